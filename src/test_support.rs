// 单元测试共用的假实现：拦截器、系统属性、输出目录
use crate::config::TraceDestinations;
use crate::interpose::{HookHandle, HookStub, Interposer};
use crate::platform::PropertySource;
use std::collections::BTreeSet;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tempfile::TempDir;

// 代理函数的控制器绑定是进程级的，涉及 install 的测试需串行
static SERIAL: Mutex<()> = Mutex::new(());

pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct InstallCall {
    pub(crate) caller: String,
    pub(crate) symbol: String,
}

pub(crate) struct FakeInterposer {
    next_stub: AtomicU64,
    failing: Vec<&'static str>,
    installs: Mutex<Vec<InstallCall>>,
    active: Mutex<BTreeSet<HookStub>>,
    removes: Mutex<Vec<HookStub>>,
}

impl FakeInterposer {
    pub(crate) fn new() -> Self {
        Self::failing(&[])
    }

    pub(crate) fn failing(symbols: &[&'static str]) -> Self {
        Self {
            next_stub: AtomicU64::new(100),
            failing: symbols.to_vec(),
            installs: Mutex::new(Vec::new()),
            active: Mutex::new(BTreeSet::new()),
            removes: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn installs(&self) -> Vec<(String, String)> {
        self.installs
            .lock()
            .unwrap()
            .iter()
            .map(|call| (call.caller.clone(), call.symbol.clone()))
            .collect()
    }

    pub(crate) fn active_count(&self) -> usize {
        self.active.lock().unwrap().len()
    }

    pub(crate) fn remove_calls(&self) -> Vec<HookStub> {
        self.removes.lock().unwrap().clone()
    }
}

impl Interposer for FakeInterposer {
    fn install_single(
        &self,
        caller_path_name: &str,
        _callee_path_name: Option<&str>,
        sym_name: &str,
        _new_func: *mut c_void,
    ) -> Option<HookHandle> {
        self.installs.lock().unwrap().push(InstallCall {
            caller: caller_path_name.to_string(),
            symbol: sym_name.to_string(),
        });
        if self.failing.contains(&sym_name) {
            return None;
        }
        let stub = self.next_stub.fetch_add(1, Ordering::SeqCst);
        self.active.lock().unwrap().insert(stub);
        // prev_func 为 0 时代理函数回退到 libc 实现
        Some(HookHandle { stub, prev_func: 0 })
    }

    fn remove(&self, stub: HookStub) {
        self.removes.lock().unwrap().push(stub);
        self.active.lock().unwrap().remove(&stub);
    }
}

pub(crate) struct FakeProperties {
    sdk: Option<String>,
    reads: AtomicUsize,
}

impl FakeProperties {
    pub(crate) fn api(level: i32) -> Self {
        Self {
            sdk: Some(level.to_string()),
            reads: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

impl PropertySource for FakeProperties {
    fn get_string(&self, _name: &str) -> Option<String> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.sdk.clone()
    }
}

pub(crate) fn destinations(dir: &TempDir) -> TraceDestinations {
    TraceDestinations::new(dir.path().join("anr.txt"), dir.path().join("self.txt"))
        .expect("tempdir paths are absolute")
}
