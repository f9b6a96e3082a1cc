// 捕获控制器：按 API level 安装/移除 connect、open、write 三个拦截点，
// 由代理函数驱动闸门，命中后移除拦截并把 write 的内容写入输出路径
use crate::config::TraceDestinations;
use crate::errno::Errno;
use crate::interpose::{HookStub, Interposer};
use crate::log;
use crate::platform::hook_plan::{SYM_WRITE, TRACE_FILE_PATH, TRACE_SOCKET_PATH};
use crate::platform::{EntryHook, HookPlan, PropertySource, api_level};
use crate::sync::MutexPoisonRecover;
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

// 闸门状态
mod gate;
// 代理函数与控制器绑定
pub(crate) mod proxies;
// 代理函数重入检测
mod reentry;
// 捕获内容落盘
mod writer;

use gate::CaptureGate;
use proxies::{ConnectFn, OpenFn, WriteFn};

/// Which destination a captured trace goes to.
#[repr(u8)]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureMode {
    /// Dump requested by the platform watchdog.
    Anr = 0,
    /// Dump requested by this process.
    SelfTriggered = 1,
}

impl CaptureMode {
    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Anr),
            1 => Some(Self::SelfTriggered),
            _ => None,
        }
    }
}

#[derive(Default)]
struct HookHandles {
    connect: Option<HookStub>,
    open: Option<HookStub>,
    write: Option<HookStub>,
}

impl HookHandles {
    fn is_empty(&self) -> bool {
        self.connect.is_none() && self.open.is_none() && self.write.is_none()
    }
}

#[derive(Default)]
struct Completion {
    captured: u64,
    last_mode: Option<CaptureMode>,
    // 停止时置位，唤醒并拒绝所有等待
    cancelled: bool,
}

pub struct CaptureController {
    interposer: Arc<dyn Interposer>,
    properties: Arc<dyn PropertySource>,
    destinations: TraceDestinations,
    api_level: OnceCell<i32>,
    hooking: AtomicBool,
    handles: Mutex<HookHandles>,
    gate: CaptureGate,
    prev_connect: AtomicUsize,
    prev_open: AtomicUsize,
    prev_write: AtomicUsize,
    completion: Mutex<Completion>,
    completion_cv: Condvar,
}

impl CaptureController {
    pub fn new(
        interposer: Arc<dyn Interposer>,
        properties: Arc<dyn PropertySource>,
        destinations: TraceDestinations,
    ) -> Self {
        Self {
            interposer,
            properties,
            destinations,
            api_level: OnceCell::new(),
            hooking: AtomicBool::new(false),
            handles: Mutex::new(HookHandles::default()),
            gate: CaptureGate::new(),
            prev_connect: AtomicUsize::new(0),
            prev_open: AtomicUsize::new(0),
            prev_write: AtomicUsize::new(0),
            completion: Mutex::new(Completion::default()),
            completion_cv: Condvar::new(),
        }
    }

    // 系统版本只读取一次
    pub fn api_level(&self) -> i32 {
        *self
            .api_level
            .get_or_init(|| api_level(self.properties.as_ref()))
    }

    pub fn destinations(&self) -> &TraceDestinations {
        &self.destinations
    }

    pub fn destination(&self, mode: CaptureMode) -> &Path {
        match mode {
            CaptureMode::Anr => self.destinations.anr_trace_path(),
            CaptureMode::SelfTriggered => self.destinations.self_trace_path(),
        }
    }

    pub fn is_hooking(&self) -> bool {
        self.hooking.load(Ordering::Acquire)
    }

    pub fn active_hook_count(&self) -> usize {
        let handles = self.handles.lock_or_poison();
        [handles.connect, handles.open, handles.write]
            .iter()
            .filter(|stub| stub.is_some())
            .count()
    }

    /// Arms interposition for one capture episode.
    ///
    /// A second call while already hooking does nothing. Failing to install
    /// one entry point does not prevent installing the others.
    pub fn install_capture(self: &Arc<Self>, mode: CaptureMode) -> Result<(), Errno> {
        if self
            .hooking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug(format_args!("capture already installed"));
            return Ok(());
        }

        let level = self.api_level();
        let Some(plan) = HookPlan::for_api_level(level) else {
            log::warn(format_args!("api level {level} unsupported, skip interposition"));
            self.hooking.store(false, Ordering::Release);
            return Err(Errno::Unsupported);
        };

        self.gate.disarm();
        self.gate.set_mode(mode);
        proxies::bind(self);

        let mut handles = self.handles.lock_or_poison();
        let (entry_slot, new_func, prev) = match plan.entry {
            EntryHook::Connect { .. } => (
                &mut handles.connect,
                proxies::connect_proxy_ptr(),
                &self.prev_connect,
            ),
            EntryHook::Open { .. } => (&mut handles.open, proxies::open_proxy_ptr(), &self.prev_open),
        };
        if entry_slot.is_none() {
            *entry_slot = self.install_one(plan.entry.caller(), plan.entry.symbol(), new_func, prev);
        }
        if handles.write.is_none() {
            handles.write = self.install_one(
                plan.write_caller,
                SYM_WRITE,
                proxies::write_proxy_ptr(),
                &self.prev_write,
            );
        }

        if handles.is_empty() {
            drop(handles);
            self.hooking.store(false, Ordering::Release);
            return Err(Errno::HookFailed);
        }
        log::info(format_args!(
            "capture installed: api {level} mode {mode:?} entry {}@{} write@{}",
            plan.entry.symbol(),
            plan.entry.caller(),
            plan.write_caller
        ));
        Ok(())
    }

    fn install_one(
        &self,
        caller: &str,
        symbol: &str,
        new_func: *mut c_void,
        prev: &AtomicUsize,
    ) -> Option<HookStub> {
        match self.interposer.install_single(caller, None, symbol, new_func) {
            Some(handle) => {
                prev.store(handle.prev_func, Ordering::Release);
                Some(handle.stub)
            }
            None => {
                log::warn(format_args!("interpose {symbol} in {caller} failed"));
                None
            }
        }
    }

    // 只移除当前存在的句柄，可重复调用
    pub fn remove_capture(&self) {
        let mut handles = self.handles.lock_or_poison();
        for stub in [handles.connect.take(), handles.open.take(), handles.write.take()]
            .into_iter()
            .flatten()
        {
            self.interposer.remove(stub);
        }
        self.gate.disarm();
        self.hooking.store(false, Ordering::Release);
    }

    pub fn observe_connect(&self, tid: i32, socket_path: &[u8]) {
        if socket_path == TRACE_SOCKET_PATH.as_bytes() {
            log::debug(format_args!("trace socket connected on {tid}"));
            self.gate.arm(tid);
        }
    }

    pub fn observe_open(&self, tid: i32, pathname: &[u8]) {
        if pathname == TRACE_FILE_PATH.as_bytes() {
            log::debug(format_args!("trace file opened on {tid}"));
            self.gate.arm(tid);
        }
    }

    /// Handles one write seen by the write proxy. Returns true when this
    /// write was the captured one.
    pub fn intercept_write(&self, tid: i32, bytes: Option<&[u8]>) -> bool {
        if !self.gate.consume(tid) {
            return false;
        }
        let token = self.gate.mode_token();
        let mode = token.mode();
        self.remove_capture();

        if let Some(bytes) = bytes {
            let path = self.destination(mode);
            match writer::write_capture(path, bytes) {
                Ok(()) => log::info(format_args!(
                    "captured {} bytes into {}",
                    bytes.len(),
                    path.display()
                )),
                Err(err) => log::warn(format_args!("write {} failed: {err}", path.display())),
            }
        }
        self.gate.reset_mode(token);
        self.notify_captured(mode);
        true
    }

    fn notify_captured(&self, mode: CaptureMode) {
        let mut completion = self.completion.lock_or_poison();
        completion.captured += 1;
        completion.last_mode = Some(mode);
        self.completion_cv.notify_all();
    }

    pub fn captured_count(&self) -> u64 {
        self.completion.lock_or_poison().captured
    }

    // 等待 captured 计数超过 seen，超时或被取消时返回 None
    pub fn wait_for_capture(&self, seen: u64, timeout: Duration) -> Option<CaptureMode> {
        let deadline = Instant::now() + timeout;
        let mut completion = self.completion.lock_or_poison();
        while completion.captured <= seen {
            if completion.cancelled {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            completion = match self.completion_cv.wait_timeout(completion, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        completion.last_mode
    }

    /// Wakes every pending [`wait_for_capture`](Self::wait_for_capture) and
    /// makes later waits return immediately until [`resume_waits`](Self::resume_waits).
    pub fn cancel_waits(&self) {
        self.completion.lock_or_poison().cancelled = true;
        self.completion_cv.notify_all();
    }

    pub fn resume_waits(&self) {
        self.completion.lock_or_poison().cancelled = false;
    }

    pub fn is_cancelled(&self) -> bool {
        self.completion.lock_or_poison().cancelled
    }

    pub(crate) fn prev_connect(&self) -> Option<ConnectFn> {
        let addr = self.prev_connect.load(Ordering::Acquire);
        (addr != 0).then(|| unsafe { std::mem::transmute::<usize, ConnectFn>(addr) })
    }

    pub(crate) fn prev_open(&self) -> Option<OpenFn> {
        let addr = self.prev_open.load(Ordering::Acquire);
        (addr != 0).then(|| unsafe { std::mem::transmute::<usize, OpenFn>(addr) })
    }

    pub(crate) fn prev_write(&self) -> Option<WriteFn> {
        let addr = self.prev_write.load(Ordering::Acquire);
        (addr != 0).then(|| unsafe { std::mem::transmute::<usize, WriteFn>(addr) })
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.gate.is_armed()
    }

    // 控制器停用：移除拦截并解除代理绑定
    pub fn shutdown(self: &Arc<Self>) {
        self.remove_capture();
        proxies::unbind(self);
    }
}
