// PLT/GOT 改写：枚举 caller 模块，定位导入符号的 GOT 槽位并写入替换函数
use crate::elf::{self, Elf};
use crate::errno::Errno;
use crate::log;
use crate::sync::MutexPoisonRecover;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::ffi::{CStr, c_void};
use std::sync::Mutex;

use super::{HookHandle, HookStub, Interposer, path_match};

// /proc/self/maps 解析
pub(crate) mod maps;
// 页面保护属性读写
pub(crate) mod memory;

use maps::MapsEntry;

// 自身所在模块不参与改写，代理函数内部的调用需要直达原函数
static SELF_MODULE: Lazy<Option<String>> = Lazy::new(|| {
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    let addr = PltInterposer::new as *const () as *const c_void;
    if unsafe { libc::dladdr(addr, &mut info) } == 0 || info.dli_fname.is_null() {
        return None;
    }
    let name = unsafe { CStr::from_ptr(info.dli_fname) };
    name.to_str().ok().map(str::to_string)
});

fn is_self_module(pathname: &str) -> bool {
    SELF_MODULE
        .as_deref()
        .is_some_and(|self_path| path_match(pathname, self_path))
}

#[derive(Clone, Copy, Debug)]
struct PatchedSlot {
    addr: usize,
    prev: usize,
    new_func: usize,
}

struct PltState {
    next_stub: HookStub,
    patches: BTreeMap<HookStub, Vec<PatchedSlot>>,
}

/// Redirects imported functions by rewriting GOT entries of loaded modules.
///
/// Only modules present at install time are patched; libraries loaded later
/// keep calling the original function.
pub struct PltInterposer {
    state: Mutex<PltState>,
}

impl Default for PltInterposer {
    fn default() -> Self {
        Self::new()
    }
}

impl PltInterposer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PltState {
                next_stub: 1,
                patches: BTreeMap::new(),
            }),
        }
    }

    fn patch_module(
        entries: &[MapsEntry],
        module: &maps::LoadedModule,
        callee_ranges: Option<&[(usize, usize)]>,
        sym_name: &str,
        new_func: usize,
        patched: &mut Vec<PatchedSlot>,
    ) -> Result<(), Errno> {
        let elf = unsafe { Elf::init(module.base_addr, &module.pathname)? };
        let slots = unsafe { elf.find_got_slots(sym_name)? };
        for addr in slots {
            let current = unsafe { elf::read_slot(addr) };
            if current == new_func {
                continue;
            }
            if let Some(ranges) = callee_ranges
                && !ranges.iter().any(|&(start, end)| current >= start && current < end)
            {
                continue;
            }
            patch_slot(entries, addr, new_func)?;
            log::debug(format_args!(
                "patched {sym_name} in {} slot {addr:#x} prev {current:#x}",
                elf.pathname()
            ));
            patched.push(PatchedSlot {
                addr,
                prev: current,
                new_func,
            });
        }
        Ok(())
    }
}

impl Interposer for PltInterposer {
    fn install_single(
        &self,
        caller_path_name: &str,
        callee_path_name: Option<&str>,
        sym_name: &str,
        new_func: *mut c_void,
    ) -> Option<HookHandle> {
        if caller_path_name.is_empty() || sym_name.is_empty() || new_func.is_null() {
            return None;
        }
        let entries = maps::read_maps();
        let callee_ranges = callee_path_name.map(|callee| maps::module_ranges(&entries, callee));
        if callee_ranges.as_ref().is_some_and(Vec::is_empty) {
            log::debug(format_args!("callee {callee_path_name:?} not loaded"));
            return None;
        }

        let mut patched = Vec::new();
        for module in maps::loaded_modules(&entries) {
            if !path_match(&module.pathname, caller_path_name) || is_self_module(&module.pathname) {
                continue;
            }
            if let Err(err) = Self::patch_module(
                &entries,
                &module,
                callee_ranges.as_deref(),
                sym_name,
                new_func as usize,
                &mut patched,
            ) {
                log::warn(format_args!(
                    "interpose {sym_name} in {} failed: {err}",
                    module.pathname
                ));
            }
        }

        let prev_func = patched.first()?.prev;
        let mut state = self.state.lock_or_poison();
        let stub = state.next_stub;
        state.next_stub += 1;
        state.patches.insert(stub, patched);
        Some(HookHandle { stub, prev_func })
    }

    fn remove(&self, stub: HookStub) {
        let Some(patched) = self.state.lock_or_poison().patches.remove(&stub) else {
            return;
        };
        let entries = maps::read_maps();
        for slot in patched.iter().rev() {
            // 槽位已被他人改写时保持现状
            if unsafe { elf::read_slot(slot.addr) } != slot.new_func {
                continue;
            }
            if let Err(err) = patch_slot(&entries, slot.addr, slot.prev) {
                log::warn(format_args!("restore slot {:#x} failed: {err}", slot.addr));
            }
        }
    }
}

// 写入 GOT 槽位：必要时临时改为可写 -> 写入 -> 恢复保护 -> 内存屏障
fn patch_slot(entries: &[MapsEntry], addr: usize, value: usize) -> Result<(), Errno> {
    let old_prot = memory::addr_protect(entries, addr)?;
    let writable_prot = memory::PROT_READ_FLAG | memory::PROT_WRITE_FLAG;
    let changed_protect = old_prot != writable_prot;
    if changed_protect {
        memory::set_addr_protect(addr, writable_prot)?;
    }

    unsafe { elf::write_slot(addr, value) };
    let written = unsafe { elf::read_slot(addr) };

    if changed_protect {
        let _ = memory::set_addr_protect(addr, old_prot);
    }
    if written != value {
        return Err(Errno::HookFailed);
    }
    memory::publish_slot_write();
    Ok(())
}
