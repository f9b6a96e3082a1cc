// SIGQUIT 处理器的安装与恢复
// 安装前在当前线程解除 SIGQUIT 屏蔽，保存旧的处理器与掩码，卸载时原样恢复
use crate::errno::Errno;
use crate::log;
use std::ffi::c_void;
use std::mem;
use std::ptr;

pub type SigInfoHandler = extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut c_void);

/// Previous SIGQUIT action and the registering thread's previous mask.
pub struct SavedSignalState {
    old_action: libc::sigaction,
    old_mask: libc::sigset_t,
}

// 信号来源：自身进程发出的诊断 dump，或 system_server 发出的 ANR
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SignalOrigin {
    SelfTriggered,
    External,
}

impl SignalOrigin {
    pub fn from_sender(sender_pid: Option<i32>, own_pid: i32) -> Self {
        match sender_pid {
            Some(pid) if pid == own_pid => Self::SelfTriggered,
            _ => Self::External,
        }
    }
}

/// Installs `handler` for SIGQUIT and unblocks SIGQUIT on the calling thread.
///
/// Expected to be called from the main thread. When the handler cannot be
/// installed the mask change is rolled back.
pub fn register(handler: SigInfoHandler) -> Result<SavedSignalState, Errno> {
    unsafe {
        let mut set: libc::sigset_t = mem::zeroed();
        libc::sigemptyset(&mut set);
        libc::sigaddset(&mut set, libc::SIGQUIT);

        let mut old_mask: libc::sigset_t = mem::zeroed();
        let ret = libc::pthread_sigmask(libc::SIG_UNBLOCK, &set, &mut old_mask);
        if ret != 0 {
            log::error(format_args!("unblock SIGQUIT failed: {ret}"));
            return Err(Errno::SigMask);
        }

        let mut act: libc::sigaction = mem::zeroed();
        libc::sigfillset(&mut act.sa_mask);
        act.sa_sigaction = handler as *const () as usize;
        act.sa_flags = libc::SA_RESTART | libc::SA_SIGINFO;

        let mut old_action: libc::sigaction = mem::zeroed();
        if libc::sigaction(libc::SIGQUIT, &act, &mut old_action) != 0 {
            let err = std::io::Error::last_os_error();
            log::error(format_args!("sigaction SIGQUIT failed: {err}"));
            libc::pthread_sigmask(libc::SIG_SETMASK, &old_mask, ptr::null_mut());
            return Err(Errno::SigAction);
        }

        log::debug(format_args!("SIGQUIT handler installed"));
        Ok(SavedSignalState {
            old_action,
            old_mask,
        })
    }
}

// 无条件恢复掩码与处理器
pub fn unregister(saved: &SavedSignalState) {
    unsafe {
        libc::pthread_sigmask(libc::SIG_SETMASK, &saved.old_mask, ptr::null_mut());
        if libc::sigaction(libc::SIGQUIT, &saved.old_action, ptr::null_mut()) != 0 {
            let err = std::io::Error::last_os_error();
            log::error(format_args!("restore SIGQUIT action failed: {err}"));
        }
    }
    log::debug(format_args!("SIGQUIT handler restored"));
}

// 从 siginfo 读取发送方 pid，信号处理器上下文中调用
pub unsafe fn sender_pid(info: *const libc::siginfo_t) -> Option<i32> {
    if info.is_null() {
        return None;
    }
    Some((*info).si_pid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    static LAST_SENDER: AtomicI32 = AtomicI32::new(0);

    extern "C" fn record_sender(_sig: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut c_void) {
        let pid = unsafe { sender_pid(info) }.unwrap_or(-1);
        LAST_SENDER.store(pid, Ordering::SeqCst);
    }

    fn current_sigquit_action() -> usize {
        unsafe {
            let mut current: libc::sigaction = mem::zeroed();
            libc::sigaction(libc::SIGQUIT, ptr::null(), &mut current);
            current.sa_sigaction
        }
    }

    #[test]
    fn origin_from_sender() {
        assert_eq!(SignalOrigin::from_sender(Some(100), 100), SignalOrigin::SelfTriggered);
        assert_eq!(SignalOrigin::from_sender(Some(1000), 100), SignalOrigin::External);
        assert_eq!(SignalOrigin::from_sender(None, 100), SignalOrigin::External);
    }

    #[test]
    fn null_siginfo_has_no_sender() {
        assert_eq!(unsafe { sender_pid(ptr::null()) }, None);
    }

    #[test]
    fn register_delivers_and_restores() {
        let before = current_sigquit_action();
        let saved = register(record_sender).expect("register should succeed");
        assert_eq!(current_sigquit_action(), record_sender as *const () as usize);

        unsafe { libc::raise(libc::SIGQUIT) };
        assert_eq!(LAST_SENDER.load(Ordering::SeqCst), unsafe { libc::getpid() });

        unregister(&saved);
        assert_eq!(current_sigquit_action(), before);
    }
}
