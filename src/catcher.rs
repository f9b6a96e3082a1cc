// Signal Catcher 线程定位与 SIGQUIT 重投递
// 通过 /proc/<pid>/task 枚举线程，按线程名与 SigBlk 掩码指纹识别
use crate::errno::Errno;
use crate::log;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};

pub const SIGNAL_CATCHER_NAME: &str = "Signal Catcher";
pub const SIGBLK_FINGERPRINT: u64 = 0x1000;

const PROC_ROOT: &str = "/proc";

// 缓存状态：尚未解析 / 解析过但未找到
const TID_UNLOADED: i32 = -2;
const TID_UNKNOWN: i32 = -1;

static SIGBLK_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?m)^SigBlk:\s*([0-9a-fA-F]+)").ok());

/// Something that makes the platform's dump thread produce a trace.
pub trait DumpTrigger: Send + Sync {
    fn trigger_dump(&self) -> Result<(), Errno>;
}

/// Scans the thread list of a process for the runtime's dump thread.
#[derive(Clone, Debug)]
pub struct ThreadScanner {
    proc_root: PathBuf,
    fingerprint: u64,
}

impl Default for ThreadScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadScanner {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from(PROC_ROOT),
            fingerprint: SIGBLK_FINGERPRINT,
        }
    }

    pub fn with_proc_root(mut self, proc_root: impl Into<PathBuf>) -> Self {
        self.proc_root = proc_root.into();
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: u64) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Returns the tid of the first thread named `Signal Catcher` whose
    /// blocked-signal mask equals the fingerprint.
    pub fn resolve(&self, pid: i32) -> Option<i32> {
        let task_dir = self.proc_root.join(pid.to_string()).join("task");
        let entries = match fs::read_dir(&task_dir) {
            Ok(entries) => entries,
            Err(err) => {
                log::warn(format_args!("open {} failed: {err}", task_dir.display()));
                return None;
            }
        };

        let mut tids: Vec<i32> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
            .collect();
        tids.sort_unstable();

        tids.into_iter()
            .find(|&tid| self.is_signal_catcher(&task_dir.join(tid.to_string())))
    }

    // 线程可能在枚举与读取之间退出，读取失败视为不匹配
    fn is_signal_catcher(&self, thread_dir: &Path) -> bool {
        let Ok(comm) = fs::read_to_string(thread_dir.join("comm")) else {
            return false;
        };
        if comm.trim_end_matches('\n') != SIGNAL_CATCHER_NAME {
            return false;
        }
        let Ok(status) = fs::read_to_string(thread_dir.join("status")) else {
            return false;
        };
        match parse_sigblk(&status) {
            Some(mask) if mask == self.fingerprint => true,
            Some(mask) => {
                log::debug(format_args!(
                    "{} SigBlk {mask:#x} != {:#x}",
                    thread_dir.display(),
                    self.fingerprint
                ));
                false
            }
            None => false,
        }
    }
}

pub(crate) fn parse_sigblk(status: &str) -> Option<u64> {
    let re = SIGBLK_RE.as_ref()?;
    let caps = re.captures(status)?;
    u64::from_str_radix(caps.get(1)?.as_str(), 16).ok()
}

/// Lazily resolved, cached tid of the dump thread.
pub struct SignalCatcher {
    scanner: ThreadScanner,
    tid: AtomicI32,
}

impl SignalCatcher {
    pub fn new(scanner: ThreadScanner) -> Self {
        Self {
            scanner,
            tid: AtomicI32::new(TID_UNLOADED),
        }
    }

    pub fn cached_tid(&self) -> Option<i32> {
        let tid = self.tid.load(Ordering::Acquire);
        (tid >= 0).then_some(tid)
    }

    // 未解析或上次未找到时重新扫描
    pub fn tid(&self, pid: i32) -> Option<i32> {
        self.cached_tid().or_else(|| self.refresh(pid))
    }

    pub fn refresh(&self, pid: i32) -> Option<i32> {
        let resolved = self.scanner.resolve(pid);
        self.tid
            .store(resolved.unwrap_or(TID_UNKNOWN), Ordering::Release);
        match resolved {
            Some(tid) => log::debug(format_args!("signal catcher tid {tid}")),
            None => log::warn(format_args!("signal catcher not found in {pid}")),
        }
        resolved
    }

    pub fn invalidate(&self) {
        self.tid.store(TID_UNKNOWN, Ordering::Release);
    }

    /// Re-sends SIGQUIT to the dump thread; a stale tid is re-resolved once.
    pub fn resend(&self, pid: i32) -> Result<(), Errno> {
        self.resend_with(pid, tgkill_sigquit)
    }

    pub(crate) fn resend_with<F>(&self, pid: i32, send: F) -> Result<(), Errno>
    where
        F: Fn(i32, i32) -> Result<(), i32>,
    {
        let tid = self.tid(pid).ok_or(Errno::ThreadNotFound)?;
        match send(pid, tid) {
            Ok(()) => Ok(()),
            Err(libc::ESRCH) => {
                self.invalidate();
                let tid = self.refresh(pid).ok_or(Errno::ThreadNotFound)?;
                send(pid, tid).map_err(|err| {
                    log::error(format_args!("tgkill {pid}/{tid} failed: {err}"));
                    Errno::SignalSend
                })
            }
            Err(err) => {
                log::error(format_args!("tgkill {pid}/{tid} failed: {err}"));
                Err(Errno::SignalSend)
            }
        }
    }
}

fn tgkill_sigquit(pid: i32, tid: i32) -> Result<(), i32> {
    let ret = unsafe {
        libc::syscall(
            libc::SYS_tgkill,
            pid as libc::c_long,
            tid as libc::c_long,
            libc::SIGQUIT as libc::c_long,
        )
    };
    if ret == 0 {
        return Ok(());
    }
    Err(std::io::Error::last_os_error().raw_os_error().unwrap_or(0))
}

/// Triggers a dump by re-sending SIGQUIT to this process's Signal Catcher.
pub struct SignalCatcherTrigger {
    pid: i32,
    catcher: SignalCatcher,
}

impl SignalCatcherTrigger {
    pub fn new(pid: i32, scanner: ThreadScanner) -> Self {
        Self {
            pid,
            catcher: SignalCatcher::new(scanner),
        }
    }

    pub fn for_current_process() -> Self {
        Self::new(unsafe { libc::getpid() }, ThreadScanner::new())
    }

    pub fn catcher(&self) -> &SignalCatcher {
        &self.catcher
    }
}

impl DumpTrigger for SignalCatcherTrigger {
    fn trigger_dump(&self) -> Result<(), Errno> {
        self.catcher.resend(self.pid)
    }
}

#[cfg(test)]
mod tests;
