// 进程级注册状态：输出路径、当前 monitor、保存的信号状态，以及 SIGQUIT 处理器
use crate::api::AnrObserver;
use crate::config::{MonitorConfig, TraceDestinations, debug_from_env};
use crate::errno::Errno;
use crate::log;
use crate::monitor::AnrMonitor;
use crate::signal::{self, SavedSignalState};
use crate::sync::MutexPoisonRecover;
use crate::version;
use once_cell::sync::{Lazy, OnceCell};
use std::ffi::c_void;
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

struct Registration {
    monitor: Arc<AnrMonitor>,
    saved: SavedSignalState,
}

static DESTINATIONS: OnceCell<TraceDestinations> = OnceCell::new();
static REGISTRATION: Mutex<Option<Registration>> = Mutex::new(None);
// 信号处理器读取的 monitor 指针，由 Arc::into_raw 产生
static ACTIVE: AtomicPtr<AnrMonitor> = AtomicPtr::new(ptr::null_mut());
// 正在执行的信号处理器数，非 0 时不能释放旧 monitor
static HANDLERS_IN_FLIGHT: AtomicUsize = AtomicUsize::new(0);
// 换下的 monitor 在处理器全部退出后才释放，超时未退出的留待下次回收
static RETIRED: Lazy<Mutex<Vec<Arc<AnrMonitor>>>> = Lazy::new(|| Mutex::new(Vec::new()));
const HANDLER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);
static DEBUG_FROM_ENV: Lazy<()> = Lazy::new(|| {
    if let Some(enabled) = debug_from_env() {
        log::set_debug_enabled(enabled);
    }
});

extern "C" fn sigquit_handler(_sig: libc::c_int, info: *mut libc::siginfo_t, _ctx: *mut c_void) {
    HANDLERS_IN_FLIGHT.fetch_add(1, Ordering::SeqCst);
    let monitor = ACTIVE.load(Ordering::SeqCst);
    if !monitor.is_null() {
        unsafe {
            let sender = signal::sender_pid(info);
            (*monitor).handle_signal(sender);
        }
    }
    HANDLERS_IN_FLIGHT.fetch_sub(1, Ordering::SeqCst);
}

pub(crate) fn init(anr_trace_path: &Path, self_trace_path: &Path) -> Result<(), Errno> {
    Lazy::force(&DEBUG_FROM_ENV);
    let destinations = TraceDestinations::new(anr_trace_path, self_trace_path)?;
    let stored = DESTINATIONS.get_or_init(|| destinations.clone());
    if *stored != destinations {
        log::warn(format_args!(
            "trace paths already set to {} / {}, ignore new ones",
            stored.anr_trace_path().display(),
            stored.self_trace_path().display()
        ));
    }
    Ok(())
}

pub(crate) fn register(
    observer: Arc<dyn AnrObserver>,
    anr_trace_path: &Path,
    self_trace_path: &Path,
) -> Result<(), Errno> {
    let mut registration = REGISTRATION.lock_or_poison();
    if registration.is_some() {
        log::debug(format_args!("already registered"));
        return Ok(());
    }
    init(anr_trace_path, self_trace_path)?;
    let destinations = DESTINATIONS.get().ok_or(Errno::Uninit)?;

    let config = MonitorConfig::new(destinations.clone());
    let monitor = Arc::new(AnrMonitor::with_defaults(&config, observer));
    monitor.start()?;
    publish(&monitor);

    let saved = match signal::register(sigquit_handler) {
        Ok(saved) => saved,
        Err(err) => {
            retire_active();
            monitor.stop();
            return Err(err);
        }
    };
    *registration = Some(Registration { monitor, saved });
    log::info(format_args!(
        "registered, capture timeout {:?}",
        config.capture_timeout
    ));
    Ok(())
}

pub(crate) fn unregister() {
    let Some(registration) = REGISTRATION.lock_or_poison().take() else {
        return;
    };
    signal::unregister(&registration.saved);
    retire_active();
    registration.monitor.stop();
    log::info(format_args!("unregistered"));
}

pub(crate) fn is_registered() -> bool {
    REGISTRATION.lock_or_poison().is_some()
}

pub(crate) fn request_self_dump() -> Result<(), Errno> {
    if !is_registered() {
        return Err(Errno::Uninit);
    }
    if unsafe { libc::kill(libc::getpid(), libc::SIGQUIT) } != 0 {
        let err = std::io::Error::last_os_error();
        log::error(format_args!("send SIGQUIT to self failed: {err}"));
        return Err(Errno::SignalSend);
    }
    Ok(())
}

fn publish(monitor: &Arc<AnrMonitor>) {
    let raw = Arc::into_raw(monitor.clone()) as *mut AnrMonitor;
    let old = ACTIVE.swap(raw, Ordering::SeqCst);
    retire_raw(old);
}

fn retire_active() {
    let old = ACTIVE.swap(ptr::null_mut(), Ordering::SeqCst);
    retire_raw(old);
}

fn retire_raw(raw: *mut AnrMonitor) {
    if !raw.is_null() {
        let monitor = unsafe { Arc::from_raw(raw as *const AnrMonitor) };
        RETIRED.lock_or_poison().push(monitor);
    }
    collect_retired();
}

// ACTIVE 已换下，此后进入的处理器看不到旧指针；等已在执行的处理器退出即可释放
fn collect_retired() {
    if !wait_handlers_drained(HANDLER_DRAIN_TIMEOUT) {
        log::warn(format_args!("sigquit handler still running, defer monitor release"));
        return;
    }
    let ready = std::mem::take(&mut *RETIRED.lock_or_poison());
    drop(ready);
}

fn wait_handlers_drained(timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while HANDLERS_IN_FLIGHT.load(Ordering::SeqCst) != 0 {
        if Instant::now() >= deadline {
            return false;
        }
        thread::yield_now();
    }
    true
}

pub(crate) fn set_debug(debug: bool) {
    log::set_debug_enabled(debug);
}

pub(crate) fn get_debug() -> bool {
    log::debug_enabled()
}

pub(crate) fn get_version() -> String {
    version::version_str_full()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serial;

    struct SilentObserver;

    impl AnrObserver for SilentObserver {
        fn on_system_anr(&self) {}
    }

    #[test]
    fn unregister_without_register_is_noop() {
        let _serial = serial();
        unregister();
        unregister();
        assert!(!is_registered());
        assert!(ACTIVE.load(Ordering::Acquire).is_null());
        assert!(RETIRED.lock_or_poison().is_empty());
    }

    #[test]
    fn unregister_releases_observer() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let observer = Arc::new(SilentObserver);

        register(observer.clone(), &dir.path().join("anr.txt"), &dir.path().join("self.txt"))
            .unwrap();
        assert!(is_registered());
        assert!(Arc::strong_count(&observer) > 1);

        unregister();
        assert!(!is_registered());
        assert!(ACTIVE.load(Ordering::Acquire).is_null());
        assert!(RETIRED.lock_or_poison().is_empty());
        assert_eq!(Arc::strong_count(&observer), 1);
    }

    #[test]
    fn repeated_cycles_keep_nothing_alive() {
        let _serial = serial();
        let dir = tempfile::tempdir().unwrap();
        let observer = Arc::new(SilentObserver);
        for _ in 0..3 {
            register(observer.clone(), &dir.path().join("anr.txt"), &dir.path().join("self.txt"))
                .unwrap();
            unregister();
        }
        assert!(RETIRED.lock_or_poison().is_empty());
        assert_eq!(Arc::strong_count(&observer), 1);
    }

    #[test]
    fn self_dump_requires_registration() {
        let _serial = serial();
        assert_eq!(request_self_dump(), Err(Errno::Uninit));
    }

    #[test]
    fn init_rejects_relative_paths() {
        assert_eq!(
            init(Path::new("anr.txt"), Path::new("/data/app/self.txt")),
            Err(Errno::InvalidArg)
        );
        assert_eq!(
            init(Path::new("/data/app/anr.txt"), Path::new("")),
            Err(Errno::InvalidArg)
        );
    }

    #[test]
    fn handler_without_monitor_returns() {
        let _serial = serial();
        sigquit_handler(libc::SIGQUIT, ptr::null_mut(), ptr::null_mut());
        assert_eq!(HANDLERS_IN_FLIGHT.load(Ordering::SeqCst), 0);
        assert!(wait_handlers_drained(Duration::from_millis(10)));
    }
}
