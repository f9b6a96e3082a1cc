use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anr_trace::{
    AnrObserver, AnrTraceErrno, CaptureMode, SignalCatcher, ThreadScanner, is_registered, register,
    request_self_dump, unregister,
};

use crate::probe_ctx::trace_dir;

#[derive(Default)]
struct CountingObserver {
    anr: AtomicUsize,
    captured: AtomicUsize,
}

impl AnrObserver for CountingObserver {
    fn on_system_anr(&self) {
        self.anr.fetch_add(1, Ordering::Relaxed);
    }

    fn on_trace_captured(&self, mode: CaptureMode, path: &Path) {
        assert_eq!(mode, CaptureMode::SelfTriggered);
        println!("trace captured to {}", path.display());
        self.captured.fetch_add(1, Ordering::Relaxed);
    }
}

fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    check()
}

pub unsafe fn scenario_register_idempotent() {
    let dir = trace_dir("register");
    let observer = Arc::new(CountingObserver::default());

    register(observer.clone(), dir.join("anr.txt"), dir.join("self.txt")).expect("register");
    assert!(is_registered());
    register(observer.clone(), dir.join("anr.txt"), dir.join("self.txt"))
        .expect("second register");
    assert!(is_registered());

    unregister();
    assert!(!is_registered());
    unregister();
    assert!(!is_registered());
    assert_eq!(observer.anr.load(Ordering::Relaxed), 0);
}

pub unsafe fn scenario_self_dump_uninit() {
    assert!(!is_registered());
    assert_eq!(request_self_dump(), Err(AnrTraceErrno::Uninit));
}

// 只有 ART 进程才有 Signal Catcher，其它进程只验证通知路径
pub unsafe fn scenario_self_dump() {
    let dir = trace_dir("self_dump");
    let self_trace = dir.join("self.txt");
    let observer = Arc::new(CountingObserver::default());
    register(observer.clone(), dir.join("anr.txt"), &self_trace).expect("register");

    request_self_dump().expect("request self dump");
    assert!(
        wait_until(Duration::from_secs(2), || observer.anr.load(Ordering::Relaxed) == 1),
        "observer not notified"
    );

    let has_catcher = SignalCatcher::new(ThreadScanner::new())
        .tid(libc::getpid())
        .is_some();
    if has_catcher {
        assert!(
            wait_until(Duration::from_secs(25), || {
                observer.captured.load(Ordering::Relaxed) == 1
            }),
            "self trace not captured"
        );
        let text = std::fs::read(&self_trace).expect("read self trace");
        assert!(!text.is_empty());
    }
    unregister();
}
