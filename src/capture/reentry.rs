// 代理函数重入检测：捕获处理期间本线程再次进入代理时直接透传
use std::cell::Cell;

thread_local! {
    #[allow(clippy::missing_const_for_thread_local)]
    static CAPTURE_DEPTH: Cell<u32> = Cell::new(0);
}

pub(super) fn is_in_capture() -> bool {
    CAPTURE_DEPTH.with(|depth| depth.get() > 0)
}

// RAII guard 保证 panic 时深度也能回退
pub(super) fn run_in_capture<R, F>(f: F) -> R
where
    F: FnOnce() -> R,
{
    struct CaptureGuard;

    impl Drop for CaptureGuard {
        fn drop(&mut self) {
            CAPTURE_DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
        }
    }

    CAPTURE_DEPTH.with(|depth| depth.set(depth.get().saturating_add(1)));
    let _guard = CaptureGuard;
    f()
}
