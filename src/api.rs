use crate::capture::CaptureMode;
use crate::errno::Errno;
use crate::runtime;
use std::path::Path;
use std::sync::Arc;

/// Receives ANR notifications.
///
/// `on_system_anr` is called from the SIGQUIT handler, before any capture
/// work starts, so it must restrict itself to async-signal-safe work.
/// `on_trace_captured` is called from the capture thread once the trace text
/// has been written.
pub trait AnrObserver: Send + Sync {
    fn on_system_anr(&self);

    fn on_trace_captured(&self, _mode: CaptureMode, _path: &Path) {}
}

pub fn get_version() -> String {
    runtime::get_version()
}

// 设置两个输出路径，只有第一次调用生效
pub fn init(anr_trace_path: impl AsRef<Path>, self_trace_path: impl AsRef<Path>) -> Result<(), Errno> {
    runtime::init(anr_trace_path.as_ref(), self_trace_path.as_ref())
}

/// Installs the SIGQUIT handler and starts the capture pipeline.
///
/// Must be called from the main thread. Calling it again before
/// [`unregister`] does nothing.
pub fn register(
    observer: Arc<dyn AnrObserver>,
    anr_trace_path: impl AsRef<Path>,
    self_trace_path: impl AsRef<Path>,
) -> Result<(), Errno> {
    runtime::register(observer, anr_trace_path.as_ref(), self_trace_path.as_ref())
}

// 未注册时为空操作
pub fn unregister() {
    runtime::unregister()
}

pub fn is_registered() -> bool {
    runtime::is_registered()
}

// 向自身进程发送 SIGQUIT，trace 写入 self_trace_path
pub fn request_self_dump() -> Result<(), Errno> {
    runtime::request_self_dump()
}

pub fn set_debug(debug: bool) {
    runtime::set_debug(debug)
}

pub fn get_debug() -> bool {
    runtime::get_debug()
}
