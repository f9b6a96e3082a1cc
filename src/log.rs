// 日志输出：Android 上写 logcat（tag anr_trace），宿主机上写 stderr
// 信号处理器与拦截中的 write 代理内不得调用
#[cfg(target_os = "android")]
use std::ffi::c_char;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

// 取值与 android_LogPriority 一致
#[repr(i32)]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
enum Level {
    Debug = 3,
    Info = 4,
    Warn = 5,
    Error = 6,
}

impl Level {
    fn short_name(self) -> &'static str {
        match self {
            Self::Debug => "D",
            Self::Info => "I",
            Self::Warn => "W",
            Self::Error => "E",
        }
    }
}

static MIN_LEVEL: AtomicI32 = AtomicI32::new(Level::Warn as i32);

#[cfg(target_os = "android")]
const LOG_TAG: &[u8] = b"anr_trace\0";

#[cfg(target_os = "android")]
#[link(name = "log")]
unsafe extern "C" {
    fn __android_log_write(prio: i32, tag: *const c_char, text: *const c_char) -> i32;
}

// 启用时输出 DEBUG 及以上，否则只输出 WARN 及以上
pub fn set_debug_enabled(enabled: bool) {
    let level = if enabled { Level::Debug } else { Level::Warn };
    MIN_LEVEL.store(level as i32, Ordering::SeqCst);
}

pub fn debug_enabled() -> bool {
    enabled(Level::Debug)
}

fn enabled(level: Level) -> bool {
    MIN_LEVEL.load(Ordering::Relaxed) <= level as i32
}

#[cfg(target_os = "android")]
fn emit(level: Level, args: fmt::Arguments) {
    // logcat 以 NUL 结尾，内嵌的 NUL 替换为空格
    let mut text: Vec<u8> = args
        .to_string()
        .into_bytes()
        .into_iter()
        .map(|byte| if byte == 0 { b' ' } else { byte })
        .collect();
    text.push(0);
    unsafe {
        __android_log_write(level as i32, LOG_TAG.as_ptr().cast(), text.as_ptr().cast());
    }
}

#[cfg(not(target_os = "android"))]
fn emit(level: Level, args: fmt::Arguments) {
    eprintln!("[anr_trace] {} {args}", level.short_name());
}

fn write_log(level: Level, args: fmt::Arguments) {
    if enabled(level) {
        emit(level, args);
    }
}

pub(crate) fn debug(args: fmt::Arguments) {
    write_log(Level::Debug, args);
}

pub(crate) fn info(args: fmt::Arguments) {
    write_log(Level::Info, args);
}

pub(crate) fn warn(args: fmt::Arguments) {
    write_log(Level::Warn, args);
}

pub(crate) fn error(args: fmt::Arguments) {
    write_log(Level::Error, args);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_toggle_moves_threshold() {
        set_debug_enabled(true);
        assert!(debug_enabled());
        assert!(enabled(Level::Info));
        set_debug_enabled(false);
        assert!(!debug_enabled());
        assert!(!enabled(Level::Info));
        assert!(enabled(Level::Warn));
        assert!(enabled(Level::Error));
    }
}
