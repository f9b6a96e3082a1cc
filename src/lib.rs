#![allow(dead_code)]
#![allow(unsafe_op_in_unsafe_fn)]
#![allow(clippy::missing_safety_doc)]

#[cfg(not(any(target_os = "android", target_os = "linux")))]
compile_error!("anr_trace supports Android and Linux hosts only");

#[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
compile_error!("anr_trace supports only 64-bit architectures: aarch64 and x86_64");

// 公共 API：注册、卸载、自触发 dump
mod api;
// 捕获控制器：拦截点安装、闸门、落盘
mod capture;
// Signal Catcher 线程定位与信号重投递
mod catcher;
// 输出路径与超时配置
mod config;
// ELF 解析：符号表与 GOT 槽位
mod elf;
// 错误码定义
mod errno;
// 函数拦截能力接口与 PLT 实现
mod interpose;
// Java 层 native 方法
#[cfg(feature = "jni")]
mod jni_bridge;
// 日志输出，Android 上使用 logcat
mod log;
// ANR 事件编排与分发线程
mod monitor;
// 系统属性与按版本选择拦截目标
mod platform;
// 进程级注册状态与 SIGQUIT 处理器
mod runtime;
// SIGQUIT 处理器安装与恢复
mod signal;
// 锁中毒恢复
mod sync;
#[cfg(test)]
mod test_support;
// 版本信息
mod version;

pub use api::{
    AnrObserver, get_debug, get_version, init, is_registered, register, request_self_dump,
    set_debug, unregister,
};
pub use capture::{CaptureController, CaptureMode};
pub use catcher::{DumpTrigger, SignalCatcher, SignalCatcherTrigger, ThreadScanner};
pub use config::{MonitorConfig, TraceDestinations};
pub use errno::Errno as AnrTraceErrno;
pub use interpose::{HookHandle, HookStub, Interposer, PltInterposer};
pub use monitor::AnrMonitor;
pub use platform::{EntryHook, HookPlan, PropertySource, SystemProperties, api_level};
