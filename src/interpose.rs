// 函数拦截能力接口：在模块 Y 中把符号 X 的调用重定向到替换函数
// 捕获逻辑只依赖此契约，不关心具体实现方式
use std::ffi::c_void;

// PLT/GOT 改写实现
#[cfg(any(target_os = "android", target_os = "linux"))]
pub mod plt;

#[cfg(any(target_os = "android", target_os = "linux"))]
pub use plt::PltInterposer;

/// Opaque identifier of one installed interposition.
pub type HookStub = u64;

/// Result of a successful install: the stub used for removal and the
/// function the replacement must forward to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HookHandle {
    pub stub: HookStub,
    pub prev_func: usize,
}

/// Capability to redirect calls to a named library function.
///
/// `install_single` returns `None` when nothing could be redirected; callers
/// treat that as "feature unavailable" rather than a fatal error. `remove`
/// must be idempotent and accept stubs it no longer knows.
pub trait Interposer: Send + Sync {
    fn install_single(
        &self,
        caller_path_name: &str,
        callee_path_name: Option<&str>,
        sym_name: &str,
        new_func: *mut c_void,
    ) -> Option<HookHandle>;

    fn remove(&self, stub: HookStub);
}

// 纯路径匹配：绝对路径要求完全相等，相对路径使用后缀匹配
pub(crate) fn path_match(module_path: &str, rule: &str) -> bool {
    if rule.is_empty() {
        return false;
    }
    if rule.starts_with('/') {
        module_path == rule
    } else {
        module_path.ends_with(rule)
            && (module_path.len() == rule.len()
                || module_path.as_bytes()[module_path.len() - rule.len() - 1] == b'/')
    }
}
