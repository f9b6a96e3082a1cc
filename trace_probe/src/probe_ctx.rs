use std::ffi::{CString, c_char, c_void};
use std::path::PathBuf;

pub const PROBE_LIB: &str = "libtrace_probe.so";

pub type ProbeWriteFn = unsafe extern "C" fn(i32, *const c_void, usize) -> isize;
pub type ProbeOpenFn = unsafe extern "C" fn(*const c_char) -> i32;

pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

// 加载探针库：优先可执行文件同目录，其次交给动态链接器搜索
pub unsafe fn load_probe_lib() -> *mut c_void {
    let mut candidates = Vec::new();
    if let Some(dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(PROBE_LIB)))
    {
        candidates.push(dir.to_string_lossy().into_owned());
    }
    candidates.push(PROBE_LIB.to_string());

    for candidate in candidates {
        let Ok(path) = CString::new(candidate.as_str()) else {
            continue;
        };
        let handle = libc::dlopen(path.as_ptr(), libc::RTLD_NOW);
        if !handle.is_null() {
            return handle;
        }
    }
    panic!("dlopen {PROBE_LIB} failed");
}

pub unsafe fn probe_symbol(handle: *mut c_void, name: &str) -> *mut c_void {
    let symbol = CString::new(name).expect("symbol name");
    let addr = libc::dlsym(handle, symbol.as_ptr());
    assert!(!addr.is_null(), "dlsym {name} failed");
    addr
}

pub unsafe fn probe_write(handle: *mut c_void) -> ProbeWriteFn {
    std::mem::transmute(probe_symbol(handle, "trace_probe_write"))
}

pub unsafe fn probe_open(handle: *mut c_void) -> ProbeOpenFn {
    std::mem::transmute(probe_symbol(handle, "trace_probe_open"))
}

// 每个场景独立的输出目录
pub fn trace_dir(scenario: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "trace_probe_{}_{scenario}",
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).expect("create trace dir");
    dir
}
