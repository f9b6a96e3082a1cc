use std::ffi::{c_char, c_void};

// 供 PLT 拦截场景使用：本库对 write/open 的导入会出现在自身 GOT 中

#[unsafe(no_mangle)]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn trace_probe_write(fd: i32, buf: *const c_void, len: usize) -> isize {
    if buf.is_null() {
        return -1;
    }
    unsafe { libc::write(fd, buf, len) }
}

#[unsafe(no_mangle)]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn trace_probe_open(path: *const c_char) -> i32 {
    if path.is_null() {
        return -1;
    }
    unsafe { libc::open(path, libc::O_WRONLY | libc::O_CLOEXEC) }
}
