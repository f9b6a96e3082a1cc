// 替换函数：先调用真实函数，再把参数交给捕获控制器判断
// 控制器在 install 时绑定到全局槽位，代理函数通过它找到前一个函数地址
use crate::sync::RwLockPoisonRecover;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::mem;
use std::slice;
use std::sync::{Arc, RwLock};

use super::{CaptureController, reentry};

pub(crate) type ConnectFn =
    unsafe extern "C" fn(c_int, *const libc::sockaddr, libc::socklen_t) -> c_int;
pub(crate) type OpenFn = unsafe extern "C" fn(*const c_char, c_int, libc::mode_t) -> c_int;
pub(crate) type WriteFn = unsafe extern "C" fn(c_int, *const c_void, libc::size_t) -> libc::ssize_t;

static BOUND: RwLock<Option<Arc<CaptureController>>> = RwLock::new(None);

pub(crate) fn bind(controller: &Arc<CaptureController>) {
    *BOUND.write_or_poison() = Some(controller.clone());
}

// 仅当绑定的仍是该控制器时解绑
pub(crate) fn unbind(controller: &Arc<CaptureController>) {
    let mut bound = BOUND.write_or_poison();
    if bound.as_ref().is_some_and(|current| Arc::ptr_eq(current, controller)) {
        *bound = None;
    }
}

pub(crate) fn is_bound(controller: &Arc<CaptureController>) -> bool {
    BOUND
        .read_or_poison()
        .as_ref()
        .is_some_and(|current| Arc::ptr_eq(current, controller))
}

fn bound() -> Option<Arc<CaptureController>> {
    BOUND.read_or_poison().clone()
}

pub(crate) fn current_tid() -> i32 {
    unsafe { libc::syscall(libc::SYS_gettid) as i32 }
}

pub(crate) fn connect_proxy_ptr() -> *mut c_void {
    capture_connect as *const () as *mut c_void
}

pub(crate) fn open_proxy_ptr() -> *mut c_void {
    capture_open as *const () as *mut c_void
}

pub(crate) fn write_proxy_ptr() -> *mut c_void {
    capture_write as *const () as *mut c_void
}

pub(crate) unsafe extern "C" fn capture_connect(
    sockfd: c_int,
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
) -> c_int {
    let controller = bound();
    let ret = match controller.as_ref().and_then(|c| c.prev_connect()) {
        Some(real) => real(sockfd, addr, addrlen),
        None => libc::connect(sockfd, addr, addrlen),
    };
    if let Some(controller) = controller
        && !reentry::is_in_capture()
        && let Some(path) = unix_socket_path(addr, addrlen)
    {
        reentry::run_in_capture(|| controller.observe_connect(current_tid(), path));
    }
    ret
}

// open 为变参函数，第三个参数 mode 在 aarch64/x86_64 上经寄存器传递
pub(crate) unsafe extern "C" fn capture_open(
    pathname: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    let controller = bound();
    let ret = match controller.as_ref().and_then(|c| c.prev_open()) {
        Some(real) => real(pathname, flags, mode),
        None => libc::open(pathname, flags, mode as libc::c_uint),
    };
    if let Some(controller) = controller
        && !reentry::is_in_capture()
        && !pathname.is_null()
    {
        let path = CStr::from_ptr(pathname).to_bytes();
        reentry::run_in_capture(|| controller.observe_open(current_tid(), path));
    }
    ret
}

pub(crate) unsafe extern "C" fn capture_write(
    fd: c_int,
    buf: *const c_void,
    count: libc::size_t,
) -> libc::ssize_t {
    let controller = bound();
    let ret = match controller.as_ref().and_then(|c| c.prev_write()) {
        Some(real) => real(fd, buf, count),
        None => libc::write(fd, buf, count),
    };
    if let Some(controller) = controller
        && !reentry::is_in_capture()
    {
        let bytes = (!buf.is_null()).then(|| slice::from_raw_parts(buf as *const u8, count));
        reentry::run_in_capture(|| controller.intercept_write(current_tid(), bytes));
    }
    ret
}

// 提取 AF_UNIX 地址的 sun_path，长度受 addrlen 约束，截断到第一个 NUL
pub(crate) unsafe fn unix_socket_path<'a>(
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
) -> Option<&'a [u8]> {
    if addr.is_null() {
        return None;
    }
    let path_offset = mem::offset_of!(libc::sockaddr_un, sun_path);
    let addrlen = (addrlen as usize).min(mem::size_of::<libc::sockaddr_un>());
    if addrlen <= path_offset || (*addr).sa_family as c_int != libc::AF_UNIX {
        return None;
    }
    let raw = slice::from_raw_parts((addr as *const u8).add(path_offset), addrlen - path_offset);
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    Some(&raw[..end])
}
