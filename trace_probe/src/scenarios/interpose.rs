use std::ffi::{CStr, c_char, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};

use anr_trace::{Interposer, PltInterposer};

use crate::probe_ctx::{
    PROBE_LIB, ProbeOpenFn, ProbeWriteFn, load_probe_lib, probe_open, probe_write,
};

static WRITE_COUNT: AtomicUsize = AtomicUsize::new(0);
static WRITE_PREV: AtomicUsize = AtomicUsize::new(0);
static OPEN_COUNT: AtomicUsize = AtomicUsize::new(0);
static OPEN_PREV: AtomicUsize = AtomicUsize::new(0);

type WriteFn = unsafe extern "C" fn(i32, *const c_void, usize) -> isize;
type OpenFn = unsafe extern "C" fn(*const c_char, i32, libc::mode_t) -> i32;

unsafe extern "C" fn counting_write(fd: i32, buf: *const c_void, count: usize) -> isize {
    WRITE_COUNT.fetch_add(1, Ordering::Relaxed);
    match WRITE_PREV.load(Ordering::Acquire) {
        0 => libc::write(fd, buf, count),
        prev => {
            let prev: WriteFn = std::mem::transmute(prev);
            prev(fd, buf, count)
        }
    }
}

unsafe extern "C" fn counting_open(path: *const c_char, flags: i32, mode: libc::mode_t) -> i32 {
    OPEN_COUNT.fetch_add(1, Ordering::Relaxed);
    match OPEN_PREV.load(Ordering::Acquire) {
        0 => libc::open(path, flags, mode),
        prev => {
            let prev: OpenFn = std::mem::transmute(prev);
            prev(path, flags, mode)
        }
    }
}

unsafe fn write_dev_null(write: ProbeWriteFn) {
    let fd = libc::open(c"/dev/null".as_ptr(), libc::O_WRONLY | libc::O_CLOEXEC);
    assert!(fd >= 0, "open /dev/null failed");
    let payload = b"trace-probe\n";
    let written = write(fd, payload.as_ptr() as *const c_void, payload.len());
    assert_eq!(written, payload.len() as isize);
    libc::close(fd);
}

unsafe fn open_dev_null(open: ProbeOpenFn) {
    let fd = open(c"/dev/null".as_ptr());
    assert!(fd >= 0, "open /dev/null through probe failed");
    libc::close(fd);
}

// libc 的实际文件名，宿主机上是 libc.so.6
unsafe fn libc_name() -> String {
    let mut info: libc::Dl_info = std::mem::zeroed();
    let addr = libc::open as *const () as *const c_void;
    assert!(libc::dladdr(addr, &mut info) != 0 && !info.dli_fname.is_null());
    let path = CStr::from_ptr(info.dli_fname).to_string_lossy().into_owned();
    match path.rsplit_once('/') {
        Some((_, name)) => name.to_string(),
        None => path,
    }
}

pub unsafe fn scenario_write_single() {
    let handle = load_probe_lib();
    let write = probe_write(handle);
    let interposer = PltInterposer::new();

    let hook = interposer
        .install_single(PROBE_LIB, None, "write", counting_write as *mut c_void)
        .expect("interpose write in probe lib");
    assert_ne!(hook.prev_func, 0);
    WRITE_PREV.store(hook.prev_func, Ordering::Release);

    let before = WRITE_COUNT.load(Ordering::Relaxed);
    write_dev_null(write);
    assert_eq!(WRITE_COUNT.load(Ordering::Relaxed), before + 1);

    interposer.remove(hook.stub);
    write_dev_null(write);
    assert_eq!(WRITE_COUNT.load(Ordering::Relaxed), before + 1);
    WRITE_PREV.store(0, Ordering::Release);
}

pub unsafe fn scenario_open_callee_filter() {
    let handle = load_probe_lib();
    let open = probe_open(handle);
    let interposer = PltInterposer::new();

    let missing = interposer.install_single(
        PROBE_LIB,
        Some("libnot_loaded_anywhere.so"),
        "open",
        counting_open as *mut c_void,
    );
    assert!(missing.is_none());

    let callee = libc_name();
    let hook = interposer
        .install_single(
            PROBE_LIB,
            Some(callee.as_str()),
            "open",
            counting_open as *mut c_void,
        )
        .expect("interpose open with libc callee");
    OPEN_PREV.store(hook.prev_func, Ordering::Release);

    let before = OPEN_COUNT.load(Ordering::Relaxed);
    open_dev_null(open);
    assert_eq!(OPEN_COUNT.load(Ordering::Relaxed), before + 1);

    interposer.remove(hook.stub);
    open_dev_null(open);
    assert_eq!(OPEN_COUNT.load(Ordering::Relaxed), before + 1);
    OPEN_PREV.store(0, Ordering::Release);
}

pub unsafe fn scenario_remove_twice() {
    let handle = load_probe_lib();
    let write = probe_write(handle);
    let interposer = PltInterposer::new();

    let hook = interposer
        .install_single(PROBE_LIB, None, "write", counting_write as *mut c_void)
        .expect("interpose write in probe lib");
    WRITE_PREV.store(hook.prev_func, Ordering::Release);
    interposer.remove(hook.stub);
    interposer.remove(hook.stub);

    let before = WRITE_COUNT.load(Ordering::Relaxed);
    write_dev_null(write);
    assert_eq!(WRITE_COUNT.load(Ordering::Relaxed), before);
    WRITE_PREV.store(0, Ordering::Release);
}
