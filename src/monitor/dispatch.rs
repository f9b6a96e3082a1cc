// 信号处理器与捕获流程之间的自管道
// 处理器只向管道写一个字节（捕获模式），分发线程读出后为每次事件启动一个捕获线程
use crate::capture::CaptureMode;
use crate::errno::Errno;
use crate::log;
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread::{self, JoinHandle};

pub(crate) type EpisodeFn = Arc<dyn Fn(CaptureMode) + Send + Sync>;

pub(crate) const CLOSED_FD: i32 = -1;

pub(crate) struct Dispatcher {
    write_fd: AtomicI32,
    thread: Option<JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn start(run_episode: EpisodeFn) -> Result<Self, Errno> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            let err = std::io::Error::last_os_error();
            log::error(format_args!("create dispatch pipe failed: {err}"));
            return Err(Errno::Dispatch);
        }
        let [read_fd, write_fd] = fds;

        let builder = thread::Builder::new().name("anr-dispatch".to_string());
        match builder.spawn(move || dispatch_loop(read_fd, run_episode)) {
            Ok(handle) => Ok(Self {
                write_fd: AtomicI32::new(write_fd),
                thread: Some(handle),
            }),
            Err(err) => {
                log::error(format_args!("spawn dispatch thread failed: {err}"));
                unsafe {
                    libc::close(read_fd);
                    libc::close(write_fd);
                }
                Err(Errno::Dispatch)
            }
        }
    }

    pub(crate) fn write_fd(&self) -> i32 {
        self.write_fd.load(Ordering::Acquire)
    }

    pub(crate) fn post(&self, mode: CaptureMode) -> bool {
        post_to(self.write_fd(), mode)
    }

    // 关闭写端后分发线程读到 EOF，等待当前捕获线程结束后退出
    pub(crate) fn stop(&mut self) {
        let fd = self.write_fd.swap(CLOSED_FD, Ordering::AcqRel);
        if fd != CLOSED_FD {
            unsafe { libc::close(fd) };
        }
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

// 信号处理器上下文：只做 write(2)
pub(crate) fn post_to(fd: i32, mode: CaptureMode) -> bool {
    if fd == CLOSED_FD {
        return false;
    }
    let byte = mode as u8;
    loop {
        let ret = unsafe { libc::write(fd, (&byte as *const u8).cast(), 1) };
        if ret == 1 {
            return true;
        }
        if ret < 0 && std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return false;
    }
}

fn dispatch_loop(read_fd: libc::c_int, run_episode: EpisodeFn) {
    let mut worker: Option<JoinHandle<()>> = None;
    loop {
        let mut byte = 0u8;
        let ret = unsafe { libc::read(read_fd, (&mut byte as *mut u8).cast(), 1) };
        if ret == 0 {
            break;
        }
        if ret < 0 {
            if std::io::Error::last_os_error().raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            log::error(format_args!(
                "dispatch pipe read failed: {}",
                std::io::Error::last_os_error()
            ));
            break;
        }
        let Some(mode) = CaptureMode::from_u8(byte) else {
            log::warn(format_args!("unknown episode byte {byte}"));
            continue;
        };

        // 上一次捕获线程的等待有超时上限，这里的 join 不会无限阻塞
        if let Some(previous) = worker.take() {
            let _ = previous.join();
        }
        let run = run_episode.clone();
        let builder = thread::Builder::new().name("anr-capture".to_string());
        match builder.spawn(move || run(mode)) {
            Ok(handle) => worker = Some(handle),
            Err(err) => log::error(format_args!("spawn capture thread failed: {err}")),
        }
    }
    if let Some(previous) = worker.take() {
        let _ = previous.join();
    }
    unsafe { libc::close(read_fd) };
    log::debug(format_args!("dispatch thread exit"));
}
