use super::AnrMonitor;
use crate::api::AnrObserver;
use crate::capture::proxies::{capture_connect, capture_open, capture_write};
use crate::capture::{CaptureController, CaptureMode};
use crate::catcher::DumpTrigger;
use crate::config::MonitorConfig;
use crate::errno::Errno;
use crate::platform::hook_plan::{TRACE_FILE_PATH, TRACE_SOCKET_PATH};
use crate::test_support::{FakeInterposer, FakeProperties, destinations, serial};
use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::mem;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

struct RecordingObserver {
    anr_calls: AtomicUsize,
    captured: Mutex<Sender<(CaptureMode, PathBuf)>>,
}

impl RecordingObserver {
    fn new() -> (Arc<Self>, Receiver<(CaptureMode, PathBuf)>) {
        let (tx, rx) = mpsc::channel();
        let observer = Arc::new(Self {
            anr_calls: AtomicUsize::new(0),
            captured: Mutex::new(tx),
        });
        (observer, rx)
    }

    fn anr_calls(&self) -> usize {
        self.anr_calls.load(Ordering::SeqCst)
    }
}

impl AnrObserver for RecordingObserver {
    fn on_system_anr(&self) {
        self.anr_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn on_trace_captured(&self, mode: CaptureMode, path: &Path) {
        let _ = self.captured.lock().unwrap().send((mode, path.to_path_buf()));
    }
}

#[derive(Clone, Copy)]
enum Channel {
    File,
    Socket,
}

// 模拟 Signal Catcher：收到重投递后在自己的线程里打开 dump 通道并写一次
struct FakeDumpThread {
    channel: Option<Channel>,
    payload: &'static [u8],
    triggers: AtomicUsize,
}

impl FakeDumpThread {
    fn new(channel: Option<Channel>, payload: &'static [u8]) -> Arc<Self> {
        Arc::new(Self {
            channel,
            payload,
            triggers: AtomicUsize::new(0),
        })
    }

    fn triggers(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }
}

fn open_trace_file() {
    let path = CString::new(TRACE_FILE_PATH).unwrap();
    let fd = unsafe { capture_open(path.as_ptr(), libc::O_RDONLY, 0) };
    if fd >= 0 {
        unsafe { libc::close(fd) };
    }
}

fn connect_trace_socket() {
    let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    assert!(fd >= 0);
    let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
    for (dst, src) in addr.sun_path.iter_mut().zip(TRACE_SOCKET_PATH.as_bytes()) {
        *dst = *src as libc::c_char;
    }
    let len = mem::offset_of!(libc::sockaddr_un, sun_path) + TRACE_SOCKET_PATH.len() + 1;
    // 主机上没有 tombstoned，连接失败不影响闸门
    unsafe {
        capture_connect(fd, &addr as *const _ as *const libc::sockaddr, len as libc::socklen_t);
        libc::close(fd);
    }
}

impl DumpTrigger for FakeDumpThread {
    fn trigger_dump(&self) -> Result<(), Errno> {
        self.triggers.fetch_add(1, Ordering::SeqCst);
        let Some(channel) = self.channel else {
            return Ok(());
        };
        let payload = self.payload;
        thread::spawn(move || {
            match channel {
                Channel::File => open_trace_file(),
                Channel::Socket => connect_trace_socket(),
            }
            let sink = OpenOptions::new().write(true).open("/dev/null").unwrap();
            let ret = unsafe { capture_write(sink.as_raw_fd(), payload.as_ptr().cast(), payload.len()) };
            assert_eq!(ret, payload.len() as isize);
        });
        Ok(())
    }
}

struct Harness {
    dir: TempDir,
    interposer: Arc<FakeInterposer>,
    controller: Arc<CaptureController>,
    trigger: Arc<FakeDumpThread>,
    observer: Arc<RecordingObserver>,
    captured: Receiver<(CaptureMode, PathBuf)>,
    monitor: AnrMonitor,
}

fn harness(level: i32, channel: Option<Channel>, timeout: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = MonitorConfig::new(destinations(&dir)).with_capture_timeout(timeout);
    let interposer = Arc::new(FakeInterposer::new());
    let controller = Arc::new(CaptureController::new(
        interposer.clone(),
        Arc::new(FakeProperties::api(level)),
        config.destinations.clone(),
    ));
    let trigger = FakeDumpThread::new(channel, b"ANR TRACE DATA");
    let (observer, captured) = RecordingObserver::new();
    let monitor = AnrMonitor::new(&config, observer.clone(), controller.clone(), trigger.clone());
    Harness {
        dir,
        interposer,
        controller,
        trigger,
        observer,
        captured,
        monitor,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn external_signal_captures_into_anr_path() {
    let _serial = serial();
    let h = harness(26, Some(Channel::File), WAIT);
    h.monitor.start().unwrap();

    h.monitor.handle_signal(Some(h.monitor.own_pid() + 1));
    assert_eq!(h.observer.anr_calls(), 1);

    let (mode, path) = h.captured.recv_timeout(WAIT).unwrap();
    assert_eq!(mode, CaptureMode::Anr);
    assert_eq!(path, h.dir.path().join("anr.txt"));
    assert_eq!(fs::read(&path).unwrap(), b"ANR TRACE DATA");
    assert!(!h.dir.path().join("self.txt").exists());

    assert_eq!(h.trigger.triggers(), 1);
    assert_eq!(h.interposer.active_count(), 0);
    assert!(!h.controller.is_hooking());
    assert_eq!(h.observer.anr_calls(), 1);
    h.monitor.stop();
}

#[test]
fn self_signal_captures_into_self_path() {
    let _serial = serial();
    let h = harness(30, Some(Channel::Socket), WAIT);
    h.monitor.start().unwrap();

    h.monitor.handle_signal(Some(h.monitor.own_pid()));
    let (mode, path) = h.captured.recv_timeout(WAIT).unwrap();
    assert_eq!(mode, CaptureMode::SelfTriggered);
    assert_eq!(path, h.dir.path().join("self.txt"));
    assert_eq!(fs::read(&path).unwrap(), b"ANR TRACE DATA");
    assert_eq!(
        h.interposer.installs(),
        vec![
            ("libcutils.so".to_string(), "connect".to_string()),
            ("libc.so".to_string(), "write".to_string()),
        ]
    );
    h.monitor.stop();
}

#[test]
fn consecutive_episodes_each_capture() {
    let _serial = serial();
    let h = harness(27, Some(Channel::Socket), WAIT);
    h.monitor.start().unwrap();

    h.monitor.handle_signal(None);
    assert_eq!(h.captured.recv_timeout(WAIT).unwrap().0, CaptureMode::Anr);
    h.monitor.handle_signal(Some(h.monitor.own_pid()));
    assert_eq!(h.captured.recv_timeout(WAIT).unwrap().0, CaptureMode::SelfTriggered);

    assert_eq!(h.observer.anr_calls(), 2);
    assert_eq!(h.trigger.triggers(), 2);
    assert_eq!(h.controller.captured_count(), 2);
    h.monitor.stop();
}

#[test]
fn missing_write_times_out_and_removes_hooks() {
    let _serial = serial();
    let h = harness(26, None, Duration::from_millis(100));
    h.monitor.start().unwrap();

    h.monitor.handle_signal(None);
    assert!(wait_until(|| h.trigger.triggers() == 1));
    assert!(wait_until(|| h.interposer.remove_calls().len() == 2));
    assert!(wait_until(|| !h.controller.is_hooking()));
    assert_eq!(h.interposer.active_count(), 0);
    assert!(h.captured.try_recv().is_err());
    assert!(!h.dir.path().join("anr.txt").exists());
    h.monitor.stop();
}

#[test]
fn unsupported_level_still_resends_signal() {
    let _serial = serial();
    let h = harness(18, Some(Channel::File), WAIT);
    h.monitor.start().unwrap();

    h.monitor.handle_signal(None);
    assert!(wait_until(|| h.trigger.triggers() == 1));
    assert!(h.interposer.installs().is_empty());
    h.monitor.stop();
    assert!(h.captured.try_recv().is_err());
}

#[test]
fn signal_before_start_only_notifies() {
    let _serial = serial();
    let h = harness(26, Some(Channel::File), WAIT);

    h.monitor.handle_signal(None);
    assert_eq!(h.observer.anr_calls(), 1);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(h.trigger.triggers(), 0);
    assert!(h.interposer.installs().is_empty());
}

#[test]
fn stop_removes_lingering_interposition() {
    let _serial = serial();
    let h = harness(26, None, WAIT);
    h.monitor.start().unwrap();
    h.controller.install_capture(CaptureMode::Anr).unwrap();
    assert_eq!(h.interposer.active_count(), 2);

    h.monitor.stop();
    h.monitor.stop();
    assert_eq!(h.interposer.active_count(), 0);
    assert!(!h.controller.is_hooking());
}

#[test]
fn stop_returns_without_waiting_for_capture_timeout() {
    let _serial = serial();
    let h = harness(26, None, Duration::from_secs(3));
    h.monitor.start().unwrap();

    h.monitor.handle_signal(None);
    assert!(wait_until(|| h.trigger.triggers() == 1));
    assert!(wait_until(|| h.controller.is_hooking()));

    let started = Instant::now();
    h.monitor.stop();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(h.interposer.active_count(), 0);
    assert!(h.captured.try_recv().is_err());
}

#[test]
fn restart_after_stop_captures_again() {
    let _serial = serial();
    let h = harness(26, Some(Channel::File), WAIT);
    h.monitor.start().unwrap();
    h.monitor.stop();

    h.monitor.start().unwrap();
    h.monitor.handle_signal(None);
    let (mode, _) = h.captured.recv_timeout(WAIT).unwrap();
    assert_eq!(mode, CaptureMode::Anr);
    h.monitor.stop();
}
