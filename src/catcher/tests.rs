use super::{SignalCatcher, ThreadScanner, parse_sigblk};
use crate::errno::Errno;
use std::cell::RefCell;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const PID: i32 = 4242;

fn status_with_sigblk(mask: &str) -> String {
    format!(
        "Name:\tSignal Catcher\nState:\tS (sleeping)\nSigQ:\t0/6700\nSigPnd:\t0000000000000000\n\
         ShdPnd:\t0000000000000000\nSigBlk:\t{mask}\nSigIgn:\t0000000000000000\n"
    )
}

fn add_thread(root: &Path, tid: i32, comm: &str, status: Option<&str>) {
    let dir = root.join(PID.to_string()).join("task").join(tid.to_string());
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("comm"), format!("{comm}\n")).unwrap();
    if let Some(status) = status {
        fs::write(dir.join("status"), status).unwrap();
    }
}

fn fake_proc() -> TempDir {
    let root = tempfile::tempdir().unwrap();
    add_thread(root.path(), PID, "com.example.app", Some(&status_with_sigblk("0000000000000000")));
    add_thread(root.path(), PID + 1, "Jit thread pool", Some(&status_with_sigblk("0000000000001000")));
    root
}

#[test]
fn parse_sigblk_line() {
    assert_eq!(parse_sigblk(&status_with_sigblk("0000000000001000")), Some(0x1000));
    assert_eq!(parse_sigblk("SigBlk: fffffffe7ffbfeff\n"), Some(0xfffffffe7ffbfeff));
    assert_eq!(parse_sigblk("SigPnd:\t0000000000000000\n"), None);
    assert_eq!(parse_sigblk("SigBlk:\tzz\n"), None);
}

#[test]
fn resolve_by_name_and_mask() {
    let root = fake_proc();
    add_thread(root.path(), PID + 5, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    let scanner = ThreadScanner::new().with_proc_root(root.path());
    assert_eq!(scanner.resolve(PID), Some(PID + 5));
}

#[test]
fn name_match_with_other_mask_is_skipped() {
    let root = fake_proc();
    add_thread(root.path(), PID + 2, "Signal Catcher", Some(&status_with_sigblk("0000000000000004")));
    add_thread(root.path(), PID + 3, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    let scanner = ThreadScanner::new().with_proc_root(root.path());
    assert_eq!(scanner.resolve(PID), Some(PID + 3));
}

#[test]
fn name_compare_is_case_sensitive() {
    let root = fake_proc();
    add_thread(root.path(), PID + 2, "signal catcher", Some(&status_with_sigblk("0000000000001000")));
    let scanner = ThreadScanner::new().with_proc_root(root.path());
    assert_eq!(scanner.resolve(PID), None);
}

#[test]
fn exited_thread_is_skipped() {
    let root = fake_proc();
    // comm 仍在但 status 已消失
    add_thread(root.path(), PID + 2, "Signal Catcher", None);
    add_thread(root.path(), PID + 9, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    let scanner = ThreadScanner::new().with_proc_root(root.path());
    assert_eq!(scanner.resolve(PID), Some(PID + 9));
}

#[test]
fn missing_task_dir_is_unknown() {
    let root = tempfile::tempdir().unwrap();
    let scanner = ThreadScanner::new().with_proc_root(root.path());
    assert_eq!(scanner.resolve(PID), None);
}

#[test]
fn custom_fingerprint() {
    let root = fake_proc();
    add_thread(root.path(), PID + 2, "Signal Catcher", Some(&status_with_sigblk("0000000000000004")));
    let scanner = ThreadScanner::new()
        .with_proc_root(root.path())
        .with_fingerprint(0x4);
    assert_eq!(scanner.resolve(PID), Some(PID + 2));
}

#[test]
fn tid_is_cached_after_first_resolve() {
    let root = fake_proc();
    add_thread(root.path(), PID + 5, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    let catcher = SignalCatcher::new(ThreadScanner::new().with_proc_root(root.path()));
    assert_eq!(catcher.cached_tid(), None);
    assert_eq!(catcher.tid(PID), Some(PID + 5));

    fs::remove_dir_all(root.path().join(PID.to_string()).join("task").join((PID + 5).to_string()))
        .unwrap();
    assert_eq!(catcher.tid(PID), Some(PID + 5));

    catcher.invalidate();
    assert_eq!(catcher.cached_tid(), None);
    assert_eq!(catcher.tid(PID), None);
}

#[test]
fn unknown_tid_is_resolved_again() {
    let root = fake_proc();
    let catcher = SignalCatcher::new(ThreadScanner::new().with_proc_root(root.path()));
    assert_eq!(catcher.tid(PID), None);

    add_thread(root.path(), PID + 7, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    assert_eq!(catcher.tid(PID), Some(PID + 7));
}

#[test]
fn resend_without_catcher_fails() {
    let root = fake_proc();
    let catcher = SignalCatcher::new(ThreadScanner::new().with_proc_root(root.path()));
    let sent = RefCell::new(Vec::new());
    let result = catcher.resend_with(PID, |pid, tid| {
        sent.borrow_mut().push((pid, tid));
        Ok(())
    });
    assert_eq!(result, Err(Errno::ThreadNotFound));
    assert!(sent.borrow().is_empty());
}

#[test]
fn resend_retries_once_on_esrch() {
    let root = fake_proc();
    add_thread(root.path(), PID + 5, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    let catcher = SignalCatcher::new(ThreadScanner::new().with_proc_root(root.path()));
    assert_eq!(catcher.tid(PID), Some(PID + 5));

    // 线程重建后 tid 变化
    fs::remove_dir_all(root.path().join(PID.to_string()).join("task").join((PID + 5).to_string()))
        .unwrap();
    add_thread(root.path(), PID + 6, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));

    let sent = RefCell::new(Vec::new());
    let result = catcher.resend_with(PID, |pid, tid| {
        sent.borrow_mut().push((pid, tid));
        if tid == PID + 5 { Err(libc::ESRCH) } else { Ok(()) }
    });
    assert_eq!(result, Ok(()));
    assert_eq!(*sent.borrow(), vec![(PID, PID + 5), (PID, PID + 6)]);
    assert_eq!(catcher.cached_tid(), Some(PID + 6));
}

#[test]
fn resend_other_error_is_not_retried() {
    let root = fake_proc();
    add_thread(root.path(), PID + 5, "Signal Catcher", Some(&status_with_sigblk("0000000000001000")));
    let catcher = SignalCatcher::new(ThreadScanner::new().with_proc_root(root.path()));
    let calls = RefCell::new(0);
    let result = catcher.resend_with(PID, |_, _| {
        *calls.borrow_mut() += 1;
        Err(libc::EPERM)
    });
    assert_eq!(result, Err(Errno::SignalSend));
    assert_eq!(*calls.borrow(), 1);
}
