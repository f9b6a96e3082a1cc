// ANR 事件编排：信号处理器上下文中通知观察者并投递事件，
// 捕获线程中安装拦截、触发 Signal Catcher dump、等待捕获完成或超时
use crate::api::AnrObserver;
use crate::capture::{CaptureController, CaptureMode};
use crate::catcher::{DumpTrigger, SignalCatcherTrigger};
use crate::config::MonitorConfig;
use crate::errno::Errno;
use crate::interpose::PltInterposer;
use crate::log;
use crate::platform::SystemProperties;
use crate::signal::SignalOrigin;
use crate::sync::MutexPoisonRecover;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// 信号处理器到捕获线程的自管道分发
mod dispatch;

use dispatch::{CLOSED_FD, Dispatcher};

// 捕获线程执行的一次完整流程
struct EpisodeRunner {
    controller: Arc<CaptureController>,
    trigger: Arc<dyn DumpTrigger>,
    observer: Arc<dyn AnrObserver>,
    capture_timeout: Duration,
}

impl EpisodeRunner {
    fn run(&self, mode: CaptureMode) {
        // 停止后管道中残留的事件不再处理
        if self.controller.is_cancelled() {
            return;
        }
        let seen = self.controller.captured_count();
        let installed = match self.controller.install_capture(mode) {
            Ok(()) => true,
            Err(err) => {
                log::warn(format_args!("install capture failed: {err}"));
                false
            }
        };

        // 拦截失败也要重投递，保证平台自身的 dump 照常进行
        if let Err(err) = self.trigger.trigger_dump() {
            log::warn(format_args!("trigger dump failed: {err}"));
        }
        if !installed {
            return;
        }

        match self.controller.wait_for_capture(seen, self.capture_timeout) {
            Some(captured) => {
                let path = self.controller.destination(captured);
                self.observer.on_trace_captured(captured, path);
            }
            None if self.controller.is_cancelled() => {
                self.controller.remove_capture();
                log::debug(format_args!("capture wait cancelled"));
            }
            None => {
                self.controller.remove_capture();
                log::warn(format_args!(
                    "no trace captured within {:?}, interposition removed",
                    self.capture_timeout
                ));
            }
        }
    }
}

pub struct AnrMonitor {
    own_pid: i32,
    runner: Arc<EpisodeRunner>,
    dispatcher: Mutex<Option<Dispatcher>>,
    // 分发管道写端，信号处理器只读取它
    post_fd: AtomicI32,
}

impl AnrMonitor {
    pub fn new(
        config: &MonitorConfig,
        observer: Arc<dyn AnrObserver>,
        controller: Arc<CaptureController>,
        trigger: Arc<dyn DumpTrigger>,
    ) -> Self {
        Self {
            own_pid: unsafe { libc::getpid() },
            runner: Arc::new(EpisodeRunner {
                controller,
                trigger,
                observer,
                capture_timeout: config.capture_timeout,
            }),
            dispatcher: Mutex::new(None),
            post_fd: AtomicI32::new(CLOSED_FD),
        }
    }

    // 真实设备上的默认组合：PLT 拦截、系统属性、Signal Catcher 重投递
    pub fn with_defaults(config: &MonitorConfig, observer: Arc<dyn AnrObserver>) -> Self {
        let controller = Arc::new(CaptureController::new(
            Arc::new(PltInterposer::new()),
            Arc::new(SystemProperties),
            config.destinations.clone(),
        ));
        Self::new(
            config,
            observer,
            controller,
            Arc::new(SignalCatcherTrigger::for_current_process()),
        )
    }

    pub fn controller(&self) -> &Arc<CaptureController> {
        &self.runner.controller
    }

    pub fn start(&self) -> Result<(), Errno> {
        let mut dispatcher = self.dispatcher.lock_or_poison();
        if dispatcher.is_some() {
            return Ok(());
        }
        self.runner.controller.resume_waits();
        let runner = self.runner.clone();
        let started = Dispatcher::start(Arc::new(move |mode| runner.run(mode)))?;
        self.post_fd.store(started.write_fd(), Ordering::Release);
        *dispatcher = Some(started);
        Ok(())
    }

    // 停止分发线程并清理残留拦截；先取消等待，join 不会等到捕获超时
    pub fn stop(&self) {
        self.post_fd.store(CLOSED_FD, Ordering::Release);
        self.runner.controller.cancel_waits();
        self.runner.controller.remove_capture();
        let dispatcher = self.dispatcher.lock_or_poison().take();
        if let Some(mut dispatcher) = dispatcher {
            dispatcher.stop();
        }
        self.runner.controller.shutdown();
    }

    /// Entry point from the SIGQUIT handler.
    ///
    /// Runs in signal context: notifies the observer, then hands the episode
    /// to the dispatcher with a single `write(2)`. Takes no locks.
    pub fn handle_signal(&self, sender_pid: Option<i32>) {
        let origin = SignalOrigin::from_sender(sender_pid, self.own_pid);
        self.runner.observer.on_system_anr();

        let mode = match origin {
            SignalOrigin::SelfTriggered => CaptureMode::SelfTriggered,
            SignalOrigin::External => CaptureMode::Anr,
        };
        dispatch::post_to(self.post_fd.load(Ordering::Acquire), mode);
    }

    pub fn own_pid(&self) -> i32 {
        self.own_pid
    }
}

impl Drop for AnrMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests;
