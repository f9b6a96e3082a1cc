// 捕获闸门：目标线程 + 单次武装标志 + 捕获模式
// 入口函数识别到 trace 目标时武装，write 在同一线程上消费，消费只会成功一次
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};

use super::CaptureMode;

const NO_TARGET: i32 = 0;
// 模式字低 8 位为 CaptureMode，其余位为 set_mode 代数
const MODE_BITS: u32 = 8;
const MODE_MASK: u32 = (1 << MODE_BITS) - 1;

/// Mode observed when a write consumed the gate, tagged with the install
/// generation it belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ModeToken(u32);

impl ModeToken {
    pub(crate) fn mode(self) -> CaptureMode {
        CaptureMode::from_u8((self.0 & MODE_MASK) as u8).unwrap_or(CaptureMode::Anr)
    }

    fn generation(self) -> u32 {
        self.0 >> MODE_BITS
    }
}

pub(crate) struct CaptureGate {
    target_tid: AtomicI32,
    armed: AtomicBool,
    mode: AtomicU32,
}

impl CaptureGate {
    pub(crate) const fn new() -> Self {
        Self {
            target_tid: AtomicI32::new(NO_TARGET),
            armed: AtomicBool::new(false),
            mode: AtomicU32::new(CaptureMode::Anr as u32),
        }
    }

    // 先写目标线程再置位，消费方以 Acquire 读取 armed 后必然看到目标线程
    pub(crate) fn arm(&self, tid: i32) {
        self.target_tid.store(tid, Ordering::Relaxed);
        self.armed.store(true, Ordering::Release);
    }

    pub(crate) fn consume(&self, tid: i32) -> bool {
        if !self.armed.load(Ordering::Acquire) {
            return false;
        }
        if self.target_tid.load(Ordering::Relaxed) != tid {
            return false;
        }
        self.armed
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }

    pub(crate) fn target_tid(&self) -> Option<i32> {
        let tid = self.target_tid.load(Ordering::Relaxed);
        (tid != NO_TARGET).then_some(tid)
    }

    pub(crate) fn mode_token(&self) -> ModeToken {
        ModeToken(self.mode.load(Ordering::Acquire))
    }

    pub(crate) fn mode(&self) -> CaptureMode {
        self.mode_token().mode()
    }

    // 每次安装推进代数，之前取得的 token 随之失效
    pub(crate) fn set_mode(&self, mode: CaptureMode) {
        let _ = self
            .mode
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let generation = (current >> MODE_BITS).wrapping_add(1);
                Some((generation << MODE_BITS) | mode as u32)
            });
    }

    // 只有模式字仍是 token 所见的值时才恢复为 Anr，新一轮安装写入的模式保持不变
    pub(crate) fn reset_mode(&self, token: ModeToken) -> bool {
        let reset = (token.generation() << MODE_BITS) | CaptureMode::Anr as u32;
        self.mode
            .compare_exchange(token.0, reset, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
