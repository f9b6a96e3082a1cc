// ANR 捕获操作错误码，0 表示成功
use std::fmt;

#[repr(i32)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Errno {
    Ok = 0,               // 成功
    Uninit = 1,           // 未初始化输出路径
    InvalidArg = 2,       // 参数无效
    Unsupported = 3,      // 当前系统版本不支持拦截
    SigMask = 4,          // 修改线程信号掩码失败
    SigAction = 5,        // 安装信号处理器失败
    HookFailed = 6,       // 拦截安装失败
    ThreadNotFound = 7,   // 未找到 Signal Catcher 线程
    SignalSend = 8,       // 重发信号失败
    Io = 9,               // 文件读写失败
    Dispatch = 10,        // 事件分发线程创建失败
    Unknown = 1001,       // 未知错误
    Invalid = 1002,       // 无效状态
    BadMaps = 1006,       // /proc/self/maps 解析失败
    Format = 1007,        // ELF 格式错误
}

impl Errno {
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    fn describe(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Uninit => "trace destinations not initialized",
            Self::InvalidArg => "invalid argument",
            Self::Unsupported => "interposition unsupported on this platform",
            Self::SigMask => "pthread_sigmask failed",
            Self::SigAction => "sigaction failed",
            Self::HookFailed => "hook install failed",
            Self::ThreadNotFound => "signal catcher thread not found",
            Self::SignalSend => "tgkill failed",
            Self::Io => "io error",
            Self::Dispatch => "episode dispatcher unavailable",
            Self::Unknown => "unknown error",
            Self::Invalid => "invalid state",
            Self::BadMaps => "bad /proc/self/maps",
            Self::Format => "bad elf format",
        }
    }
}

impl From<Errno> for i32 {
    fn from(value: Errno) -> Self {
        value as i32
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.as_i32())
    }
}

impl std::error::Error for Errno {}
