// 按 API level 选择拦截目标
// API < 19 不支持；[19, 27) 拦截 libart 的 open；>= 27 改为拦截 libcutils 的 connect
// write 始终拦截，但所属库随版本变化，必须查表

pub const API_LEVEL_MIN_SUPPORTED: i32 = 19;
pub const API_LEVEL_CONNECT: i32 = 27;

pub const TRACE_SOCKET_PATH: &str = "/dev/socket/tombstoned_java_trace";
pub const TRACE_FILE_PATH: &str = "/data/anr/traces.txt";

pub const SYM_CONNECT: &str = "connect";
pub const SYM_OPEN: &str = "open";
pub const SYM_WRITE: &str = "write";

const LIB_CUTILS: &str = "libcutils.so";
const LIB_ART: &str = "libart.so";
const LIB_C: &str = "libc.so";
const LIB_BASE: &str = "libbase.so";

// write 所属库的版本区间表，闭区间，按顺序匹配
const WRITE_CALLER_TABLE: [(i32, i32, &str); 4] = [
    (30, i32::MAX, LIB_C),
    (29, 29, LIB_BASE),
    (24, 25, LIB_C),
    (API_LEVEL_MIN_SUPPORTED, 28, LIB_ART),
];

// trace 目标的入口函数：平台通过它打开 dump 通道
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryHook {
    Open { caller: &'static str },
    Connect { caller: &'static str },
}

impl EntryHook {
    pub fn caller(&self) -> &'static str {
        match self {
            Self::Open { caller } | Self::Connect { caller } => caller,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Open { .. } => SYM_OPEN,
            Self::Connect { .. } => SYM_CONNECT,
        }
    }

    // 入口函数识别 trace 目标时比对的路径
    pub fn trace_path(&self) -> &'static str {
        match self {
            Self::Open { .. } => TRACE_FILE_PATH,
            Self::Connect { .. } => TRACE_SOCKET_PATH,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct HookPlan {
    pub api_level: i32,
    pub entry: EntryHook,
    pub write_caller: &'static str,
}

impl HookPlan {
    pub fn for_api_level(api_level: i32) -> Option<Self> {
        if api_level < API_LEVEL_MIN_SUPPORTED {
            return None;
        }
        let entry = if api_level >= API_LEVEL_CONNECT {
            EntryHook::Connect { caller: LIB_CUTILS }
        } else {
            EntryHook::Open { caller: LIB_ART }
        };
        let write_caller = WRITE_CALLER_TABLE
            .iter()
            .find(|(low, high, _)| (*low..=*high).contains(&api_level))
            .map(|(_, _, lib)| *lib)?;
        Some(Self {
            api_level,
            entry,
            write_caller,
        })
    }
}
