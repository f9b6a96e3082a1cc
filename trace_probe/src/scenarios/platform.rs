use anr_trace::{
    EntryHook, HookPlan, SignalCatcher, SystemProperties, ThreadScanner, api_level,
};

pub unsafe fn scenario_hook_plan() {
    let level = api_level(&SystemProperties);
    println!("api level {level}");
    match HookPlan::for_api_level(level) {
        Some(plan) => {
            assert_eq!(plan.api_level, level);
            match plan.entry {
                EntryHook::Connect { caller } => assert_eq!(caller, "libcutils.so"),
                EntryHook::Open { caller } => assert_eq!(caller, "libart.so"),
            }
            println!(
                "entry {} in {}, write in {}",
                plan.entry.symbol(),
                plan.entry.caller(),
                plan.write_caller
            );
        }
        None => assert!(level < 19, "api level {level} should be supported"),
    }
}

// 非 ART 进程里找不到 Signal Catcher 属正常结果
pub unsafe fn scenario_signal_catcher_scan() {
    let pid = libc::getpid();
    let catcher = SignalCatcher::new(ThreadScanner::new());
    match catcher.tid(pid) {
        Some(tid) => {
            assert!(tid > 0);
            assert_eq!(catcher.cached_tid(), Some(tid));
            println!("signal catcher tid {tid}");
        }
        None => {
            assert_eq!(catcher.cached_tid(), None);
            println!("no signal catcher in this process");
        }
    }
}
