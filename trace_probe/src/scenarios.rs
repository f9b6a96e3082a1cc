mod interpose;
mod lifecycle;
mod platform;

use crate::probe_ctx::env_flag;

pub unsafe fn run_all() {
    run("hook-plan", platform::scenario_hook_plan);
    run("signal-catcher-scan", platform::scenario_signal_catcher_scan);
    run("plt-write-single", interpose::scenario_write_single);
    run("plt-open-callee-filter", interpose::scenario_open_callee_filter);
    run("plt-remove-twice", interpose::scenario_remove_twice);
    run("register-idempotent", lifecycle::scenario_register_idempotent);
    run("self-dump-uninit", lifecycle::scenario_self_dump_uninit);
    if env_flag("TRACE_PROBE_SELF_DUMP") {
        run("self-dump", lifecycle::scenario_self_dump);
    }
}

unsafe fn run(name: &str, scenario: unsafe fn()) {
    println!("scenario: {name}");
    scenario();
}
