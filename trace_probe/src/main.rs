#![allow(unsafe_op_in_unsafe_fn)]

mod probe_ctx;
mod scenarios;

use anr_trace::set_debug;

fn main() {
    set_debug(true);
    unsafe {
        scenarios::run_all();
    }
    println!("trace_probe all scenarios passed");
}
