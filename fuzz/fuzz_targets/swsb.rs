#![no_main]
use libfuzzer_sys::fuzz_target;

use swsb::{set_swsb, Platform, SwsbError, SwsbOptions};
use swsb_util::{test_framework as ir, validator};

static mut COUNTER_GEN: usize = 0;
static mut COUNTER_OK: usize = 0;

fuzz_target!(|program: ir::Program| {
    let (num_gen, num_ok) = unsafe {
        COUNTER_GEN += 1;
        (COUNTER_GEN, COUNTER_OK)
    };

    println!(
        "=== status: #ok/#total: {}/{} == {} ",
        num_ok,
        num_gen,
        100.0 * (num_ok as f64) / (num_gen as f64)
    );

    if let Err(err) = validator::validate(&program) {
        println!("validation error: {}", err);
        return;
    }

    for &platform in Platform::all() {
        let opts = SwsbOptions::new(platform);
        let caps = opts.caps().unwrap();
        let result = match set_swsb(&program, &opts) {
            Ok(result) => result,
            Err(SwsbError::UnsupportedOp { .. }) => continue,
            Err(err) => {
                program.print("input");
                panic!("fuzz_targets/swsb.rs: {} on {}", err, platform);
            }
        };

        let mut annotated = program.clone();
        annotated.update_from_result(result);
        if let Err(err) = validator::check_annotations(&annotated, &caps) {
            program.print("input");
            annotated.print("output");
            panic!("fuzz_targets/swsb.rs: unordered hazard on {}: {}", platform, err);
        }
    }

    unsafe {
        COUNTER_OK += 1;
    }
});
