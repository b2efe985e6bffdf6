#![no_main]

use bactsm_client::window::reproject;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u32, u8, u8)| {
    let (start, size, wire) = input;
    let start = u64::from(start);
    if let Some(abs) = reproject(start, size, wire) {
        assert!(abs >= start && abs < start + u64::from(size));
        assert_eq!(abs % 256, u64::from(wire));
    }
});
