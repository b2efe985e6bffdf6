#![no_main]

use bactsm_core::services::read_property::ReadPropertyAck;
use bactsm_core::services::ServiceAck;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = ReadPropertyAck::decode_payload(data);
});
