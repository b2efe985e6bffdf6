#![no_main]

use bactsm_core::encoding::reader::Reader;
use bactsm_datalink::bip::BvlcHeader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(header) = BvlcHeader::decode(&mut Reader::new(data)) {
        assert!(header.length >= 4);
    }
});
