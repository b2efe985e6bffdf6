#![no_main]

use bactsm_core::apdu::{
    AbortPdu, ApduType, BacnetError, ComplexAckHeader, RejectPdu, SegmentAck, SimpleAck,
};
use bactsm_core::encoding::reader::Reader;
use bactsm_core::npdu::split_apdu;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((_, apdu)) = split_apdu(data) else {
        return;
    };
    let mut r = Reader::new(apdu);
    match ApduType::of(apdu) {
        Some(ApduType::SimpleAck) => {
            let _ = SimpleAck::decode(&mut r);
        }
        Some(ApduType::ComplexAck) => {
            if let Ok(header) = ComplexAckHeader::decode(&mut r) {
                assert_eq!(header.segmented, header.sequence_number.is_some());
            }
        }
        Some(ApduType::SegmentAck) => {
            let _ = SegmentAck::decode(&mut r);
        }
        Some(ApduType::Error) => {
            let _ = BacnetError::decode(&mut r);
        }
        Some(ApduType::Reject) => {
            let _ = RejectPdu::decode(&mut r);
        }
        Some(ApduType::Abort) => {
            let _ = AbortPdu::decode(&mut r);
        }
        _ => {}
    }
});
