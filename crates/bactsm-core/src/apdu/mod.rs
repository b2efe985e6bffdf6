/// Confirmed-service request/response headers.
pub mod confirmed;
/// APDU type discriminant.
pub mod pdu;
/// Abort and reject reason codes.
pub mod reason;

pub use confirmed::{
    AbortPdu, BacnetError, ComplexAckHeader, ConfirmedRequestHeader, RejectPdu, SegmentAck,
    SimpleAck,
};
pub use pdu::ApduType;
pub use reason::{AbortReason, RejectReason};
