//! Service payload codecs.
//!
//! The transaction engine owns every APDU header, so services only describe
//! their payload: a request knows how to write the bytes that follow the
//! confirmed-request header, and an ack knows how to read the bytes that
//! follow the complex-ack header once all segments have been reassembled.

pub mod read_property;
pub mod reinitialize_device;

use crate::encoding::{primitives::decode_unsigned, reader::Reader, tag::Tag, writer::Writer};
use crate::types::ObjectId;
use crate::{DecodeError, EncodeError};

/// A confirmed service request (the "save" half of the codec contract).
pub trait ConfirmedService {
    /// Service choice octet written into the request header.
    const SERVICE_CHOICE: u8;

    /// Writes the service parameters, without any APDU header.
    fn encode_service(&self, w: &mut Writer<'_>) -> Result<(), EncodeError>;
}

/// The payload of a complex ack (the "load" half of the codec contract).
pub trait ServiceAck: Sized {
    /// Service choice the ack must echo.
    const SERVICE_CHOICE: u8;

    /// Decodes the reassembled service payload.
    fn decode_ack(r: &mut Reader<'_>) -> Result<Self, DecodeError>;

    /// Decodes `payload` and insists nothing is left over.
    fn decode_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        let mut r = Reader::new(payload);
        let ack = Self::decode_ack(&mut r)?;
        if !r.is_empty() {
            return Err(DecodeError::TrailingData);
        }
        Ok(ack)
    }
}

/// Decode a required context-tagged unsigned integer at the expected tag number.
pub(crate) fn decode_required_ctx_unsigned(
    r: &mut Reader<'_>,
    expected_tag_num: u8,
) -> Result<u32, DecodeError> {
    match Tag::decode(r)? {
        Tag::Context { tag_num, len } if tag_num == expected_tag_num => {
            decode_unsigned(r, len as usize)
        }
        _ => Err(DecodeError::InvalidTag),
    }
}

/// Decode a required context-tagged object identifier at the expected tag number.
pub(crate) fn decode_required_ctx_object_id(
    r: &mut Reader<'_>,
    expected_tag_num: u8,
) -> Result<ObjectId, DecodeError> {
    match Tag::decode(r)? {
        Tag::Context { tag_num, len: 4 } if tag_num == expected_tag_num => {
            Ok(ObjectId::from_raw(r.read_be_u32()?))
        }
        _ => Err(DecodeError::InvalidTag),
    }
}
