use crate::apdu::{AbortReason, ApduType, RejectReason};
use crate::encoding::{
    primitives::{decode_unsigned, encode_ctx_unsigned},
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::{DecodeError, EncodeError};

const SEGMENTED: u8 = 0b0000_1000;
const MORE_FOLLOWS: u8 = 0b0000_0100;
const SEGMENTED_RESPONSE_ACCEPTED: u8 = 0b0000_0010;
const NEGATIVE_ACK: u8 = 0b0000_0010;
const SERVER: u8 = 0b0000_0001;

fn expect_type(r: &mut Reader<'_>, ty: ApduType) -> Result<u8, DecodeError> {
    let b0 = r.read_u8()?;
    if (b0 >> 4) != ty as u8 {
        return Err(DecodeError::InvalidValue);
    }
    Ok(b0)
}

/// Header of a BACnet-Confirmed-Request-PDU.
///
/// `sequence_number` and `proposed_window_size` are only present on the wire
/// when `segmented` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmedRequestHeader {
    pub segmented: bool,
    pub more_follows: bool,
    pub segmented_response_accepted: bool,
    pub max_segments: u8,
    pub max_apdu: u8,
    pub invoke_id: u8,
    pub sequence_number: Option<u8>,
    pub proposed_window_size: Option<u8>,
    pub service_choice: u8,
}

impl ConfirmedRequestHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let mut b0 = ApduType::ConfirmedRequest.header_octet();
        if self.segmented {
            b0 |= SEGMENTED;
        }
        if self.more_follows {
            b0 |= MORE_FOLLOWS;
        }
        if self.segmented_response_accepted {
            b0 |= SEGMENTED_RESPONSE_ACCEPTED;
        }

        w.write_u8(b0)?;
        w.write_u8(((self.max_segments & 0x07) << 4) | (self.max_apdu & 0x0f))?;
        w.write_u8(self.invoke_id)?;
        if self.segmented {
            w.write_u8(self.sequence_number.unwrap_or(0))?;
            w.write_u8(self.proposed_window_size.unwrap_or(1))?;
        }
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = expect_type(r, ApduType::ConfirmedRequest)?;
        let segmented = (b0 & SEGMENTED) != 0;
        let seg_apdu = r.read_u8()?;
        let invoke_id = r.read_u8()?;
        let (sequence_number, proposed_window_size) = if segmented {
            (Some(r.read_u8()?), Some(r.read_u8()?))
        } else {
            (None, None)
        };
        Ok(Self {
            segmented,
            more_follows: (b0 & MORE_FOLLOWS) != 0,
            segmented_response_accepted: (b0 & SEGMENTED_RESPONSE_ACCEPTED) != 0,
            max_segments: (seg_apdu >> 4) & 0x07,
            max_apdu: seg_apdu & 0x0f,
            invoke_id,
            sequence_number,
            proposed_window_size,
            service_choice: r.read_u8()?,
        })
    }

    /// Encoded size of this header in octets.
    pub const fn encoded_len(&self) -> usize {
        if self.segmented {
            6
        } else {
            4
        }
    }
}

/// Header of a BACnet-ComplexACK-PDU; the service payload follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexAckHeader {
    pub segmented: bool,
    pub more_follows: bool,
    pub invoke_id: u8,
    pub sequence_number: Option<u8>,
    pub proposed_window_size: Option<u8>,
    pub service_choice: u8,
}

impl ComplexAckHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let mut b0 = ApduType::ComplexAck.header_octet();
        if self.segmented {
            b0 |= SEGMENTED;
        }
        if self.more_follows {
            b0 |= MORE_FOLLOWS;
        }
        w.write_u8(b0)?;
        w.write_u8(self.invoke_id)?;
        if self.segmented {
            w.write_u8(self.sequence_number.unwrap_or(0))?;
            w.write_u8(self.proposed_window_size.unwrap_or(1))?;
        }
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = expect_type(r, ApduType::ComplexAck)?;
        let segmented = (b0 & SEGMENTED) != 0;
        let invoke_id = r.read_u8()?;
        let (sequence_number, proposed_window_size) = if segmented {
            (Some(r.read_u8()?), Some(r.read_u8()?))
        } else {
            (None, None)
        };
        Ok(Self {
            segmented,
            more_follows: (b0 & MORE_FOLLOWS) != 0,
            invoke_id,
            sequence_number,
            proposed_window_size,
            service_choice: r.read_u8()?,
        })
    }

    /// True when this header closes the response: either unsegmented or the
    /// segment with `more_follows` cleared.
    pub const fn is_final(&self) -> bool {
        !self.segmented || !self.more_follows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimpleAck {
    pub invoke_id: u8,
    pub service_choice: u8,
}

impl SimpleAck {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(ApduType::SimpleAck.header_octet())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.service_choice)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_type(r, ApduType::SimpleAck)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            service_choice: r.read_u8()?,
        })
    }
}

/// BACnet-Error-PDU with its class/code pair.
///
/// Class and code are optional because some devices send the bare header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetError {
    pub invoke_id: u8,
    pub service_choice: u8,
    pub error_class: Option<u32>,
    pub error_code: Option<u32>,
}

impl BacnetError {
    /// Encodes with context tags 0/1, the form used by most services.
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Error.header_octet())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.service_choice)?;
        if let (Some(class), Some(code)) = (self.error_class, self.error_code) {
            encode_ctx_unsigned(w, 0, class)?;
            encode_ctx_unsigned(w, 1, code)?;
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_type(r, ApduType::Error)?;
        let invoke_id = r.read_u8()?;
        let service_choice = r.read_u8()?;
        let mut error_class = None;
        let mut error_code = None;
        if !r.is_empty() {
            match Tag::decode(r)? {
                Tag::Opening { tag_num: 0 } => {
                    let class_tag = Tag::decode(r)?;
                    error_class = Some(decode_error_value(r, class_tag, 0)?);
                    let code_tag = Tag::decode(r)?;
                    error_code = Some(decode_error_value(r, code_tag, 1)?);
                    match Tag::decode(r)? {
                        Tag::Closing { tag_num: 0 } => {}
                        _ => return Err(DecodeError::InvalidTag),
                    }
                }
                first_tag => {
                    error_class = Some(decode_error_value(r, first_tag, 0)?);
                    let second_tag = Tag::decode(r)?;
                    error_code = Some(decode_error_value(r, second_tag, 1)?);
                }
            }
        }
        Ok(Self {
            invoke_id,
            service_choice,
            error_class,
            error_code,
        })
    }
}

fn decode_error_value(r: &mut Reader<'_>, tag: Tag, expected_ctx_tag: u8) -> Result<u32, DecodeError> {
    match tag {
        Tag::Context { tag_num, len } if tag_num == expected_ctx_tag => {
            decode_unsigned(r, len as usize)
        }
        Tag::Application {
            tag: AppTag::Enumerated,
            len,
        } => decode_unsigned(r, len as usize),
        _ => Err(DecodeError::InvalidTag),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectPdu {
    pub invoke_id: u8,
    pub reason: RejectReason,
}

impl RejectPdu {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(ApduType::Reject.header_octet())?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.reason.to_u8())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        expect_type(r, ApduType::Reject)?;
        Ok(Self {
            invoke_id: r.read_u8()?,
            reason: RejectReason::from_u8(r.read_u8()?),
        })
    }
}

/// BACnet-Abort-PDU. `server` is set when the abort originates from the
/// responding side of the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AbortPdu {
    pub server: bool,
    pub invoke_id: u8,
    pub reason: AbortReason,
}

impl AbortPdu {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let mut b0 = ApduType::Abort.header_octet();
        if self.server {
            b0 |= SERVER;
        }
        w.write_u8(b0)?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.reason.to_u8())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = expect_type(r, ApduType::Abort)?;
        Ok(Self {
            server: (b0 & SERVER) != 0,
            invoke_id: r.read_u8()?,
            reason: AbortReason::from_u8(r.read_u8()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentAck {
    pub negative_ack: bool,
    pub sent_by_server: bool,
    pub invoke_id: u8,
    pub sequence_number: u8,
    pub actual_window_size: u8,
}

impl SegmentAck {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let mut b0 = ApduType::SegmentAck.header_octet();
        if self.negative_ack {
            b0 |= NEGATIVE_ACK;
        }
        if self.sent_by_server {
            b0 |= SERVER;
        }
        w.write_u8(b0)?;
        w.write_u8(self.invoke_id)?;
        w.write_u8(self.sequence_number)?;
        w.write_u8(self.actual_window_size)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let b0 = expect_type(r, ApduType::SegmentAck)?;
        Ok(Self {
            negative_ack: (b0 & NEGATIVE_ACK) != 0,
            sent_by_server: (b0 & SERVER) != 0,
            invoke_id: r.read_u8()?,
            sequence_number: r.read_u8()?,
            actual_window_size: r.read_u8()?,
        })
    }
}
