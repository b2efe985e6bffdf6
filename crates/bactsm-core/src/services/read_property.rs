use crate::encoding::{
    primitives::{encode_ctx_object_id, encode_ctx_unsigned},
    writer::Writer,
};
use crate::services::ConfirmedService;
use crate::types::{ObjectId, PropertyId};
use crate::EncodeError;

pub const SERVICE_READ_PROPERTY: u8 = 0x0C;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPropertyRequest {
    pub object_id: ObjectId,
    pub property_id: PropertyId,
    pub array_index: Option<u32>,
}

impl ConfirmedService for ReadPropertyRequest {
    const SERVICE_CHOICE: u8 = SERVICE_READ_PROPERTY;

    fn encode_service(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        encode_ctx_object_id(w, 0, self.object_id.raw())?;
        encode_ctx_unsigned(w, 1, self.property_id.to_u32())?;
        if let Some(idx) = self.array_index {
            encode_ctx_unsigned(w, 2, idx)?;
        }
        Ok(())
    }
}

#[cfg(feature = "alloc")]
pub use ack::{PropertyValue, ReadPropertyAck};

#[cfg(feature = "alloc")]
mod ack {
    use super::SERVICE_READ_PROPERTY;
    use crate::encoding::{
        primitives::{decode_character_string, decode_signed, decode_unsigned},
        reader::Reader,
        tag::{AppTag, Tag},
    };
    use crate::services::{
        decode_required_ctx_object_id, decode_required_ctx_unsigned, ServiceAck,
    };
    use crate::types::{ObjectId, PropertyId};
    use crate::DecodeError;
    use alloc::string::{String, ToString};
    use alloc::vec::Vec;
    use core::fmt;

    /// An application-tagged value, owned so it can outlive the segment
    /// buffers it was reassembled from.
    #[derive(Debug, Clone, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub enum PropertyValue {
        Null,
        Boolean(bool),
        Unsigned(u32),
        Signed(i32),
        Real(f32),
        Double(f64),
        OctetString(Vec<u8>),
        CharacterString(String),
        Enumerated(u32),
        ObjectId(ObjectId),
        /// Bit strings, dates and times, kept as raw content octets.
        Other { tag: u8, data: Vec<u8> },
    }

    impl PropertyValue {
        fn decode(r: &mut Reader<'_>, tag: AppTag, len: u32) -> Result<Self, DecodeError> {
            let len = len as usize;
            let value = match tag {
                AppTag::Null => Self::Null,
                AppTag::Boolean => Self::Boolean(len != 0),
                AppTag::UnsignedInt => Self::Unsigned(decode_unsigned(r, len)?),
                AppTag::SignedInt => Self::Signed(decode_signed(r, len)?),
                AppTag::Real => {
                    if len != 4 {
                        return Err(DecodeError::InvalidLength);
                    }
                    Self::Real(f32::from_bits(r.read_be_u32()?))
                }
                AppTag::Double => {
                    let raw = r.read_exact(8)?;
                    if len != 8 {
                        return Err(DecodeError::InvalidLength);
                    }
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(raw);
                    Self::Double(f64::from_be_bytes(bytes))
                }
                AppTag::OctetString => Self::OctetString(r.read_exact(len)?.to_vec()),
                AppTag::CharacterString => {
                    Self::CharacterString(decode_character_string(r, len)?.to_string())
                }
                AppTag::Enumerated => Self::Enumerated(decode_unsigned(r, len)?),
                AppTag::ObjectId => {
                    if len != 4 {
                        return Err(DecodeError::InvalidLength);
                    }
                    Self::ObjectId(ObjectId::from_raw(r.read_be_u32()?))
                }
                AppTag::BitString | AppTag::Date | AppTag::Time => Self::Other {
                    tag: tag as u8,
                    data: r.read_exact(len)?.to_vec(),
                },
            };
            Ok(value)
        }
    }

    impl fmt::Display for PropertyValue {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Self::Null => f.write_str("null"),
                Self::Boolean(v) => write!(f, "{v}"),
                Self::Unsigned(v) => write!(f, "{v}"),
                Self::Signed(v) => write!(f, "{v}"),
                Self::Real(v) => write!(f, "{v}"),
                Self::Double(v) => write!(f, "{v}"),
                Self::OctetString(v) => {
                    for b in v {
                        write!(f, "{b:02X}")?;
                    }
                    Ok(())
                }
                Self::CharacterString(v) => write!(f, "\"{v}\""),
                Self::Enumerated(v) => write!(f, "enum({v})"),
                Self::ObjectId(v) => write!(f, "{v}"),
                Self::Other { tag, data } => write!(f, "tag{tag}({} octets)", data.len()),
            }
        }
    }

    /// ReadProperty-ACK with the property value(s) decoded and owned.
    #[derive(Debug, Clone, PartialEq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct ReadPropertyAck {
        pub object_id: ObjectId,
        pub property_id: PropertyId,
        pub array_index: Option<u32>,
        /// One entry for scalar properties, several for lists and arrays.
        pub values: Vec<PropertyValue>,
    }

    impl ServiceAck for ReadPropertyAck {
        const SERVICE_CHOICE: u8 = SERVICE_READ_PROPERTY;

        fn decode_ack(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
            let object_id = decode_required_ctx_object_id(r, 0)?;
            let property_id = PropertyId::from_u32(decode_required_ctx_unsigned(r, 1)?);

            let (array_index, value_start_tag) = match Tag::decode(r)? {
                Tag::Context { tag_num: 2, len } => {
                    let idx = decode_unsigned(r, len as usize)?;
                    (Some(idx), Tag::decode(r)?)
                }
                other => (None, other),
            };
            if value_start_tag != (Tag::Opening { tag_num: 3 }) {
                return Err(DecodeError::InvalidTag);
            }

            let mut values = Vec::new();
            loop {
                match Tag::decode(r)? {
                    Tag::Closing { tag_num: 3 } => break,
                    Tag::Application { tag, len } => {
                        values.push(PropertyValue::decode(r, tag, len)?)
                    }
                    _ => return Err(DecodeError::InvalidTag),
                }
            }

            Ok(Self {
                object_id,
                property_id,
                array_index,
                values,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ReadPropertyRequest, SERVICE_READ_PROPERTY};
    use crate::encoding::writer::Writer;
    use crate::services::ConfirmedService;
    use crate::types::{ObjectId, ObjectType, PropertyId};

    #[test]
    fn request_encodes_parameters_only() {
        let mut buf = [0u8; 32];
        let mut w = Writer::new(&mut buf);
        ReadPropertyRequest {
            object_id: ObjectId::new(ObjectType::Device, 123),
            property_id: PropertyId::ObjectName,
            array_index: None,
        }
        .encode_service(&mut w)
        .unwrap();
        assert_eq!(ReadPropertyRequest::SERVICE_CHOICE, SERVICE_READ_PROPERTY);
        assert_eq!(
            w.as_written(),
            &[0x0C, 0x02, 0x00, 0x00, 0x7B, 0x19, 0x4D]
        );
    }

    #[cfg(feature = "alloc")]
    mod ack {
        use crate::encoding::{
            primitives::{
                encode_app_character_string, encode_app_real, encode_closing_tag,
                encode_ctx_object_id, encode_ctx_unsigned, encode_opening_tag,
            },
            writer::Writer,
        };
        use crate::services::read_property::{PropertyValue, ReadPropertyAck};
        use crate::services::ServiceAck;
        use crate::types::{ObjectId, ObjectType, PropertyId};
        use crate::DecodeError;
        use alloc::string::ToString;
        use alloc::vec;

        fn ack_payload(buf: &mut [u8], with_close: bool) -> usize {
            let mut w = Writer::new(buf);
            encode_ctx_object_id(&mut w, 0, ObjectId::new(ObjectType::AnalogValue, 3).raw())
                .unwrap();
            encode_ctx_unsigned(&mut w, 1, PropertyId::PresentValue.to_u32()).unwrap();
            encode_opening_tag(&mut w, 3).unwrap();
            encode_app_real(&mut w, 21.5).unwrap();
            encode_app_character_string(&mut w, "degC").unwrap();
            if with_close {
                encode_closing_tag(&mut w, 3).unwrap();
            }
            w.as_written().len()
        }

        #[test]
        fn decodes_value_list() {
            let mut buf = [0u8; 64];
            let n = ack_payload(&mut buf, true);
            let ack = ReadPropertyAck::decode_payload(&buf[..n]).unwrap();
            assert_eq!(ack.object_id, ObjectId::new(ObjectType::AnalogValue, 3));
            assert_eq!(ack.property_id, PropertyId::PresentValue);
            assert_eq!(ack.array_index, None);
            assert_eq!(
                ack.values,
                vec![
                    PropertyValue::Real(21.5),
                    PropertyValue::CharacterString("degC".to_string())
                ]
            );
        }

        #[test]
        fn truncated_payload_fails() {
            let mut buf = [0u8; 64];
            let n = ack_payload(&mut buf, false);
            assert_eq!(
                ReadPropertyAck::decode_payload(&buf[..n]).unwrap_err(),
                DecodeError::UnexpectedEof
            );
        }

        #[test]
        fn trailing_octets_fail() {
            let mut buf = [0u8; 64];
            let n = ack_payload(&mut buf, true);
            buf[n] = 0x00;
            assert_eq!(
                ReadPropertyAck::decode_payload(&buf[..n + 1]).unwrap_err(),
                DecodeError::TrailingData
            );
        }
    }
}
