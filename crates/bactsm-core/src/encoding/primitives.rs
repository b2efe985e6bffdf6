use crate::encoding::{
    reader::Reader,
    tag::{AppTag, Tag},
    writer::Writer,
};
use crate::{DecodeError, EncodeError};

/// Writes `value` big-endian in the fewest octets (1..=4), returning the length.
pub fn encode_unsigned(w: &mut Writer<'_>, value: u32) -> Result<usize, EncodeError> {
    let len = match value {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    };
    w.write_all(&value.to_be_bytes()[4 - len..])?;
    Ok(len)
}

pub fn decode_unsigned(r: &mut Reader<'_>, len: usize) -> Result<u32, DecodeError> {
    if len == 0 || len > 4 {
        return Err(DecodeError::InvalidLength);
    }
    let mut value = 0u32;
    for _ in 0..len {
        value = (value << 8) | r.read_u8()? as u32;
    }
    Ok(value)
}

pub fn encode_signed(w: &mut Writer<'_>, value: i32) -> Result<usize, EncodeError> {
    let len = match value {
        -128..=127 => 1,
        -32_768..=32_767 => 2,
        -8_388_608..=8_388_607 => 3,
        _ => 4,
    };
    w.write_all(&value.to_be_bytes()[4 - len..])?;
    Ok(len)
}

pub fn decode_signed(r: &mut Reader<'_>, len: usize) -> Result<i32, DecodeError> {
    if len == 0 || len > 4 {
        return Err(DecodeError::InvalidLength);
    }
    let bytes = r.read_exact(len)?;
    let fill = if (bytes[0] & 0x80) != 0 { 0xFF } else { 0x00 };
    let mut out = [fill; 4];
    out[4 - len..].copy_from_slice(bytes);
    Ok(i32::from_be_bytes(out))
}

fn encode_tagged_unsigned(w: &mut Writer<'_>, tag: Tag, value: u32) -> Result<(), EncodeError> {
    let mut scratch = [0u8; 4];
    let mut tw = Writer::new(&mut scratch);
    let len = encode_unsigned(&mut tw, value)?;
    match tag {
        Tag::Application { tag, .. } => Tag::Application {
            tag,
            len: len as u32,
        },
        Tag::Context { tag_num, .. } => Tag::Context {
            tag_num,
            len: len as u32,
        },
        _ => return Err(EncodeError::Message("unsigned needs a primitive tag")),
    }
    .encode(w)?;
    w.write_all(&scratch[..len])
}

pub fn encode_app_unsigned(w: &mut Writer<'_>, value: u32) -> Result<(), EncodeError> {
    let tag = Tag::Application {
        tag: AppTag::UnsignedInt,
        len: 0,
    };
    encode_tagged_unsigned(w, tag, value)
}

pub fn encode_app_enumerated(w: &mut Writer<'_>, value: u32) -> Result<(), EncodeError> {
    let tag = Tag::Application {
        tag: AppTag::Enumerated,
        len: 0,
    };
    encode_tagged_unsigned(w, tag, value)
}

pub fn encode_app_real(w: &mut Writer<'_>, value: f32) -> Result<(), EncodeError> {
    Tag::Application {
        tag: AppTag::Real,
        len: 4,
    }
    .encode(w)?;
    w.write_all(&value.to_bits().to_be_bytes())
}

pub fn encode_app_character_string(w: &mut Writer<'_>, value: &str) -> Result<(), EncodeError> {
    let bytes = value.as_bytes();
    Tag::Application {
        tag: AppTag::CharacterString,
        len: (bytes.len() + 1) as u32,
    }
    .encode(w)?;
    w.write_u8(0)?;
    w.write_all(bytes)
}

pub fn encode_ctx_unsigned(w: &mut Writer<'_>, tag_num: u8, value: u32) -> Result<(), EncodeError> {
    encode_tagged_unsigned(w, Tag::Context { tag_num, len: 0 }, value)
}

pub fn encode_ctx_object_id(
    w: &mut Writer<'_>,
    tag_num: u8,
    object_id_raw: u32,
) -> Result<(), EncodeError> {
    Tag::Context { tag_num, len: 4 }.encode(w)?;
    w.write_be_u32(object_id_raw)
}

/// Encodes an ANSI X3.4 (charset 0) character string under a context tag.
pub fn encode_ctx_character_string(
    w: &mut Writer<'_>,
    tag_num: u8,
    value: &str,
) -> Result<(), EncodeError> {
    let bytes = value.as_bytes();
    Tag::Context {
        tag_num,
        len: (bytes.len() + 1) as u32,
    }
    .encode(w)?;
    w.write_u8(0)?;
    w.write_all(bytes)
}

/// Decodes a character string body of `len` octets; only charset 0 (UTF-8)
/// is accepted.
pub fn decode_character_string<'a>(r: &mut Reader<'a>, len: usize) -> Result<&'a str, DecodeError> {
    if len == 0 {
        return Err(DecodeError::InvalidLength);
    }
    let raw = r.read_exact(len)?;
    if raw[0] != 0 {
        return Err(DecodeError::Unsupported);
    }
    core::str::from_utf8(&raw[1..]).map_err(|_| DecodeError::InvalidValue)
}

pub fn encode_opening_tag(w: &mut Writer<'_>, tag_num: u8) -> Result<(), EncodeError> {
    Tag::Opening { tag_num }.encode(w)
}

pub fn encode_closing_tag(w: &mut Writer<'_>, tag_num: u8) -> Result<(), EncodeError> {
    Tag::Closing { tag_num }.encode(w)
}

#[cfg(test)]
#[cfg(feature = "alloc")]
mod tests {
    use super::{
        decode_character_string, decode_signed, decode_unsigned, encode_ctx_character_string,
        encode_signed, encode_unsigned,
    };
    use crate::encoding::{reader::Reader, tag::Tag, writer::Writer};
    use alloc::format;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn unsigned_roundtrip(v in any::<u32>()) {
            let mut b = [0u8; 8];
            let mut w = Writer::new(&mut b);
            let len = encode_unsigned(&mut w, v).unwrap();
            let mut r = Reader::new(w.as_written());
            prop_assert_eq!(decode_unsigned(&mut r, len).unwrap(), v);
        }

        #[test]
        fn signed_roundtrip(v in any::<i32>()) {
            let mut b = [0u8; 8];
            let mut w = Writer::new(&mut b);
            let len = encode_signed(&mut w, v).unwrap();
            let mut r = Reader::new(w.as_written());
            prop_assert_eq!(decode_signed(&mut r, len).unwrap(), v);
        }
    }

    #[test]
    fn unsigned_uses_minimal_length() {
        let mut b = [0u8; 8];
        let mut w = Writer::new(&mut b);
        assert_eq!(encode_unsigned(&mut w, 0x0100).unwrap(), 2);
        assert_eq!(w.as_written(), &[0x01, 0x00]);
    }

    #[test]
    fn ctx_character_string_roundtrip() {
        let mut b = [0u8; 32];
        let mut w = Writer::new(&mut b);
        encode_ctx_character_string(&mut w, 2, "hello").unwrap();
        let mut r = Reader::new(w.as_written());
        match Tag::decode(&mut r).unwrap() {
            Tag::Context { tag_num: 2, len } => {
                assert_eq!(decode_character_string(&mut r, len as usize).unwrap(), "hello");
            }
            other => panic!("unexpected tag: {other:?}"),
        }
    }
}
