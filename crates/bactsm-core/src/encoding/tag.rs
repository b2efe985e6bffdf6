use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

const CONTEXT_CLASS: u8 = 0b0000_1000;
const EXTENDED_TAG: u8 = 0x0F;
const LVT_EXTENDED: u8 = 5;
const LVT_OPENING: u8 = 6;
const LVT_CLOSING: u8 = 7;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectId = 12,
}

impl AppTag {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        Ok(match value {
            0 => Self::Null,
            1 => Self::Boolean,
            2 => Self::UnsignedInt,
            3 => Self::SignedInt,
            4 => Self::Real,
            5 => Self::Double,
            6 => Self::OctetString,
            7 => Self::CharacterString,
            8 => Self::BitString,
            9 => Self::Enumerated,
            10 => Self::Date,
            11 => Self::Time,
            12 => Self::ObjectId,
            _ => return Err(DecodeError::InvalidTag),
        })
    }
}

/// One decoded tag header. The content octets (if any) follow in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    Application { tag: AppTag, len: u32 },
    Context { tag_num: u8, len: u32 },
    Opening { tag_num: u8 },
    Closing { tag_num: u8 },
}

impl Tag {
    pub fn encode(self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Tag::Application { tag, len } => write_header(w, tag as u8, false, len),
            Tag::Context { tag_num, len } => write_header(w, tag_num, true, len),
            Tag::Opening { tag_num } => write_initial(w, tag_num, true, LVT_OPENING),
            Tag::Closing { tag_num } => write_initial(w, tag_num, true, LVT_CLOSING),
        }
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let first = r.read_u8()?;
        let context = (first & CONTEXT_CLASS) != 0;
        let tag_num = match first >> 4 {
            EXTENDED_TAG => r.read_u8()?,
            n => n,
        };
        let lvt = first & 0x07;

        match (context, lvt) {
            (true, LVT_OPENING) => Ok(Tag::Opening { tag_num }),
            (true, LVT_CLOSING) => Ok(Tag::Closing { tag_num }),
            (true, _) => Ok(Tag::Context {
                tag_num,
                len: read_len(r, lvt)?,
            }),
            (false, _) => Ok(Tag::Application {
                tag: AppTag::from_u8(tag_num)?,
                len: read_len(r, lvt)?,
            }),
        }
    }
}

fn write_initial(w: &mut Writer<'_>, tag_num: u8, context: bool, lvt: u8) -> Result<(), EncodeError> {
    let extended = tag_num >= EXTENDED_TAG;
    let mut first = if extended { EXTENDED_TAG << 4 } else { tag_num << 4 };
    if context {
        first |= CONTEXT_CLASS;
    }
    w.write_u8(first | lvt)?;
    if extended {
        w.write_u8(tag_num)?;
    }
    Ok(())
}

fn write_header(w: &mut Writer<'_>, tag_num: u8, context: bool, len: u32) -> Result<(), EncodeError> {
    if len < u32::from(LVT_EXTENDED) {
        return write_initial(w, tag_num, context, len as u8);
    }
    write_initial(w, tag_num, context, LVT_EXTENDED)?;
    match len {
        0..=253 => w.write_u8(len as u8),
        254..=0xFFFF => {
            w.write_u8(254)?;
            w.write_be_u16(len as u16)
        }
        _ => {
            w.write_u8(255)?;
            w.write_be_u32(len)
        }
    }
}

fn read_len(r: &mut Reader<'_>, lvt: u8) -> Result<u32, DecodeError> {
    match lvt {
        0..=4 => Ok(u32::from(lvt)),
        LVT_EXTENDED => match r.read_u8()? {
            254 => Ok(u32::from(r.read_be_u16()?)),
            255 => r.read_be_u32(),
            short => Ok(u32::from(short)),
        },
        _ => Err(DecodeError::InvalidLength),
    }
}
