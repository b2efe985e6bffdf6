use crate::encoding::{reader::Reader, writer::Writer};
use crate::{DecodeError, EncodeError};

/// BACnet network layer protocol version (always `0x01`).
pub const NPDU_VERSION: u8 = 0x01;

const CONTROL_NETWORK_MESSAGE: u8 = 0x80;
const CONTROL_DESTINATION: u8 = 0x20;
const CONTROL_SOURCE: u8 = 0x08;
/// Control bit telling the network layer a reply is expected.
pub const CONTROL_EXPECTING_REPLY: u8 = 0x04;

/// A network-layer address consisting of a network number and a MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NpduAddress {
    pub network: u16,
    pub mac: [u8; 6],
    pub mac_len: u8,
}

/// BACnet Network Protocol Data Unit (NPDU) header.
///
/// The client only originates local, non-routed NPDUs, but inbound frames may
/// carry source/destination specifiers from a router and are decoded in full
/// so the APDU that follows can be located.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Npdu {
    pub control: u8,
    pub destination: Option<NpduAddress>,
    pub source: Option<NpduAddress>,
    pub hop_count: Option<u8>,
    pub message_type: Option<u8>,
    pub vendor_id: Option<u16>,
}

impl Npdu {
    pub const fn new(control: u8) -> Self {
        Self {
            control,
            destination: None,
            source: None,
            hop_count: None,
            message_type: None,
            vendor_id: None,
        }
    }

    /// Local NPDU in front of an application-layer PDU.
    pub const fn for_apdu(expecting_reply: bool) -> Self {
        Self::new(if expecting_reply {
            CONTROL_EXPECTING_REPLY
        } else {
            0
        })
    }

    pub const fn expecting_reply(&self) -> bool {
        (self.control & CONTROL_EXPECTING_REPLY) != 0
    }

    pub const fn is_network_message(&self) -> bool {
        (self.control & CONTROL_NETWORK_MESSAGE) != 0
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(NPDU_VERSION)?;
        w.write_u8(self.control)?;

        if let Some(dest) = self.destination {
            encode_addr(w, dest)?;
        }
        if let Some(src) = self.source {
            encode_addr(w, src)?;
        }
        if self.destination.is_some() {
            w.write_u8(self.hop_count.unwrap_or(255))?;
        }
        if self.is_network_message() {
            w.write_u8(self.message_type.unwrap_or(0))?;
            if matches!(self.message_type, Some(0x80..=0xFF)) {
                w.write_be_u16(self.vendor_id.unwrap_or(0))?;
            }
        }
        Ok(())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.read_u8()? != NPDU_VERSION {
            return Err(DecodeError::InvalidValue);
        }

        let control = r.read_u8()?;
        let has_dest = (control & CONTROL_DESTINATION) != 0;
        let destination = if has_dest {
            Some(decode_addr(r)?)
        } else {
            None
        };
        let source = if (control & CONTROL_SOURCE) != 0 {
            Some(decode_addr(r)?)
        } else {
            None
        };
        let hop_count = if has_dest { Some(r.read_u8()?) } else { None };

        let (message_type, vendor_id) = if (control & CONTROL_NETWORK_MESSAGE) != 0 {
            let mt = r.read_u8()?;
            let vid = if mt >= 0x80 {
                Some(r.read_be_u16()?)
            } else {
                None
            };
            (Some(mt), vid)
        } else {
            (None, None)
        };

        Ok(Self {
            control,
            destination,
            source,
            hop_count,
            message_type,
            vendor_id,
        })
    }
}

/// Splits a datalink payload into its NPDU header and the APDU behind it.
///
/// Network-layer messages carry no APDU and are refused.
pub fn split_apdu(frame: &[u8]) -> Result<(Npdu, &[u8]), DecodeError> {
    let mut r = Reader::new(frame);
    let npdu = Npdu::decode(&mut r)?;
    if npdu.is_network_message() {
        return Err(DecodeError::Unsupported);
    }
    Ok((npdu, r.read_remaining()))
}

fn encode_addr(w: &mut Writer<'_>, addr: NpduAddress) -> Result<(), EncodeError> {
    if addr.mac_len as usize > addr.mac.len() {
        return Err(EncodeError::InvalidLength);
    }
    w.write_be_u16(addr.network)?;
    w.write_u8(addr.mac_len)?;
    w.write_all(&addr.mac[..addr.mac_len as usize])
}

fn decode_addr(r: &mut Reader<'_>) -> Result<NpduAddress, DecodeError> {
    let network = r.read_be_u16()?;
    let mac_len = r.read_u8()?;
    if mac_len as usize > 6 {
        return Err(DecodeError::InvalidLength);
    }
    let mut mac = [0u8; 6];
    mac[..mac_len as usize].copy_from_slice(r.read_exact(mac_len as usize)?);
    Ok(NpduAddress {
        network,
        mac,
        mac_len,
    })
}
