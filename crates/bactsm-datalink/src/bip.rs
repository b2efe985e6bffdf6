//! BACnet/IP (Annex J) over UDP: a four-octet BVLC header in front of each NPDU.

use crate::{DataLink, DataLinkAddress, DataLinkError};
use bactsm_core::encoding::{reader::Reader, writer::Writer};
use bactsm_core::{DecodeError, EncodeError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::UdpSocket;

pub const BVLC_TYPE_BIP: u8 = 0x81;
const BVLC_HEADER_LEN: usize = 4;
const MAX_BIP_FRAME_LEN: usize = 1600;

/// The BVLC functions a plain BACnet/IP node sends or accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvlcFunction {
    Result,
    ForwardedNpdu,
    DistributeBroadcastToNetwork,
    OriginalUnicastNpdu,
    OriginalBroadcastNpdu,
    /// BBMD table management and anything unassigned.
    Other(u8),
}

impl BvlcFunction {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Self::Result,
            0x04 => Self::ForwardedNpdu,
            0x09 => Self::DistributeBroadcastToNetwork,
            0x0A => Self::OriginalUnicastNpdu,
            0x0B => Self::OriginalBroadcastNpdu,
            v => Self::Other(v),
        }
    }

    pub const fn to_u8(self) -> u8 {
        match self {
            Self::Result => 0x00,
            Self::ForwardedNpdu => 0x04,
            Self::DistributeBroadcastToNetwork => 0x09,
            Self::OriginalUnicastNpdu => 0x0A,
            Self::OriginalBroadcastNpdu => 0x0B,
            Self::Other(v) => v,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BvlcHeader {
    pub function: BvlcFunction,
    /// Whole frame length, header included.
    pub length: u16,
}

impl BvlcHeader {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(BVLC_TYPE_BIP)?;
        w.write_u8(self.function.to_u8())?;
        w.write_be_u16(self.length)
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        if r.read_u8()? != BVLC_TYPE_BIP {
            return Err(DecodeError::InvalidValue);
        }
        let function = BvlcFunction::from_u8(r.read_u8()?);
        let length = r.read_be_u16()?;
        if usize::from(length) < BVLC_HEADER_LEN {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { function, length })
    }

    fn payload_len(&self) -> usize {
        usize::from(self.length) - BVLC_HEADER_LEN
    }
}

/// A UDP socket speaking BACnet/IP. Cloning shares the socket.
#[derive(Debug, Clone)]
pub struct BacnetIpTransport {
    socket: Arc<UdpSocket>,
}

impl BacnetIpTransport {
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, DataLinkError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.set_broadcast(true)?;
        log::debug!("bacnet/ip bound on {}", socket.local_addr()?);
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, DataLinkError> {
        self.socket.local_addr().map_err(DataLinkError::Io)
    }
}

fn copy_payload(payload: &[u8], buf: &mut [u8]) -> Result<usize, DataLinkError> {
    let dst = buf
        .get_mut(..payload.len())
        .ok_or(DataLinkError::FrameTooLarge)?;
    dst.copy_from_slice(payload);
    Ok(payload.len())
}

impl DataLink for BacnetIpTransport {
    async fn send(&self, address: DataLinkAddress, payload: &[u8]) -> Result<(), DataLinkError> {
        let function = if address.is_broadcast() {
            BvlcFunction::OriginalBroadcastNpdu
        } else {
            BvlcFunction::OriginalUnicastNpdu
        };

        let total_len = BVLC_HEADER_LEN + payload.len();
        if total_len > MAX_BIP_FRAME_LEN {
            return Err(DataLinkError::FrameTooLarge);
        }

        let mut frame = [0u8; MAX_BIP_FRAME_LEN];
        let mut w = Writer::new(&mut frame);
        BvlcHeader {
            function,
            length: total_len as u16,
        }
        .encode(&mut w)
        .map_err(|_| DataLinkError::InvalidFrame)?;
        w.write_all(payload)
            .map_err(|_| DataLinkError::FrameTooLarge)?;

        self.socket
            .send_to(w.as_written(), address.as_socket_addr())
            .await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
        let mut frame = [0u8; MAX_BIP_FRAME_LEN];
        let (n, src) = self.socket.recv_from(&mut frame).await?;
        let mut r = Reader::new(&frame[..n]);
        let hdr = BvlcHeader::decode(&mut r).map_err(|_| DataLinkError::InvalidFrame)?;
        let body = r
            .read_exact(hdr.payload_len())
            .map_err(|_| DataLinkError::InvalidFrame)?;

        match hdr.function {
            BvlcFunction::OriginalUnicastNpdu
            | BvlcFunction::OriginalBroadcastNpdu
            | BvlcFunction::DistributeBroadcastToNetwork => {
                Ok((copy_payload(body, buf)?, DataLinkAddress::Ip(src)))
            }
            BvlcFunction::ForwardedNpdu => {
                // B/IP address of the originator precedes the NPDU.
                if body.len() < 6 {
                    return Err(DataLinkError::InvalidFrame);
                }
                let (origin, payload) = body.split_at(6);
                let ip = Ipv4Addr::new(origin[0], origin[1], origin[2], origin[3]);
                let port = u16::from_be_bytes([origin[4], origin[5]]);
                Ok((
                    copy_payload(payload, buf)?,
                    DataLinkAddress::Ip(SocketAddr::new(IpAddr::V4(ip), port)),
                ))
            }
            BvlcFunction::Result => Err(DataLinkError::InvalidFrame),
            BvlcFunction::Other(v) => Err(DataLinkError::UnsupportedBvlcFunction(v)),
        }
    }
}
