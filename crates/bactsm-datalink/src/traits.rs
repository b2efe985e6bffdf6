use crate::DataLinkAddress;
use std::future::Future;
use thiserror::Error;

/// Errors that can occur at the data-link layer.
#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("frame too large")]
    FrameTooLarge,
    #[error("invalid frame")]
    InvalidFrame,
    #[error("unsupported BVLC function 0x{0:02x}")]
    UnsupportedBvlcFunction(u8),
}

/// Moves whole NPDUs between this node and a peer.
///
/// The returned futures are `Send` so a generic link can be driven from
/// spawned tasks. [`BacnetIpTransport`](crate::BacnetIpTransport) is the
/// shipped implementation; tests substitute in-memory links.
pub trait DataLink: Send + Sync {
    /// Sends `payload` to the given data-link `address`.
    fn send(
        &self,
        address: DataLinkAddress,
        payload: &[u8],
    ) -> impl Future<Output = Result<(), DataLinkError>> + Send;

    /// Receives a frame into `buf`, returning `(bytes_read, source_address)`.
    fn recv(
        &self,
        buf: &mut [u8],
    ) -> impl Future<Output = Result<(usize, DataLinkAddress), DataLinkError>> + Send;
}
