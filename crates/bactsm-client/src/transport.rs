use bactsm_core::apdu::{AbortPdu, ConfirmedRequestHeader, SegmentAck};
use bactsm_core::encoding::writer::Writer;
use bactsm_core::npdu::Npdu;
use bactsm_core::EncodeError;
use bactsm_datalink::{DataLink, DataLinkAddress};
use std::sync::Arc;
use tokio::sync::mpsc;

/// NPDU (2) plus the largest client-originated APDU header (6).
const MAX_HEADER_OVERHEAD: usize = 8;

/// APDU headers a client transaction originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingApdu {
    ConfirmedRequest(ConfirmedRequestHeader),
    SegmentAck(SegmentAck),
    Abort(AbortPdu),
}

impl OutgoingApdu {
    pub fn invoke_id(&self) -> u8 {
        match self {
            Self::ConfirmedRequest(h) => h.invoke_id,
            Self::SegmentAck(h) => h.invoke_id,
            Self::Abort(h) => h.invoke_id,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::ConfirmedRequest(h) => h.encode(w),
            Self::SegmentAck(h) => h.encode(w),
            Self::Abort(h) => h.encode(w),
        }
    }
}

/// Builds the network-layer frame for one outgoing APDU.
pub fn encode_frame(
    expect_reply: bool,
    header: &OutgoingApdu,
    payload: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let mut frame = vec![0u8; MAX_HEADER_OVERHEAD + payload.len()];
    let mut w = Writer::new(&mut frame);
    Npdu::for_apdu(expect_reply).encode(&mut w)?;
    header.encode(&mut w)?;
    w.write_all(payload)?;
    let len = w.position();
    frame.truncate(len);
    Ok(frame)
}

/// Fire-and-forget send of a framed APDU. Implementations must not block and
/// must not call back into the transaction.
pub trait Transport: Send + Sync {
    fn send_raw(
        &self,
        destination: DataLinkAddress,
        expect_reply: bool,
        header: OutgoingApdu,
        payload: &[u8],
    );
}

#[derive(Debug)]
struct QueuedFrame {
    destination: DataLinkAddress,
    invoke_id: u8,
    frame: Vec<u8>,
}

/// [`Transport`] over a [`DataLink`]. Frames are queued to a single sender
/// task and leave in the order they were handed over.
#[derive(Debug)]
pub struct DataLinkTransport {
    tx: mpsc::UnboundedSender<QueuedFrame>,
}

impl DataLinkTransport {
    /// Spawns the sender task, which runs until the transport is dropped and
    /// its queue is drained.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new<D: DataLink + 'static>(datalink: Arc<D>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(send_loop(datalink, rx));
        Self { tx }
    }
}

async fn send_loop<D: DataLink>(datalink: Arc<D>, mut rx: mpsc::UnboundedReceiver<QueuedFrame>) {
    while let Some(queued) = rx.recv().await {
        if let Err(err) = datalink.send(queued.destination, &queued.frame).await {
            log::warn!(
                "send to {} (invoke id {}) failed: {err}",
                queued.destination,
                queued.invoke_id
            );
        }
    }
    log::trace!("transport sender stopped");
}

impl Transport for DataLinkTransport {
    fn send_raw(
        &self,
        destination: DataLinkAddress,
        expect_reply: bool,
        header: OutgoingApdu,
        payload: &[u8],
    ) {
        let frame = match encode_frame(expect_reply, &header, payload) {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("failed to encode {header:?} for {destination}: {err}");
                return;
            }
        };
        let queued = QueuedFrame {
            destination,
            invoke_id: header.invoke_id(),
            frame,
        };
        if self.tx.send(queued).is_err() {
            log::warn!("transport sender is gone; dropping frame for {destination}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_frame, DataLinkTransport, OutgoingApdu, Transport};
    use bactsm_core::apdu::{AbortPdu, AbortReason, ConfirmedRequestHeader, SegmentAck};
    use bactsm_datalink::{DataLink, DataLinkAddress, DataLinkError};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct ChannelLink {
        tx: mpsc::UnboundedSender<(DataLinkAddress, Vec<u8>)>,
    }

    impl DataLink for ChannelLink {
        async fn send(
            &self,
            address: DataLinkAddress,
            payload: &[u8],
        ) -> Result<(), DataLinkError> {
            self.tx
                .send((address, payload.to_vec()))
                .map_err(|_| DataLinkError::InvalidFrame)
        }

        async fn recv(&self, _buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
            std::future::pending().await
        }
    }

    fn peer() -> DataLinkAddress {
        DataLinkAddress::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), 47808))
    }

    #[test]
    fn request_frame_expects_reply() {
        let header = OutgoingApdu::ConfirmedRequest(ConfirmedRequestHeader {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: true,
            max_segments: 0,
            max_apdu: 5,
            invoke_id: 3,
            sequence_number: None,
            proposed_window_size: None,
            service_choice: 0x14,
        });
        let frame = encode_frame(true, &header, &[0x09, 0x00]).unwrap();
        assert_eq!(frame, vec![0x01, 0x04, 0x02, 0x05, 0x03, 0x14, 0x09, 0x00]);
    }

    #[test]
    fn segment_ack_frame_has_no_payload() {
        let header = OutgoingApdu::SegmentAck(SegmentAck {
            negative_ack: true,
            sent_by_server: false,
            invoke_id: 3,
            sequence_number: 0,
            actual_window_size: 4,
        });
        let frame = encode_frame(false, &header, &[]).unwrap();
        assert_eq!(frame, vec![0x01, 0x00, 0x42, 0x03, 0x00, 0x04]);
    }

    fn abort(invoke_id: u8) -> OutgoingApdu {
        OutgoingApdu::Abort(AbortPdu {
            server: false,
            invoke_id,
            reason: AbortReason::Other,
        })
    }

    #[tokio::test]
    async fn datalink_transport_sends_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = DataLinkTransport::new(Arc::new(ChannelLink { tx }));
        transport.send_raw(peer(), false, abort(8), &[]);
        let (address, frame) = rx.recv().await.unwrap();
        assert_eq!(address, peer());
        assert_eq!(frame, vec![0x01, 0x00, 0x70, 0x08, 0x00]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn frames_leave_in_submission_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let transport = DataLinkTransport::new(Arc::new(ChannelLink { tx }));
        let ack = OutgoingApdu::SegmentAck(SegmentAck {
            negative_ack: false,
            sent_by_server: false,
            invoke_id: 1,
            sequence_number: 9,
            actual_window_size: 4,
        });
        for invoke_id in 0..=u8::MAX {
            transport.send_raw(peer(), false, ack, &[]);
            transport.send_raw(peer(), false, abort(invoke_id), &[]);
        }
        for invoke_id in 0..=u8::MAX {
            let (_, first) = rx.recv().await.unwrap();
            let (_, second) = rx.recv().await.unwrap();
            assert_eq!(first[2], 0x40);
            assert_eq!(second, vec![0x01, 0x00, 0x70, invoke_id, 0x00]);
        }
    }
}
