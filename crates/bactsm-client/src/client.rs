use crate::config::TransactionConfig;
use crate::directory::{DeviceTable, DeviceTableEntry, Recipient};
use crate::handle::ClientTransactionHandle;
use crate::manager::TransactionManager;
use crate::transaction::ClientTransaction;
use crate::transport::DataLinkTransport;
use crate::{ClientError, ComplexAckHandle, SimpleAckHandle};
use bactsm_core::apdu::AbortReason;
use bactsm_core::npdu::split_apdu;
use bactsm_core::services::read_property::{ReadPropertyAck, ReadPropertyRequest};
use bactsm_core::services::reinitialize_device::{ReinitializeDeviceRequest, ReinitializeState};
use bactsm_core::services::ConfirmedService;
use bactsm_core::types::{MaxApdu, MaxSegments, ObjectId, PropertyId};
use bactsm_datalink::{BacnetIpTransport, DataLink, DataLinkAddress, DataLinkError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const MAX_FRAME_LEN: usize = 2048;
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// Confirmed-service client over a [`DataLink`].
///
/// A background task reads every inbound frame and routes replies to the live
/// transaction they belong to. Dropping the client stops that task and aborts
/// every transaction still in flight.
#[derive(Debug)]
pub struct BacnetClient<D: DataLink + 'static> {
    datalink: Arc<D>,
    manager: Arc<TransactionManager>,
    devices: Arc<DeviceTable>,
    receiver: JoinHandle<()>,
}

impl BacnetClient<BacnetIpTransport> {
    /// Binds BACnet/IP on an ephemeral UDP port.
    pub async fn new() -> Result<Self, ClientError> {
        let bind_addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0);
        let datalink = BacnetIpTransport::bind(bind_addr).await?;
        Ok(Self::with_datalink(datalink))
    }
}

impl<D: DataLink + 'static> BacnetClient<D> {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn with_datalink(datalink: D) -> Self {
        let datalink = Arc::new(datalink);
        let devices = Arc::new(DeviceTable::new(DEFAULT_LOOKUP_TIMEOUT));
        let manager = TransactionManager::new(
            Arc::new(DataLinkTransport::new(datalink.clone())),
            devices.clone(),
            TransactionConfig::default(),
        );
        let receiver = tokio::spawn(receive_loop(datalink.clone(), manager.clone()));
        Self {
            datalink,
            manager,
            devices,
            receiver,
        }
    }

    pub fn with_config(self, config: TransactionConfig) -> Self {
        self.manager.set_config(config);
        self
    }

    fn reconfigure(self, f: impl FnOnce(TransactionConfig) -> TransactionConfig) -> Self {
        let config = f(self.manager.config());
        self.with_config(config)
    }

    pub fn with_response_timeout(self, timeout: Duration) -> Self {
        self.reconfigure(|c| c.with_request_timeout(timeout))
    }

    pub fn with_segment_timeout(self, timeout: Duration) -> Self {
        self.reconfigure(|c| c.with_segment_timeout(timeout))
    }

    pub fn with_retries(self, retries: u8) -> Self {
        self.reconfigure(|c| c.with_retries(retries))
    }

    pub fn with_max_apdu(self, max_apdu: MaxApdu) -> Self {
        self.reconfigure(|c| c.with_max_apdu(max_apdu))
    }

    pub fn with_max_segments(self, max_segments: MaxSegments) -> Self {
        self.reconfigure(|c| c.with_max_segments(max_segments))
    }

    pub fn with_segmented_response_accepted(self, accepted: bool) -> Self {
        self.reconfigure(|c| c.with_segmented_response_accepted(accepted))
    }

    pub fn with_max_window_size(self, size: u8) -> Self {
        self.reconfigure(|c| c.with_max_window_size(size))
    }

    pub fn datalink(&self) -> &D {
        &self.datalink
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    /// Devices known by instance number, used to resolve
    /// [`Recipient::Device`].
    pub fn devices(&self) -> &DeviceTable {
        &self.devices
    }

    pub fn add_device(&self, instance: u32, address: DataLinkAddress, max_apdu: MaxApdu) {
        self.devices
            .insert(instance, DeviceTableEntry { address, max_apdu });
    }

    /// Starts a confirmed exchange; `handle` receives the outcome.
    pub fn send_confirmed<S: ConfirmedService>(
        &self,
        recipient: Recipient,
        request: &S,
        handle: Arc<dyn ClientTransactionHandle>,
    ) -> Result<Arc<ClientTransaction>, ClientError> {
        self.manager.start(recipient, request, handle)
    }

    pub async fn read_property(
        &self,
        recipient: Recipient,
        object_id: ObjectId,
        property_id: PropertyId,
    ) -> Result<ReadPropertyAck, ClientError> {
        self.read_property_request(
            recipient,
            ReadPropertyRequest {
                object_id,
                property_id,
                array_index: None,
            },
        )
        .await
    }

    /// Reads one element of an array property.
    pub async fn read_property_element(
        &self,
        recipient: Recipient,
        object_id: ObjectId,
        property_id: PropertyId,
        array_index: u32,
    ) -> Result<ReadPropertyAck, ClientError> {
        self.read_property_request(
            recipient,
            ReadPropertyRequest {
                object_id,
                property_id,
                array_index: Some(array_index),
            },
        )
        .await
    }

    async fn read_property_request(
        &self,
        recipient: Recipient,
        request: ReadPropertyRequest,
    ) -> Result<ReadPropertyAck, ClientError> {
        let (handle, response) = ComplexAckHandle::<ReadPropertyAck>::new();
        self.send_confirmed(recipient, &request, handle)?;
        response.wait().await
    }

    pub async fn reinitialize_device(
        &self,
        recipient: Recipient,
        state: ReinitializeState,
        password: Option<&str>,
    ) -> Result<(), ClientError> {
        let (handle, response) = SimpleAckHandle::new();
        self.send_confirmed(
            recipient,
            &ReinitializeDeviceRequest { state, password },
            handle,
        )?;
        response.wait().await
    }
}

impl<D: DataLink + 'static> Drop for BacnetClient<D> {
    fn drop(&mut self) {
        self.receiver.abort();
        self.manager.abort_all(AbortReason::Other);
    }
}

async fn receive_loop<D: DataLink>(datalink: Arc<D>, manager: Arc<TransactionManager>) {
    let mut buf = [0u8; MAX_FRAME_LEN];
    loop {
        let (len, source) = match datalink.recv(&mut buf).await {
            Ok(frame) => frame,
            Err(DataLinkError::Io(err)) => {
                log::warn!("datalink receive failed: {err}");
                continue;
            }
            Err(err) => {
                log::debug!("dropping inbound frame: {err}");
                continue;
            }
        };
        match split_apdu(&buf[..len]) {
            Ok((npdu, _)) if npdu.is_network_message() => {
                log::trace!("ignoring network layer message from {source}");
            }
            Ok((_, apdu)) => manager.route(source, apdu),
            Err(err) => log::debug!("dropping frame from {source} with bad npdu: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BacnetClient;
    use crate::directory::Recipient;
    use crate::{ClientError, SimpleAckHandle};
    use bactsm_core::apdu::{
        AbortReason, BacnetError, ComplexAckHeader, ConfirmedRequestHeader, SegmentAck, SimpleAck,
    };
    use bactsm_core::encoding::{reader::Reader, writer::Writer};
    use bactsm_core::npdu::{split_apdu, Npdu};
    use bactsm_core::services::read_property::PropertyValue;
    use bactsm_core::services::reinitialize_device::ReinitializeState;
    use bactsm_core::types::{ErrorClass, MaxApdu, ObjectId, ObjectType, PropertyId};
    use bactsm_datalink::{DataLink, DataLinkAddress, DataLinkError};
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::time::Duration;
    use tokio::sync::{mpsc, Mutex};

    type Frame = (DataLinkAddress, Vec<u8>);

    /// In-memory link: frames the client sends appear on `outbound`, frames
    /// pushed into `inbound` are what it receives.
    struct MemoryLink {
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: Mutex<mpsc::UnboundedReceiver<Frame>>,
    }

    impl DataLink for MemoryLink {
        async fn send(&self, address: DataLinkAddress, payload: &[u8]) -> Result<(), DataLinkError> {
            self.outbound
                .send((address, payload.to_vec()))
                .map_err(|_| DataLinkError::InvalidFrame)
        }

        async fn recv(&self, buf: &mut [u8]) -> Result<(usize, DataLinkAddress), DataLinkError> {
            let Some((source, frame)) = self.inbound.lock().await.recv().await else {
                return std::future::pending().await;
            };
            if frame.len() > buf.len() {
                return Err(DataLinkError::FrameTooLarge);
            }
            buf[..frame.len()].copy_from_slice(&frame);
            Ok((frame.len(), source))
        }
    }

    struct Peer {
        from_client: mpsc::UnboundedReceiver<Frame>,
        to_client: mpsc::UnboundedSender<Frame>,
    }

    impl Peer {
        async fn next_apdu(&mut self) -> Vec<u8> {
            let (address, frame) = self.from_client.recv().await.unwrap();
            assert_eq!(address, device());
            let (_, apdu) = split_apdu(&frame).unwrap();
            apdu.to_vec()
        }

        async fn next_request(&mut self) -> (ConfirmedRequestHeader, Vec<u8>) {
            let apdu = self.next_apdu().await;
            let mut r = Reader::new(&apdu);
            let header = ConfirmedRequestHeader::decode(&mut r).unwrap();
            (header, r.read_remaining().to_vec())
        }

        async fn next_segment_ack(&mut self) -> SegmentAck {
            let apdu = self.next_apdu().await;
            SegmentAck::decode(&mut Reader::new(&apdu)).unwrap()
        }

        fn reply(&self, encode: impl FnOnce(&mut Writer<'_>)) {
            let mut buf = [0u8; 512];
            let mut w = Writer::new(&mut buf);
            Npdu::for_apdu(false).encode(&mut w).unwrap();
            encode(&mut w);
            self.to_client
                .send((device(), w.as_written().to_vec()))
                .unwrap();
        }

        fn complex_ack(&self, header: ComplexAckHeader, payload: &[u8]) {
            self.reply(|w| {
                header.encode(w).unwrap();
                w.write_all(payload).unwrap();
            });
        }
    }

    fn device() -> DataLinkAddress {
        DataLinkAddress::Ip(SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40)), 47808))
    }

    fn client() -> (BacnetClient<MemoryLink>, Peer) {
        let _ = env_logger::builder().is_test(true).try_init();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        let link = MemoryLink {
            outbound,
            inbound: Mutex::new(inbound),
        };
        (
            BacnetClient::with_datalink(link),
            Peer {
                from_client,
                to_client,
            },
        )
    }

    // AnalogValue 3, PresentValue, REAL 21.5.
    const READ_ACK: [u8; 14] = [
        0x0C, 0x00, 0x80, 0x00, 0x03, 0x19, 0x55, 0x3E, 0x44, 0x41, 0xAC, 0x00, 0x00, 0x3F,
    ];

    fn analog_value() -> ObjectId {
        ObjectId::new(ObjectType::AnalogValue, 3)
    }

    #[tokio::test]
    async fn read_property_end_to_end() {
        let (client, mut peer) = client();
        let peer_task = tokio::spawn(async move {
            let (header, payload) = peer.next_request().await;
            assert_eq!(header.service_choice, 0x0C);
            assert!(header.segmented_response_accepted);
            assert_eq!(payload, vec![0x0C, 0x00, 0x80, 0x00, 0x03, 0x19, 0x55]);
            peer.complex_ack(
                ComplexAckHeader {
                    segmented: false,
                    more_follows: false,
                    invoke_id: header.invoke_id,
                    sequence_number: None,
                    proposed_window_size: None,
                    service_choice: 0x0C,
                },
                &READ_ACK,
            );
            peer
        });

        let ack = client
            .read_property(
                Recipient::address(device()),
                analog_value(),
                PropertyId::PresentValue,
            )
            .await
            .unwrap();
        assert_eq!(ack.object_id, analog_value());
        assert_eq!(ack.values, vec![PropertyValue::Real(21.5)]);
        peer_task.await.unwrap();
        assert!(client.manager().is_empty());
    }

    #[tokio::test]
    async fn segmented_read_property_end_to_end() {
        let (client, mut peer) = client();
        let client = client.with_max_window_size(2);
        let peer_task = tokio::spawn(async move {
            let (header, _) = peer.next_request().await;
            let segment = |seq: u8, more: bool| ComplexAckHeader {
                segmented: true,
                more_follows: more,
                invoke_id: header.invoke_id,
                sequence_number: Some(seq),
                proposed_window_size: Some(4),
                service_choice: 0x0C,
            };

            peer.complex_ack(segment(0, true), &READ_ACK[..5]);
            let ack = peer.next_segment_ack().await;
            assert_eq!((ack.sequence_number, ack.actual_window_size), (0, 2));

            peer.complex_ack(segment(1, true), &READ_ACK[5..8]);
            peer.complex_ack(segment(2, true), &READ_ACK[8..11]);
            let ack = peer.next_segment_ack().await;
            assert_eq!((ack.negative_ack, ack.sequence_number), (false, 2));

            peer.complex_ack(segment(3, false), &READ_ACK[11..]);
            let ack = peer.next_segment_ack().await;
            assert_eq!(ack.sequence_number, 3);
        });

        let ack = client
            .read_property(
                Recipient::address(device()),
                analog_value(),
                PropertyId::PresentValue,
            )
            .await
            .unwrap();
        assert_eq!(ack.values, vec![PropertyValue::Real(21.5)]);
        peer_task.await.unwrap();
    }

    #[tokio::test]
    async fn reinitialize_device_by_instance() {
        let (client, mut peer) = client();
        client.add_device(1234, device(), MaxApdu::UpTo480);
        let peer_task = tokio::spawn(async move {
            let (header, payload) = peer.next_request().await;
            assert_eq!(header.service_choice, 0x14);
            assert_eq!(payload, vec![0x09, 0x00, 0x1C, 0x00, b'a', b'b', b'c']);
            peer.reply(|w| {
                SimpleAck {
                    invoke_id: header.invoke_id,
                    service_choice: 0x14,
                }
                .encode(w)
                .unwrap();
            });
        });

        client
            .reinitialize_device(
                Recipient::Device(1234),
                ReinitializeState::Coldstart,
                Some("abc"),
            )
            .await
            .unwrap();
        peer_task.await.unwrap();
    }

    #[tokio::test]
    async fn service_error_is_reported() {
        let (client, mut peer) = client();
        let peer_task = tokio::spawn(async move {
            let (header, _) = peer.next_request().await;
            peer.reply(|w| {
                BacnetError {
                    invoke_id: header.invoke_id,
                    service_choice: 0x0C,
                    error_class: Some(2),
                    error_code: Some(32),
                }
                .encode(w)
                .unwrap();
            });
        });

        let err = client
            .read_property(
                Recipient::address(device()),
                analog_value(),
                PropertyId::Description,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ClientError::ServiceError {
                error_class: Some(ErrorClass::Property),
                error_code_raw: Some(32),
                ..
            }
        ));
        peer_task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lost_request_is_resent() {
        let (client, mut peer) = client();
        let client = client.with_response_timeout(Duration::from_millis(500));
        let peer_task = tokio::spawn(async move {
            let (first, _) = peer.next_request().await;
            let (second, _) = peer.next_request().await;
            assert_eq!(first.invoke_id, second.invoke_id);
            peer.reply(|w| {
                SimpleAck {
                    invoke_id: second.invoke_id,
                    service_choice: 0x14,
                }
                .encode(w)
                .unwrap();
            });
        });

        client
            .reinitialize_device(
                Recipient::address(device()),
                ReinitializeState::Warmstart,
                None,
            )
            .await
            .unwrap();
        peer_task.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_client_aborts_live_transactions() {
        let (client, mut peer) = client();
        let (handle, response) = SimpleAckHandle::new();
        client
            .send_confirmed(
                Recipient::address(device()),
                &bactsm_core::services::reinitialize_device::ReinitializeDeviceRequest {
                    state: ReinitializeState::Warmstart,
                    password: None,
                },
                handle,
            )
            .unwrap();
        peer.next_request().await;

        drop(client);
        assert!(matches!(
            response.wait().await,
            Err(ClientError::Abort {
                reason: AbortReason::Other,
                server: false
            })
        ));
    }
}
