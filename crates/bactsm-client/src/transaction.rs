//! Client side of one confirmed-service exchange.
//!
//! All entry points (device lookup, inbound PDUs routed by the manager, timer
//! expiry and caller aborts) take the transaction's lock for their whole
//! duration, so the state machine runs as if single-threaded. While holding it
//! a transaction may call into its handle, its transport and the manager
//! registry; none of them call back into the transaction.

use crate::config::TransactionConfig;
use crate::directory::{DeviceLookup, DeviceTableEntry, Recipient};
use crate::handle::ClientTransactionHandle;
use crate::manager::TransactionManager;
use crate::transport::{OutgoingApdu, Transport};
use crate::window::{SegmentFit, Window};
use crate::ClientError;
use bactsm_core::apdu::{
    AbortPdu, AbortReason, BacnetError, ComplexAckHeader, ConfirmedRequestHeader, RejectPdu,
    SegmentAck, SimpleAck,
};
use bactsm_core::encoding::writer::Writer;
use bactsm_core::services::ConfirmedService;
use bactsm_core::EncodeError;
use bactsm_datalink::DataLinkAddress;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;

/// Length of an unsegmented confirmed-request header.
const REQUEST_HEADER_LEN: usize = 4;
const MAX_ENCODED_REQUEST: usize = 64 * 1024;
/// Window sizes a peer may propose.
const PROPOSED_WINDOW_RANGE: std::ops::RangeInclusive<u8> = 1..=127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Waiting for the directory to resolve the peer.
    GetDeviceInfo,
    /// Reserved for outbound segmentation, which is not supported.
    SegmentedRequest,
    /// Request sent, waiting for the first reply.
    AwaitConfirmation,
    /// Receiving a segmented complex ack.
    SegmentedConfirmation,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerKind {
    Request,
    Segment,
}

#[derive(Debug)]
struct ArmedTimer {
    kind: TimerKind,
    task: JoinHandle<()>,
}

/// Correlation key, known once the peer is resolved and registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Peer {
    address: DataLinkAddress,
    invoke_id: u8,
}

#[derive(Debug)]
struct Inner {
    state: ClientState,
    peer: Option<Peer>,
    window: Window,
    /// Payload octets of the segmented reply accepted so far.
    received: usize,
    /// Out-of-window segments since the last in-order one.
    nacks: u32,
    timeouts: u8,
    /// The single running timer; request and segment timers never overlap.
    timer: Option<ArmedTimer>,
    /// Bumped on every start/stop so a fire that lost the race is ignored.
    timer_generation: u64,
}

pub struct ClientTransaction {
    this: Weak<ClientTransaction>,
    manager: Weak<TransactionManager>,
    transport: Arc<dyn Transport>,
    runtime: tokio::runtime::Handle,
    config: TransactionConfig,
    handle: Arc<dyn ClientTransactionHandle>,
    requested_invoke_id: Option<u8>,
    service_choice: u8,
    request: Vec<u8>,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for ClientTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientTransaction")
            .field("service_choice", &self.service_choice)
            .field("request_len", &self.request.len())
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

fn encode_request<S: ConfirmedService>(request: &S) -> Result<Vec<u8>, ClientError> {
    let mut size = 256;
    loop {
        let mut buf = vec![0u8; size];
        let mut w = Writer::new(&mut buf);
        match request.encode_service(&mut w) {
            Ok(()) => {
                let len = w.position();
                buf.truncate(len);
                return Ok(buf);
            }
            Err(EncodeError::BufferTooSmall) if size < MAX_ENCODED_REQUEST => size *= 2,
            Err(err) => return Err(err.into()),
        }
    }
}

fn check_request_fits(request_len: usize, peer_max: usize) -> Result<(), ClientError> {
    let len = REQUEST_HEADER_LEN + request_len;
    if len > peer_max {
        return Err(ClientError::SegmentedRequestUnsupported { len, max: peer_max });
    }
    Ok(())
}

impl ClientTransaction {
    /// Creates the transaction, binds `handle` to it and starts resolving
    /// `recipient`. The request goes out once the peer is known.
    ///
    /// `invoke_id` of `None` lets the manager pick a free id for the peer.
    pub(crate) fn start<S: ConfirmedService>(
        manager: &Arc<TransactionManager>,
        recipient: Recipient,
        request: &S,
        invoke_id: Option<u8>,
        handle: Arc<dyn ClientTransactionHandle>,
    ) -> Result<Arc<Self>, ClientError> {
        let request = encode_request(request)?;
        if let Recipient::Address { max_apdu, .. } = recipient {
            check_request_fits(request.len(), max_apdu.octets())?;
        }

        let txn = Arc::new_cyclic(|this| Self {
            this: this.clone(),
            manager: Arc::downgrade(manager),
            transport: manager.transport(),
            runtime: manager.runtime().clone(),
            config: manager.config(),
            handle: handle.clone(),
            requested_invoke_id: invoke_id,
            service_choice: S::SERVICE_CHOICE,
            request,
            inner: Mutex::new(Inner {
                state: ClientState::GetDeviceInfo,
                peer: None,
                window: Window::default(),
                received: 0,
                nacks: 0,
                timeouts: 0,
                timer: None,
                timer_generation: 0,
            }),
        });
        handle.binding().bind(&txn)?;

        log::debug!(
            "service {} for {recipient:?}: resolving device",
            txn.service_choice
        );
        let pending = txn.clone();
        manager.directory().search_for_device(
            recipient,
            Box::new(move |lookup| pending.on_device_lookup(lookup)),
        );
        Ok(txn)
    }

    pub fn state(&self) -> ClientState {
        self.inner.lock().state
    }

    pub fn service_choice(&self) -> u8 {
        self.service_choice
    }

    /// Invoke id in use, once the peer has been resolved.
    pub fn invoke_id(&self) -> Option<u8> {
        self.inner.lock().peer.map(|peer| peer.invoke_id)
    }

    pub fn peer_address(&self) -> Option<DataLinkAddress> {
        self.inner.lock().peer.map(|peer| peer.address)
    }

    #[cfg(test)]
    pub(crate) fn window(&self) -> Window {
        self.inner.lock().window
    }

    /// Aborts the exchange, telling the peer when it is known. Idempotent.
    pub fn abort(&self, reason: AbortReason) {
        let mut inner = self.inner.lock();
        if inner.state == ClientState::Disposed {
            return;
        }
        log::debug!("caller aborted {:?}: {reason}", inner.peer);
        self.abort_locked(&mut inner, reason);
    }

    fn on_device_lookup(self: &Arc<Self>, lookup: DeviceLookup) {
        let mut inner = self.inner.lock();
        if inner.state != ClientState::GetDeviceInfo {
            return;
        }
        let entry = match lookup {
            DeviceLookup::Found(entry) => entry,
            DeviceLookup::Timeout(recipient) => {
                log::warn!("no address for {recipient:?}; aborting");
                self.abort_locked(&mut inner, AbortReason::Other);
                return;
            }
        };
        if let Err(err) = self.begin(&mut inner, entry) {
            match err {
                ClientError::SegmentedRequestUnsupported { .. } => {
                    log::error!("{err}");
                    self.abort_locked(&mut inner, AbortReason::SegmentationNotSupported);
                }
                err => {
                    log::warn!("cannot start transaction with {}: {err}", entry.address);
                    self.abort_locked(&mut inner, AbortReason::Other);
                }
            }
        }
    }

    fn begin(
        self: &Arc<Self>,
        inner: &mut Inner,
        entry: DeviceTableEntry,
    ) -> Result<(), ClientError> {
        check_request_fits(self.request.len(), entry.max_apdu.octets())?;
        let manager = self.manager.upgrade().ok_or(ClientError::ResponseDropped)?;
        let invoke_id = manager.register(entry.address, self.requested_invoke_id, self)?;
        inner.peer = Some(Peer {
            address: entry.address,
            invoke_id,
        });
        inner.state = ClientState::AwaitConfirmation;
        log::debug!(
            "invoke id {invoke_id} to {}: sending service {}",
            entry.address,
            self.service_choice
        );
        self.send_request(inner);
        self.start_timer(inner, TimerKind::Request);
        Ok(())
    }

    pub(crate) fn on_simple_ack(&self, ack: &SimpleAck) {
        let mut inner = self.inner.lock();
        match inner.state {
            ClientState::AwaitConfirmation if ack.service_choice == self.service_choice => {
                self.stop_timer(&mut inner);
                self.handle.feed_simple_ack();
                self.dispose(&mut inner);
            }
            ClientState::AwaitConfirmation | ClientState::SegmentedConfirmation => {
                self.protocol_violation(&mut inner, "unexpected simple ack");
            }
            _ => {}
        }
    }

    pub(crate) fn on_complex_ack(&self, header: &ComplexAckHeader, payload: &[u8]) {
        let mut inner = self.inner.lock();
        match inner.state {
            ClientState::AwaitConfirmation => self.first_reply(&mut inner, header, payload),
            ClientState::SegmentedConfirmation => self.next_segment(&mut inner, header, payload),
            _ => {}
        }
    }

    fn first_reply(&self, inner: &mut Inner, header: &ComplexAckHeader, payload: &[u8]) {
        if header.service_choice != self.service_choice || !self.handle.expects_complex_ack() {
            self.protocol_violation(inner, "unexpected complex ack");
            return;
        }
        self.stop_timer(inner);

        if !header.segmented {
            self.handle.feed_complex_ack(header, payload);
            self.dispose(inner);
            return;
        }
        if header.sequence_number != Some(0) {
            self.protocol_violation(inner, "first segment does not carry sequence number 0");
            return;
        }
        if !self.config.segmented_response_accepted() {
            log::warn!("peer segmented a response we did not accept");
            self.abort_locked(inner, AbortReason::SegmentationNotSupported);
            return;
        }
        let proposed = header.proposed_window_size.unwrap_or(0);
        if !PROPOSED_WINDOW_RANGE.contains(&proposed) {
            log::warn!("peer proposed window size {proposed}");
            self.abort_locked(inner, AbortReason::WindowSizeOutOfRange);
            return;
        }

        if !self.accept_payload(inner, payload.len()) {
            return;
        }

        inner.window = Window::after_first_segment(proposed.min(self.config.max_window_size()));
        self.send_segment_ack(inner, false, 0);
        self.handle.feed_complex_ack(header, payload);
        if header.is_final() {
            self.dispose(inner);
            return;
        }
        log::debug!(
            "{:?}: segmented reply, window {}",
            inner.peer,
            inner.window.size()
        );
        inner.state = ClientState::SegmentedConfirmation;
        self.start_timer(inner, TimerKind::Segment);
    }

    fn next_segment(&self, inner: &mut Inner, header: &ComplexAckHeader, payload: &[u8]) {
        let Some(wire) = header.sequence_number.filter(|_| header.segmented) else {
            self.protocol_violation(inner, "unsegmented complex ack during segmentation");
            return;
        };
        if header.service_choice != self.service_choice {
            self.protocol_violation(inner, "segment for a different service");
            return;
        }

        if inner.window.classify(wire) == SegmentFit::Unexpected {
            inner.nacks += 1;
            if inner.nacks > self.nack_limit(inner) {
                self.protocol_violation(inner, "peer keeps sending segments outside the window");
                return;
            }
            log::debug!(
                "{:?}: segment {wire} outside window at {}, nack",
                inner.peer,
                inner.window.next()
            );
            let last = inner.window.last_in_order();
            self.send_segment_ack(inner, true, last);
            self.start_timer(inner, TimerKind::Segment);
            return;
        }

        if !self.accept_payload(inner, payload.len()) {
            return;
        }
        inner.nacks = 0;
        self.handle.feed_complex_ack(header, payload);
        let window_full = inner.window.advance();
        if header.is_final() {
            self.stop_timer(inner);
            self.send_segment_ack(inner, false, wire);
            self.dispose(inner);
            return;
        }
        if window_full {
            self.send_segment_ack(inner, false, wire);
            inner.window.slide();
        }
        self.start_timer(inner, TimerKind::Segment);
    }

    /// Counts `len` more reassembled octets, aborting with buffer-overflow
    /// once the configured cap is passed.
    fn accept_payload(&self, inner: &mut Inner, len: usize) -> bool {
        let received = inner.received.saturating_add(len);
        if received > self.config.max_reassembly_bytes() {
            log::warn!(
                "{:?}: segmented reply exceeds {} bytes",
                inner.peer,
                self.config.max_reassembly_bytes()
            );
            self.abort_locked(inner, AbortReason::BufferOverflow);
            return false;
        }
        inner.received = received;
        true
    }

    /// Out-of-window segments tolerated without progress: one full window
    /// per allowed retry.
    fn nack_limit(&self, inner: &Inner) -> u32 {
        u32::from(inner.window.size()) * u32::from(self.config.retries())
    }

    pub(crate) fn on_error(&self, error: &BacnetError) {
        let mut inner = self.inner.lock();
        if Self::awaiting_reply(&inner) {
            self.stop_timer(&mut inner);
            self.handle.feed_error(*error);
            self.dispose(&mut inner);
        }
    }

    pub(crate) fn on_reject(&self, reject: &RejectPdu) {
        let mut inner = self.inner.lock();
        if Self::awaiting_reply(&inner) {
            self.stop_timer(&mut inner);
            self.handle.feed_reject(reject.reason);
            self.dispose(&mut inner);
        }
    }

    pub(crate) fn on_abort(&self, abort: &AbortPdu) {
        let mut inner = self.inner.lock();
        if Self::awaiting_reply(&inner) {
            log::debug!("{:?} aborted by peer: {}", inner.peer, abort.reason);
            self.stop_timer(&mut inner);
            self.handle.feed_abort(abort.reason, abort.server);
            self.dispose(&mut inner);
        }
    }

    fn awaiting_reply(inner: &Inner) -> bool {
        matches!(
            inner.state,
            ClientState::AwaitConfirmation | ClientState::SegmentedConfirmation
        )
    }

    fn on_timer(&self, kind: TimerKind, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.timer_generation != generation || inner.state == ClientState::Disposed {
            return;
        }
        inner.timer = None;
        match (kind, inner.state) {
            (TimerKind::Request, ClientState::AwaitConfirmation) => {
                inner.timeouts += 1;
                if inner.timeouts < self.config.retries() {
                    log::debug!(
                        "{:?}: no reply, resending (attempt {} of {})",
                        inner.peer,
                        inner.timeouts + 1,
                        self.config.retries()
                    );
                    self.send_request(&inner);
                    self.start_timer(&mut inner, TimerKind::Request);
                } else {
                    log::warn!(
                        "{:?}: no reply after {} attempts",
                        inner.peer,
                        inner.timeouts
                    );
                    self.abort_locked(&mut inner, AbortReason::Other);
                }
            }
            (TimerKind::Segment, ClientState::SegmentedConfirmation) => {
                log::warn!(
                    "{:?}: timed out waiting for segment {}",
                    inner.peer,
                    inner.window.next()
                );
                self.abort_locked(&mut inner, AbortReason::Other);
            }
            _ => {}
        }
    }

    fn protocol_violation(&self, inner: &mut Inner, what: &str) {
        log::warn!("{:?}: {what} in {:?}", inner.peer, inner.state);
        self.abort_locked(inner, AbortReason::InvalidApduInThisState);
    }

    fn abort_locked(&self, inner: &mut Inner, reason: AbortReason) {
        if let Some(peer) = inner.peer {
            self.transport.send_raw(
                peer.address,
                false,
                OutgoingApdu::Abort(AbortPdu {
                    server: false,
                    invoke_id: peer.invoke_id,
                    reason,
                }),
                &[],
            );
        }
        self.handle.feed_abort(reason, false);
        self.dispose(inner);
    }

    fn dispose(&self, inner: &mut Inner) {
        self.stop_timer(inner);
        inner.state = ClientState::Disposed;
        if let (Some(peer), Some(manager)) = (inner.peer, self.manager.upgrade()) {
            manager.unregister(peer.address, peer.invoke_id, self);
        }
        log::debug!("{:?}: disposed", inner.peer);
    }

    fn send_request(&self, inner: &Inner) {
        let Some(peer) = inner.peer else {
            return;
        };
        let header = ConfirmedRequestHeader {
            segmented: false,
            more_follows: false,
            segmented_response_accepted: self.config.segmented_response_accepted(),
            max_segments: self.config.max_segments().to_u8(),
            max_apdu: self.config.max_apdu().to_u8(),
            invoke_id: peer.invoke_id,
            sequence_number: None,
            proposed_window_size: None,
            service_choice: self.service_choice,
        };
        self.transport.send_raw(
            peer.address,
            true,
            OutgoingApdu::ConfirmedRequest(header),
            &self.request,
        );
    }

    fn send_segment_ack(&self, inner: &Inner, negative_ack: bool, sequence_number: u8) {
        let Some(peer) = inner.peer else {
            return;
        };
        self.transport.send_raw(
            peer.address,
            false,
            OutgoingApdu::SegmentAck(SegmentAck {
                negative_ack,
                sent_by_server: false,
                invoke_id: peer.invoke_id,
                sequence_number,
                actual_window_size: inner.window.size(),
            }),
            &[],
        );
    }

    fn start_timer(&self, inner: &mut Inner, kind: TimerKind) {
        self.stop_timer(inner);
        let generation = inner.timer_generation;
        let period = match kind {
            TimerKind::Request => self.config.request_timeout(),
            TimerKind::Segment => self.config.segment_timeout(),
        };
        let txn = self.this.clone();
        let task = self.runtime.spawn(async move {
            tokio::time::sleep(period).await;
            if let Some(txn) = txn.upgrade() {
                txn.on_timer(kind, generation);
            }
        });
        inner.timer = Some(ArmedTimer { kind, task });
    }

    fn stop_timer(&self, inner: &mut Inner) {
        inner.timer_generation += 1;
        if let Some(timer) = inner.timer.take() {
            log::trace!("stopping {:?} timer", timer.kind);
            timer.task.abort();
        }
    }
}
