//! Registry of live client transactions, keyed by peer and invoke id.
//!
//! Lock order is transaction first, then registry: a transaction registers
//! and unregisters itself while holding its own lock, so the registry never
//! calls into a transaction while its own lock is held.

use crate::config::TransactionConfig;
use crate::directory::{DeviceDirectory, Recipient};
use crate::handle::ClientTransactionHandle;
use crate::transaction::ClientTransaction;
use crate::transport::Transport;
use crate::ClientError;
use bactsm_core::apdu::{
    AbortPdu, AbortReason, ApduType, BacnetError, ComplexAckHeader, RejectPdu, SegmentAck,
    SimpleAck,
};
use bactsm_core::encoding::reader::Reader;
use bactsm_core::services::ConfirmedService;
use bactsm_core::DecodeError;
use bactsm_datalink::DataLinkAddress;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Key = (DataLinkAddress, u8);

#[derive(Default)]
struct Registry {
    live: HashMap<Key, Arc<ClientTransaction>>,
    next_id: HashMap<DataLinkAddress, u8>,
}

impl Registry {
    fn first_free(&self, address: DataLinkAddress) -> Result<u8, ClientError> {
        let start = self.next_id.get(&address).copied().unwrap_or(1);
        (0..=u8::MAX)
            .map(|offset| start.wrapping_add(offset))
            .find(|id| !self.live.contains_key(&(address, *id)))
            .ok_or(ClientError::InvokeIdsExhausted { address })
    }

    fn allocate(&mut self, address: DataLinkAddress) -> Result<u8, ClientError> {
        let id = self.first_free(address)?;
        self.next_id.insert(address, id.wrapping_add(1));
        Ok(id)
    }
}

/// Routes inbound replies to the transaction that owns them.
pub struct TransactionManager {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn DeviceDirectory>,
    config: Mutex<TransactionConfig>,
    runtime: tokio::runtime::Handle,
    registry: Mutex<Registry>,
}

impl std::fmt::Debug for TransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionManager")
            .field("config", &*self.config.lock())
            .field("live", &self.len())
            .finish()
    }
}

impl TransactionManager {
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn DeviceDirectory>,
        config: TransactionConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            transport,
            directory,
            config: Mutex::new(config),
            runtime: tokio::runtime::Handle::current(),
            registry: Mutex::new(Registry::default()),
        })
    }

    /// Settings copied into each transaction when it starts.
    pub fn config(&self) -> TransactionConfig {
        *self.config.lock()
    }

    /// Replaces the settings for transactions started from now on.
    pub fn set_config(&self, config: TransactionConfig) {
        *self.config.lock() = config;
    }

    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        self.transport.clone()
    }

    pub(crate) fn directory(&self) -> &Arc<dyn DeviceDirectory> {
        &self.directory
    }

    pub(crate) fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }

    /// Starts a confirmed exchange with `recipient`; the outcome is delivered
    /// through `handle`. An invoke id is picked once the peer is resolved.
    pub fn start<S: ConfirmedService>(
        self: &Arc<Self>,
        recipient: Recipient,
        request: &S,
        handle: Arc<dyn ClientTransactionHandle>,
    ) -> Result<Arc<ClientTransaction>, ClientError> {
        ClientTransaction::start(self, recipient, request, None, handle)
    }

    /// Like [`start`](Self::start) with a caller-chosen invoke id. If the id
    /// is live for the resolved peer the transaction aborts locally.
    pub fn start_with_invoke_id<S: ConfirmedService>(
        self: &Arc<Self>,
        recipient: Recipient,
        request: &S,
        invoke_id: u8,
        handle: Arc<dyn ClientTransactionHandle>,
    ) -> Result<Arc<ClientTransaction>, ClientError> {
        ClientTransaction::start(self, recipient, request, Some(invoke_id), handle)
    }

    /// Next free invoke id for `address`, rotating so recently used ids are
    /// reused last. The id is not reserved.
    pub fn next_invoke_id(&self, address: DataLinkAddress) -> Result<u8, ClientError> {
        self.registry.lock().first_free(address)
    }

    /// Claims an invoke id for `txn`; allocation and insertion happen under
    /// one lock.
    pub(crate) fn register(
        &self,
        address: DataLinkAddress,
        requested: Option<u8>,
        txn: &Arc<ClientTransaction>,
    ) -> Result<u8, ClientError> {
        let mut registry = self.registry.lock();
        let invoke_id = match requested {
            Some(invoke_id) if registry.live.contains_key(&(address, invoke_id)) => {
                return Err(ClientError::InvokeIdInUse { address, invoke_id });
            }
            Some(invoke_id) => invoke_id,
            None => registry.allocate(address)?,
        };
        registry.live.insert((address, invoke_id), txn.clone());
        Ok(invoke_id)
    }

    /// Removes the registration, but only if it still belongs to `txn`.
    pub(crate) fn unregister(
        &self,
        address: DataLinkAddress,
        invoke_id: u8,
        txn: &ClientTransaction,
    ) {
        let mut registry = self.registry.lock();
        let owned = registry
            .live
            .get(&(address, invoke_id))
            .is_some_and(|live| std::ptr::eq(Arc::as_ptr(live), txn));
        if owned {
            registry.live.remove(&(address, invoke_id));
        }
    }

    fn lookup(&self, address: DataLinkAddress, invoke_id: u8) -> Option<Arc<ClientTransaction>> {
        self.registry.lock().live.get(&(address, invoke_id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.registry.lock().live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Aborts every live transaction, notifying each peer.
    pub fn abort_all(&self, reason: AbortReason) {
        let live: Vec<_> = self.registry.lock().live.values().cloned().collect();
        if !live.is_empty() {
            log::debug!("aborting {} live transaction(s): {reason}", live.len());
        }
        for txn in live {
            txn.abort(reason);
        }
    }

    /// Hands one inbound APDU (NPDU already stripped) from `source` to the
    /// transaction it answers.
    pub fn route(&self, source: DataLinkAddress, apdu: &[u8]) {
        if let Err(err) = self.try_route(source, apdu) {
            log::debug!("dropping undecodable apdu from {source}: {err}");
        }
    }

    fn try_route(&self, source: DataLinkAddress, apdu: &[u8]) -> Result<(), DecodeError> {
        let kind = ApduType::of(apdu).ok_or(DecodeError::InvalidValue)?;
        let mut r = Reader::new(apdu);
        match kind {
            ApduType::SimpleAck => {
                let ack = SimpleAck::decode(&mut r)?;
                if let Some(txn) = self.reply_target(source, ack.invoke_id, kind) {
                    txn.on_simple_ack(&ack);
                }
            }
            ApduType::ComplexAck => {
                let header = ComplexAckHeader::decode(&mut r)?;
                let payload = r.read_remaining();
                if let Some(txn) = self.reply_target(source, header.invoke_id, kind) {
                    txn.on_complex_ack(&header, payload);
                }
            }
            ApduType::Error => {
                let error = BacnetError::decode(&mut r)?;
                if let Some(txn) = self.reply_target(source, error.invoke_id, kind) {
                    txn.on_error(&error);
                }
            }
            ApduType::Reject => {
                let reject = RejectPdu::decode(&mut r)?;
                if let Some(txn) = self.reply_target(source, reject.invoke_id, kind) {
                    txn.on_reject(&reject);
                }
            }
            ApduType::Abort => {
                let abort = AbortPdu::decode(&mut r)?;
                if !abort.server {
                    log::trace!("ignoring client-side abort from {source}");
                } else if let Some(txn) = self.reply_target(source, abort.invoke_id, kind) {
                    txn.on_abort(&abort);
                }
            }
            ApduType::SegmentAck => {
                let ack = SegmentAck::decode(&mut r)?;
                log::trace!(
                    "ignoring segment ack for invoke id {} from {source}; requests are never segmented",
                    ack.invoke_id
                );
            }
            ApduType::ConfirmedRequest | ApduType::UnconfirmedRequest => {
                log::trace!("ignoring {kind:?} from {source}");
            }
        }
        Ok(())
    }

    fn reply_target(
        &self,
        source: DataLinkAddress,
        invoke_id: u8,
        kind: ApduType,
    ) -> Option<Arc<ClientTransaction>> {
        let txn = self.lookup(source, invoke_id);
        if txn.is_none() {
            log::trace!("no transaction for {kind:?} from {source} (invoke id {invoke_id})");
        }
        txn
    }
}
