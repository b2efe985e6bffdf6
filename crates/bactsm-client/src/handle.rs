//! Result delivery: the transaction pushes outcomes into a handle, the caller
//! pulls the final result out of a [`Response`].

use crate::transaction::ClientTransaction;
use crate::ClientError;
use bactsm_core::apdu::{AbortReason, BacnetError, ComplexAckHeader, RejectReason};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;

/// Push side of a confirmed-service exchange.
///
/// A transaction calls exactly one terminal `feed_*` method. For segmented
/// replies [`feed_complex_ack`](Self::feed_complex_ack) is called once per
/// segment, the last one carrying a final header.
pub trait ClientTransactionHandle: Send + Sync {
    fn feed_abort(&self, reason: AbortReason, server: bool);
    fn feed_reject(&self, reason: RejectReason);
    fn feed_error(&self, error: BacnetError);
    fn feed_simple_ack(&self);
    fn feed_complex_ack(&self, header: &ComplexAckHeader, payload: &[u8]);

    /// Whether the service answers with a complex ack. A transaction whose
    /// handle says no treats a complex ack as a protocol violation.
    fn expects_complex_ack(&self) -> bool;

    fn binding(&self) -> &TransactionBinding;

    /// Cancels the exchange. Safe before the transaction exists: the abort is
    /// queued and replayed when the handle is bound.
    fn abort(&self, reason: AbortReason) {
        self.binding().abort(reason);
    }
}

#[derive(Debug)]
enum BindingState {
    Unbound { pending: Option<AbortReason> },
    Bound(Weak<ClientTransaction>),
}

/// Link from a handle back to its transaction.
#[derive(Debug)]
pub struct TransactionBinding {
    state: Mutex<BindingState>,
}

impl Default for TransactionBinding {
    fn default() -> Self {
        Self {
            state: Mutex::new(BindingState::Unbound { pending: None }),
        }
    }
}

impl TransactionBinding {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_bound(&self) -> bool {
        matches!(*self.state.lock(), BindingState::Bound(_))
    }

    pub(crate) fn bind(&self, txn: &Arc<ClientTransaction>) -> Result<(), ClientError> {
        let pending = {
            let mut state = self.state.lock();
            let pending = match &*state {
                BindingState::Unbound { pending } => *pending,
                BindingState::Bound(_) => return Err(ClientError::HandleAlreadyBound),
            };
            *state = BindingState::Bound(Arc::downgrade(txn));
            pending
        };
        if let Some(reason) = pending {
            log::debug!("replaying abort ({reason}) queued before the transaction existed");
            txn.abort(reason);
        }
        Ok(())
    }

    pub fn abort(&self, reason: AbortReason) {
        let txn = match &mut *self.state.lock() {
            BindingState::Unbound { pending } => {
                pending.get_or_insert(reason);
                return;
            }
            BindingState::Bound(txn) => txn.upgrade(),
        };
        if let Some(txn) = txn {
            txn.abort(reason);
        }
    }
}

type Outcome<T> = Result<T, ClientError>;

/// Single-assignment slot behind a [`Response`].
#[derive(Debug)]
pub(crate) struct Completion<T> {
    tx: Mutex<Option<oneshot::Sender<Outcome<T>>>>,
}

impl<T> Completion<T> {
    pub(crate) fn new() -> (Self, Response<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            Response { rx },
        )
    }

    /// Completes the response. Returns false, dropping `outcome`, when it was
    /// already completed.
    pub(crate) fn complete(&self, outcome: Outcome<T>) -> bool {
        match self.tx.lock().take() {
            Some(tx) => {
                // The caller may have dropped its Response; nothing to do then.
                let _ = tx.send(outcome);
                true
            }
            None => {
                log::debug!("response already completed; ignoring redundant outcome");
                false
            }
        }
    }

    pub(crate) fn abort(&self, reason: AbortReason, server: bool) {
        self.complete(Err(ClientError::Abort { reason, server }));
    }

    pub(crate) fn reject(&self, reason: RejectReason) {
        self.complete(Err(ClientError::Reject { reason }));
    }

    pub(crate) fn error(&self, error: BacnetError) {
        self.complete(Err(error.into()));
    }
}

/// Pull side of a confirmed-service exchange.
#[derive(Debug)]
pub struct Response<T> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> Response<T> {
    pub async fn wait(self) -> Result<T, ClientError> {
        self.rx.await.unwrap_or(Err(ClientError::ResponseDropped))
    }

    /// Blocks the current thread until the outcome is known.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_wait(self) -> Result<T, ClientError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(ClientError::ResponseDropped))
    }

    /// Takes the outcome if it is already known.
    pub fn try_wait(&mut self) -> Option<Result<T, ClientError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(ClientError::ResponseDropped)),
        }
    }
}
