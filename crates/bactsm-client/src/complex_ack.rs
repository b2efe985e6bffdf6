use crate::handle::{ClientTransactionHandle, Completion, Response, TransactionBinding};
use bactsm_core::apdu::{AbortReason, BacnetError, ComplexAckHeader, RejectReason};
use bactsm_core::services::ServiceAck;
use parking_lot::Mutex;
use std::sync::Arc;

/// Handle for services answered with a Complex-ACK carrying a `T`.
///
/// Segment payloads are kept in arrival order and decoded once, when the
/// final segment arrives.
#[derive(Debug)]
pub struct ComplexAckHandle<T> {
    binding: TransactionBinding,
    completion: Completion<T>,
    segments: Mutex<Vec<Vec<u8>>>,
}

impl<T: ServiceAck + Send + 'static> ComplexAckHandle<T> {
    pub fn new() -> (Arc<Self>, Response<T>) {
        let (completion, response) = Completion::new();
        (
            Arc::new(Self {
                binding: TransactionBinding::new(),
                completion,
                segments: Mutex::new(Vec::new()),
            }),
            response,
        )
    }

    fn finish(&self, segments: Vec<Vec<u8>>) {
        let payload = segments.concat();
        match T::decode_payload(&payload) {
            Ok(ack) => {
                self.completion.complete(Ok(ack));
            }
            Err(err) => {
                log::warn!(
                    "failed to decode {}-octet complex ack: {err}",
                    payload.len()
                );
                self.completion.reject(RejectReason::InvalidTag);
            }
        }
    }
}

impl<T: ServiceAck + Send + 'static> ClientTransactionHandle for ComplexAckHandle<T> {
    fn feed_abort(&self, reason: AbortReason, server: bool) {
        self.completion.abort(reason, server);
    }

    fn feed_reject(&self, reason: RejectReason) {
        self.completion.reject(reason);
    }

    fn feed_error(&self, error: BacnetError) {
        self.completion.error(error);
    }

    fn feed_simple_ack(&self) {
        log::warn!("simple ack where a complex ack was expected");
        self.completion
            .abort(AbortReason::InvalidApduInThisState, false);
    }

    fn feed_complex_ack(&self, header: &ComplexAckHeader, payload: &[u8]) {
        let complete = {
            let mut segments = self.segments.lock();
            segments.push(payload.to_vec());
            header
                .is_final()
                .then(|| std::mem::take(&mut *segments))
        };
        if let Some(segments) = complete {
            self.finish(segments);
        }
    }

    fn expects_complex_ack(&self) -> bool {
        true
    }

    fn binding(&self) -> &TransactionBinding {
        &self.binding
    }
}
