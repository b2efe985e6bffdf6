use crate::handle::{ClientTransactionHandle, Completion, Response, TransactionBinding};
use bactsm_core::apdu::{AbortReason, BacnetError, ComplexAckHeader, RejectReason};
use std::sync::Arc;

/// Handle for services acknowledged with a Simple-ACK.
#[derive(Debug)]
pub struct SimpleAckHandle {
    binding: TransactionBinding,
    completion: Completion<()>,
}

impl SimpleAckHandle {
    pub fn new() -> (Arc<Self>, Response<()>) {
        let (completion, response) = Completion::new();
        (
            Arc::new(Self {
                binding: TransactionBinding::new(),
                completion,
            }),
            response,
        )
    }
}

impl ClientTransactionHandle for SimpleAckHandle {
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
        self.completion.complete(Ok(()));
    }

    fn feed_complex_ack(&self, header: &ComplexAckHeader, _payload: &[u8]) {
        log::warn!(
            "complex ack for invoke id {} where a simple ack was expected",
            header.invoke_id
        );
        self.completion
            .abort(AbortReason::InvalidApduInThisState, false);
    }

    fn expects_complex_ack(&self) -> bool {
        false
    }

    fn binding(&self) -> &TransactionBinding {
        &self.binding
    }
}

#[cfg(test)]
mod tests {
    use super::SimpleAckHandle;
    use crate::handle::ClientTransactionHandle;
    use crate::ClientError;
    use bactsm_core::apdu::{AbortReason, BacnetError, ComplexAckHeader, RejectReason};

    #[test]
    fn simple_ack_succeeds() {
        let (handle, response) = SimpleAckHandle::new();
        handle.feed_simple_ack();
        handle.feed_abort(AbortReason::Other, true);
        assert!(response.blocking_wait().is_ok());
    }

    #[test]
    fn complex_ack_is_reported_as_abort() {
        let (handle, response) = SimpleAckHandle::new();
        handle.feed_complex_ack(
            &ComplexAckHeader {
                segmented: false,
                more_follows: false,
                invoke_id: 1,
                sequence_number: None,
                proposed_window_size: None,
                service_choice: 12,
            },
            &[],
        );
        assert!(matches!(
            response.blocking_wait(),
            Err(ClientError::Abort {
                reason: AbortReason::InvalidApduInThisState,
                server: false
            })
        ));
    }

    #[test]
    fn reject_and_error_map_to_client_errors() {
        let (handle, response) = SimpleAckHandle::new();
        handle.feed_reject(RejectReason::TooManyArguments);
        assert!(matches!(
            response.blocking_wait(),
            Err(ClientError::Reject {
                reason: RejectReason::TooManyArguments
            })
        ));

        let (handle, response) = SimpleAckHandle::new();
        handle.feed_error(BacnetError {
            invoke_id: 1,
            service_choice: 20,
            error_class: Some(4),
            error_code: Some(26),
        });
        assert!(matches!(
            response.blocking_wait(),
            Err(ClientError::ServiceError {
                service_choice: 20,
                ..
            })
        ));
    }
}
