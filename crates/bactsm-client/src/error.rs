use bactsm_core::apdu::{AbortReason, BacnetError, RejectReason};
use bactsm_core::types::{ErrorClass, ErrorCode};
use bactsm_datalink::{DataLinkAddress, DataLinkError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("encode error: {0}")]
    Encode(#[from] bactsm_core::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] bactsm_core::DecodeError),
    #[error("transaction aborted: {reason} (server={server})")]
    Abort { reason: AbortReason, server: bool },
    #[error("request rejected: {reason}")]
    Reject { reason: RejectReason },
    #[error("remote service error for service choice {service_choice}")]
    ServiceError {
        service_choice: u8,
        error_class_raw: Option<u32>,
        error_code_raw: Option<u32>,
        error_class: Option<ErrorClass>,
        error_code: Option<ErrorCode>,
    },
    #[error("request of {len} octets exceeds peer max APDU {max}; segmented requests are not supported")]
    SegmentedRequestUnsupported { len: usize, max: usize },
    #[error("invoke id {invoke_id} already in use for {address}")]
    InvokeIdInUse {
        address: DataLinkAddress,
        invoke_id: u8,
    },
    #[error("no free invoke id for {address}")]
    InvokeIdsExhausted { address: DataLinkAddress },
    #[error("transaction handle is already bound")]
    HandleAlreadyBound,
    #[error("transaction ended without a response")]
    ResponseDropped,
}

impl From<BacnetError> for ClientError {
    fn from(err: BacnetError) -> Self {
        Self::ServiceError {
            service_choice: err.service_choice,
            error_class_raw: err.error_class,
            error_code_raw: err.error_code,
            error_class: err.error_class.and_then(ErrorClass::from_u32),
            error_code: err.error_code.and_then(ErrorCode::from_u32),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ClientError;
    use bactsm_core::apdu::{AbortReason, BacnetError};
    use bactsm_core::types::{ErrorClass, ErrorCode};

    #[test]
    fn service_error_keeps_raw_and_named_codes() {
        let err = ClientError::from(BacnetError {
            invoke_id: 4,
            service_choice: 12,
            error_class: Some(2),
            error_code: Some(9999),
        });
        match err {
            ClientError::ServiceError {
                service_choice,
                error_class,
                error_code,
                error_code_raw,
                ..
            } => {
                assert_eq!(service_choice, 12);
                assert_eq!(error_class, Some(ErrorClass::Property));
                assert_eq!(error_code, None::<ErrorCode>);
                assert_eq!(error_code_raw, Some(9999));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn abort_display_names_reason() {
        let err = ClientError::Abort {
            reason: AbortReason::SegmentationNotSupported,
            server: true,
        };
        assert!(err.to_string().contains("server=true"));
    }
}
