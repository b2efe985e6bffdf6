use bactsm_core::types::{MaxApdu, MaxSegments};
use std::time::Duration;

/// Largest window a client may negotiate; BACnet caps proposals at 127.
pub const MAX_WINDOW_SIZE: u8 = 127;
/// Default cap on the reassembled payload of a segmented reply.
pub const MAX_REASSEMBLY_BYTES: usize = 1024 * 1024;

/// Per-transaction timing and negotiation parameters.
///
/// Each transaction takes a copy when it starts, so changing the manager's
/// configuration never affects transactions already in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionConfig {
    request_timeout: Duration,
    segment_timeout: Duration,
    retries: u8,
    max_apdu: MaxApdu,
    max_segments: MaxSegments,
    segmented_response_accepted: bool,
    max_window_size: u8,
    max_reassembly_bytes: usize,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(3),
            segment_timeout: Duration::from_secs(2),
            retries: 3,
            max_apdu: MaxApdu::UpTo1476,
            max_segments: MaxSegments::Unspecified,
            segmented_response_accepted: true,
            max_window_size: 16,
            max_reassembly_bytes: MAX_REASSEMBLY_BYTES,
        }
    }
}

impl TransactionConfig {
    /// How long to wait for the first reply before resending.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// How long to wait for the next segment of a segmented reply.
    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.segment_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Total number of times the request is sent before giving up. At least 1.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries.max(1);
        self
    }

    pub fn with_max_apdu(mut self, max_apdu: MaxApdu) -> Self {
        self.max_apdu = max_apdu;
        self
    }

    pub fn with_max_segments(mut self, max_segments: MaxSegments) -> Self {
        self.max_segments = max_segments;
        self
    }

    pub fn with_segmented_response_accepted(mut self, accepted: bool) -> Self {
        self.segmented_response_accepted = accepted;
        self
    }

    pub fn with_max_window_size(mut self, size: u8) -> Self {
        self.max_window_size = size.clamp(1, MAX_WINDOW_SIZE);
        self
    }

    /// Largest segmented reply payload accepted before aborting with
    /// buffer-overflow.
    pub fn with_max_reassembly_bytes(mut self, limit: usize) -> Self {
        self.max_reassembly_bytes = limit.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn segment_timeout(&self) -> Duration {
        self.segment_timeout
    }

    pub fn retries(&self) -> u8 {
        self.retries
    }

    pub fn max_apdu(&self) -> MaxApdu {
        self.max_apdu
    }

    pub fn max_segments(&self) -> MaxSegments {
        self.max_segments
    }

    pub fn segmented_response_accepted(&self) -> bool {
        self.segmented_response_accepted
    }

    pub fn max_window_size(&self) -> u8 {
        self.max_window_size
    }

    pub fn max_reassembly_bytes(&self) -> usize {
        self.max_reassembly_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::{TransactionConfig, MAX_REASSEMBLY_BYTES, MAX_WINDOW_SIZE};
    use std::time::Duration;

    #[test]
    fn defaults() {
        let cfg = TransactionConfig::default();
        assert_eq!(cfg.request_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.segment_timeout(), Duration::from_secs(2));
        assert_eq!(cfg.retries(), 3);
        assert!(cfg.segmented_response_accepted());
        assert_eq!(cfg.max_window_size(), 16);
        assert_eq!(cfg.max_reassembly_bytes(), MAX_REASSEMBLY_BYTES);
    }

    #[test]
    fn setters_clamp_degenerate_values() {
        let cfg = TransactionConfig::default()
            .with_retries(0)
            .with_max_window_size(0)
            .with_request_timeout(Duration::ZERO)
            .with_max_reassembly_bytes(0);
        assert_eq!(cfg.retries(), 1);
        assert_eq!(cfg.max_window_size(), 1);
        assert_eq!(cfg.request_timeout(), Duration::from_millis(1));
        assert_eq!(cfg.max_reassembly_bytes(), 1);

        let cfg = cfg.with_max_window_size(200);
        assert_eq!(cfg.max_window_size(), MAX_WINDOW_SIZE);
    }
}
