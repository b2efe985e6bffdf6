//! Receive window for segmented complex acks.
//!
//! Segments carry a one-octet sequence number. The window tracks absolute
//! (unwrapped) numbers instead, and [`reproject`] is the single place where a
//! wire octet is mapped back into that space. The mapping is only unambiguous
//! while the window stays below 256 segments and reordering never spans a full
//! wrap; negotiated windows are capped at 127.

/// Maps wire sequence number `wire` into absolute sequence space relative to a
/// window starting at `window_start` and spanning `window_size` segments.
///
/// Returns the absolute number when it falls in
/// `window_start..window_start + window_size`, otherwise `None`.
pub fn reproject(window_start: u64, window_size: u8, wire: u8) -> Option<u64> {
    let base = window_start - window_start % 256;
    let mut candidate = base + u64::from(wire);
    if candidate < window_start {
        candidate += 256;
    }
    (candidate < window_start + u64::from(window_size)).then_some(candidate)
}

/// What the window made of an incoming segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentFit {
    /// The segment the window was waiting for.
    Expected,
    /// Outside the window, a duplicate, or ahead of a gap.
    Unexpected,
}

/// Sliding window over absolute sequence numbers.
///
/// Invariant: `start <= next <= start + size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    start: u64,
    size: u8,
    next: u64,
}

impl Window {
    /// Window opened by the first segment (sequence 0), which is accepted
    /// outside of any window.
    pub fn after_first_segment(size: u8) -> Self {
        Self {
            start: 1,
            size: size.max(1),
            next: 1,
        }
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn size(&self) -> u8 {
        self.size
    }

    /// Absolute sequence number of the next in-order segment.
    pub fn next(&self) -> u64 {
        self.next
    }

    pub fn classify(&self, wire: u8) -> SegmentFit {
        match reproject(self.start, self.size, wire) {
            Some(abs) if abs == self.next => SegmentFit::Expected,
            _ => SegmentFit::Unexpected,
        }
    }

    /// Records the expected segment as received. Returns true when that
    /// filled the window.
    pub fn advance(&mut self) -> bool {
        self.next += 1;
        self.is_exhausted()
    }

    pub fn is_exhausted(&self) -> bool {
        self.next == self.start + u64::from(self.size)
    }

    /// Moves the window up to the next expected segment after an ack.
    pub fn slide(&mut self) {
        self.start = self.next;
    }

    /// Wire number of the last in-order segment, as carried in segment acks.
    pub fn last_in_order(&self) -> u8 {
        (self.next.saturating_sub(1) % 256) as u8
    }
}
