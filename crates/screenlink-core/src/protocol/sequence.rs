//! Lock-free counters for the header `seq` field and frame numbering.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out 0, 1, 2, … to any number of concurrent senders.
///
/// Each Session owns one for the header of every unit it writes; the client
/// keeps a second one for frame numbers so that commands never leave gaps in
/// the frame sequence.  Wraps to 0 after `u64::MAX`.
///
/// ```rust
/// use screenlink_core::protocol::SequenceCounter;
///
/// let seq = SequenceCounter::new();
/// assert_eq!((seq.next(), seq.next()), (0, 1));
/// assert_eq!(seq.issued(), 2);
/// ```
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    pub fn starting_at(first: u64) -> Self {
        Self(AtomicU64::new(first))
    }

    /// Claims the next number.  Only uniqueness matters, so `Relaxed` suffices.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The number the next call to [`next`](Self::next) will return.
    pub fn issued(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
