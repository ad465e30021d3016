//! Request sequencing for read-models
//!
//! Every load is tagged with a number at issue time. A response is applied
//! only if its number is higher than that of every response applied so far,
//! so a slow stale reply can never overwrite a fresher one.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub(crate) struct RequestSequence {
    issued: AtomicU64,
    applied: AtomicU64,
    in_flight: AtomicUsize,
}

impl RequestSequence {
    /// Tag a new request
    pub fn issue(&self) -> u64 {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark `seq` as resolved; true if its result should be applied
    pub fn settle(&self, seq: u64) -> bool {
        let _ = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        self.applied.fetch_max(seq, Ordering::SeqCst) < seq
    }

    /// Discard every response issued so far
    pub fn invalidate(&self) {
        self.applied
            .fetch_max(self.issued.load(Ordering::SeqCst), Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn last_applied(&self) -> u64 {
        self.applied.load(Ordering::SeqCst)
    }
}
