//! Admission permit - released on drop

use super::Counters;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Slot in the in-flight budget held by one admitted frame.
///
/// Dropping the permit gives the slot back. Every exit path of a frame
/// invocation drops its permit exactly once, so the counter cannot drift.
#[derive(Debug)]
pub struct AdmissionPermit {
    counters: Arc<Counters>,
    frame_id: u64,
}

impl AdmissionPermit {
    pub(super) fn new(counters: Arc<Counters>, frame_id: u64) -> Self {
        Self { counters, frame_id }
    }

    /// Sequence number assigned at admission
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let prev = self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
        tracing::debug!(
            frame_id = self.frame_id,
            in_flight = prev.saturating_sub(1),
            "Admission slot released"
        );
    }
}
