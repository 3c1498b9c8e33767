//! AdmissionController - Frame Load Control
//!
//! ## Responsibilities
//!
//! - Bound the number of frames under detection at any moment
//! - Reject (not queue) frames that arrive while the bound is reached
//! - Hand out RAII permits so release happens exactly once per admission
//!
//! ## Design
//!
//! - Single shared counter, checked and incremented atomically
//! - Older in-flight frames are never affected by a rejection

mod permit;
mod types;

pub use permit::AdmissionPermit;
pub use types::*;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    in_flight: AtomicUsize,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

/// AdmissionController instance
#[derive(Debug)]
pub struct AdmissionController {
    bound: usize,
    counters: Arc<Counters>,
}

impl AdmissionController {
    /// Create new AdmissionController with the given in-flight bound
    pub fn new(bound: usize) -> Self {
        Self {
            bound: bound.max(1),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Try to admit one frame.
    ///
    /// Returns `None` when `bound` frames are already in flight; the caller
    /// drops the frame. The check and the increment are a single atomic step.
    pub fn try_admit(&self) -> Option<AdmissionPermit> {
        let admitted = self
            .counters
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < self.bound).then_some(current + 1)
            });

        match admitted {
            Ok(prev) => {
                let frame_id = self.counters.admitted.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(frame_id, in_flight = prev + 1, bound = self.bound, "Frame admitted");
                Some(AdmissionPermit::new(self.counters.clone(), frame_id))
            }
            Err(current) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::info!(in_flight = current, bound = self.bound, "Skipping frame (queue full)");
                None
            }
        }
    }

    /// Number of frames currently in flight
    pub fn in_flight(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Configured bound
    pub fn bound(&self) -> usize {
        self.bound
    }

    /// Get current admission status
    pub fn status(&self) -> AdmissionStatus {
        AdmissionStatus {
            in_flight: self.in_flight(),
            bound: self.bound,
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}
