//! AdmissionController types

use serde::{Deserialize, Serialize};

/// Default number of frames allowed in flight at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 3;

/// Point-in-time admission counters (for `/api/status`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionStatus {
    pub in_flight: usize,
    pub bound: usize,
    /// Frames admitted since startup
    pub admitted: u64,
    /// Frames dropped at admission since startup
    pub dropped: u64,
}
