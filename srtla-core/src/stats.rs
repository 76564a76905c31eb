//! Stats snapshots
//!
//! Read-only views of the engine's per-path state, taken under the path
//! table lock and handed to the embedding process.

use crate::path::{Path, PathState};

/// A point-in-time view of one path.
#[derive(Debug, Clone)]
pub struct PathSnapshot {
    pub virtual_ip: String,
    pub kind: String,
    pub state: PathState,
    pub weight: u32,
    /// Scaled congestion window (see [`crate::path::WINDOW_MULT`]).
    pub window: i32,
    pub inflight: usize,
    pub rtt_ms: f64,
    pub bytes_sent: u64,
    pub packets_sent: u64,
    pub nak_count: u32,
    pub ack_count: u64,
    /// Selection score at snapshot time; zero for ineligible paths.
    pub score: i32,
}

impl PathSnapshot {
    pub(crate) fn of(path: &Path) -> Self {
        PathSnapshot {
            virtual_ip: path.virtual_ip().to_string(),
            kind: path.kind().to_string(),
            state: path.state(),
            weight: path.weight(),
            window: path.window(),
            inflight: path.inflight_len(),
            rtt_ms: path.smooth_rtt_ms(),
            bytes_sent: path.bytes_sent(),
            packets_sent: path.packets_sent(),
            nak_count: path.nak_count(),
            ack_count: path.ack_count(),
            score: path.score(),
        }
    }
}
