//! SRTLA - SRT Link Aggregation
//!
//! High-level Rust API for the sender side of an SRTLA bonding proxy.

pub use srtla_core as core;
pub use srtla_io as io;
pub use srtla_protocol as protocol;

// Re-export commonly used types
pub use srtla_core::{EngineConfig, PathSnapshot, PathSpec, PathState, SrtlaSender};
pub use srtla_protocol::{PacketKind, SeqNumber};
