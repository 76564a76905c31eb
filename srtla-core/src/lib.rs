//! SRTLA Sender Core
//!
//! The packet-forwarding engine of a sender-side SRTLA proxy: a local SRT
//! encoder sends to a loopback UDP port, and the engine spreads the stream
//! across every registered network path, attributes NAK/ACK feedback to the
//! path that transmitted each packet, and keeps per-path congestion windows
//! so lossy paths drain while healthy ones absorb more load.
//!
//! The engine runs a single-threaded cooperative event loop; the embedding
//! process talks to it through [`SrtlaSender`], whose path add/remove/stats
//! calls synchronize with the loop on the shared path table.

pub mod engine;
pub mod path;
pub mod pool;
pub mod stats;

pub use engine::{EngineConfig, EngineError, PathSpec, SrtlaSender};
pub use path::{Path, PathState};
pub use pool::VirtualIpPool;
pub use stats::PathSnapshot;
