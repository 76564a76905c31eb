//! SRTLA I/O and Platform Abstraction
//!
//! Network I/O building blocks for the sender: a UDP socket wrapper with the
//! options the proxy needs, a `poll(2)` readiness set for the single-threaded
//! event loop, and monotonic timing utilities.

pub mod poll;
pub mod socket;
pub mod time;

pub use poll::ReadPoller;
pub use socket::{configure_path_socket, SocketError, UdpEndpoint};
pub use time::{monotonic_ms, Timer, Timestamp};
