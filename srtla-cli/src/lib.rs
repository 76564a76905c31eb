//! SRTLA CLI Library
//!
//! Shared functionality for the SRTLA command-line sender.

pub mod config;
pub mod stats;

pub use config::{Config, ConfigError, PathEntry, SenderSettings};
pub use stats::{display_path_stats, format_bytes, format_rtt};
