//! Virtual IP pool
//!
//! Each path is labelled with a stable address from a private /24. The label
//! is never routed; it identifies the path to the embedding process and in
//! logs, and survives for the path's whole lifetime including its zombie
//! window.

use parking_lot::Mutex;
use std::collections::BTreeSet;

const BASE: &str = "10.0.0.";
const MIN_HOST: u8 = 2; // .1 is reserved for the gateway
const MAX_HOST: u8 = 254; // .255 is broadcast

/// Allocator over "10.0.0.2" .. "10.0.0.254".
pub struct VirtualIpPool {
    used: Mutex<BTreeSet<u8>>,
}

impl VirtualIpPool {
    pub fn new() -> Self {
        VirtualIpPool {
            used: Mutex::new(BTreeSet::new()),
        }
    }

    /// Allocate the lowest free label, or `None` when the pool is exhausted.
    pub fn allocate(&self) -> Option<String> {
        let mut used = self.used.lock();
        let host = (MIN_HOST..=MAX_HOST).find(|h| !used.contains(h))?;
        used.insert(host);
        Some(format!("{BASE}{host}"))
    }

    /// Claim a specific label. Fails if it is outside the pool's range or
    /// already in use.
    pub fn claim(&self, ip: &str) -> bool {
        match Self::host_of(ip) {
            Some(host) => self.used.lock().insert(host),
            None => false,
        }
    }

    /// Return a label to the pool. Unknown labels are ignored.
    pub fn release(&self, ip: &str) {
        if let Some(host) = Self::host_of(ip) {
            self.used.lock().remove(&host);
        }
    }

    pub fn in_use(&self) -> usize {
        self.used.lock().len()
    }

    fn host_of(ip: &str) -> Option<u8> {
        let host: u8 = ip.strip_prefix(BASE)?.parse().ok()?;
        (MIN_HOST..=MAX_HOST).contains(&host).then_some(host)
    }
}

impl Default for VirtualIpPool {
    fn default() -> Self {
        Self::new()
    }
}
