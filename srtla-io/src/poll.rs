//! Readiness waiting for the event loop
//!
//! The sender's loop waits on one local socket plus every path socket
//! (zombies included) with a bounded tick. `poll(2)` fits: the descriptor
//! set is rebuilt each iteration because paths come and go, and the fd count
//! is small (one per path, at most a /24 worth).

use std::io;
use std::os::unix::io::RawFd;
use std::time::Duration;

/// A reusable read-readiness set over raw file descriptors.
pub struct ReadPoller {
    fds: Vec<libc::pollfd>,
}

impl ReadPoller {
    pub fn new() -> Self {
        ReadPoller { fds: Vec::new() }
    }

    /// Drop all registered descriptors. Call at the top of each loop turn.
    pub fn clear(&mut self) {
        self.fds.clear();
    }

    /// Register a descriptor for read readiness; returns its slot index.
    pub fn register(&mut self, fd: RawFd) -> usize {
        self.fds.push(libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        });
        self.fds.len() - 1
    }

    /// Wait until at least one descriptor is readable or the timeout
    /// elapses. Returns the number of ready descriptors (0 on timeout or
    /// interruption).
    pub fn wait(&mut self, timeout: Duration) -> io::Result<usize> {
        if self.fds.is_empty() {
            std::thread::sleep(timeout);
            return Ok(0);
        }

        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as libc::c_int;
        let rc = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };

        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(rc as usize)
    }

    /// Whether the descriptor in `slot` became readable (or errored, which
    /// the caller discovers on the following `recv`).
    pub fn readable(&self, slot: usize) -> bool {
        self.fds
            .get(slot)
            .map(|p| p.revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) != 0)
            .unwrap_or(false)
    }
}

impl Default for ReadPoller {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::UdpSocket;
    use std::os::unix::io::AsRawFd;
    use std::time::Instant;

    #[test]
    fn times_out_when_idle() {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut poller = ReadPoller::new();
        let slot = poller.register(socket.as_raw_fd());

        let start = Instant::now();
        let ready = poller.wait(Duration::from_millis(50)).unwrap();
        assert_eq!(ready, 0);
        assert!(!poller.readable(slot));
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[test]
    fn reports_readable_socket() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();
        sender
            .send_to(b"ping", receiver.local_addr().unwrap())
            .unwrap();

        let mut poller = ReadPoller::new();
        let slot = poller.register(receiver.as_raw_fd());
        let ready = poller.wait(Duration::from_millis(500)).unwrap();
        assert_eq!(ready, 1);
        assert!(poller.readable(slot));
    }

    #[test]
    fn empty_set_just_sleeps() {
        let mut poller = ReadPoller::new();
        let start = Instant::now();
        assert_eq!(poller.wait(Duration::from_millis(30)).unwrap(), 0);
        assert!(start.elapsed() >= Duration::from_millis(25));
    }
}
