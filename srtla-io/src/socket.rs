//! UDP socket wrapper
//!
//! Cross-platform UDP socket construction with the options the SRTLA sender
//! cares about: non-blocking mode and a large send buffer on egress paths.

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use std::io::{self, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use thiserror::Error;

/// Send buffer applied to egress path sockets, matching the SRTLA reference
/// sender.
pub const PATH_SEND_BUFFER: usize = 8 * 1024 * 1024;

/// Socket configuration errors
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid socket address")]
    InvalidAddress,
}

/// UDP endpoint wrapper
///
/// Used by the embedding process to construct path sockets (bound to an
/// egress interface, connected to the receiver) before handing them to the
/// engine, and by the engine itself for the local listening socket.
pub struct UdpEndpoint {
    inner: Socket,
}

impl UdpEndpoint {
    /// Create a new endpoint bound to the given address, non-blocking.
    pub fn bind(addr: SocketAddr) -> Result<Self, SocketError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.bind(&addr.into())?;
        socket.set_nonblocking(true)?;

        Ok(UdpEndpoint { inner: socket })
    }

    /// Connect the endpoint to a remote peer. Subsequent sends go to the
    /// peer and receives are filtered to it.
    pub fn connect(&self, peer: SocketAddr) -> Result<(), SocketError> {
        self.inner.connect(&peer.into())?;
        Ok(())
    }

    pub fn set_send_buffer_size(&self, size: usize) -> Result<(), SocketError> {
        self.inner.set_send_buffer_size(size)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr, SocketError> {
        self.inner
            .local_addr()?
            .as_socket()
            .ok_or(SocketError::InvalidAddress)
    }

    /// Send a datagram to the connected peer.
    pub fn send(&self, buf: &[u8]) -> Result<usize, SocketError> {
        Ok(self.inner.send(buf)?)
    }

    /// Receive a datagram, returning its length and source address.
    /// `WouldBlock` surfaces as an `Io` error the caller can match on.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), SocketError> {
        use std::mem::MaybeUninit;
        // socket2 takes MaybeUninit; the buffer is plain bytes so the cast
        // is sound and avoids a copy.
        let uninit = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr() as *mut MaybeUninit<u8>, buf.len())
        };
        match self.inner.recv_from(uninit) {
            Ok((n, addr)) => Ok((n, addr.as_socket().ok_or(SocketError::InvalidAddress)?)),
            Err(e) => Err(SocketError::Io(e)),
        }
    }

    /// Convert into a standard UDP socket, e.g. for handing to the engine.
    pub fn into_udp_socket(self) -> UdpSocket {
        self.inner.into()
    }
}

/// Apply the engine's path-socket options to a donated socket: a large send
/// buffer and non-blocking mode. The buffer size is advisory (the OS may
/// clamp it); failing to set it is not fatal.
pub fn configure_path_socket(socket: &UdpSocket) -> io::Result<()> {
    let sock = SockRef::from(socket);
    let _ = sock.set_send_buffer_size(PATH_SEND_BUFFER);
    socket.set_nonblocking(true)
}

/// Whether an I/O error is the non-blocking "try again later" case.
pub fn is_would_block(err: &io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bind_assigns_ephemeral_port() {
        let ep = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        assert!(ep.local_addr().unwrap().port() > 0);
    }

    #[test]
    fn connected_send_and_recv() {
        let receiver = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        let sender = UdpEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        sender.connect(receiver_addr).unwrap();
        sender.send(b"hello srtla").unwrap();

        let mut buf = [0u8; 64];
        for _ in 0..50 {
            match receiver.recv_from(&mut buf) {
                Ok((n, _)) => {
                    assert_eq!(&buf[..n], b"hello srtla");
                    return;
                }
                Err(_) => std::thread::sleep(Duration::from_millis(5)),
            }
        }
        panic!("datagram never arrived");
    }

    #[test]
    fn path_socket_configuration() {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        configure_path_socket(&socket).unwrap();

        let mut buf = [0u8; 16];
        let err = socket.recv(&mut buf).unwrap_err();
        assert!(is_would_block(&err));
    }
}
