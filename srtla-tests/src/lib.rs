//! Test harness for driving a live SRTLA sender over loopback sockets.
//!
//! `FakeReceiver` plays the receiver's half of the registration handshake
//! and lets scenario tests inject packet traces (SRTLA ACKs, SRT NAKs,
//! data replies) at specific path addresses.

use bytes::BufMut;
use srtla_core::SrtlaSender;
use std::collections::BTreeSet;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

/// Wire types the harness matches on.
pub const TYPE_KEEPALIVE: [u8; 2] = [0x90, 0x00];
pub const TYPE_REG1: [u8; 2] = [0x92, 0x00];
pub const TYPE_REG2: [u8; 2] = [0x92, 0x01];
pub const TYPE_REG3: [u8; 2] = [0x92, 0x02];
pub const TYPE_REG_ERR: [u8; 2] = [0x92, 0x10];

/// A scripted SRTLA receiver on a loopback socket.
pub struct FakeReceiver {
    socket: UdpSocket,
}

impl FakeReceiver {
    pub fn bind() -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").expect("bind receiver");
        socket
            .set_read_timeout(Some(Duration::from_millis(100)))
            .expect("set read timeout");
        FakeReceiver { socket }
    }

    pub fn addr(&self) -> SocketAddr {
        self.socket.local_addr().expect("receiver addr")
    }

    pub fn send_to(&self, data: &[u8], target: SocketAddr) {
        self.socket.send_to(data, target).expect("receiver send");
    }

    /// Receive until `pred` matches or the deadline passes. Non-matching
    /// datagrams (keepalives, stray retransmissions) are discarded.
    pub fn recv_matching<F>(&self, deadline: Duration, mut pred: F) -> Option<(Vec<u8>, SocketAddr)>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let start = Instant::now();
        let mut buf = [0u8; 2048];
        while start.elapsed() < deadline {
            match self.socket.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if pred(&buf[..len]) {
                        return Some((buf[..len].to_vec(), from));
                    }
                }
                Err(_) => {}
            }
        }
        None
    }

    /// Wait for a REG1 frame; returns the candidate session id and the
    /// path address it came from.
    pub fn expect_reg1(&self, deadline: Duration) -> ([u8; 256], SocketAddr) {
        let (frame, from) = self
            .recv_matching(deadline, |d| d.len() == 258 && d[..2] == TYPE_REG1)
            .expect("REG1 never arrived");
        let mut id = [0u8; 256];
        id.copy_from_slice(&frame[2..258]);
        (id, from)
    }

    /// Run the whole registration handshake against `expected_paths`
    /// distinct path sockets, returning their addresses.
    ///
    /// REG2 echoes the first half of the candidate id and fills the second
    /// half, as a real receiver does.
    pub fn register_paths(&self, expected_paths: usize) -> BTreeSet<SocketAddr> {
        let (id, first) = self.expect_reg1(Duration::from_secs(3));

        let mut reg2 = Vec::with_capacity(258);
        reg2.extend_from_slice(&TYPE_REG2);
        reg2.extend_from_slice(&id[..128]);
        reg2.extend_from_slice(&[0xC3; 128]);
        self.send_to(&reg2, first);

        // The sender re-broadcasts REG2 on every registering path.
        let mut paths = BTreeSet::new();
        let deadline = Instant::now() + Duration::from_secs(3);
        while paths.len() < expected_paths && Instant::now() < deadline {
            if let Some((_, from)) =
                self.recv_matching(Duration::from_millis(300), |d| {
                    d.len() == 258 && d[..2] == TYPE_REG2
                })
            {
                paths.insert(from);
            }
        }
        assert_eq!(paths.len(), expected_paths, "REG2 broadcast incomplete");

        for path in &paths {
            self.send_to(&TYPE_REG3, *path);
        }
        paths
    }
}

/// Wait until the sender reports `count` connected paths.
pub fn await_connected(sender: &SrtlaSender, count: usize, deadline: Duration) {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if sender.connected_path_count() == count {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    panic!(
        "paths never connected: wanted {}, have {}",
        count,
        sender.connected_path_count()
    );
}

/// Poll `check` until it returns true or the deadline passes.
pub fn await_condition<F: FnMut() -> bool>(deadline: Duration, mut check: F) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    false
}

/// Build an SRT data packet with the given sequence and total length.
pub fn make_srt_data(seq: u32, total_len: usize) -> Vec<u8> {
    assert!(total_len >= 16);
    let mut buf = Vec::with_capacity(total_len);
    buf.put_u32(seq & 0x7FFF_FFFF);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    buf.resize(total_len, 0x5C);
    buf
}

/// Build an SRT control packet with the given subtype and trailing words.
pub fn make_srt_control(subtype: u16, words: &[u32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 + words.len() * 4);
    buf.put_u32(0x8000_0000 | ((subtype as u32) << 16));
    buf.put_u32(0);
    buf.put_u32(0);
    buf.put_u32(0);
    for w in words {
        buf.put_u32(*w);
    }
    buf
}

/// Build an SRT cumulative ACK for `ack_sn`.
pub fn make_srt_ack(ack_sn: u32) -> Vec<u8> {
    make_srt_control(2, &[ack_sn, 0, 0, 0])
}

/// Build an SRT NAK listing individual lost sequences.
pub fn make_srt_nak(lost: &[u32]) -> Vec<u8> {
    make_srt_control(3, lost)
}

/// Build an SRTLA ACK frame for up to ten sequences; the remainder repeats
/// the last sequence, as the wire format always carries ten slots.
pub fn make_srtla_ack(seqs: &[u32]) -> Vec<u8> {
    assert!(!seqs.is_empty() && seqs.len() <= 10);
    let mut buf = Vec::with_capacity(44);
    buf.put_u16(0x9100);
    buf.put_u16(0);
    for i in 0..10 {
        buf.put_u32(*seqs.get(i).unwrap_or_else(|| seqs.last().unwrap()));
    }
    buf
}

/// Bind a path socket on loopback, connected to the receiver. Returns the
/// socket and its local address (how the receiver will see this path).
pub fn make_path_socket(receiver: SocketAddr) -> (UdpSocket, SocketAddr) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind path socket");
    socket.connect(receiver).expect("connect path socket");
    let addr = socket.local_addr().expect("path socket addr");
    (socket, addr)
}
