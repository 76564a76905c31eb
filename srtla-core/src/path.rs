//! Per-path state
//!
//! A `Path` is one egress socket bound to one network interface and
//! registered with the SRTLA receiver. It owns the three pieces of state the
//! engine's fairness machinery is built on: the registration state machine,
//! the inflight set (which sequences this path transmitted and has not yet
//! seen acknowledged or lost), and the scaled congestion window.
//!
//! NAK/ACK feedback is broadcast to every path; membership in the inflight
//! set decides which path the feedback actually belongs to.

use srtla_io::Timestamp;
use srtla_protocol::SeqNumber;
use std::collections::HashSet;
use std::io;
use std::net::UdpSocket;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::Duration;

/// Window bookkeeping is integer-only, scaled so that one inflight packet
/// weighs `WINDOW_MULT` against the window.
pub const WINDOW_MULT: i32 = 1000;
pub const WINDOW_MIN: i32 = 1;
pub const WINDOW_DEF: i32 = 20;
pub const WINDOW_MAX: i32 = 60;

/// Window penalty for a NAKed packet this path owns.
const NAK_PENALTY: i32 = 100;

/// Extra window growth per owned SRTLA ACK while congested.
const CONGESTED_INCREMENT: i32 = 29;

/// A path with no received traffic for this long loses selection
/// eligibility and is re-registered.
pub const PATH_TIMEOUT: Duration = Duration::from_millis(4000);

/// A registration attempt that has not reached REG3 within this long
/// restarts from REG1.
pub const REG_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a removed path keeps its socket open to drain late replies.
pub const ZOMBIE_TTL: Duration = Duration::from_millis(15_000);

/// Registration and lifecycle state of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    /// Created or reset; REG1 not yet sent.
    Disconnected,
    /// REG1 sent, waiting for the group handshake.
    RegisteringReg1,
    /// REG2 broadcast on this path, waiting for its REG3.
    RegisteringReg2,
    /// Registered; eligible for selection.
    Connected,
    /// Removed, but the socket is still read for up to [`ZOMBIE_TTL`].
    Zombie,
    /// Registration rejected by the receiver; terminal.
    Failed,
}

impl std::fmt::Display for PathState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PathState::Disconnected => "disconnected",
            PathState::RegisteringReg1 => "registering-reg1",
            PathState::RegisteringReg2 => "registering-reg2",
            PathState::Connected => "connected",
            PathState::Zombie => "zombie",
            PathState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One egress path of the bonded session.
pub struct Path {
    socket: UdpSocket,
    virtual_ip: String,
    kind: String,
    weight: u32,
    state: PathState,

    inflight: HashSet<SeqNumber>,
    window: i32,

    smooth_rtt_ms: f64,
    fast_rtt_ms: f64,

    last_send: Option<Timestamp>,
    last_activity: Timestamp,
    zombie_since: Option<Timestamp>,
    reg_started: Option<Timestamp>,

    bytes_sent: u64,
    packets_sent: u64,
    nak_count: u32,
    ack_count: u64,
}

impl Path {
    /// Wrap a donated socket. The socket must already be bound to its
    /// egress interface and connected to the receiver.
    pub fn new(socket: UdpSocket, virtual_ip: String, kind: String, weight: u32) -> Self {
        Path {
            socket,
            virtual_ip,
            kind,
            weight,
            state: PathState::Disconnected,
            inflight: HashSet::new(),
            window: WINDOW_DEF * WINDOW_MULT,
            smooth_rtt_ms: 100.0,
            fast_rtt_ms: 100.0,
            last_send: None,
            last_activity: Timestamp::now(),
            zombie_since: None,
            reg_started: None,
            bytes_sent: 0,
            packets_sent: 0,
            nak_count: 0,
            ack_count: 0,
        }
    }

    pub fn virtual_ip(&self) -> &str {
        &self.virtual_ip
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: u32) {
        self.weight = weight;
    }

    pub fn state(&self) -> PathState {
        self.state
    }

    pub fn set_state(&mut self, state: PathState) {
        self.state = state;
    }

    pub fn is_connected(&self) -> bool {
        self.state == PathState::Connected
    }

    pub fn is_zombie(&self) -> bool {
        self.state == PathState::Zombie
    }

    pub fn window(&self) -> i32 {
        self.window
    }

    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.socket.as_raw_fd()
    }

    /// Send a datagram on the path's connected socket.
    pub fn send(&self, data: &[u8]) -> io::Result<usize> {
        self.socket.send(data)
    }

    /// Receive a datagram from the path's connected socket.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.socket.recv(buf)
    }

    /// Record an outgoing SRT data packet: track its sequence, bump the
    /// counters, stamp activity.
    pub fn mark_sent(&mut self, seq: SeqNumber, bytes: usize) {
        self.inflight.insert(seq);
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
        let now = Timestamp::now();
        self.last_send = Some(now);
        self.last_activity = now;
    }

    /// Record outgoing bytes that carry no trackable sequence (SRT control
    /// traffic relayed from the encoder).
    pub fn note_sent(&mut self, bytes: usize) {
        self.packets_sent += 1;
        self.bytes_sent += bytes as u64;
        let now = Timestamp::now();
        self.last_send = Some(now);
        self.last_activity = now;
    }

    /// Record an outgoing keepalive. Refreshes the send clock used for RTT
    /// sampling without counting as path activity, so a receiver that went
    /// silent still trips the timeout.
    pub fn touch_sent(&mut self) {
        self.last_send = Some(Timestamp::now());
    }

    /// Record any received datagram.
    pub fn mark_received(&mut self) {
        self.last_activity = Timestamp::now();
    }

    /// Backdate activity so the path immediately loses eligibility and gets
    /// picked up by timeout-driven re-registration.
    pub fn mark_stale(&mut self) {
        self.last_activity = Timestamp::backdated(PATH_TIMEOUT + Duration::from_millis(1));
    }

    pub fn timed_out(&self) -> bool {
        self.last_activity.elapsed() > PATH_TIMEOUT
    }

    /// Eligible for selection: connected and recently active.
    pub fn eligible(&self) -> bool {
        self.is_connected() && !self.timed_out()
    }

    /// Note that a REG1/REG2 attempt started on this path.
    pub fn begin_registration(&mut self, state: PathState) {
        self.state = state;
        self.reg_started = Some(Timestamp::now());
    }

    /// Whether the current registration attempt has run out of time.
    pub fn registration_expired(&self) -> bool {
        match (self.state, self.reg_started) {
            (PathState::RegisteringReg1 | PathState::RegisteringReg2, Some(started)) => {
                started.elapsed() > REG_TIMEOUT
            }
            (PathState::RegisteringReg1 | PathState::RegisteringReg2, None) => true,
            _ => false,
        }
    }

    /// Withdraw the path: it stops being selectable but its socket keeps
    /// draining replies until [`ZOMBIE_TTL`] elapses.
    pub fn make_zombie(&mut self) {
        self.state = PathState::Zombie;
        self.zombie_since = Some(Timestamp::now());
    }

    pub fn zombie_expired(&self) -> bool {
        matches!(self.state, PathState::Zombie)
            && self
                .zombie_since
                .map(|since| since.elapsed() > ZOMBIE_TTL)
                .unwrap_or(true)
    }

    /// Cumulative SRT ACK: prune every inflight sequence the ACK covers.
    /// The window is deliberately untouched; SRT ACKs certify the stream,
    /// not this particular path.
    pub fn on_srt_ack(&mut self, ack: SeqNumber) {
        let before = self.inflight.len();
        self.inflight.retain(|seq| !seq.covered_by_ack(ack));
        let pruned = before - self.inflight.len();
        if pruned > 0 {
            self.ack_count += pruned as u64;
            self.last_activity = Timestamp::now();
        }
    }

    /// SRT NAK for one lost sequence. Only the owner pays: if this path did
    /// not transmit the sequence the report is for a sibling path.
    pub fn on_srt_nak(&mut self, seq: SeqNumber) {
        if !self.inflight.remove(&seq) {
            return;
        }
        self.window = (self.window - NAK_PENALTY).max(WINDOW_MIN * WINDOW_MULT);
        self.nak_count += 1;
        self.last_activity = Timestamp::now();
    }

    /// SRTLA ACK for one sequence. If this path owns it: prune, fold an RTT
    /// sample, and while congested grow the window by the large increment.
    /// Regardless of ownership the window grows by one — any SRTLA ACK
    /// arriving here certifies the path is alive.
    pub fn on_srtla_ack(&mut self, seq: SeqNumber) {
        if self.inflight.remove(&seq) {
            let now = Timestamp::now();
            if let Some(sent) = self.last_send {
                let sample = now.millis_since(sent) as f64;
                self.smooth_rtt_ms = self.smooth_rtt_ms * 0.875 + sample * 0.125;
                self.fast_rtt_ms = self.fast_rtt_ms * 0.75 + sample * 0.25;
            }
            if (self.inflight.len() as i32).saturating_mul(WINDOW_MULT) > self.window {
                self.window += CONGESTED_INCREMENT;
            }
            self.ack_count += 1;
            self.last_activity = now;
        }
        self.window = (self.window + 1).min(WINDOW_MAX * WINDOW_MULT);
    }

    /// Forget all inflight tracking without touching the window. Used when a
    /// sibling path is withdrawn and its acknowledgements will never arrive.
    pub fn clear_inflight(&mut self) {
        self.inflight.clear();
    }

    /// Reset the window to its default and drop inflight tracking.
    pub fn reset_window(&mut self) {
        self.window = WINDOW_DEF * WINDOW_MULT;
        self.inflight.clear();
    }

    /// Selection score: `window / (inflight + 1)`, zero when the path is
    /// not usable.
    pub fn score(&self) -> i32 {
        if !self.eligible() {
            return 0;
        }
        self.window / (self.inflight.len() as i32 + 1)
    }

    pub fn smooth_rtt_ms(&self) -> f64 {
        self.smooth_rtt_ms
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets_sent
    }

    pub fn nak_count(&self) -> u32 {
        self.nak_count
    }

    pub fn ack_count(&self) -> u64 {
        self.ack_count
    }

    #[cfg(test)]
    pub(crate) fn contains_inflight(&self, seq: SeqNumber) -> bool {
        self.inflight.contains(&seq)
    }
}
