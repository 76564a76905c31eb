//! SRTLA sender engine
//!
//! One engine instance owns the local SRT listening socket, the path table
//! and the session id, and runs a single-threaded cooperative event loop:
//! wait for readiness on the local socket plus every path socket (zombies
//! included), dispatch one datagram per ready socket, then run the periodic
//! housekeeping (keepalives, registration recovery, zombie reaping, encoder
//! idle reset).
//!
//! The embedding process drives the engine through [`SrtlaSender`]; those
//! calls synchronize with the loop on the path table mutex.

use crate::path::{Path, PathState};
use crate::pool::VirtualIpPool;
use crate::stats::PathSnapshot;
use parking_lot::Mutex;
use rand::RngCore;
use srtla_io::socket::is_would_block;
use srtla_io::{monotonic_ms, ReadPoller, Timer, Timestamp};
use srtla_protocol::{self as proto, PacketKind, SRTLA_ID_LEN};
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Upper bound on one readiness wait.
const LOOP_TICK: Duration = Duration::from_millis(200);

/// Keepalive cadence on every live path.
const KEEPALIVE_INTERVAL: Duration = Duration::from_millis(200);

/// Cadence of the per-path debug stats log.
const STATS_LOG_INTERVAL: Duration = Duration::from_millis(1000);

/// Cadence of the expired-zombie sweep.
const ZOMBIE_SWEEP_INTERVAL: Duration = Duration::from_millis(5000);

/// The learned encoder address is forgotten after this much silence.
const ENCODER_IDLE_TIMEOUT: Duration = Duration::from_millis(10_000);

const RECV_BUFFER_LEN: usize = 65536;

/// Engine errors surfaced to the embedding process.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot resolve receiver address {0}")]
    Resolve(String),

    #[error("virtual IP pool exhausted")]
    PoolExhausted,

    #[error("virtual IP {0} is outside the pool range")]
    InvalidVirtualIp(String),

    #[error("a live path already uses virtual IP {0}")]
    DuplicatePath(String),

    #[error("no active path with virtual IP {0}")]
    UnknownPath(String),

    #[error("refusing to remove the last connected path")]
    LastPath,

    #[error("engine is not running")]
    NotRunning,
}

/// Startup parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Loopback UDP port the SRT encoder sends to. Use 0 for an ephemeral
    /// port and read it back with [`SrtlaSender::local_addr`].
    pub local_port: u16,
    pub receiver_host: String,
    pub receiver_port: u16,
}

/// Caller-supplied attributes of a new path.
#[derive(Debug, Clone)]
pub struct PathSpec {
    /// Explicit virtual IP from the 10.0.0.0/24 pool, or `None` to
    /// auto-allocate.
    pub virtual_ip: Option<String>,
    pub weight: u32,
    /// Human-readable tag: "wifi", "cellular", "ethernet", ...
    pub kind: String,
}

impl Default for PathSpec {
    fn default() -> Self {
        PathSpec {
            virtual_ip: None,
            weight: 1,
            kind: "unknown".to_string(),
        }
    }
}

struct Shared {
    running: AtomicBool,
    local: UdpSocket,
    receiver: SocketAddr,
    session_id: Mutex<[u8; SRTLA_ID_LEN]>,
    paths: Mutex<Vec<Path>>,
    pool: VirtualIpPool,
    dropped_no_path: AtomicU64,
}

/// Handle to a running SRTLA sender engine.
///
/// Dropping the handle stops the engine: the loop thread is joined, every
/// path socket and the local socket are closed.
pub struct SrtlaSender {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl SrtlaSender {
    /// Bind the local socket, resolve the receiver and start the event
    /// loop.
    pub fn start(config: EngineConfig) -> Result<Self, EngineError> {
        let local = UdpSocket::bind(("0.0.0.0", config.local_port))?;
        local.set_nonblocking(true)?;

        let target = format!("{}:{}", config.receiver_host, config.receiver_port);
        let receiver = target
            .to_socket_addrs()
            .map_err(|_| EngineError::Resolve(target.clone()))?
            .find(SocketAddr::is_ipv4)
            .ok_or(EngineError::Resolve(target))?;

        let mut session_id = [0u8; SRTLA_ID_LEN];
        rand::thread_rng().fill_bytes(&mut session_id);

        let shared = Arc::new(Shared {
            running: AtomicBool::new(true),
            local,
            receiver,
            session_id: Mutex::new(session_id),
            paths: Mutex::new(Vec::new()),
            pool: VirtualIpPool::new(),
            dropped_no_path: AtomicU64::new(0),
        });

        let loop_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("srtla-engine".to_string())
            .spawn(move || run_loop(loop_shared))?;

        info!(
            local = %shared.local.local_addr()?,
            receiver = %receiver,
            "srtla sender started"
        );

        Ok(SrtlaSender {
            shared,
            thread: Some(thread),
        })
    }

    /// The address of the local listening socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.shared.local.local_addr()
    }

    /// The resolved receiver address.
    pub fn receiver_addr(&self) -> SocketAddr {
        self.shared.receiver
    }

    /// Register a new path. The socket must be a UDP socket already bound
    /// to the desired egress interface and connected to the receiver; the
    /// engine takes ownership and closes it at teardown or zombie expiry.
    ///
    /// Returns the path's virtual IP.
    pub fn add_path(&self, socket: UdpSocket, spec: PathSpec) -> Result<String, EngineError> {
        if !self.shared.running.load(Ordering::Acquire) {
            return Err(EngineError::NotRunning);
        }

        let session_id = *self.shared.session_id.lock();
        let mut paths = self.shared.paths.lock();

        let virtual_ip = match &spec.virtual_ip {
            Some(ip) => {
                if let Some(idx) = paths.iter().position(|p| p.virtual_ip() == ip) {
                    if !paths[idx].is_zombie() {
                        return Err(EngineError::DuplicatePath(ip.clone()));
                    }
                    // The zombie already holds the pool label; hand it over.
                    info!(vip = %ip, "replacing zombie path");
                    paths.remove(idx);
                } else if !self.shared.pool.claim(ip) {
                    return Err(EngineError::InvalidVirtualIp(ip.clone()));
                }
                ip.clone()
            }
            None => self.shared.pool.allocate().ok_or(EngineError::PoolExhausted)?,
        };

        if let Err(err) = srtla_io::configure_path_socket(&socket) {
            self.shared.pool.release(&virtual_ip);
            return Err(EngineError::Io(err));
        }

        let mut path = Path::new(socket, virtual_ip.clone(), spec.kind, spec.weight);
        send_reg1(&session_id, &mut path);
        info!(vip = %virtual_ip, kind = path.kind(), "path added, registration started");
        paths.push(path);

        Ok(virtual_ip)
    }

    /// Withdraw a path. It becomes a zombie: its socket is still read for
    /// 15 seconds so late receiver replies reach the encoder, then it is
    /// destroyed and its virtual IP returns to the pool.
    ///
    /// Refused when the target is the last connected path.
    pub fn remove_path(&self, virtual_ip: &str) -> Result<(), EngineError> {
        let mut paths = self.shared.paths.lock();

        let idx = paths
            .iter()
            .position(|p| p.virtual_ip() == virtual_ip && !p.is_zombie())
            .ok_or_else(|| EngineError::UnknownPath(virtual_ip.to_string()))?;

        let connected = paths.iter().filter(|p| p.is_connected()).count();
        if paths[idx].is_connected() && connected <= 1 {
            warn!(vip = %virtual_ip, "refusing removal of last connected path");
            return Err(EngineError::LastPath);
        }

        paths[idx].make_zombie();
        info!(vip = %virtual_ip, "path withdrawn, draining as zombie");

        // If a single connected path remains, the receiver will keep
        // acknowledging the zombie's packets to the zombie's address; those
        // acknowledgements never reach the survivor. Clear its tracking so
        // its inflight count cannot inflate forever.
        let survivors: Vec<usize> = paths
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_connected())
            .map(|(i, _)| i)
            .collect();
        if let [only] = survivors[..] {
            let survivor = &mut paths[only];
            debug!(vip = %survivor.virtual_ip(), "clearing inflight on last remaining path");
            survivor.clear_inflight();
            survivor.reset_window();
        }

        // Nudge the receiver so it redirects ACK traffic to live paths.
        let frame = proto::build_keepalive(monotonic_ms());
        for path in paths.iter_mut().filter(|p| p.is_connected()) {
            if path.send(&frame).is_ok() {
                path.touch_sent();
            }
        }

        Ok(())
    }

    /// Update a path's advisory weight.
    pub fn update_weight(&self, virtual_ip: &str, weight: u32) -> Result<(), EngineError> {
        let mut paths = self.shared.paths.lock();
        let path = paths
            .iter_mut()
            .find(|p| p.virtual_ip() == virtual_ip && !p.is_zombie())
            .ok_or_else(|| EngineError::UnknownPath(virtual_ip.to_string()))?;
        path.set_weight(weight);
        Ok(())
    }

    /// Demote every live path to `Disconnected` with a clean window; the
    /// loop re-registers each on its next iteration. The learned encoder
    /// identity is preserved.
    pub fn refresh_all_paths(&self) {
        let mut paths = self.shared.paths.lock();
        for path in paths.iter_mut().filter(|p| !p.is_zombie()) {
            path.set_state(PathState::Disconnected);
            path.clear_inflight();
            path.reset_window();
            path.mark_received();
        }
        info!(count = paths.len(), "all paths reset for re-registration");
    }

    /// Point-in-time view of every path, zombies included.
    pub fn stats_snapshot(&self) -> Vec<PathSnapshot> {
        self.shared.paths.lock().iter().map(PathSnapshot::of).collect()
    }

    /// Number of connected, non-zombie paths.
    pub fn connected_path_count(&self) -> usize {
        self.shared
            .paths
            .lock()
            .iter()
            .filter(|p| p.is_connected())
            .count()
    }

    /// Datagrams dropped because no path was eligible.
    pub fn dropped_datagrams(&self) -> u64 {
        self.shared.dropped_no_path.load(Ordering::Relaxed)
    }

    /// Stop the engine: join the loop thread, close every socket, release
    /// every virtual IP.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        // Break the readiness wait early.
        let _ = socket2::SockRef::from(&self.shared.local).shutdown(std::net::Shutdown::Both);

        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }

        let mut paths = self.shared.paths.lock();
        for path in paths.drain(..) {
            self.shared.pool.release(path.virtual_ip());
        }
        info!("srtla sender stopped");
    }
}

impl Drop for SrtlaSender {
    fn drop(&mut self) {
        self.stop();
    }
}

fn send_reg1(session_id: &[u8; SRTLA_ID_LEN], path: &mut Path) {
    let frame = proto::build_reg1(session_id);
    match path.send(&frame) {
        Ok(_) => debug!(vip = %path.virtual_ip(), "REG1 sent"),
        Err(err) => warn!(vip = %path.virtual_ip(), %err, "REG1 send failed"),
    }
    path.begin_registration(PathState::RegisteringReg1);
}

fn run_loop(shared: Arc<Shared>) {
    let mut buf = vec![0u8; RECV_BUFFER_LEN];
    let mut poller = ReadPoller::new();
    let mut encoder: Option<SocketAddr> = None;
    let mut encoder_activity = Timestamp::now();
    let mut keepalive_timer = Timer::new(KEEPALIVE_INTERVAL);
    let mut stats_timer = Timer::new(STATS_LOG_INTERVAL);
    let mut zombie_timer = Timer::new(ZOMBIE_SWEEP_INTERVAL);

    debug!("engine loop running");

    while shared.running.load(Ordering::Acquire) {
        poller.clear();
        let local_slot = poller.register(shared.local.as_raw_fd());
        let path_slots: Vec<(usize, String)> = {
            let paths = shared.paths.lock();
            paths
                .iter()
                .map(|p| (poller.register(p.raw_fd()), p.virtual_ip().to_string()))
                .collect()
        };

        match poller.wait(LOOP_TICK) {
            Ok(_) => {}
            Err(err) => {
                if shared.running.load(Ordering::Acquire) {
                    error!(%err, "readiness wait failed");
                }
                break;
            }
        }

        if poller.readable(local_slot) {
            match shared.local.recv_from(&mut buf) {
                Ok((len, from)) => {
                    if encoder != Some(from) {
                        info!(%from, reconnect = encoder.is_some(), "encoder address learned");
                        encoder = Some(from);
                    }
                    encoder_activity = Timestamp::now();
                    handle_outgoing(&shared, &buf[..len]);
                }
                Err(ref err) if is_would_block(err) => {}
                Err(err) => {
                    if shared.running.load(Ordering::Acquire) {
                        warn!(%err, "local socket receive failed");
                    }
                }
            }
        }

        for (slot, vip) in &path_slots {
            if poller.readable(*slot) {
                service_path(&shared, vip, &mut buf, &mut encoder);
            }
        }

        if keepalive_timer.try_fire() {
            send_keepalives(&shared);
        }

        recover_paths(&shared);

        if stats_timer.try_fire() {
            log_path_stats(&shared);
        }

        if zombie_timer.try_fire() {
            reap_zombies(&shared);
        }

        if encoder.is_some() && encoder_activity.elapsed() > ENCODER_IDLE_TIMEOUT {
            info!("encoder idle, forgetting its address");
            encoder = None;
        }
    }

    debug!("engine loop stopped");
}

/// One datagram from the encoder: pick the best path and forward.
fn handle_outgoing(shared: &Shared, data: &[u8]) {
    let seq = proto::srt_sequence(data);

    let mut paths = shared.paths.lock();

    let mut best: Option<usize> = None;
    let mut best_score = -1;
    for (i, path) in paths.iter().enumerate() {
        if !path.eligible() {
            continue;
        }
        let score = path.score();
        if score > best_score {
            best = Some(i);
            best_score = score;
        }
    }

    let Some(idx) = best else {
        shared.dropped_no_path.fetch_add(1, Ordering::Relaxed);
        debug!(len = data.len(), "no eligible path, datagram dropped");
        return;
    };

    let path = &mut paths[idx];
    match seq {
        Some(seq) => path.mark_sent(seq, data.len()),
        None => path.note_sent(data.len()),
    }

    if let Err(err) = path.send(data) {
        if matches!(
            err.kind(),
            io::ErrorKind::NotConnected | io::ErrorKind::InvalidInput
        ) {
            // The socket itself is unusable; re-registration cannot help.
            error!(vip = %path.virtual_ip(), %err, "path socket broken, failing path");
            path.set_state(PathState::Failed);
        } else {
            warn!(vip = %path.virtual_ip(), %err, "path send failed, staling path");
            path.mark_stale();
        }
    }
}

/// One datagram from a path socket: classify and dispatch.
fn service_path(shared: &Shared, vip: &str, buf: &mut [u8], encoder: &mut Option<SocketAddr>) {
    let mut paths = shared.paths.lock();
    let Some(idx) = paths.iter().position(|p| p.virtual_ip() == vip) else {
        return;
    };

    let len = match paths[idx].recv(buf) {
        Ok(len) => len,
        Err(ref err) if is_would_block(err) => return,
        Err(err) => {
            warn!(vip, %err, "path receive failed");
            return;
        }
    };
    paths[idx].mark_received();
    let data = &buf[..len];

    let Some(kind) = proto::classify(data) else {
        debug!(vip, len, "unclassifiable datagram");
        return;
    };

    match kind {
        PacketKind::Keepalive => {}

        PacketKind::SrtlaAck => match proto::parse_srtla_ack(data) {
            Ok(seqs) => {
                for seq in seqs {
                    for path in paths.iter_mut().filter(|p| p.is_connected()) {
                        path.on_srtla_ack(seq);
                    }
                }
            }
            Err(err) => warn!(vip, %err, "malformed SRTLA ACK"),
        },

        PacketKind::SrtAck => {
            if let Some(ack) = proto::srt_ack_number(data) {
                for path in paths.iter_mut().filter(|p| p.is_connected()) {
                    path.on_srt_ack(ack);
                }
            }
            forward_to_encoder(shared, encoder, data);
        }

        PacketKind::SrtNak => {
            for seq in proto::srt_nak_sequences(data) {
                for path in paths.iter_mut().filter(|p| p.is_connected()) {
                    path.on_srt_nak(seq);
                }
            }
            forward_to_encoder(shared, encoder, data);
        }

        PacketKind::SrtShutdown => {
            forward_to_encoder(shared, encoder, data);
            info!(vip, "SRT shutdown from receiver, forgetting encoder");
            *encoder = None;
        }

        PacketKind::SrtData(_) | PacketKind::SrtControl => {
            forward_to_encoder(shared, encoder, data);
        }

        PacketKind::SrtlaData => match proto::parse_srtla_data(data) {
            Ok(frame) => {
                if frame.virtual_ip.to_string() != vip {
                    debug!(vip, framed = %frame.virtual_ip, "SRTLA data frame for another path");
                }
                forward_to_encoder(shared, encoder, frame.payload);
            }
            Err(err) => warn!(vip, %err, "malformed SRTLA data frame"),
        },

        PacketKind::Reg2 => handle_reg2(shared, &mut paths[..], data),

        PacketKind::Reg3 => {
            info!(vip, "REG3 received, path connected");
            paths[idx].set_state(PathState::Connected);
        }

        PacketKind::RegErr | PacketKind::RegNgp => {
            error!(vip, ?kind, "registration rejected, path failed");
            paths[idx].set_state(PathState::Failed);
        }

        PacketKind::Reg1 => {
            // Sender-side: REG1 only ever travels towards the receiver.
            debug!(vip, "unexpected REG1 from receiver, ignored");
        }
    }
}

/// First REG2 commits the full session id and is re-broadcast on every path
/// still registering.
fn handle_reg2(shared: &Shared, paths: &mut [Path], data: &[u8]) {
    let id = match proto::parse_reg2_id(data) {
        Ok(id) => id,
        Err(err) => {
            warn!(%err, "malformed REG2");
            return;
        }
    };

    let committed = {
        let mut session = shared.session_id.lock();
        if session[..SRTLA_ID_LEN / 2] != id[..SRTLA_ID_LEN / 2] {
            warn!("REG2 session id prefix mismatch, dropping");
            return;
        }
        session.copy_from_slice(id);
        *session
    };

    info!("session id committed, broadcasting REG2");
    let frame = proto::build_reg2(&committed);
    for path in paths.iter_mut() {
        if matches!(path.state(), PathState::Zombie | PathState::Failed) {
            continue;
        }
        match path.send(&frame) {
            Ok(_) => debug!(vip = %path.virtual_ip(), "REG2 sent"),
            Err(err) => warn!(vip = %path.virtual_ip(), %err, "REG2 send failed"),
        }
        if !path.is_connected() {
            path.begin_registration(PathState::RegisteringReg2);
        }
    }
}

fn send_keepalives(shared: &Shared) {
    let frame = proto::build_keepalive(monotonic_ms());
    let mut paths = shared.paths.lock();
    for path in paths.iter_mut() {
        if matches!(path.state(), PathState::Zombie | PathState::Failed) {
            continue;
        }
        if path.send(&frame).is_ok() {
            path.touch_sent();
        }
    }
}

/// Restart registration on paths that are new, timed out, or stuck in a
/// registration state past its deadline.
fn recover_paths(shared: &Shared) {
    let session_id = *shared.session_id.lock();
    let mut paths = shared.paths.lock();
    for path in paths.iter_mut() {
        match path.state() {
            PathState::Disconnected => {
                send_reg1(&session_id, path);
            }
            PathState::Connected if path.timed_out() => {
                info!(vip = %path.virtual_ip(), "path timed out, re-registering");
                send_reg1(&session_id, path);
            }
            PathState::RegisteringReg1 | PathState::RegisteringReg2
                if path.registration_expired() =>
            {
                debug!(vip = %path.virtual_ip(), "registration timed out, retrying REG1");
                send_reg1(&session_id, path);
            }
            _ => {}
        }
    }
}

fn reap_zombies(shared: &Shared) {
    let mut paths = shared.paths.lock();
    paths.retain(|path| {
        if path.zombie_expired() {
            info!(vip = %path.virtual_ip(), "zombie expired, releasing");
            shared.pool.release(path.virtual_ip());
            false
        } else {
            true
        }
    });
}

fn log_path_stats(shared: &Shared) {
    let paths = shared.paths.lock();
    for path in paths.iter() {
        debug!(
            vip = %path.virtual_ip(),
            state = %path.state(),
            window = path.window(),
            inflight = path.inflight_len(),
            score = path.score(),
            rtt_ms = path.smooth_rtt_ms(),
            "path stats"
        );
    }
}

fn forward_to_encoder(shared: &Shared, encoder: &Option<SocketAddr>, data: &[u8]) {
    let Some(addr) = encoder else {
        debug!("reply received before encoder address is known, dropped");
        return;
    };
    if let Err(err) = shared.local.send_to(data, addr) {
        warn!(%err, "forward to encoder failed");
    }
}
