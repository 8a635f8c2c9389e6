//! Socket manager: owns the datagram endpoint and the peer ->
//! `Connection` map, performs I/O and reports new/dead peers.
//!
//! The datagram transport is a pluggable trait, not hard-wired to
//! `std::net::UdpSocket` - the same habit of keeping `Channel`/`Buffer`
//! generic over `io::Read + io::Write` so tests can swap in a
//! `MockChannel` (`neutronium::net::buffer` tests). Here the production
//! implementation is `UdpTransport`; tests use an in-memory lossy
//! transport instead.

use crate::config::Config;
use crate::connection::Connection;
use crate::options::SendOptions;
use crate::peer::PeerAddr;
use netline_support::error::ErrorUtils;
use netline_support::TransportError;
use std::collections::BTreeMap;
use std::io;
use std::time::Instant;

/// A non-blocking datagram transport. `send_to`/`recv_from` must never
/// block; `io::ErrorKind::WouldBlock` signals "nothing to do right now".
pub trait DatagramIo {
    fn send_to(&mut self, buf: &[u8], peer: PeerAddr) -> io::Result<usize>;
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, PeerAddr)>;
}

/// Production transport backed by a non-blocking `std::net::UdpSocket`.
pub struct UdpTransport {
    socket: std::net::UdpSocket,
}

impl UdpTransport {
    pub fn bind(addr: std::net::SocketAddr) -> io::Result<Self> {
        let socket = std::net::UdpSocket::bind(addr)?;
        socket.set_nonblocking(true)?;
        Ok(UdpTransport { socket })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.socket.local_addr()
    }
}

impl DatagramIo for UdpTransport {
    #[inline]
    fn send_to(&mut self, buf: &[u8], peer: PeerAddr) -> io::Result<usize> {
        self.socket.send_to(buf, peer.socket_addr())
    }

    #[inline]
    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, PeerAddr)> {
        let (n, addr) = self.socket.recv_from(buf)?;
        Ok((n, PeerAddr::from(addr)))
    }
}

/// The set of peers that changed connectivity status during one `tick()`.
#[derive(Debug, Default, Clone)]
pub struct TickReport {
    pub new_peers: Vec<PeerAddr>,
    pub dead_peers: Vec<PeerAddr>,
}

pub struct Socket<T: DatagramIo> {
    io: T,
    config: Config,
    peers: BTreeMap<PeerAddr, Connection>,
    pending_new_peers: Vec<PeerAddr>,
    log: slog::Logger,
}

impl<T: DatagramIo> Socket<T> {
    pub fn new(io: T, config: Config) -> Self {
        Socket {
            io,
            config,
            peers: BTreeMap::new(),
            pending_new_peers: Vec::new(),
            log: netline_support::logging::discard_logger(),
        }
    }

    pub fn with_logger(mut self, log: slog::Logger) -> Self {
        self.log = log;
        self
    }

    /// Idempotent: creates a fresh connection for `peer` if one does not
    /// already exist, recording it as newly connected for this tick.
    pub fn connect(&mut self, peer: PeerAddr, now: Instant) {
        if !self.peers.contains_key(&peer) {
            self.peers.insert(peer, Connection::new(now));
            self.pending_new_peers.push(peer);
        }
    }

    pub fn is_connected(&self, peer: PeerAddr) -> bool {
        self.peers.contains_key(&peer)
    }

    /// Peers in deterministic (address-sorted) order.
    pub fn connections(&self) -> Vec<PeerAddr> {
        self.peers.keys().copied().collect()
    }

    /// Queues `payload` for `peer`, connecting lazily if needed. No
    /// immediate I/O happens here - delivery happens on the next `tick`.
    pub fn send(&mut self, payload: Vec<u8>, peer: PeerAddr, options: SendOptions, now: Instant) {
        self.connect(peer, now);
        self.peers.get_mut(&peer).expect("just connected").enqueue(payload, options);
    }

    /// Scans peers in deterministic order and returns the first
    /// available inbound payload.
    pub fn receive(&mut self) -> Option<(Vec<u8>, PeerAddr)> {
        for (&peer, conn) in self.peers.iter_mut() {
            if let Some(payload) = conn.poll_inbound() {
                return Some((payload, peer));
            }
        }
        None
    }

    /// Flushes outbound traffic, drains inbound traffic, then reaps dead
    /// connections - in that order, so responses queued last tick are on
    /// the wire before this tick's inputs are processed.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        self.flush_outbound(now);
        self.drain_inbound(now);

        let new_peers = std::mem::take(&mut self.pending_new_peers);
        let dead_peers = self.reap_dead(now);

        TickReport { new_peers, dead_peers }
    }

    fn flush_outbound(&mut self, now: Instant) {
        for (&peer, conn) in self.peers.iter_mut() {
            while let Some(bytes) = conn.poll_outbound(now, &self.config) {
                let result: Result<usize, TransportError> =
                    self.io.send_to(&bytes, peer).map_err(TransportError::from);
                if result.has_failed() {
                    slog::warn!(self.log, "transport send failed"; "peer" => %peer);
                }
            }
        }
    }

    fn drain_inbound(&mut self, now: Instant) {
        let mut buf = vec![0u8; self.config.max_datagram];
        loop {
            match self.io.recv_from(&mut buf) {
                Ok((n, sender)) => {
                    self.connect(sender, now);
                    self.peers
                        .get_mut(&sender)
                        .expect("just connected")
                        .drain_received(&buf[..n], now);
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    slog::warn!(self.log, "transport receive failed"; "error" => %err);
                    break;
                }
            }
        }
    }

    fn reap_dead(&mut self, now: Instant) -> Vec<PeerAddr> {
        let dead: Vec<PeerAddr> = self
            .peers
            .iter()
            .filter(|(_, conn)| !conn.is_alive(now, &self.config))
            .map(|(&peer, _)| peer)
            .collect();

        for peer in &dead {
            self.peers.remove(peer);
            slog::info!(self.log, "peer reaped"; "peer" => %peer);
        }

        dead
    }
}
