//! Connection: owns one reliable and one unreliable channel for a
//! single peer, tracks send/receive timestamps, and decides liveness
//! and heartbeat cadence.

use crate::channel::{ReliableChannel, UnreliableChannel};
use crate::codec::{self, Frame, Packet};
use crate::config::Config;
use crate::options::SendOptions;
use std::time::Instant;

pub struct Connection {
    reliable: ReliableChannel,
    unreliable: UnreliableChannel,
    last_send_time: Instant,
    last_recv_time: Instant,
}

impl Connection {
    /// Creates a connection considered freshly alive as of `now` - a
    /// connection is lazily created on first send-to or first
    /// receive-from.
    pub fn new(now: Instant) -> Self {
        Connection {
            reliable: ReliableChannel::new(),
            unreliable: UnreliableChannel::new(),
            last_send_time: now,
            last_recv_time: now,
        }
    }

    /// Routes the payload to the reliable or unreliable channel based on
    /// `options`.
    pub fn enqueue(&mut self, payload: Vec<u8>, options: SendOptions) {
        if options.is_reliable() {
            self.reliable.enqueue_send(payload, options);
        } else {
            self.unreliable.enqueue_send(payload, options);
        }
    }

    /// Called by the socket manager on ingress: classifies the raw
    /// datagram and dispatches it to the right channel, or drops it if
    /// it fails to classify as any known frame.
    pub fn drain_received(&mut self, bytes: &[u8], now: Instant) {
        self.last_recv_time = now;

        let frame = match codec::classify(bytes) {
            Ok(frame) => frame,
            Err(_) => return,
        };

        match frame {
            Frame::Heartbeat => {}
            Frame::Ack(seq) => self.reliable.on_ack(seq),
            Frame::Data(packet) => {
                if packet.options.is_reliable() {
                    self.reliable.accept_recv(packet);
                } else {
                    self.unreliable.accept_recv(packet);
                }
            }
        }
    }

    /// Attempts reliable egress first, then unreliable, then a
    /// heartbeat if the connection has been idle for
    /// `config.heartbeat_interval`. Updates `last_send_time` whenever
    /// anything is returned.
    pub fn poll_outbound(&mut self, now: Instant, config: &Config) -> Option<Vec<u8>> {
        if let Some(bytes) = self.reliable.take_next_send(now, config) {
            self.last_send_time = now;
            return Some(bytes);
        }

        if let Some(packet) = self.unreliable.take_next_send() {
            self.last_send_time = now;
            return Some(packet.serialize());
        }

        if now.duration_since(self.last_send_time) >= config.heartbeat_interval {
            self.last_send_time = now;
            return Some(codec::make_heartbeat());
        }

        None
    }

    /// Attempts reliable delivery first (strict in-order), then
    /// unreliable.
    pub fn poll_inbound(&mut self) -> Option<Vec<u8>> {
        self.reliable.take_next_recv().or_else(|| self.unreliable.take_next_recv())
    }

    pub fn is_alive(&self, now: Instant, config: &Config) -> bool {
        now.duration_since(self.last_recv_time) < config.keep_alive_timeout
    }

    #[cfg(test)]
    pub(crate) fn last_recv_time(&self) -> Instant {
        self.last_recv_time
    }
}
