//! Reliable channel: ordered, exactly-once delivery over an
//! unreliable transport. Unacked packets are retransmitted on a
//! priority-aware timer; acks are small and prioritized ahead of
//! retransmits on the send side.

use crate::codec::{self, Packet};
use crate::config::Config;
use crate::options::SendOptions;
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

struct SentPacket {
    packet: Packet,
    /// `None` until the packet has been sent for the first time - it is
    /// then immediately eligible for its first transmission regardless
    /// of the resend interval.
    last_sent_time: Option<Instant>,
}

pub struct ReliableChannel {
    send_queue: Vec<SentPacket>,
    recv_buffer: BTreeMap<u64, Vec<u8>>,
    ack_egress: VecDeque<u64>,
    next_send_seq: u64,
    expected_recv_seq: u64,
}

impl ReliableChannel {
    pub fn new() -> Self {
        ReliableChannel {
            send_queue: Vec::new(),
            recv_buffer: BTreeMap::new(),
            ack_egress: VecDeque::new(),
            next_send_seq: 0,
            expected_recv_seq: 1,
        }
    }

    /// Queues a reliable payload for sending. Assigns the next sequence
    /// number; the packet stays in the send queue, retransmitted on a
    /// timer, until `on_ack` retires it.
    pub fn enqueue_send(&mut self, payload: Vec<u8>, options: SendOptions) {
        self.next_send_seq += 1;
        self.send_queue.push(SentPacket {
            packet: Packet {
                options,
                sequence: self.next_send_seq,
                payload,
            },
            last_sent_time: None,
        });
    }

    /// Returns the next bytes to put on the wire, in priority order:
    /// pending acks first, then the first eligible unacked packet.
    pub fn take_next_send(&mut self, now: Instant, config: &Config) -> Option<Vec<u8>> {
        if let Some(seq) = self.ack_egress.pop_front() {
            return Some(codec::make_ack(seq));
        }

        for sent in self.send_queue.iter_mut() {
            let threshold = if sent.packet.options.is_high_priority() {
                config.high_priority_resend_interval
            } else {
                config.resend_interval
            };

            let eligible = match sent.last_sent_time {
                None => true,
                Some(last) => now.duration_since(last) >= threshold,
            };

            if eligible {
                sent.last_sent_time = Some(now);
                return Some(sent.packet.serialize());
            }
        }

        None
    }

    /// Always acks the packet's sequence and inserts it into the ordered
    /// receive buffer (idempotent - a duplicate simply overwrites).
    pub fn accept_recv(&mut self, packet: Packet) {
        self.ack_egress.push_back(packet.sequence);
        self.recv_buffer.insert(packet.sequence, packet.payload);
    }

    /// Hands back the next payload only if it is exactly the next one
    /// expected in sequence, enforcing strict in-order, exactly-once
    /// delivery to the caller.
    pub fn take_next_recv(&mut self) -> Option<Vec<u8>> {
        if self.recv_buffer.contains_key(&self.expected_recv_seq) {
            let payload = self.recv_buffer.remove(&self.expected_recv_seq);
            self.expected_recv_seq += 1;
            payload
        } else {
            None
        }
    }

    /// Retires the packet with matching sequence from the send queue.
    /// Acks for unknown sequences are ignored.
    pub fn on_ack(&mut self, sequence: u64) {
        self.send_queue.retain(|sent| sent.packet.sequence != sequence);
    }
}

impl Default for ReliableChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_send_is_immediately_eligible() {
        let mut chan = ReliableChannel::new();
        let config = Config::release();
        chan.enqueue_send(b"a".to_vec(), SendOptions::RELIABLE);

        let bytes = chan.take_next_send(Instant::now(), &config).unwrap();
        let packet = Packet::deserialize(&bytes).unwrap();
        assert_eq!(packet.sequence, 1);
    }

    #[test]
    fn does_not_resend_before_interval_elapses() {
        let mut chan = ReliableChannel::new();
        let config = Config::release();
        chan.enqueue_send(b"a".to_vec(), SendOptions::RELIABLE);

        let t0 = Instant::now();
        chan.take_next_send(t0, &config).unwrap();
        assert!(chan.take_next_send(t0, &config).is_none());

        let t1 = t0 + config.resend_interval;
        assert!(chan.take_next_send(t1, &config).is_some());
    }

    #[test]
    fn high_priority_resends_faster() {
        let mut chan = ReliableChannel::new();
        let config = Config::release();
        chan.enqueue_send(b"a".to_vec(), SendOptions::RELIABLE | SendOptions::HIGH_PRIORITY);

        let t0 = Instant::now();
        chan.take_next_send(t0, &config).unwrap();

        let t1 = t0 + config.high_priority_resend_interval;
        assert!(chan.take_next_send(t1, &config).is_some());
    }

    #[test]
    fn ack_retires_packet_from_retransmission() {
        let mut chan = ReliableChannel::new();
        let config = Config::release();
        chan.enqueue_send(b"a".to_vec(), SendOptions::RELIABLE);

        let t0 = Instant::now();
        chan.take_next_send(t0, &config).unwrap();
        chan.on_ack(1);

        let t1 = t0 + config.resend_interval * 10;
        assert!(chan.take_next_send(t1, &config).is_none());
    }

    #[test]
    fn receive_enforces_strict_order() {
        let mut chan = ReliableChannel::new();

        chan.accept_recv(Packet {
            options: SendOptions::RELIABLE,
            sequence: 2,
            payload: b"two".to_vec(),
        });
        // Sequence 2 arrived before 1 - it must not be handed out yet.
        assert!(chan.take_next_recv().is_none());

        chan.accept_recv(Packet {
            options: SendOptions::RELIABLE,
            sequence: 1,
            payload: b"one".to_vec(),
        });

        assert_eq!(chan.take_next_recv().unwrap(), b"one".to_vec());
        assert_eq!(chan.take_next_recv().unwrap(), b"two".to_vec());
        assert!(chan.take_next_recv().is_none());
    }

    #[test]
    fn duplicate_receive_is_idempotent() {
        let mut chan = ReliableChannel::new();
        let packet = Packet {
            options: SendOptions::RELIABLE,
            sequence: 1,
            payload: b"one".to_vec(),
        };
        chan.accept_recv(packet.clone());
        chan.accept_recv(packet);

        assert_eq!(chan.take_next_recv().unwrap(), b"one".to_vec());
        assert!(chan.take_next_recv().is_none());
        // Two acks were still queued for egress - one per received datagram.
        assert_eq!(chan.ack_egress.len(), 2);
    }

    #[test]
    fn acks_are_prioritized_over_retransmits() {
        let mut chan = ReliableChannel::new();
        let config = Config::release();
        chan.enqueue_send(b"a".to_vec(), SendOptions::RELIABLE);
        chan.accept_recv(Packet {
            options: SendOptions::RELIABLE,
            sequence: 5,
            payload: b"x".to_vec(),
        });

        let bytes = chan.take_next_send(Instant::now(), &config).unwrap();
        assert_eq!(bytes.len(), codec::ACK_SIZE);
    }

    #[test]
    fn unknown_ack_is_ignored() {
        let mut chan = ReliableChannel::new();
        let config = Config::release();
        chan.enqueue_send(b"a".to_vec(), SendOptions::RELIABLE);
        chan.on_ack(999);

        assert!(chan.take_next_send(Instant::now(), &config).is_some());
    }
}
