//! Unreliable channel: best-effort delivery with monotonic sequence
//! numbers. Duplicates and reorderings are discarded on
//! receive; nothing is ever retransmitted.

use crate::codec::Packet;
use crate::options::SendOptions;
use std::collections::VecDeque;

pub struct UnreliableChannel {
    send_queue: VecDeque<Packet>,
    recv_queue: VecDeque<Vec<u8>>,
    next_send_seq: u64,
    last_recv_seq: u64,
}

impl UnreliableChannel {
    pub fn new() -> Self {
        UnreliableChannel {
            send_queue: VecDeque::new(),
            recv_queue: VecDeque::new(),
            next_send_seq: 0,
            last_recv_seq: 0,
        }
    }

    /// Queues a best-effort payload for sending. `options` must not carry
    /// the `Reliable` flag - the connection routes reliable sends to the
    /// other channel before they ever reach here.
    pub fn enqueue_send(&mut self, payload: Vec<u8>, options: SendOptions) {
        debug_assert!(!options.is_reliable(), "reliable send routed to unreliable channel");
        self.next_send_seq += 1;
        self.send_queue.push_back(Packet {
            options,
            sequence: self.next_send_seq,
            payload,
        });
    }

    /// Pops the next packet to put on the wire. Each best-effort packet
    /// is sent at most once by this channel.
    pub fn take_next_send(&mut self) -> Option<Packet> {
        self.send_queue.pop_front()
    }

    /// Accepts a received packet, dropping it silently unless its
    /// sequence strictly advances `last_recv_seq`.
    pub fn accept_recv(&mut self, packet: Packet) {
        if packet.sequence > self.last_recv_seq {
            self.last_recv_seq = packet.sequence;
            self.recv_queue.push_back(packet.payload);
        }
    }

    pub fn take_next_recv(&mut self) -> Option<Vec<u8>> {
        self.recv_queue.pop_front()
    }
}

impl Default for UnreliableChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(seq: u64, payload: &str) -> Packet {
        Packet {
            options: SendOptions::NONE,
            sequence: seq,
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[test]
    fn send_sequence_is_monotonic() {
        let mut chan = UnreliableChannel::new();
        chan.enqueue_send(b"a".to_vec(), SendOptions::NONE);
        chan.enqueue_send(b"b".to_vec(), SendOptions::NONE);

        assert_eq!(chan.take_next_send().unwrap().sequence, 1);
        assert_eq!(chan.take_next_send().unwrap().sequence, 2);
        assert!(chan.take_next_send().is_none());
    }

    #[test]
    fn drops_duplicates_and_reorderings() {
        let mut chan = UnreliableChannel::new();
        chan.accept_recv(packet(1, "one"));
        chan.accept_recv(packet(1, "dup"));
        chan.accept_recv(packet(3, "three"));
        chan.accept_recv(packet(2, "stale"));

        assert_eq!(chan.take_next_recv().unwrap(), b"one".to_vec());
        assert_eq!(chan.take_next_recv().unwrap(), b"three".to_vec());
        assert!(chan.take_next_recv().is_none());
    }
}
