//! Packet codec: encodes/decodes the three wire framings distinguished
//! purely by datagram length - no magic byte. A data
//! packet is `options(1) + sequence(8) + len-prefixed payload`, which is
//! always at least 11 bytes, so it can never be mistaken for the 8-byte
//! ack framing.

use crate::options::SendOptions;
use netline_support::wire::{Reader, WriteExt, Writer};
use netline_support::CodecError;

/// Size in bytes of a bare ack datagram (just the sequence number).
pub const ACK_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub options: SendOptions,
    pub sequence: u64,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Writer::new();
        out.write_u8_le(self.options.bits()).expect("vec write is infallible");
        out.write_u64_le(self.sequence).expect("vec write is infallible");
        out.write_bytes(&self.payload).expect("vec write is infallible");
        out
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Packet, CodecError> {
        let mut r = Reader::new(bytes);
        let options = SendOptions::from_bits(r.read_u8()?);
        let sequence = r.read_u64()?;
        let payload = r.read_bytes()?;
        Ok(Packet {
            options,
            sequence,
            payload,
        })
    }
}

/// Empty datagram used to keep a connection's liveness timer fresh.
#[inline]
pub fn make_heartbeat() -> Vec<u8> {
    Vec::new()
}

/// Encodes a bare acknowledgement for `sequence`. Always exactly `ACK_SIZE` bytes.
pub fn make_ack(sequence: u64) -> Vec<u8> {
    let mut out = Writer::with_capacity(ACK_SIZE);
    out.write_u64_le(sequence).expect("vec write is infallible");
    debug_assert_eq!(out.len(), ACK_SIZE);
    out
}

/// The three wire framings a received datagram can classify as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Heartbeat,
    Ack(u64),
    Data(Packet),
}

/// Classifies a raw datagram by length first, then decodes it.
pub fn classify(bytes: &[u8]) -> Result<Frame, CodecError> {
    if bytes.is_empty() {
        return Ok(Frame::Heartbeat);
    }

    if bytes.len() == ACK_SIZE {
        let mut r = Reader::new(bytes);
        return Ok(Frame::Ack(r.read_u64()?));
    }

    Packet::deserialize(bytes).map(Frame::Data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_data_packet() {
        let packet = Packet {
            options: SendOptions::RELIABLE,
            sequence: 42,
            payload: b"hello world".to_vec(),
        };
        let bytes = packet.serialize();
        assert_eq!(Packet::deserialize(&bytes).unwrap(), packet);
    }

    #[test]
    fn data_packet_never_collides_with_ack_size() {
        let packet = Packet {
            options: SendOptions::NONE,
            sequence: 0,
            payload: Vec::new(),
        };
        assert!(packet.serialize().len() > ACK_SIZE);
    }

    #[test]
    fn classifies_heartbeat() {
        assert_eq!(classify(&make_heartbeat()).unwrap(), Frame::Heartbeat);
    }

    #[test]
    fn classifies_ack() {
        assert_eq!(classify(&make_ack(7)).unwrap(), Frame::Ack(7));
    }

    #[test]
    fn classifies_data() {
        let packet = Packet {
            options: SendOptions::HIGH_PRIORITY,
            sequence: 1,
            payload: vec![1, 2, 3],
        };
        let bytes = packet.serialize();
        assert_eq!(classify(&bytes).unwrap(), Frame::Data(packet));
    }

    #[test]
    fn truncated_data_fails_closed() {
        assert_eq!(classify(&[1, 2, 3, 4, 5, 6, 7, 8, 9]), Err(CodecError::Truncated));
    }
}
