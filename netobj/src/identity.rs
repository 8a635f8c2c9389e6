//! Object identity and role: the key a net object is registered under,
//! and whether it owns or mirrors the state it names.

use netline_support::wire::{Reader, WriteExt, Writer};
use netline_support::CodecError;
use std::hash::{Hash, Hasher};

/// A polymorphic key for a replicated net object. `Simple` covers the
/// common case of a small fixed-size instance id; `Extended` covers
/// identities that need arbitrary serialized bytes. The two variants
/// never compare equal to each other even if their bytes coincide -
/// colliding type-ids across variants would otherwise be a correctness
/// bug, so equality and hashing both fold the discriminant in first.
#[derive(Debug, Clone)]
pub enum ObjectId {
    Simple { type_id: u8, instance: u16 },
    Extended { type_id: u8, bytes: Vec<u8> },
}

impl ObjectId {
    pub fn write(&self, out: &mut Writer) {
        match self {
            ObjectId::Simple { type_id, instance } => {
                out.write_u8_le(0).expect("vec write is infallible");
                out.write_u8_le(*type_id).expect("vec write is infallible");
                out.write_u16_le(*instance).expect("vec write is infallible");
            }
            ObjectId::Extended { type_id, bytes } => {
                out.write_u8_le(1).expect("vec write is infallible");
                out.write_u8_le(*type_id).expect("vec write is infallible");
                out.write_bytes(bytes).expect("vec write is infallible");
            }
        }
    }

    pub fn read(r: &mut Reader) -> Result<ObjectId, CodecError> {
        match r.read_u8()? {
            0 => {
                let type_id = r.read_u8()?;
                let instance = r.read_u16()?;
                Ok(ObjectId::Simple { type_id, instance })
            }
            1 => {
                let type_id = r.read_u8()?;
                let bytes = r.read_bytes()?;
                Ok(ObjectId::Extended { type_id, bytes })
            }
            variant => Err(CodecError::UnknownType(variant as u64)),
        }
    }
}

impl PartialEq for ObjectId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ObjectId::Simple { type_id: a_ty, instance: a_i }, ObjectId::Simple { type_id: b_ty, instance: b_i }) => {
                a_ty == b_ty && a_i == b_i
            }
            (ObjectId::Extended { type_id: a_ty, bytes: a_b }, ObjectId::Extended { type_id: b_ty, bytes: b_b }) => {
                a_ty == b_ty && a_b == b_b
            }
            _ => false,
        }
    }
}

impl Eq for ObjectId {}

impl Hash for ObjectId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            ObjectId::Simple { type_id, instance } => {
                0u8.hash(state);
                type_id.hash(state);
                instance.hash(state);
            }
            ObjectId::Extended { type_id, bytes } => {
                1u8.hash(state);
                type_id.hash(state);
                bytes.hash(state);
            }
        }
    }
}

/// Whether a net object owns authoritative state (`Master`) or mirrors
/// it (`Slave`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Master,
    Slave,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_simple() {
        let id = ObjectId::Simple { type_id: 3, instance: 42 };
        let mut w = Vec::new();
        id.write(&mut w);
        let mut r = Reader::new(&w);
        assert_eq!(ObjectId::read(&mut r).unwrap(), id);
    }

    #[test]
    fn roundtrips_extended() {
        let id = ObjectId::Extended { type_id: 9, bytes: vec![1, 2, 3, 4] };
        let mut w = Vec::new();
        id.write(&mut w);
        let mut r = Reader::new(&w);
        assert_eq!(ObjectId::read(&mut r).unwrap(), id);
    }

    #[test]
    fn simple_and_extended_never_compare_equal() {
        let simple = ObjectId::Simple { type_id: 1, instance: 0 };
        let extended = ObjectId::Extended { type_id: 1, bytes: vec![0, 0] };
        assert_ne!(simple, extended);
    }
}
