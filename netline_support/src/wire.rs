//! Manual, allocation-light wire encoding.
//!
//! Neither `flux::contract::PrivateData` nor `neutronium`'s frame
//! header reaches for `serde`/`bincode` on the wire path - both are
//! hand-encoded with `byteorder` over a `Read`/`Write` cursor. `netline`
//! follows the same discipline: every on-wire type writes and reads
//! itself directly against a `Vec<u8>`/`&[u8]` cursor.

use crate::error::CodecError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

/// A write cursor over a growable buffer.
pub type Writer = Vec<u8>;

/// A read cursor over a borrowed byte slice.
pub struct Reader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
    #[inline]
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader {
            cursor: Cursor::new(bytes),
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len() - self.cursor.position() as usize
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        self.cursor.read_u8().map_err(|_| CodecError::Truncated)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)
    }

    #[inline]
    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| CodecError::Truncated)
    }

    /// Reads a u16 length prefix followed by that many raw bytes.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u16()? as usize;
        let mut buf = vec![0u8; len];
        self.cursor.read_exact(&mut buf).map_err(|_| CodecError::Truncated)?;
        Ok(buf)
    }

    /// True if every byte of the underlying slice has been consumed.
    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

/// Extension methods used on the `Vec<u8>` writer, mirroring the reader
/// above so that encode/decode pairs read side by side.
pub trait WriteExt: Write {
    #[inline]
    fn write_u8_le(&mut self, v: u8) -> io::Result<()> {
        self.write_all(&[v])
    }

    #[inline]
    fn write_u16_le(&mut self, v: u16) -> io::Result<()> {
        WriteBytesExt::write_u16::<LittleEndian>(self, v)
    }

    #[inline]
    fn write_u32_le(&mut self, v: u32) -> io::Result<()> {
        WriteBytesExt::write_u32::<LittleEndian>(self, v)
    }

    #[inline]
    fn write_u64_le(&mut self, v: u64) -> io::Result<()> {
        WriteBytesExt::write_u64::<LittleEndian>(self, v)
    }

    /// Writes a u16 length prefix followed by the raw bytes.
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        debug_assert!(bytes.len() <= u16::MAX as usize, "payload exceeds length-prefix range");
        self.write_u16_le(bytes.len() as u16)?;
        self.write_all(bytes)
    }
}

impl WriteExt for Vec<u8> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_scalars() {
        let mut w: Writer = Vec::new();
        w.write_u8_le(7).unwrap();
        w.write_u16_le(300).unwrap();
        w.write_u32_le(70_000).unwrap();
        w.write_u64_le(u64::MAX).unwrap();

        let mut r = Reader::new(&w);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_u16().unwrap(), 300);
        assert_eq!(r.read_u32().unwrap(), 70_000);
        assert_eq!(r.read_u64().unwrap(), u64::MAX);
        assert!(r.is_exhausted());
    }

    #[test]
    fn roundtrip_length_prefixed_bytes() {
        let mut w: Writer = Vec::new();
        w.write_bytes(b"hello").unwrap();

        let mut r = Reader::new(&w);
        assert_eq!(r.read_bytes().unwrap(), b"hello");
    }

    #[test]
    fn truncated_reads_fail_closed() {
        let mut r = Reader::new(&[1, 2]);
        assert_eq!(r.read_u64(), Err(CodecError::Truncated));
    }
}
