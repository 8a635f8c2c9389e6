//! Peer address: an opaque transport endpoint. The core only requires
//! equality, hashing and a wire codec - it never inspects the IP/port
//! itself.

use netline_support::wire::{Reader, WriteExt, Writer};
use netline_support::CodecError;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr(pub SocketAddr);

impl PeerAddr {
    #[inline]
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn write(&self, out: &mut Writer) {
        match self.0 {
            SocketAddr::V4(addr) => {
                out.write_u8_le(4).expect("vec write is infallible");
                out.extend_from_slice(&addr.ip().octets());
                out.write_u16_le(addr.port()).expect("vec write is infallible");
            }
            SocketAddr::V6(addr) => {
                out.write_u8_le(6).expect("vec write is infallible");
                out.extend_from_slice(&addr.ip().octets());
                out.write_u16_le(addr.port()).expect("vec write is infallible");
            }
        }
    }

    pub fn read(r: &mut Reader) -> Result<PeerAddr, CodecError> {
        use std::net::{Ipv4Addr, Ipv6Addr};

        match r.read_u8()? {
            4 => {
                let mut octets = [0u8; 4];
                for o in octets.iter_mut() {
                    *o = r.read_u8()?;
                }
                let port = r.read_u16()?;
                Ok(PeerAddr(SocketAddr::from((Ipv4Addr::from(octets), port))))
            }
            6 => {
                let mut octets = [0u8; 16];
                for o in octets.iter_mut() {
                    *o = r.read_u8()?;
                }
                let port = r.read_u16()?;
                Ok(PeerAddr(SocketAddr::from((Ipv6Addr::from(octets), port))))
            }
            _ => Err(CodecError::Truncated),
        }
    }
}

impl From<SocketAddr> for PeerAddr {
    #[inline]
    fn from(addr: SocketAddr) -> Self {
        PeerAddr(addr)
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
