//! `netline` - the connection layer: packet codec, unreliable/reliable
//! channels, per-peer connections and a socket manager sitting
//! directly on a non-blocking datagram transport.
//!
//! Single-threaded, cooperative, caller-driven: every state transition
//! happens inside a `Socket::tick()` call. There is no background
//! thread and no internal clock - callers supply `Instant`s so that
//! tests can drive the whole stack with a synthetic clock.

pub mod channel;
pub mod codec;
pub mod config;
pub mod connection;
pub mod options;
pub mod peer;
pub mod socket;

pub use codec::{Frame, Packet};
pub use config::Config;
pub use connection::Connection;
pub use options::SendOptions;
pub use peer::PeerAddr;
pub use socket::{DatagramIo, Socket, TickReport, UdpTransport};
