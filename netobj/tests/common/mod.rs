//! Shared test transport: an in-memory hub connecting any number of
//! simulated peers, used to drive the multi-peer mesh and memento
//! tests. Grounded in the same hand-rolled fake pattern as `netline`'s
//! own test transport - just generalized from a two-peer pair to an
//! N-peer hub.

use netline::{DatagramIo, PeerAddr};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::rc::Rc;

type Inbox = VecDeque<(Vec<u8>, PeerAddr)>;

#[derive(Default)]
struct Hub {
    inboxes: HashMap<PeerAddr, Inbox>,
}

/// One peer's endpoint into a shared `Hub`. `send_to` delivers straight
/// into the destination's inbox; `recv_from` pops this peer's own.
#[derive(Clone)]
pub struct HubIo {
    self_addr: PeerAddr,
    hub: Rc<RefCell<Hub>>,
}

impl DatagramIo for HubIo {
    fn send_to(&mut self, buf: &[u8], peer: PeerAddr) -> io::Result<usize> {
        let mut hub = self.hub.borrow_mut();
        hub.inboxes.entry(peer).or_default().push_back((buf.to_vec(), self.self_addr));
        Ok(buf.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, PeerAddr)> {
        let mut hub = self.hub.borrow_mut();
        match hub.inboxes.entry(self.self_addr).or_default().pop_front() {
            Some((bytes, from)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok((bytes.len(), from))
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Builds a fresh hub shared by every `HubIo` handed out from it.
pub struct SimHub {
    hub: Rc<RefCell<Hub>>,
}

impl SimHub {
    pub fn new() -> Self {
        SimHub { hub: Rc::new(RefCell::new(Hub::default())) }
    }

    pub fn io_for(&self, addr: PeerAddr) -> HubIo {
        HubIo { self_addr: addr, hub: self.hub.clone() }
    }
}

pub fn addr(port: u16) -> PeerAddr {
    format!("127.0.0.1:{port}").parse::<std::net::SocketAddr>().unwrap().into()
}
