//! Shared test transport: an in-memory, seeded-lossy datagram bus.
//!
//! Grounded in `net/buffer.rs`'s `MockChannel` tests - a hand-rolled
//! fake standing in for the kernel socket, not a mocking framework.

use netline::{DatagramIo, PeerAddr};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

struct Link {
    queue: VecDeque<(Vec<u8>, PeerAddr)>,
    drop_rate: f64,
    rng: StdRng,
}

/// One endpoint of a simulated two-peer datagram link. Drops a fixed
/// fraction of outbound datagrams uniformly at random.
pub struct SimIo {
    self_addr: PeerAddr,
    outbound: Rc<RefCell<Link>>,
    inbound: Rc<RefCell<Link>>,
}

impl DatagramIo for SimIo {
    fn send_to(&mut self, buf: &[u8], _peer: PeerAddr) -> io::Result<usize> {
        let mut link = self.outbound.borrow_mut();
        let roll: f64 = link.rng.gen();
        let drop_rate = link.drop_rate;
        if roll >= drop_rate {
            link.queue.push_back((buf.to_vec(), self.self_addr));
        }
        Ok(buf.len())
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> io::Result<(usize, PeerAddr)> {
        match self.inbound.borrow_mut().queue.pop_front() {
            Some((bytes, from)) => {
                buf[..bytes.len()].copy_from_slice(&bytes);
                Ok((bytes.len(), from))
            }
            None => Err(io::ErrorKind::WouldBlock.into()),
        }
    }
}

/// Builds a pair of `SimIo` endpoints sharing one lossy link in each
/// direction, seeded deterministically so test failures reproduce.
pub fn sim_pair(a: PeerAddr, b: PeerAddr, drop_rate: f64, seed: u64) -> (SimIo, SimIo) {
    let a_to_b = Rc::new(RefCell::new(Link {
        queue: VecDeque::new(),
        drop_rate,
        rng: StdRng::seed_from_u64(seed),
    }));
    let b_to_a = Rc::new(RefCell::new(Link {
        queue: VecDeque::new(),
        drop_rate,
        rng: StdRng::seed_from_u64(seed.wrapping_add(1)),
    }));

    (
        SimIo {
            self_addr: a,
            outbound: a_to_b.clone(),
            inbound: b_to_a.clone(),
        },
        SimIo {
            self_addr: b,
            outbound: b_to_a,
            inbound: a_to_b,
        },
    )
}

pub fn addr(port: u16) -> PeerAddr {
    format!("127.0.0.1:{port}").parse::<std::net::SocketAddr>().unwrap().into()
}
