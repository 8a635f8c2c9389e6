//! Net runtime: registry of net objects, the top-level `tick()`, and
//! host-vs-participant session bootstrap.
//!
//! The runtime is an explicit, heap-allocated value
//! (`Rc<RefCell<Runtime<T>>>`) threaded through `NetObjectHandle`
//! rather than reached via a global, so a process can run more than
//! one independently and tests can spin up several in the same thread.
//! `NetObject`s are owned by user code; the runtime holds only `Weak`
//! pointers to them, and each `NetObjectHandle` holds a `Weak` pointer
//! back to the runtime so it can unregister itself when dropped -
//! weak back-references in both directions, so neither side keeps the
//! other alive.

use crate::identity::{ObjectId, Role};
use crate::messages::{register_builtin_types, MasterLocation, SessionSetup, SetMasterAssignment, SetMasterRequest};
use crate::object::{NetObject, ObjectCtx};
use crate::registry::{encode_envelope, hash_type_name, MessageRegistry, NetMessage};
use netline::{Config, DatagramIo, PeerAddr, SendOptions, Socket, TickReport};
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};
use std::time::Instant;

/// Whether this process bootstraps the session (binds the well-known
/// address and relays discovery/session messages) or joins one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeRole {
    Host,
    Participant,
}

type PeerCallback = Box<dyn FnMut(PeerAddr)>;

struct Runtime<T: DatagramIo> {
    role: RuntimeRole,
    host_addr: PeerAddr,
    local_addr: PeerAddr,
    socket: Socket<T>,
    registry: MessageRegistry,
    objects: HashMap<ObjectId, Weak<RefCell<NetObject>>>,
    /// Learned from inbound `SetMasterAssignment`s: the host uses this
    /// to answer `SetMasterRequest`s for objects it does not itself
    /// hold a local replica of, by sending the requester a
    /// `MasterLocation` redirect naming the peer that does, rather
    /// than relaying the request's raw bytes itself. The requester
    /// then re-sends its request straight to that peer, so the
    /// eventual `SetMasterAssignment` reply carries the real master's
    /// address, not the host's.
    master_addrs: HashMap<ObjectId, PeerAddr>,
    connected_to_host: bool,
    current_now: Instant,
    self_send_queue: VecDeque<(Box<dyn NetMessage>, PeerAddr)>,
    log: slog::Logger,
    on_peer_connected: Option<PeerCallback>,
    on_peer_disconnected: Option<PeerCallback>,
}

impl<T: DatagramIo> Runtime<T> {
    fn deliver(&mut self, peer: PeerAddr, msg: &dyn NetMessage, options: SendOptions) {
        if peer == self.local_addr {
            self.self_send_queue.push_back((msg.clone_box(), self.local_addr));
            return;
        }
        let bytes = encode_envelope(msg);
        self.socket.send(bytes, peer, options, self.current_now);
    }

    fn drain_self_sends(&mut self) {
        while let Some((msg, sender)) = self.self_send_queue.pop_front() {
            self.route_inbound(msg, sender);
        }
    }

    /// Routes one decoded inbound message: object-targeted messages go
    /// to the matching local `NetObject`; runtime-level messages
    /// (`SessionSetup`) go to the runtime's own handling. Messages
    /// addressed to an object identity this runtime doesn't know about
    /// are dropped silently, unless the host can redirect them.
    fn route_inbound(&mut self, msg: Box<dyn NetMessage>, sender: PeerAddr) {
        let type_id = msg.type_id();

        if type_id == hash_type_name(SetMasterAssignment::type_name()) {
            if let Some(assignment) = msg.as_any().downcast_ref::<SetMasterAssignment>() {
                self.master_addrs.insert(assignment.identity.clone(), sender);
            }
        }

        if let Some(identity) = msg.target_identity() {
            if let Some(object) = self.objects.get(&identity).and_then(Weak::upgrade) {
                object.borrow_mut().receive(self, msg, sender);
                return;
            }

            if type_id == hash_type_name(SetMasterRequest::type_name()) && self.role == RuntimeRole::Host {
                if let Some(&master_addr) = self.master_addrs.get(&identity) {
                    let redirect = MasterLocation { identity, master_addr };
                    self.deliver(sender, &redirect, SendOptions::NONE);
                }
            } else {
                slog::debug!(self.log, "dropping message for unknown object"; "type_id" => type_id);
            }
            return;
        }

        if type_id == hash_type_name(SessionSetup::type_name()) {
            if let Some(setup) = msg.as_any().downcast_ref::<SessionSetup>() {
                for &peer in &setup.peers {
                    self.socket.connect(peer, self.current_now);
                }
            }
            return;
        }

        if type_id == hash_type_name(MasterLocation::type_name()) {
            // Redirect: the host could not answer a `SetMasterRequest`
            // locally, but knows where the master actually lives. Resend
            // the request straight to it, so the master's reply carries
            // the master's own address as `sender`, not the host's.
            if let Some(location) = msg.as_any().downcast_ref::<MasterLocation>() {
                let request = SetMasterRequest { identity: location.identity.clone() };
                self.deliver(location.master_addr, &request, SendOptions::NONE);
            }
        }
    }

    fn tick(&mut self, now: Instant) -> TickReport {
        self.current_now = now;

        let report = self.socket.tick(now);

        if self.role == RuntimeRole::Host {
            for &peer in &report.new_peers {
                let others: Vec<PeerAddr> = self.socket.connections().into_iter().filter(|&p| p != peer).collect();
                let setup = SessionSetup { peers: others };
                let bytes = encode_envelope(&setup);
                self.socket.send(bytes, peer, SendOptions::RELIABLE, now);
            }
        } else if !self.connected_to_host {
            self.socket.connect(self.host_addr, now);
            self.connected_to_host = true;
        }

        for &peer in &report.new_peers {
            if let Some(cb) = self.on_peer_connected.as_mut() {
                cb(peer);
            }
        }
        for &peer in &report.dead_peers {
            if let Some(cb) = self.on_peer_disconnected.as_mut() {
                cb(peer);
            }
            self.master_addrs.retain(|_, &mut addr| addr != peer);

            let identities: Vec<ObjectId> = self.objects.keys().cloned().collect();
            for identity in identities {
                if let Some(object) = self.objects.get(&identity).and_then(Weak::upgrade) {
                    object.borrow_mut().peer_disconnected(self, peer);
                }
            }
        }
        self.drain_self_sends();

        while let Some((payload, sender)) = self.socket.receive() {
            match self.registry.decode_envelope(&payload) {
                Ok(msg) => self.route_inbound(msg, sender),
                Err(err) => {
                    slog::debug!(self.log, "dropping malformed datagram"; "error" => %err, "peer" => %sender);
                }
            }
        }
        self.drain_self_sends();

        let identities: Vec<ObjectId> = self.objects.keys().cloned().collect();
        for identity in identities {
            match self.objects.get(&identity).and_then(Weak::upgrade) {
                Some(object) => object.borrow_mut().tick(self, now),
                None => {
                    self.objects.remove(&identity);
                }
            }
        }
        self.drain_self_sends();

        report
    }
}

impl<T: DatagramIo> ObjectCtx for Runtime<T> {
    fn registry(&self) -> &MessageRegistry {
        &self.registry
    }
    fn log(&self) -> &slog::Logger {
        &self.log
    }
    fn local_addr(&self) -> PeerAddr {
        self.local_addr
    }
    fn host_addr(&self) -> PeerAddr {
        self.host_addr
    }
    fn peers(&self) -> Vec<PeerAddr> {
        self.socket.connections()
    }
    fn is_connected(&self, peer: PeerAddr) -> bool {
        peer == self.local_addr || self.socket.is_connected(peer)
    }
    fn send(&mut self, peer: PeerAddr, msg: &dyn NetMessage, options: SendOptions) {
        self.deliver(peer, msg, options);
    }
}

/// A shareable, heap-allocated handle to the net runtime. `Clone` just
/// bumps the `Rc`; all clones observe the same state.
pub struct NetRuntime<T: DatagramIo> {
    inner: Rc<RefCell<Runtime<T>>>,
}

impl<T: DatagramIo> Clone for NetRuntime<T> {
    fn clone(&self) -> Self {
        NetRuntime { inner: self.inner.clone() }
    }
}

impl<T: DatagramIo> NetRuntime<T> {
    /// Binds the host role at `host_addr`: the well-known address every
    /// participant connects to.
    pub fn new_host(io: T, host_addr: PeerAddr, config: Config) -> Self {
        Self::new(io, RuntimeRole::Host, host_addr, host_addr, config)
    }

    /// Joins as a participant. `local_addr` is the caller-supplied
    /// address of the already-bound ephemeral socket.
    pub fn new_participant(io: T, host_addr: PeerAddr, local_addr: PeerAddr, config: Config) -> Self {
        Self::new(io, RuntimeRole::Participant, host_addr, local_addr, config)
    }

    fn new(io: T, role: RuntimeRole, host_addr: PeerAddr, local_addr: PeerAddr, config: Config) -> Self {
        let mut registry = MessageRegistry::new();
        register_builtin_types(&mut registry);

        let now = Instant::now();
        let runtime = Runtime {
            role,
            host_addr,
            local_addr,
            socket: Socket::new(io, config),
            registry,
            objects: HashMap::new(),
            master_addrs: HashMap::new(),
            connected_to_host: role == RuntimeRole::Host,
            current_now: now,
            self_send_queue: VecDeque::new(),
            log: netline_support::logging::discard_logger(),
            on_peer_connected: None,
            on_peer_disconnected: None,
        };

        NetRuntime { inner: Rc::new(RefCell::new(runtime)) }
    }

    pub fn with_logger(self, log: slog::Logger) -> Self {
        self.inner.borrow_mut().log = log;
        self
    }

    pub fn role(&self) -> RuntimeRole {
        self.inner.borrow().role
    }

    pub fn local_addr(&self) -> PeerAddr {
        self.inner.borrow().local_addr
    }

    pub fn host_addr(&self) -> PeerAddr {
        self.inner.borrow().host_addr
    }

    pub fn is_connected(&self, peer: PeerAddr) -> bool {
        self.inner.borrow().is_connected(peer)
    }

    pub fn connections(&self) -> Vec<PeerAddr> {
        self.inner.borrow().peers()
    }

    /// Registers an application message type on this runtime's shared
    /// registry, in addition to the built-in types registered at
    /// construction.
    pub fn register_message<M: NetMessage + 'static>(&self) {
        self.inner.borrow_mut().registry.register::<M>();
    }

    pub fn on_peer_connected<F: FnMut(PeerAddr) + 'static>(&self, callback: F) {
        self.inner.borrow_mut().on_peer_connected = Some(Box::new(callback));
    }

    pub fn on_peer_disconnected<F: FnMut(PeerAddr) + 'static>(&self, callback: F) {
        self.inner.borrow_mut().on_peer_disconnected = Some(Box::new(callback));
    }

    /// Top-level per-frame tick: drives the socket, session bootstrap,
    /// inbound dispatch, and every net object's per-tick hook.
    pub fn tick(&self, now: Instant) -> TickReport {
        self.inner.borrow_mut().tick(now)
    }

    /// Self-send shortcut plus the general send path: if `peer` is this
    /// runtime's own address, dispatches locally without serialization;
    /// otherwise serializes `type_id` + message and hands the bytes to
    /// the socket.
    pub fn send<M: NetMessage + 'static>(&self, msg: &M, peer: PeerAddr, options: SendOptions) {
        self.inner.borrow_mut().deliver(peer, msg, options);
    }

    /// Creates a net object under `identity`, registers it in the
    /// runtime's registry, and runs its master-discovery
    /// construction-time behavior. The returned handle unregisters the
    /// object on drop.
    pub fn create_object(&self, role: Role, identity: ObjectId) -> NetObjectHandle<T> {
        let object = Rc::new(RefCell::new(NetObject::new(role, identity.clone())));
        {
            let mut inner = self.inner.borrow_mut();
            inner.objects.insert(identity.clone(), Rc::downgrade(&object));
            object.borrow_mut().on_constructed(&mut *inner);
            inner.drain_self_sends();
        }

        NetObjectHandle {
            object,
            identity,
            runtime: Rc::downgrade(&self.inner),
        }
    }

    /// Drops the runtime's bookkeeping of every net object. The objects
    /// themselves remain alive as long as application code holds their
    /// handles - the runtime never owned them.
    pub fn shutdown(&self) {
        self.inner.borrow_mut().objects.clear();
    }
}

/// An owning handle to one `NetObject`, returned by
/// `NetRuntime::create_object`. Holds a `Weak` back-reference to the
/// runtime so it can unregister itself on drop.
pub struct NetObjectHandle<T: DatagramIo> {
    object: Rc<RefCell<NetObject>>,
    identity: ObjectId,
    runtime: Weak<RefCell<Runtime<T>>>,
}

impl<T: DatagramIo> NetObjectHandle<T> {
    pub fn identity(&self) -> &ObjectId {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.object.borrow().role()
    }

    pub fn known_authority_addr(&self) -> Option<PeerAddr> {
        self.object.borrow().known_authority_addr()
    }

    /// Registers an application handler for messages of type `M`.
    pub fn on<M, F>(&self, handler: F)
    where
        M: NetMessage + 'static,
        F: FnMut(&M, PeerAddr, &mut dyn ObjectCtx) + 'static,
    {
        self.object.borrow_mut().on::<M, F>(handler);
    }

    /// Master-only: fires the first time a peer is observed requesting
    /// mastership of this object.
    pub fn on_replica_added<F>(&self, callback: F)
    where
        F: FnMut(PeerAddr, &mut dyn ObjectCtx) + 'static,
    {
        self.object.borrow_mut().on_replica_added(callback);
    }

    /// Master-only: fires when a known replica's connection is reaped.
    pub fn on_replica_left<F>(&self, callback: F)
    where
        F: FnMut(PeerAddr, &mut dyn ObjectCtx) + 'static,
    {
        self.object.borrow_mut().on_replica_left(callback);
    }

    pub fn register_memento<M: NetMessage + Default + 'static>(&self, period: std::time::Duration) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let mut inner = runtime.borrow_mut();
        self.object.borrow_mut().register_memento::<M>(period, &mut *inner);
    }

    /// Mutably borrows this object's registered memento for `M` so user
    /// code can write authoritative state into it, without re-running
    /// registration. `f` must not itself call back into this handle -
    /// both `self.object` and the runtime
    /// stay borrowed for the duration of the call, so a re-entrant send
    /// from inside `f` fails with a `RefCell` borrow panic rather than
    /// silently aliasing.
    pub fn with_memento<M: NetMessage + Default + 'static, R>(&self, period: std::time::Duration, f: impl FnOnce(&mut M) -> R) -> R {
        let Some(runtime) = self.runtime.upgrade() else {
            let mut scratch = M::default();
            return f(&mut scratch);
        };
        let mut inner = runtime.borrow_mut();
        let mut object = self.object.borrow_mut();
        let snapshot = object.register_memento::<M>(period, &mut *inner);
        f(snapshot)
    }

    /// Reads the current value of a registered or mirrored memento for
    /// `M`. See `NetObject::read_memento`.
    pub fn read_memento<M: NetMessage + Clone + 'static>(&self) -> Option<M> {
        self.object.borrow().read_memento::<M>()
    }

    pub fn broadcast<M: NetMessage + 'static>(&self, msg: M, options: SendOptions) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let mut inner = runtime.borrow_mut();
        self.object.borrow().broadcast(&mut *inner, msg, options);
        inner.drain_self_sends();
    }

    pub fn broadcast_except<M: NetMessage + 'static>(&self, msg: M, except: PeerAddr, options: SendOptions) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let mut inner = runtime.borrow_mut();
        self.object.borrow().broadcast_except(&mut *inner, msg, except, options);
        inner.drain_self_sends();
    }

    pub fn unicast<M: NetMessage + 'static>(&self, msg: M, peer: PeerAddr, options: SendOptions) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let mut inner = runtime.borrow_mut();
        self.object.borrow().unicast(&mut *inner, msg, peer, options);
        inner.drain_self_sends();
    }

    pub fn send_to_master<M: NetMessage + 'static>(&self, msg: M, options: SendOptions) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let mut inner = runtime.borrow_mut();
        self.object.borrow().send_to_master(&mut *inner, msg, options);
        inner.drain_self_sends();
    }

    pub fn send_to_authority<M: NetMessage + 'static>(&self, msg: M, options: SendOptions) {
        let Some(runtime) = self.runtime.upgrade() else { return };
        let mut inner = runtime.borrow_mut();
        self.object.borrow().send_to_authority(&mut *inner, msg, options);
        inner.drain_self_sends();
    }
}

impl<T: DatagramIo> Drop for NetObjectHandle<T> {
    /// Self-unregisters from the runtime's registry. A no-op if the
    /// runtime has already been dropped.
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.borrow_mut().objects.remove(&self.identity);
        }
    }
}
