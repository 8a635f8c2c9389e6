//! Net object: one logical replicated entity, dispatching inbound
//! messages by type id, managing mementoes, and sending by role
//! (broadcast/unicast/to-authority).

use crate::identity::{ObjectId, Role};
use crate::messages::{MementoUpdate, SetMasterAssignment, SetMasterRequest};
use crate::registry::{hash_type_name, NetMessage};
use netline::{PeerAddr, SendOptions};
use netline_support::error::protocol_misuse;
use netline_support::wire::Writer;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::registry::MessageRegistry;

/// Everything a `NetObject` needs from its owning runtime to perform a
/// send or look at connectivity, without holding a back-reference to
/// the runtime itself. The runtime passes a `&mut dyn ObjectCtx` into
/// every handler instead, which keeps a `NetObject` cheap to construct
/// in isolation (see the tests below) and avoids the reference-cycle
/// bookkeeping that a real back-reference would need for this path.
pub trait ObjectCtx {
    fn registry(&self) -> &MessageRegistry;
    fn log(&self) -> &slog::Logger;
    fn local_addr(&self) -> PeerAddr;
    fn host_addr(&self) -> PeerAddr;
    fn peers(&self) -> Vec<PeerAddr>;
    fn is_connected(&self, peer: PeerAddr) -> bool;
    /// Sends a stamped, type-id-prefixed envelope for `msg` to `peer`.
    /// Self-addressed sends are the runtime's job to loop back locally -
    /// `NetObject` never special-cases its own address here.
    fn send(&mut self, peer: PeerAddr, msg: &dyn NetMessage, options: SendOptions);
}

struct MementoSlot {
    snapshot: Box<dyn NetMessage>,
    period: Duration,
    last_send_time: Option<Instant>,
}

type Handler = Box<dyn FnMut(Box<dyn NetMessage>, PeerAddr, &mut dyn ObjectCtx)>;
type ReplicaCallback = Box<dyn FnMut(PeerAddr, &mut dyn ObjectCtx)>;

/// A runtime entity keyed by `identity`.
pub struct NetObject {
    identity: ObjectId,
    role: Role,
    known_authority_addr: Option<PeerAddr>,
    handlers: HashMap<u64, Handler>,
    mementos: HashMap<u64, MementoSlot>,
    /// Master-only: peers known to hold a slave replica of this object,
    /// tracked so `on_replica_left` fires exactly once per departure. A
    /// peer is considered a replica once it has sent a
    /// `SetMasterRequest` for this identity.
    replicas: HashSet<PeerAddr>,
    on_replica_added: Option<ReplicaCallback>,
    on_replica_left: Option<ReplicaCallback>,
}

impl NetObject {
    pub fn new(role: Role, identity: ObjectId) -> Self {
        NetObject {
            identity,
            role,
            known_authority_addr: None,
            handlers: HashMap::new(),
            mementos: HashMap::new(),
            replicas: HashSet::new(),
            on_replica_added: None,
            on_replica_left: None,
        }
    }

    /// Master-only: registers a callback fired the first time a peer is
    /// observed requesting mastership of this object, i.e. when a new
    /// slave replica joins.
    pub fn on_replica_added<F>(&mut self, callback: F)
    where
        F: FnMut(PeerAddr, &mut dyn ObjectCtx) + 'static,
    {
        self.on_replica_added = Some(Box::new(callback));
    }

    /// Master-only: registers a callback fired when a known replica's
    /// connection is reaped. Invoked by `peer_disconnected`, which the
    /// owning runtime calls for every master object on each dead peer
    /// reported by a tick.
    pub fn on_replica_left<F>(&mut self, callback: F)
    where
        F: FnMut(PeerAddr, &mut dyn ObjectCtx) + 'static,
    {
        self.on_replica_left = Some(Box::new(callback));
    }

    /// Called by the runtime for every master object when `peer`'s
    /// connection is reaped. A no-op if `peer` was never a known
    /// replica of this object.
    pub fn peer_disconnected(&mut self, ctx: &mut dyn ObjectCtx, peer: PeerAddr) {
        if self.role != Role::Master || !self.replicas.remove(&peer) {
            return;
        }
        if let Some(cb) = self.on_replica_left.as_mut() {
            cb(peer, ctx);
        }
    }

    pub fn identity(&self) -> &ObjectId {
        &self.identity
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn known_authority_addr(&self) -> Option<PeerAddr> {
        self.known_authority_addr
    }

    /// A freshly-registered master immediately announces itself to the
    /// host so the host can relay future `SetMasterRequest`s to it.
    pub fn on_constructed(&mut self, ctx: &mut dyn ObjectCtx) {
        if self.role == Role::Master {
            let assignment = SetMasterAssignment { identity: self.identity.clone() };
            let host = ctx.host_addr();
            ctx.send(host, &assignment, SendOptions::NONE);
        }
    }

    /// Registers an application handler for messages of type `M`,
    /// keyed by `M`'s registry type-id. The built-in discovery/memento
    /// messages are dispatched directly by `receive` and do not go
    /// through this map.
    pub fn on<M, F>(&mut self, mut handler: F)
    where
        M: NetMessage + 'static,
        F: FnMut(&M, PeerAddr, &mut dyn ObjectCtx) + 'static,
    {
        let type_id = hash_type_name(M::type_name());
        self.handlers.insert(
            type_id,
            Box::new(move |msg, sender, ctx| {
                if let Some(typed) = msg.as_any().downcast_ref::<M>() {
                    handler(typed, sender, ctx);
                }
            }),
        );
    }

    /// Looks up `msg.type_id()` in the handler map and invokes it,
    /// dropping unrecognized messages.
    pub fn receive(&mut self, ctx: &mut dyn ObjectCtx, msg: Box<dyn NetMessage>, sender: PeerAddr) {
        let type_id = msg.type_id();

        if type_id == hash_type_name(SetMasterRequest::type_name()) {
            self.handle_set_master_request(ctx, sender);
            return;
        }
        if type_id == hash_type_name(SetMasterAssignment::type_name()) {
            self.handle_set_master_assignment(msg.as_ref(), sender);
            return;
        }
        if type_id == hash_type_name(MementoUpdate::type_name()) {
            self.handle_memento_update(ctx, msg.as_ref());
            return;
        }

        if let Some(handler) = self.handlers.get_mut(&type_id) {
            handler(msg, sender, ctx);
        }
    }

    fn handle_set_master_request(&mut self, ctx: &mut dyn ObjectCtx, sender: PeerAddr) {
        if self.role != Role::Master {
            protocol_misuse(ctx.log(), "SetMasterRequest routed to a non-master object");
            return;
        }
        if self.replicas.insert(sender) {
            if let Some(cb) = self.on_replica_added.as_mut() {
                cb(sender, ctx);
            }
        }
        let assignment = SetMasterAssignment { identity: self.identity.clone() };
        ctx.send(sender, &assignment, SendOptions::NONE);
    }

    fn handle_set_master_assignment(&mut self, _msg: &dyn NetMessage, sender: PeerAddr) {
        if self.role != Role::Slave {
            return;
        }
        self.known_authority_addr = Some(sender);
    }

    fn handle_memento_update(&mut self, ctx: &mut dyn ObjectCtx, msg: &dyn NetMessage) {
        let Some(update) = msg.as_any().downcast_ref::<MementoUpdate>() else {
            return;
        };

        let mut reader = netline_support::wire::Reader::new(&update.memento_bytes);
        let Ok(decoded) = ctx.registry().decode(update.memento_type_id, &mut reader) else {
            return;
        };

        match self.mementos.get_mut(&update.memento_type_id) {
            Some(slot) => {
                slot.snapshot.copy_from(decoded.as_ref());
            }
            None => {
                self.mementos.insert(
                    update.memento_type_id,
                    MementoSlot { snapshot: decoded, period: Duration::from_millis(0), last_send_time: None },
                );
            }
        }
    }

    /// Master-only: allocates (or returns the existing) memento slot
    /// for `M` and hands back a mutable reference so user code can
    /// write authoritative state into it.
    pub fn register_memento<M: NetMessage + Default + 'static>(&mut self, period: Duration, ctx: &mut dyn ObjectCtx) -> &mut M {
        if self.role != Role::Master {
            protocol_misuse(ctx.log(), "register_memento called on a non-master object");
        }

        let type_id = hash_type_name(M::type_name());
        self.mementos
            .entry(type_id)
            .or_insert_with(|| MementoSlot { snapshot: Box::new(M::default()), period, last_send_time: None });

        self.mementos
            .get_mut(&type_id)
            .expect("just inserted")
            .snapshot
            .as_any_mut()
            .downcast_mut::<M>()
            .expect("memento slot type matches its registration type")
    }

    /// Reads the current value of a registered or mirrored memento slot
    /// for `M`, if one exists. Works on both roles: on a master it
    /// reads the authoritative snapshot written via `register_memento`;
    /// on a slave it reads the latest mirrored copy, if any
    /// `MementoUpdate` has arrived yet.
    pub fn read_memento<M: NetMessage + Clone + 'static>(&self) -> Option<M> {
        let type_id = hash_type_name(M::type_name());
        self.mementos.get(&type_id)?.snapshot.as_any().downcast_ref::<M>().cloned()
    }

    /// Master-only per-tick hook: broadcasts every memento whose
    /// period has elapsed. Slave per-tick hook: re-sends
    /// `SetMasterRequest` while discovery hasn't completed.
    pub fn tick(&mut self, ctx: &mut dyn ObjectCtx, now: Instant) {
        match self.role {
            Role::Master => self.broadcast_due_mementos(ctx, now),
            Role::Slave => {
                if self.known_authority_addr.is_none() {
                    let request = SetMasterRequest { identity: self.identity.clone() };
                    let host = ctx.host_addr();
                    ctx.send(host, &request, SendOptions::NONE);
                }
            }
        }
    }

    fn broadcast_due_mementos(&mut self, ctx: &mut dyn ObjectCtx, now: Instant) {
        let due: Vec<u64> = self
            .mementos
            .iter()
            .filter(|(_, slot)| slot.last_send_time.map_or(true, |t| now.duration_since(t) >= slot.period))
            .map(|(&type_id, _)| type_id)
            .collect();

        for memento_type_id in due {
            let bytes = {
                let slot = self.mementos.get(&memento_type_id).expect("just filtered");
                let mut writer = Writer::new();
                slot.snapshot.encode(&mut writer);
                writer
            };
            let update = MementoUpdate { identity: self.identity.clone(), memento_type_id, memento_bytes: bytes };
            self.broadcast(ctx, update, SendOptions::NONE);
            self.mementos.get_mut(&memento_type_id).expect("just filtered").last_send_time = Some(now);
        }
    }

    /// Master-only: sends to every known peer, stamping `msg` with
    /// this object's identity first.
    pub fn broadcast<M: NetMessage + 'static>(&self, ctx: &mut dyn ObjectCtx, mut msg: M, options: SendOptions) {
        if self.role != Role::Master {
            protocol_misuse(ctx.log(), "broadcast called on a non-master object");
            return;
        }
        msg.set_identity(self.identity.clone());
        for peer in ctx.peers() {
            ctx.send(peer, &msg, options);
        }
    }

    /// Master-only: sends to every known peer except `except`.
    pub fn broadcast_except<M: NetMessage + 'static>(&self, ctx: &mut dyn ObjectCtx, mut msg: M, except: PeerAddr, options: SendOptions) {
        if self.role != Role::Master {
            protocol_misuse(ctx.log(), "broadcast_except called on a non-master object");
            return;
        }
        msg.set_identity(self.identity.clone());
        for peer in ctx.peers() {
            if peer != except {
                ctx.send(peer, &msg, options);
            }
        }
    }

    /// Master-only: sends to exactly one peer, which must be a known
    /// connection or the local address - sending to the local address
    /// is the one case where `peer` can equal the object's own runtime,
    /// and the runtime loops it back without touching the transport.
    pub fn unicast<M: NetMessage + 'static>(&self, ctx: &mut dyn ObjectCtx, mut msg: M, peer: PeerAddr, options: SendOptions) {
        if self.role != Role::Master {
            protocol_misuse(ctx.log(), "unicast called on a non-master object");
            return;
        }
        if peer != ctx.local_addr() && !ctx.is_connected(peer) {
            protocol_misuse(ctx.log(), "unicast to an unknown peer");
            return;
        }
        msg.set_identity(self.identity.clone());
        ctx.send(peer, &msg, options);
    }

    /// Slave-only: sends to the known authority, or silently drops if
    /// discovery hasn't completed yet.
    pub fn send_to_master<M: NetMessage + 'static>(&self, ctx: &mut dyn ObjectCtx, mut msg: M, options: SendOptions) {
        if self.role != Role::Slave {
            protocol_misuse(ctx.log(), "send_to_master called on a non-slave object");
            return;
        }
        let Some(addr) = self.known_authority_addr else {
            return;
        };
        msg.set_identity(self.identity.clone());
        ctx.send(addr, &msg, options);
    }

    /// Sends to the host endpoint unconditionally - used during
    /// discovery, before a slave has a `known_authority_addr`.
    pub fn send_to_authority<M: NetMessage + 'static>(&self, ctx: &mut dyn ObjectCtx, mut msg: M, options: SendOptions) {
        msg.set_identity(self.identity.clone());
        let host = ctx.host_addr();
        ctx.send(host, &msg, options);
    }
}
