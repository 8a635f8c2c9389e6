//! End-to-end memento replication: a master's memento, written once
//! and broadcast on a 100ms period, mirrors onto a slave's replica
//! within 250ms.

mod common;

use common::{addr, SimHub};
use netline::Config;
use netline_support::wire::{Reader, WriteExt, Writer};
use netline_support::CodecError;
use netobj::{NetMessage, NetRuntime, ObjectId, Role};
use std::any::Any;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default, PartialEq)]
struct ObjectSyncMemento {
    x: f32,
    y: f32,
    dx: f32,
    dy: f32,
    scale: f32,
    rot: f32,
}

impl NetMessage for ObjectSyncMemento {
    fn type_id(&self) -> u64 {
        netobj::hash_type_name(Self::type_name())
    }

    fn encode(&self, out: &mut Writer) {
        for field in [self.x, self.y, self.dx, self.dy, self.scale, self.rot] {
            out.write_u32_le(field.to_bits()).expect("vec write is infallible");
        }
    }

    fn decode(reader: &mut Reader) -> Result<Self, CodecError> {
        let mut fields = [0f32; 6];
        for field in fields.iter_mut() {
            *field = f32::from_bits(reader.read_u32()?);
        }
        Ok(ObjectSyncMemento { x: fields[0], y: fields[1], dx: fields[2], dy: fields[3], scale: fields[4], rot: fields[5] })
    }

    fn type_name() -> &'static str {
        "netobj::tests::memento::ObjectSyncMemento"
    }

    fn clone_box(&self) -> Box<dyn NetMessage> {
        Box::new(self.clone())
    }

    fn copy_from(&mut self, other: &dyn NetMessage) -> bool {
        match other.as_any().downcast_ref::<ObjectSyncMemento>() {
            Some(o) => {
                *self = o.clone();
                true
            }
            None => false,
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn slave_memento_converges_within_period_plus_rtt() {
    let hub = SimHub::new();
    let host_addr = addr(22101);
    let slave_addr = addr(22102);

    let config = Config::release();
    let host = NetRuntime::new_host(hub.io_for(host_addr), host_addr, config);
    let slave = NetRuntime::new_participant(hub.io_for(slave_addr), host_addr, slave_addr, config);
    // The memento's payload type must be registered on every runtime
    // that might decode a fresh `MementoUpdate` for it, exactly like
    // any other application message - the master's own
    // `register_memento` call only affects its local snapshot, not any
    // peer's registry.
    host.register_message::<ObjectSyncMemento>();
    slave.register_message::<ObjectSyncMemento>();

    let identity = ObjectId::Simple { type_id: 10, instance: 0 };
    let master_object = host.create_object(Role::Master, identity.clone());
    let slave_object = slave.create_object(Role::Slave, identity);

    // Settle the handshake first - this test measures convergence from
    // the moment the master writes, on an already-live connection, not
    // from cold start.
    let handshake_start = Instant::now();
    for step in 0..5u64 {
        let now = handshake_start + config.heartbeat_interval * step as u32;
        host.tick(now);
        slave.tick(now);
    }
    assert!(slave.is_connected(host_addr));
    assert!(host.connections().contains(&slave_addr));
    assert!(slave_object.known_authority_addr().is_some(), "discovery should complete during the handshake");

    master_object.with_memento::<ObjectSyncMemento, ()>(Duration::from_millis(100), |snapshot| {
        *snapshot = ObjectSyncMemento { x: 1.0, y: 2.0, dx: 3.0, dy: 4.0, scale: 5.0, rot: 6.0 };
    });

    let t0 = handshake_start + config.heartbeat_interval * 5;
    let mut mirrored = None;
    for step in 0..250u64 {
        let now = t0 + Duration::from_millis(step);
        host.tick(now);
        slave.tick(now);

        if let Some(value) = slave_object.read_memento::<ObjectSyncMemento>() {
            mirrored = Some(value);
            break;
        }
    }

    let mirrored = mirrored.expect("slave should have received a MementoUpdate within 250ms");
    assert_eq!(
        mirrored,
        ObjectSyncMemento { x: 1.0, y: 2.0, dx: 3.0, dy: 4.0, scale: 5.0, rot: 6.0 }
    );
}
