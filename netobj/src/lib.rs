//! `netobj` - the replicated-object layer: a message registry, net
//! objects with master/slave roles and memento replication, and the
//! net runtime tying them to a `netline` socket.

pub mod identity;
pub mod messages;
pub mod object;
pub mod registry;
pub mod runtime;

pub use identity::{ObjectId, Role};
pub use messages::{MementoUpdate, SessionSetup, SetMasterAssignment, SetMasterRequest};
pub use object::{NetObject, ObjectCtx};
pub use registry::{encode_envelope, hash_type_name, MessageRegistry, NetMessage};
pub use runtime::{NetObjectHandle, NetRuntime, RuntimeRole};
