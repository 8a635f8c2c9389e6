//! A minimal two-role chat demo driving `netobj` end to end over real
//! UDP sockets. Grounded in the original sample's `server_main`/
//! `client_main` split (`QuickGameNetworking/main.cpp`): the host also
//! holds the master replica of the one chat room object, announces
//! joins/leaves via the replica-added/replica-left callbacks, and
//! rebroadcasts every line prefixed with the sender's port; a
//! participant holds a slave replica and only prints what it receives.
//!
//! Stdin is read on its own thread into a bounded queue, external to
//! the core - the tick loop itself never blocks on input.

use netline::{Config, PeerAddr, SendOptions, UdpTransport};
use netline_support::wire::{Reader, WriteExt, Writer};
use netline_support::{Clock, CodecError, SystemClock};
use netobj::{hash_type_name, ObjectId, Role};
use netobj::{NetMessage, NetRuntime};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// The one application-defined message type this demo registers on top
/// of the built-in discovery/replication messages.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Text {
    identity: ObjectId,
    body: String,
}

impl Default for Text {
    fn default() -> Self {
        Text { identity: CHAT_ROOM, body: String::new() }
    }
}

impl NetMessage for Text {
    fn type_id(&self) -> u64 {
        hash_type_name(Self::type_name())
    }

    fn encode(&self, out: &mut Writer) {
        self.identity.write(out);
        out.write_bytes(self.body.as_bytes()).expect("vec write is infallible");
    }

    fn decode(reader: &mut Reader) -> Result<Self, CodecError> {
        let identity = ObjectId::read(reader)?;
        let bytes = reader.read_bytes()?;
        Ok(Text { identity, body: String::from_utf8_lossy(&bytes).into_owned() })
    }

    fn type_name() -> &'static str {
        "netchat::Text"
    }

    fn clone_box(&self) -> Box<dyn NetMessage> {
        Box::new(self.clone())
    }

    fn copy_from(&mut self, other: &dyn NetMessage) -> bool {
        match other.as_any().downcast_ref::<Text>() {
            Some(t) => {
                *self = t.clone();
                true
            }
            None => false,
        }
    }

    fn target_identity(&self) -> Option<ObjectId> {
        Some(self.identity.clone())
    }

    fn set_identity(&mut self, id: ObjectId) {
        self.identity = id;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

const CHAT_ROOM: ObjectId = ObjectId::Simple { type_id: 0, instance: 0 };

fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut line = String::new();
        loop {
            line.clear();
            match std::io::stdin().read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let trimmed = line.trim_end().to_string();
                    if tx.send(trimmed).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

fn run_host(bind_addr: SocketAddr) -> std::io::Result<()> {
    let io = UdpTransport::bind(bind_addr)?;
    let host_addr = PeerAddr::from(io.local_addr()?);
    let runtime = NetRuntime::new_host(io, host_addr, Config::default());
    runtime.register_message::<Text>();

    let room = runtime.create_object(Role::Master, CHAT_ROOM);
    room.on::<Text, _>(|msg, sender, ctx| {
        let line = format!("User{}: {}", sender, msg.body);
        println!("{line}");
        let reply = Text { identity: CHAT_ROOM, body: line };
        ctx.send(sender, &reply, SendOptions::RELIABLE);
    });
    room.on_replica_added(|peer, ctx| {
        let welcome = Text { identity: CHAT_ROOM, body: "System: welcome to the chat!".to_string() };
        ctx.send(peer, &welcome, SendOptions::RELIABLE);
        println!("System: User{peer} has joined!");
    });
    room.on_replica_left(|peer, _ctx| {
        println!("System: User{peer} has left!");
    });

    println!("hosting chat on {host_addr}");
    let clock = SystemClock;
    loop {
        runtime.tick(clock.now());
        thread::sleep(Duration::from_millis(10));
    }
}

fn run_participant(host_addr: SocketAddr, local_addr: SocketAddr) -> std::io::Result<()> {
    let io = UdpTransport::bind(local_addr)?;
    let local_addr = PeerAddr::from(io.local_addr()?);
    let runtime = NetRuntime::new_participant(io, PeerAddr::from(host_addr), local_addr, Config::default());
    runtime.register_message::<Text>();

    let room = runtime.create_object(Role::Slave, CHAT_ROOM);
    room.on::<Text, _>(|msg, _sender, _ctx| {
        println!("{}", msg.body);
    });

    let input = spawn_stdin_reader();
    println!("joined chat via {host_addr} as {local_addr}");
    let clock = SystemClock;
    loop {
        while let Ok(line) = input.try_recv() {
            if line == "/quit" {
                return Ok(());
            }
            room.send_to_master(Text { identity: CHAT_ROOM, body: line }, SendOptions::RELIABLE);
        }
        runtime.tick(clock.now());
        thread::sleep(Duration::from_millis(10));
    }
}

fn main() -> std::io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("host") => {
            let bind_addr: SocketAddr = args.get(2).map(String::as_str).unwrap_or("0.0.0.0:8000").parse().expect("invalid bind address");
            run_host(bind_addr)
        }
        Some("join") => {
            let host_addr: SocketAddr = args.get(2).expect("usage: netchat join <host_addr> [local_addr]").parse().expect("invalid host address");
            let local_addr: SocketAddr = args.get(3).map(String::as_str).unwrap_or("0.0.0.0:0").parse().expect("invalid local address");
            run_participant(host_addr, local_addr)
        }
        _ => {
            eprintln!("usage: netchat host [bind_addr] | netchat join <host_addr> [local_addr]");
            Ok(())
        }
    }
}
