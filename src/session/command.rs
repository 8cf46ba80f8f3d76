//! Command dispatch table, keyed by `PacketType`: the reader's table is
//! polymorphic over a single-method capability, mirrored here as an
//! object-safe `Command` trait.

use std::collections::HashMap;
use std::sync::Arc;

use crate::actor::BoxFuture;
use crate::codec::PacketType;
use crate::codec::packet::Packet;
use crate::session::session::Session;

/// One command handler: `do(session, packet)`.
pub trait Command: Send + Sync + 'static {
    fn execute<'a>(&'a self, session: &'a Arc<Session>, packet: &'a Packet) -> BoxFuture<'a, ()>;
}

#[derive(Default)]
pub struct CommandTable {
    commands: HashMap<PacketType, Box<dyn Command>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, packet_type: PacketType, command: Box<dyn Command>) -> Self {
        self.commands.insert(packet_type, command);
        self
    }

    pub fn get(&self, packet_type: PacketType) -> Option<&dyn Command> {
        self.commands.get(&packet_type).map(|c| c.as_ref())
    }
}
