//! `cherry`: cluster membership, actor-based RPC dispatch, and the
//! client session agent for a distributed game-cluster runtime.
//!
//! The crate is organized the way `CherryApp` (component G) assembles
//! it: a bus client (A) underlies a member registry (B), kept converged
//! by the discovery protocol (C); an actor system (D) dispatches calls
//! locally or across A; a packet/message codec (E) frames the client
//! wire protocol consumed by the session agent (F).

pub mod actor;
pub mod bus;
pub mod codec;
pub mod config;
pub mod discovery;
pub mod error;
pub mod member;
pub mod serializer;
pub mod session;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::actor::ActorSystem;
use crate::bus::BusClient;
use crate::discovery::{DiscoveryClient, DiscoveryMaster};
use crate::error::CherryError;
use crate::member::{Member, MemberRegistry};
use crate::serializer::Serializer;
use crate::session::command::CommandTable;
use crate::session::listener::{self, ListenerConfig};
use crate::session::SessionRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum AppState {
    Stopped = 0,
    Running = 1,
}

enum DiscoveryRole {
    Master(DiscoveryMaster),
    Client(DiscoveryClient),
}

/// Optional configuration for component F, the client-facing listener.
/// Nodes that accept no client connections (a pure `center` node, say)
/// omit this entirely when calling `start`.
pub struct ListenOptions {
    pub addr: String,
    pub commands: Arc<CommandTable>,
    pub config: ListenerConfig,
}

/// The application facade: owns one instance of each component and
/// drives startup/shutdown ordering. An explicit value, never a
/// global/`lazy_static` singleton, so a process can host more than one
/// independent instance.
pub struct CherryApp<S: Serializer> {
    node_id: String,
    node_type: String,
    rpc_address: String,
    bus: Arc<dyn BusClient>,
    members: Arc<MemberRegistry>,
    discovery: DiscoveryRole,
    actors: Arc<ActorSystem<S>>,
    sessions: Arc<SessionRegistry>,
    listener_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    state: AtomicU8,
}

impl<S: Serializer> CherryApp<S> {
    /// Assembles A, B, C, D but does not start C's protocol loops or F's
    /// listener; call [`start`](Self::start) for that.
    pub fn new(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        rpc_address: impl Into<String>,
        master_node_id: &str,
        bus: Arc<dyn BusClient>,
    ) -> Self {
        let node_id = node_id.into();
        let node_type = node_type.into();
        let rpc_address = rpc_address.into();
        let members = Arc::new(MemberRegistry::new());
        let actors = Arc::new(ActorSystem::new(node_id.clone(), Arc::clone(&members), Arc::clone(&bus)));

        let discovery = if node_id == master_node_id {
            DiscoveryRole::Master(DiscoveryMaster::new(node_id.clone(), Arc::clone(&members), Arc::clone(&bus)))
        } else {
            DiscoveryRole::Client(DiscoveryClient::new(node_id.clone(), master_node_id, Arc::clone(&members), Arc::clone(&bus)))
        };

        Self {
            node_id,
            node_type,
            rpc_address,
            bus,
            members,
            discovery,
            actors,
            sessions: Arc::new(SessionRegistry::new()),
            listener_task: tokio::sync::Mutex::new(None),
            state: AtomicU8::new(AppState::Stopped as u8),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn rpc_address(&self) -> &str {
        &self.rpc_address
    }

    pub fn actor_system(&self) -> &Arc<ActorSystem<S>> {
        &self.actors
    }

    pub fn members(&self) -> &Arc<MemberRegistry> {
        &self.members
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == AppState::Running as u8
    }

    /// Brings up the bus, member registry, discovery protocol, actor
    /// system, and finally the client listener, in that order. `listen`
    /// is omitted on nodes that accept no client connections.
    pub async fn start(&self, listen: Option<ListenOptions>) -> Result<(), CherryError> {
        // A, B: the bus and member registry are already live by
        // construction; C brings B to convergence.
        let self_member = Member::new(self.node_id.clone(), self.node_type.clone(), self.rpc_address.clone());
        match &self.discovery {
            DiscoveryRole::Master(master) => master.start(self_member).await?,
            DiscoveryRole::Client(client) => client.start(self_member).await?,
        }

        // D: actors themselves are registered by the caller through
        // `actor_system()`; the inbox subscription is what lets another
        // node's `call`/`call_wait` actually reach them.
        ActorSystem::start_remote_inbox(Arc::clone(&self.actors)).await?;

        // F: optionally accept client connections.
        if let Some(ListenOptions { addr, commands, config }) = listen {
            let sessions = Arc::clone(&self.sessions);
            let task = tokio::spawn(async move {
                if let Err(e) = listener::run(&addr, commands, sessions, config).await {
                    log::error!("session listener on {addr} exited: {e}");
                }
            });
            *self.listener_task.lock().await = Some(task);
        }

        self.state.store(AppState::Running as u8, Ordering::Release);
        Ok(())
    }

    /// Reverses startup order: listener, then actor system, then
    /// discovery, then the bus. Safe to call even if `start` never ran.
    pub async fn stop(&self) {
        self.state.store(AppState::Stopped as u8, Ordering::Release);

        if let Some(task) = self.listener_task.lock().await.take() {
            task.abort();
        }

        self.actors.shutdown_all();

        if let DiscoveryRole::Client(client) = &self.discovery {
            client.shutdown().await;
        }

        // B has no explicit teardown; it is dropped along with self.

        // Forcibly close the bus last, breaking any still-indefinite
        // registration retries a lagging discovery task might be stuck in.
        self.bus.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::memory::InMemoryBus;
    use crate::serializer::JsonSerializer;

    #[tokio::test]
    async fn two_facades_coexist_in_one_process() {
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());

        let master: CherryApp<JsonSerializer> = CherryApp::new("m1", "center", "addr-m1", "m1", Arc::clone(&bus));
        master.start(None).await.unwrap();

        let gate: CherryApp<JsonSerializer> = CherryApp::new("g1", "gate", "addr-g1", "m1", Arc::clone(&bus));
        gate.start(None).await.unwrap();

        assert!(master.is_running());
        assert!(gate.is_running());
        assert!(gate.members().contains("m1"));
        assert!(master.members().contains("g1"));

        gate.stop().await;
        master.stop().await;
        assert!(!gate.is_running());
    }

    #[tokio::test]
    async fn stop_before_start_does_not_panic() {
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());
        let app: CherryApp<JsonSerializer> = CherryApp::new("m1", "center", "addr-m1", "m1", bus);
        app.stop().await;
        assert!(!app.is_running());
    }
}
