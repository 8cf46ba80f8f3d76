//! `ActorSystem`: the dispatch surface shared by `call` and `callWait`,
//! resolving a target path to a local actor or a remote node over the
//! bus.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize as SerdeSerialize;
use serde::de::DeserializeOwned;

use crate::actor::actor::Actor;
use crate::actor::envelope::Envelope;
use crate::actor::mailbox::{self, ActorHandle};
use crate::actor::path::ActorPath;
use crate::bus::{BusClient, BusMessage};
use crate::error::{CherryError, ErrorCode};
use crate::member::MemberRegistry;
use crate::serializer::Serializer;

/// Default `callWait` deadline absent a more specific override.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Deterministic bus subject for a node's RPC inbox. Opaque to callers;
/// every node must derive it the same way for remote dispatch to reach
/// the right inbox.
fn rpc_subject(node_id: &str) -> String {
    format!("cherry.rpc.{node_id}")
}

pub struct ActorSystem<S: Serializer> {
    local_node_id: String,
    actors: RwLock<HashMap<String, ActorHandle>>,
    members: Arc<MemberRegistry>,
    bus: Arc<dyn BusClient>,
    call_timeout: Duration,
    _serializer: PhantomData<S>,
}

impl<S: Serializer> ActorSystem<S> {
    pub fn new(local_node_id: impl Into<String>, members: Arc<MemberRegistry>, bus: Arc<dyn BusClient>) -> Self {
        Self {
            local_node_id: local_node_id.into(),
            actors: RwLock::new(HashMap::new()),
            members,
            bus,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            _serializer: PhantomData,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Installs a local actor. Fails if the id is already registered.
    pub fn register(&self, actor_id: impl Into<String>, actor: Box<dyn Actor>) -> Result<(), CherryError> {
        let actor_id = actor_id.into();
        let mut table = self.actors.write().expect("actor table lock poisoned");
        if table.contains_key(&actor_id) {
            return Err(CherryError::new(ErrorCode::HandlerAlreadyRegistered));
        }
        let handle = mailbox::spawn(actor, actor_id.clone());
        table.insert(actor_id, handle);
        Ok(())
    }

    pub fn unregister(&self, actor_id: &str) {
        let mut table = self.actors.write().expect("actor table lock poisoned");
        if let Some(handle) = table.remove(actor_id) {
            handle.begin_stop();
        }
    }

    /// Stops every locally registered actor. Used by the application
    /// facade's `stop()`.
    pub fn shutdown_all(&self) {
        let table = self.actors.write().expect("actor table lock poisoned");
        for handle in table.values() {
            handle.begin_stop();
        }
    }

    /// Resolves an empty `nodeId` to the local node; otherwise passes the
    /// target through unchanged.
    fn resolve(&self, target: &ActorPath) -> ActorPath {
        if target.is_local_shorthand() {
            target.with_node(self.local_node_id.clone())
        } else {
            target.clone()
        }
    }

    /// Fire-and-forget dispatch: `call(source, target, func, request)`.
    pub async fn call<T: SerdeSerialize>(
        &self,
        source: ActorPath,
        target: ActorPath,
        func_name: &str,
        request: &T,
    ) -> Result<(), CherryError> {
        let target = self.resolve(&target);

        if target.node_id == self.local_node_id {
            return self.enqueue_local(source, target, func_name, request).await;
        }

        if !self.members.contains(&target.node_id) {
            return Err(CherryError::new(ErrorCode::DiscoveryNotFoundNode));
        }

        let payload = S::marshal(request)?;
        let subject = rpc_subject(&target.node_id);
        let envelope_bytes = encode_remote_envelope(&source, &target, func_name, payload);
        // Fire-and-forget: bus errors beyond marshaling are silently dropped.
        let _ = self.bus.publish(&subject, envelope_bytes).await;
        Ok(())
    }

    /// Synchronous request/response with the system's default timeout:
    /// `callWait(source, target, func, request) -> response`.
    pub async fn call_wait<T: SerdeSerialize, R: DeserializeOwned>(
        &self,
        source: ActorPath,
        target: ActorPath,
        func_name: &str,
        request: &T,
    ) -> Result<R, CherryError> {
        let target = self.resolve(&target);

        if target.node_id == self.local_node_id {
            let bytes = self.call_local_wait(source, target, func_name, request).await?;
            return S::unmarshal(&bytes);
        }

        if !self.members.contains(&target.node_id) {
            return Err(CherryError::new(ErrorCode::DiscoveryNotFoundNode));
        }

        let payload = S::marshal(request)?;
        let subject = rpc_subject(&target.node_id);
        let envelope_bytes = encode_remote_envelope(&source, &target, func_name, payload);

        let response = self
            .bus
            .request(&subject, envelope_bytes, self.call_timeout)
            .await
            .map_err(|_| CherryError::new(ErrorCode::NetError))?;
        let bytes = decode_remote_reply(&response)?;
        S::unmarshal(&bytes)
    }

    async fn enqueue_local<T: SerdeSerialize>(
        &self,
        source: ActorPath,
        target: ActorPath,
        func_name: &str,
        request: &T,
    ) -> Result<(), CherryError> {
        let payload = S::marshal(request)?;
        let envelope = Envelope::fire_and_forget(source, target.clone(), func_name, payload);
        self.post_local(&target, envelope).await
    }

    async fn call_local_wait<T: SerdeSerialize>(
        &self,
        source: ActorPath,
        target: ActorPath,
        func_name: &str,
        request: &T,
    ) -> Result<Vec<u8>, CherryError> {
        let payload = S::marshal(request)?;
        let (envelope, rx) = Envelope::request(source, target.clone(), func_name, payload);
        self.post_local(&target, envelope).await?;

        match tokio::time::timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) | Err(_) => Err(CherryError::new(ErrorCode::NetError)),
        }
    }

    async fn post_local(&self, target: &ActorPath, envelope: Envelope) -> Result<(), CherryError> {
        let handle = {
            let table = self.actors.read().expect("actor table lock poisoned");
            match table.get(target.local_key()) {
                Some(handle) => handle.clone(),
                None => return Err(CherryError::new(ErrorCode::HandlerNotFound)),
            }
        };
        handle.post(envelope).await.map_err(CherryError::from)
    }

    /// Subscribes `system` to its own `rpc_subject` and spawns the loop
    /// that bridges inbound `RemoteEnvelope`s into local mailbox posts:
    /// the other half of `call`/`call_wait`'s publish-to-`rpc_subject`
    /// side, without which no node can ever receive a remote RPC. Each
    /// message is handled on its own task so one slow or stuck handler
    /// never head-of-line blocks the rest of the inbox.
    pub async fn start_remote_inbox(system: Arc<Self>) -> Result<(), CherryError> {
        let subject = rpc_subject(&system.local_node_id);
        let mut inbox = system.bus.subscribe(&subject).await?;
        tokio::spawn(async move {
            while let Some(message) = inbox.recv().await {
                let system = Arc::clone(&system);
                tokio::spawn(async move {
                    system.handle_remote_envelope(message).await;
                });
            }
        });
        Ok(())
    }

    async fn handle_remote_envelope(&self, message: BusMessage) {
        let remote: RemoteEnvelope = match serde_json::from_slice(&message.payload) {
            Ok(remote) => remote,
            Err(e) => {
                log::warn!("actor system '{}': malformed remote envelope: {e}", self.local_node_id);
                return;
            }
        };

        let source = match ActorPath::parse(&remote.source) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("actor system '{}': unparsable remote source '{}': {e}", self.local_node_id, remote.source);
                return;
            }
        };
        let target = match ActorPath::parse(&remote.target) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("actor system '{}': unparsable remote target '{}': {e}", self.local_node_id, remote.target);
                return;
            }
        };

        match message.reply_to {
            Some(reply_to) => {
                let (envelope, rx) = Envelope::request(source, target.clone(), remote.func_name, remote.payload);
                let result = match self.post_local(&target, envelope).await {
                    Ok(()) => match tokio::time::timeout(self.call_timeout, rx).await {
                        Ok(Ok(result)) => result,
                        Ok(Err(_)) | Err(_) => Err(CherryError::new(ErrorCode::NetError)),
                    },
                    Err(e) => Err(e),
                };
                let _ = self.bus.publish(&reply_to, encode_remote_reply(result)).await;
            }
            None => {
                let envelope = Envelope::fire_and_forget(source, target.clone(), remote.func_name, remote.payload);
                if let Err(e) = self.post_local(&target, envelope).await {
                    log::warn!("actor system '{}': remote fire-and-forget to '{target}' failed: {e}", self.local_node_id);
                }
            }
        }
    }
}

/// Wire shape for a remote envelope crossing the bus: just enough for the
/// receiving node's inbox subscriber to reconstruct an `Envelope` and
/// dispatch it locally. Kept separate from the payload's own
/// serialization so the envelope's routing fields never depend on the
/// application `Serializer` in use.
#[derive(serde::Serialize, serde::Deserialize)]
pub struct RemoteEnvelope {
    pub source: String,
    pub target: String,
    pub func_name: String,
    pub payload: Vec<u8>,
}

fn encode_remote_envelope(source: &ActorPath, target: &ActorPath, func_name: &str, payload: Vec<u8>) -> Vec<u8> {
    let remote = RemoteEnvelope {
        source: source.to_string(),
        target: target.to_string(),
        func_name: func_name.to_string(),
        payload,
    };
    // The envelope's own routing metadata always travels as JSON,
    // independent of the configured application `Serializer` — only the
    // inner payload is pluggable.
    serde_json::to_vec(&remote).expect("RemoteEnvelope fields are always JSON-encodable")
}

/// Wire shape for a `callWait` reply crossing the bus: the handler's
/// result, carried as a code rather than a bare success/failure flag so a
/// remote rejection (unknown actor, handler error) is distinguishable
/// from a transport failure on the caller's side.
#[derive(serde::Serialize, serde::Deserialize)]
struct RemoteReply {
    code: i32,
    data: Vec<u8>,
}

fn encode_remote_reply(result: Result<Vec<u8>, CherryError>) -> Vec<u8> {
    let reply = match result {
        Ok(data) => RemoteReply { code: ErrorCode::Ok.as_i32(), data },
        Err(e) => RemoteReply { code: e.code().as_i32(), data: Vec::new() },
    };
    serde_json::to_vec(&reply).expect("RemoteReply fields are always JSON-encodable")
}

fn decode_remote_reply(bytes: &[u8]) -> Result<Vec<u8>, CherryError> {
    let reply: RemoteReply = serde_json::from_slice(bytes).map_err(|e| CherryError::with_source(ErrorCode::UnmarshalError, e))?;
    match ErrorCode::from_i32(reply.code) {
        Some(ErrorCode::Ok) => Ok(reply.data),
        Some(code) => Err(CherryError::new(code)),
        None => Err(CherryError::new(ErrorCode::UnmarshalError)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::actor::BoxFuture;
    use crate::bus::memory::InMemoryBus;
    use crate::member::Member;
    use crate::serializer::JsonSerializer;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Pong {
        n: u32,
    }

    struct Echo;
    impl Actor for Echo {
        fn handle<'a>(&'a mut self, envelope: Envelope) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                let ping: Ping = JsonSerializer::unmarshal(&envelope.payload).unwrap();
                let response = JsonSerializer::marshal(&Pong { n: ping.n }).unwrap();
                envelope.reply(Ok(response));
            })
        }
    }

    fn system() -> ActorSystem<JsonSerializer> {
        let members = Arc::new(MemberRegistry::new());
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());
        ActorSystem::new("m1", members, bus)
    }

    #[tokio::test]
    async fn local_call_wait_round_trips() {
        let sys = system();
        sys.register("echo", Box::new(Echo)).unwrap();

        let response: Pong = sys
            .call_wait(ActorPath::local("caller"), ActorPath::local("echo"), "ping", &Ping { n: 7 })
            .await
            .unwrap();
        assert_eq!(response.n, 7);
    }

    #[tokio::test]
    async fn call_to_unknown_local_actor_fails_with_handler_not_found() {
        let sys = system();
        let err = sys
            .call(ActorPath::local("caller"), ActorPath::local("ghost"), "ping", &Ping { n: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HandlerNotFound);
    }

    #[tokio::test]
    async fn call_wait_to_unknown_node_fails_with_discovery_not_found() {
        let sys = system();
        let target = ActorPath {
            node_id: "nope".into(),
            actor_id: "account".into(),
            child_id: None,
        };
        let err = sys
            .call_wait::<_, Pong>(ActorPath::local("caller"), target, "getUID", &Ping { n: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::DiscoveryNotFoundNode);
    }

    #[tokio::test]
    async fn register_twice_fails() {
        let sys = system();
        sys.register("echo", Box::new(Echo)).unwrap();
        let err = sys.register("echo", Box::new(Echo)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::HandlerAlreadyRegistered);
    }

    #[tokio::test]
    async fn remote_target_known_member_is_attempted_over_bus() {
        let members = Arc::new(MemberRegistry::new());
        members.add(Member::new("m2", "center", "127.0.0.1:9000")).unwrap();
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());
        let sys = ActorSystem::<JsonSerializer>::new("m1", members, bus).with_call_timeout(Duration::from_millis(20));

        let target = ActorPath {
            node_id: "m2".into(),
            actor_id: "account".into(),
            child_id: None,
        };
        // No responder is listening on m2's subject, so this should time
        // out with NetError rather than DiscoveryNotFoundNode.
        let err = sys
            .call_wait::<_, Pong>(ActorPath::local("caller"), target, "getUID", &Ping { n: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NetError);
    }

    #[tokio::test]
    async fn remote_call_wait_round_trips_through_the_subscribed_inbox() {
        let members = Arc::new(MemberRegistry::new());
        members.add(Member::new("m2", "center", "127.0.0.1:9000")).unwrap();
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());

        let callee = Arc::new(ActorSystem::<JsonSerializer>::new("m2", Arc::clone(&members), Arc::clone(&bus)));
        callee.register("echo", Box::new(Echo)).unwrap();
        ActorSystem::start_remote_inbox(Arc::clone(&callee)).await.unwrap();

        let caller = ActorSystem::<JsonSerializer>::new("m1", members, bus);
        let target = ActorPath {
            node_id: "m2".into(),
            actor_id: "echo".into(),
            child_id: None,
        };
        let response: Pong = caller
            .call_wait(ActorPath::local("caller"), target, "ping", &Ping { n: 9 })
            .await
            .unwrap();
        assert_eq!(response.n, 9);
    }

    #[tokio::test]
    async fn remote_call_wait_to_unregistered_actor_surfaces_handler_not_found() {
        let members = Arc::new(MemberRegistry::new());
        members.add(Member::new("m2", "center", "127.0.0.1:9000")).unwrap();
        let bus: Arc<dyn BusClient> = Arc::new(InMemoryBus::new());

        let callee = Arc::new(ActorSystem::<JsonSerializer>::new("m2", Arc::clone(&members), Arc::clone(&bus)));
        ActorSystem::start_remote_inbox(Arc::clone(&callee)).await.unwrap();

        let caller = ActorSystem::<JsonSerializer>::new("m1", members, bus);
        let target = ActorPath {
            node_id: "m2".into(),
            actor_id: "ghost".into(),
            child_id: None,
        };
        let err = caller
            .call_wait::<_, Pong>(ActorPath::local("caller"), target, "ping", &Ping { n: 1 })
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::HandlerNotFound);
    }
}
