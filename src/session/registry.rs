//! Process-wide session table: resolves the agent↔session cycle by
//! having lookups go through `sid` rather than a direct reference held
//! by the session itself. `ActorSystem` handlers use this to reach the
//! connection that owns a given `sid`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::session::agent::AgentHandle;

#[derive(Default)]
pub struct SessionRegistry {
    agents: RwLock<HashMap<u64, Arc<AgentHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sid: u64, agent: Arc<AgentHandle>) {
        self.agents.write().expect("session registry lock poisoned").insert(sid, agent);
    }

    pub fn get(&self, sid: u64) -> Option<Arc<AgentHandle>> {
        self.agents.read().expect("session registry lock poisoned").get(&sid).cloned()
    }

    /// Called once the agent has fully closed, to drop its table entry.
    pub fn remove(&self, sid: u64) {
        self.agents.write().expect("session registry lock poisoned").remove(&sid);
    }

    pub fn len(&self) -> usize {
        self.agents.read().expect("session registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
