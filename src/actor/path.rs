//! `ActorPath` parsing: `nodeId.actorId` or `nodeId.actorId.childId`,
//! strict — exactly one or two dots, non-empty segments. An empty
//! `nodeId` means "route locally".

use std::fmt;

use crate::error::{CherryError, ErrorCode};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorPath {
    pub node_id: String,
    pub actor_id: String,
    pub child_id: Option<String>,
}

impl ActorPath {
    pub fn local(actor_id: impl Into<String>) -> Self {
        Self {
            node_id: String::new(),
            actor_id: actor_id.into(),
            child_id: None,
        }
    }

    pub fn is_local_shorthand(&self) -> bool {
        self.node_id.is_empty()
    }

    pub fn parse(raw: &str) -> Result<Self, CherryError> {
        let parts: Vec<&str> = raw.split('.').collect();
        match parts.as_slice() {
            [node_id, actor_id] => {
                if actor_id.is_empty() {
                    return Err(CherryError::new(ErrorCode::RouteDecodeError));
                }
                Ok(Self {
                    node_id: node_id.to_string(),
                    actor_id: actor_id.to_string(),
                    child_id: None,
                })
            }
            [node_id, actor_id, child_id] => {
                if actor_id.is_empty() || child_id.is_empty() {
                    return Err(CherryError::new(ErrorCode::RouteDecodeError));
                }
                Ok(Self {
                    node_id: node_id.to_string(),
                    actor_id: actor_id.to_string(),
                    child_id: Some(child_id.to_string()),
                })
            }
            _ => Err(CherryError::new(ErrorCode::RouteDecodeError)),
        }
    }

    /// The mailbox key: children share a parent's addressable identity in
    /// the local actor table, so only `actor_id` is used to look up the
    /// registered actor: an actor exclusively owns its child actors, so
    /// they share its entry in the local actor table.
    pub fn local_key(&self) -> &str {
        &self.actor_id
    }

    pub fn with_node(&self, node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            actor_id: self.actor_id.clone(),
            child_id: self.child_id.clone(),
        }
    }
}

impl fmt::Display for ActorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.child_id {
            Some(child) => write!(f, "{}.{}.{}", self.node_id, self.actor_id, child),
            None => write!(f, "{}.{}", self.node_id, self.actor_id),
        }
    }
}
