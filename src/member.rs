//! The in-memory authoritative view of currently known cluster members.
//! A `RwLock<HashMap<...>>` guards the primary table, with a second
//! index kept in lockstep under the same mutation path so readers never
//! observe a partial update across the two.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{CherryError, ErrorCode};

/// A node's identity, kind, reachable address, and free-form settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub node_id: String,
    pub node_type: String,
    pub address: String,
    pub settings: HashMap<String, String>,
}

impl Member {
    pub fn new(
        node_id: impl Into<String>,
        node_type: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            node_type: node_type.into(),
            address: address.into(),
            settings: HashMap::new(),
        }
    }

    /// True when every field but `node_id` matches — two members sharing
    /// an id must be identical in everything else.
    fn conflicts_with(&self, other: &Member) -> bool {
        self.node_id == other.node_id
            && (self.node_type != other.node_type || self.address != other.address || self.settings != other.settings)
    }
}

#[derive(Default)]
struct Indices {
    by_id: HashMap<String, Member>,
    by_type: HashMap<String, Vec<String>>,
}

/// `nodeId → Member` plus a secondary `nodeType → ordered node ids` index.
/// Both indices live behind one lock so mutations never leave readers
/// observing one index updated and not the other.
pub struct MemberRegistry {
    inner: RwLock<Indices>,
}

impl Default for MemberRegistry {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
        }
    }
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: re-adding an identical member is a no-op; adding a
    /// conflicting one (same id, different fields) fails.
    pub fn add(&self, member: Member) -> Result<(), CherryError> {
        let mut guard = self.inner.write().expect("member registry lock poisoned");
        if let Some(existing) = guard.by_id.get(&member.node_id) {
            if existing.conflicts_with(&member) {
                return Err(CherryError::new(ErrorCode::MemberConflict));
            }
            return Ok(());
        }

        guard
            .by_type
            .entry(member.node_type.clone())
            .or_default()
            .push(member.node_id.clone());
        guard.by_id.insert(member.node_id.clone(), member);
        Ok(())
    }

    /// Removal of an unknown id is a no-op.
    pub fn remove(&self, node_id: &str) {
        let mut guard = self.inner.write().expect("member registry lock poisoned");
        if let Some(member) = guard.by_id.remove(node_id) {
            if let Some(bucket) = guard.by_type.get_mut(&member.node_type) {
                bucket.retain(|id| id != node_id);
            }
        }
    }

    pub fn get(&self, node_id: &str) -> Option<Member> {
        self.inner
            .read()
            .expect("member registry lock poisoned")
            .by_id
            .get(node_id)
            .cloned()
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.inner
            .read()
            .expect("member registry lock poisoned")
            .by_id
            .contains_key(node_id)
    }

    /// Members of a given type, in insertion order, so deterministic
    /// "first of type" selection is possible.
    pub fn list_by_type(&self, node_type: &str) -> Vec<Member> {
        let guard = self.inner.read().expect("member registry lock poisoned");
        guard
            .by_type
            .get(node_type)
            .into_iter()
            .flatten()
            .filter_map(|id| guard.by_id.get(id).cloned())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Member> {
        self.inner
            .read()
            .expect("member registry lock poisoned")
            .by_id
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("member registry lock poisoned").by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_is_idempotent() {
        let registry = MemberRegistry::new();
        let m = Member::new("n1", "gate", "127.0.0.1:9000");
        registry.add(m.clone()).unwrap();
        registry.add(m).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn conflicting_add_is_rejected() {
        let registry = MemberRegistry::new();
        registry.add(Member::new("n1", "gate", "127.0.0.1:9000")).unwrap();
        let conflicting = Member::new("n1", "gate", "127.0.0.1:9999");
        let err = registry.add(conflicting).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MemberConflict);
    }

    #[test]
    fn remove_unknown_is_noop() {
        let registry = MemberRegistry::new();
        registry.remove("does-not-exist");
        assert!(registry.is_empty());
    }

    #[test]
    fn list_by_type_preserves_insertion_order() {
        let registry = MemberRegistry::new();
        registry.add(Member::new("g1", "gate", "a")).unwrap();
        registry.add(Member::new("g2", "gate", "b")).unwrap();
        registry.add(Member::new("m1", "center", "c")).unwrap();

        let gates = registry.list_by_type("gate");
        assert_eq!(gates.iter().map(|m| m.node_id.as_str()).collect::<Vec<_>>(), vec!["g1", "g2"]);
    }

    #[test]
    fn remove_updates_both_indices() {
        let registry = MemberRegistry::new();
        registry.add(Member::new("g1", "gate", "a")).unwrap();
        registry.remove("g1");
        assert!(registry.get("g1").is_none());
        assert!(registry.list_by_type("gate").is_empty());
    }
}
