//! `Session`: per-connection state shared between the reader
//! and writer halves of an `Agent`. Uid and attributes are guarded by a
//! lock held only during mutation; state and heartbeat timestamp are
//! read via atomics so the hot paths never block on each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::RwLock;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Init = 0,
    Working = 1,
    Closed = 2,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Init,
            1 => SessionState::Working,
            _ => SessionState::Closed,
        }
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as i64
}

pub struct Session {
    pub sid: u64,
    uid: RwLock<Option<String>>,
    state: AtomicU8,
    last_heartbeat_unix: AtomicI64,
    attributes: RwLock<HashMap<String, String>>,
}

impl Session {
    pub fn new(sid: u64) -> Self {
        Self {
            sid,
            uid: RwLock::new(None),
            state: AtomicU8::new(SessionState::Init as u8),
            last_heartbeat_unix: AtomicI64::new(now_unix()),
            attributes: RwLock::new(HashMap::new()),
        }
    }

    pub fn uid(&self) -> Option<String> {
        self.uid.read().expect("session uid lock poisoned").clone()
    }

    /// Assigns `uid` and advances `Init → Working`. Immutable once set;
    /// a second call is a no-op, matching the monotone state-transition
    /// rule.
    pub fn bind_uid(&self, uid: impl Into<String>) {
        let mut guard = self.uid.write().expect("session uid lock poisoned");
        if guard.is_none() {
            *guard = Some(uid.into());
            self.advance_state(SessionState::Working);
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::Acquire))
    }

    /// Moves the state forward only; `Init → Working → Closed` is
    /// monotone, so a request to move backward (or to the current state)
    /// is silently ignored.
    pub fn advance_state(&self, next: SessionState) {
        if (next as u8) > self.state.load(Ordering::Acquire) {
            self.state.store(next as u8, Ordering::Release);
        }
    }

    pub fn touch_heartbeat(&self) {
        self.last_heartbeat_unix.store(now_unix(), Ordering::Release);
    }

    pub fn last_heartbeat_unix(&self) -> i64 {
        self.last_heartbeat_unix.load(Ordering::Acquire)
    }

    pub fn set_attribute(&self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.write().expect("session attributes lock poisoned").insert(key.into(), value.into());
    }

    pub fn get_attribute(&self, key: &str) -> Option<String> {
        self.attributes.read().expect("session attributes lock poisoned").get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_transitions_are_monotone() {
        let session = Session::new(1);
        assert_eq!(session.state(), SessionState::Init);
        session.advance_state(SessionState::Closed);
        assert_eq!(session.state(), SessionState::Closed);
        session.advance_state(SessionState::Working);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn bind_uid_is_immutable_once_set() {
        let session = Session::new(1);
        session.bind_uid("alice");
        session.bind_uid("bob");
        assert_eq!(session.uid().as_deref(), Some("alice"));
        assert_eq!(session.state(), SessionState::Working);
    }
}
