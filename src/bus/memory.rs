//! In-process `BusClient` double used by tests. Mirrors the real
//! subject-based publish/subscribe/request semantics closely enough that
//! dispatch logic in `ActorSystem`/discovery exercises the same code
//! paths it would against `NatsBusClient`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::actor::BoxFuture;
use crate::bus::{BusClient, BusMessage};
use crate::error::{CherryError, ErrorCode};

#[derive(Default)]
struct Subscribers {
    by_subject: HashMap<String, Vec<mpsc::Sender<BusMessage>>>,
}

/// Shared in-memory bus. Clone to hand the same bus to multiple
/// `CherryApp` instances within one process, the way a real NATS cluster
/// would be shared by multiple real nodes.
#[derive(Clone)]
pub struct InMemoryBus {
    subscribers: Arc<RwLock<Subscribers>>,
    reply_seq: Arc<AtomicU64>,
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(Subscribers::default())),
            reply_seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn deliver(&self, subject: &str, message: BusMessage) {
        let subs = self.subscribers.read().expect("in-memory bus lock poisoned");
        if let Some(senders) = subs.by_subject.get(subject) {
            for sender in senders {
                // Best-effort: a lagging/dropped subscriber silently
                // misses the message, matching at-most-once delivery.
                let _ = sender.try_send(BusMessage {
                    subject: message.subject.clone(),
                    payload: message.payload.clone(),
                    reply_to: message.reply_to.clone(),
                });
            }
        }
    }
}

impl BusClient for InMemoryBus {
    fn publish<'a>(&'a self, subject: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), CherryError>> {
        Box::pin(async move {
            self.deliver(
                subject,
                BusMessage {
                    subject: subject.to_string(),
                    payload,
                    reply_to: None,
                },
            );
            Ok(())
        })
    }

    fn request<'a>(
        &'a self,
        subject: &'a str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, CherryError>> {
        Box::pin(async move {
            let reply_subject = format!("_inbox.{}", self.reply_seq.fetch_add(1, Ordering::Relaxed));
            let (tx, mut rx) = mpsc::channel(1);
            {
                let mut subs = self.subscribers.write().expect("in-memory bus lock poisoned");
                subs.by_subject.entry(reply_subject.clone()).or_default().push(tx);
            }

            self.deliver(
                subject,
                BusMessage {
                    subject: subject.to_string(),
                    payload,
                    reply_to: Some(reply_subject.clone()),
                },
            );

            let result = tokio::time::timeout(timeout, rx.recv()).await;
            {
                let mut subs = self.subscribers.write().expect("in-memory bus lock poisoned");
                subs.by_subject.remove(&reply_subject);
            }

            match result {
                Ok(Some(message)) => Ok(message.payload),
                Ok(None) | Err(_) => Err(CherryError::new(ErrorCode::NetError)),
            }
        })
    }

    fn subscribe<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<mpsc::Receiver<BusMessage>, CherryError>> {
        Box::pin(async move {
            let (tx, rx) = mpsc::channel(256);
            let mut subs = self.subscribers.write().expect("in-memory bus lock poisoned");
            subs.by_subject.entry(subject.to_string()).or_default().push(tx);
            Ok(rx)
        })
    }

    fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(10)
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let mut subs = self.subscribers.write().expect("in-memory bus lock poisoned");
            subs.by_subject.clear();
        })
    }
}
