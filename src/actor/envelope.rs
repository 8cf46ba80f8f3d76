//! `Envelope`: the unit of work posted to an actor's mailbox. Carries any
//! RPC call, fire-and-forget or request/response alike.

use tokio::sync::oneshot;

use crate::actor::path::ActorPath;
use crate::error::CherryError;

/// A reply slot. Present for `callWait`-style requests, absent for
/// fire-and-forget `call`s.
pub type ReplyChannel = oneshot::Sender<Result<Vec<u8>, CherryError>>;

pub struct Envelope {
    pub source: ActorPath,
    pub target: ActorPath,
    pub func_name: String,
    pub payload: Vec<u8>,
    pub reply: Option<ReplyChannel>,
}

impl Envelope {
    pub fn fire_and_forget(source: ActorPath, target: ActorPath, func_name: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            source,
            target,
            func_name: func_name.into(),
            payload,
            reply: None,
        }
    }

    pub fn request(
        source: ActorPath,
        target: ActorPath,
        func_name: impl Into<String>,
        payload: Vec<u8>,
    ) -> (Self, oneshot::Receiver<Result<Vec<u8>, CherryError>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                source,
                target,
                func_name: func_name.into(),
                payload,
                reply: Some(tx),
            },
            rx,
        )
    }

    pub fn is_request(&self) -> bool {
        self.reply.is_some()
    }

    /// Sends the handler's result back over the reply channel, if any.
    /// Dropping the receiver (the caller gave up, e.g. on timeout) makes
    /// this a no-op: a late reply is simply discarded.
    pub fn reply(self, result: Result<Vec<u8>, CherryError>) {
        if let Some(tx) = self.reply {
            let _ = tx.send(result);
        }
    }
}
