//! Per-actor mailbox worker: one `tokio` task drains an
//! `mpsc::Receiver<Envelope>` and drives a boxed `Actor` strictly in
//! arrival order. A task rather than an OS thread fits handlers that are
//! I/O-bound RPC glue rather than a CPU-bound simulation tick.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;

use crate::actor::actor::Actor;
use crate::actor::envelope::Envelope;
use crate::error::ErrorCode;

/// Default mailbox depth. Not currently exposed via configuration; a
/// generous fixed bound keeps bursts from blocking callers indefinitely
/// while still giving backpressure semantics a home if ever exposed.
const MAILBOX_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl From<u8> for ActorState {
    fn from(value: u8) -> Self {
        match value {
            0 => ActorState::Created,
            1 => ActorState::Running,
            2 => ActorState::Stopping,
            _ => ActorState::Stopped,
        }
    }
}

/// A live actor's mailbox handle: the sending half plus its lifecycle
/// state. The owning worker task is detached, so one blocked actor never
/// blocks another — `ActorSystem` only ever talks to actors through this
/// handle.
#[derive(Clone)]
pub struct ActorHandle {
    sender: mpsc::Sender<Envelope>,
    state: Arc<AtomicU8>,
}

impl ActorHandle {
    pub fn state(&self) -> ActorState {
        ActorState::from(self.state.load(Ordering::Acquire))
    }

    /// Enqueues one envelope. Fails with `HandlerNotFound` once the actor
    /// has begun stopping: a `Created` actor (registered but not yet
    /// polled by its worker task) still accepts envelopes — the channel
    /// send simply waits for the worker to start draining it.
    pub async fn post(&self, envelope: Envelope) -> Result<(), ErrorCode> {
        if matches!(self.state(), ActorState::Stopping | ActorState::Stopped) {
            return Err(ErrorCode::HandlerNotFound);
        }
        self.sender.send(envelope).await.map_err(|_| ErrorCode::HandlerNotFound)
    }

    /// Marks the actor `Stopping`; in-flight handlers run to completion,
    /// buffered envelopes still drain, but no further `post` succeeds.
    pub fn begin_stop(&self) {
        self.state.store(ActorState::Stopping as u8, Ordering::Release);
    }
}

/// Spawns the worker task for a freshly registered actor and returns the
/// handle `ActorSystem` keeps in its table.
pub fn spawn(mut actor: Box<dyn Actor>, actor_id: String) -> ActorHandle {
    let (tx, mut rx) = mpsc::channel::<Envelope>(MAILBOX_CAPACITY);
    let state = Arc::new(AtomicU8::new(ActorState::Created as u8));
    let worker_state = Arc::clone(&state);

    tokio::spawn(async move {
        worker_state.store(ActorState::Running as u8, Ordering::Release);
        while let Some(envelope) = rx.recv().await {
            // Processes envelopes strictly in arrival order, awaiting
            // each handler to completion before pulling the next one.
            let func_name = envelope.func_name.clone();
            let outcome = AssertUnwindSafe(actor.handle(envelope)).catch_unwind().await;
            if let Err(panic) = outcome {
                let message = panic_message(&panic);
                log::error!("actor '{actor_id}' panicked handling '{func_name}': {message}");
                break;
            }
        }
        worker_state.store(ActorState::Stopped as u8, Ordering::Release);
    });

    ActorHandle { sender: tx, state }
}

fn panic_message(panic: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
