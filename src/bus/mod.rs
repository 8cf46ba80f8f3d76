//! The cluster message bus abstraction.
//!
//! Object-safe by hand: a small set of async methods returning
//! `BoxFuture` rather than using `async-trait`, so `Box<dyn BusClient>`
//! can be stored in `CherryApp` and swapped between the real
//! `NatsBusClient` and the in-memory double used by tests.

pub mod memory;
pub mod nats;

use std::time::Duration;

use crate::actor::BoxFuture;
use crate::error::CherryError;

/// One inbound bus message delivered to a subscriber.
pub struct BusMessage {
    pub subject: String,
    pub payload: Vec<u8>,
    /// Present when the message was sent via `request`; responding
    /// (rather than ignoring it) is how a `BusClient::subscribe` handler
    /// answers an RPC `callWait`.
    pub reply_to: Option<String>,
}

/// The cluster message bus. One instance per `CherryApp`.
pub trait BusClient: Send + Sync + 'static {
    /// Fire-and-forget publish. Errors beyond construction are not
    /// surfaced to the caller; delivery is at-most-once by design.
    fn publish<'a>(&'a self, subject: &'a str, payload: Vec<u8>) -> BoxFuture<'a, Result<(), CherryError>>;

    /// Request/response with a caller-supplied timeout. Fails with
    /// `NetError` on timeout or transport failure.
    fn request<'a>(
        &'a self,
        subject: &'a str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<Vec<u8>, CherryError>>;

    /// Subscribes to a subject; the returned receiver yields every
    /// message published to it, including ones sent via `request` (in
    /// which case `reply_to` is set and the subscriber is expected to
    /// `publish` its answer there).
    fn subscribe<'a>(&'a self, subject: &'a str) -> BoxFuture<'a, Result<tokio::sync::mpsc::Receiver<BusMessage>, CherryError>>;

    /// Delay before the client's next reconnect attempt. Discovery's
    /// registration retries use this as their own backoff so both layers
    /// stay in lockstep with the underlying transport's health.
    fn reconnect_delay(&self) -> Duration;

    /// Forcibly closes the connection. Shutting down the application
    /// facade closes the bus client last, breaking any otherwise
    /// indefinite, non-cancellable registration retries still in flight.
    fn close(&self) -> BoxFuture<'_, ()>;
}
