//! The `Actor` trait: an addressable entity owning a single-threaded
//! mailbox. Object-safe by hand (boxed futures) rather than via the
//! `async-trait` macro: an `Actor` needs to be stored as `Box<dyn Actor>`
//! in the actor table, so the boxed-future shape is the idiomatic middle
//! ground between a dyn-safe trait and an ergonomic `async fn`.

use std::future::Future;
use std::pin::Pin;

use crate::actor::envelope::Envelope;

/// A single inbound call. `func_name` selects the operation the same way
/// an HTTP method+path selects a handler; implementations typically
/// `match` on it.
pub trait Actor: Send + 'static {
    /// Handle one envelope to completion. Returning `Err` only matters
    /// for request/response envelopes (their bytes become the call's
    /// error); fire-and-forget envelopes ignore the result other than
    /// logging it.
    fn handle<'a>(&'a mut self, envelope: Envelope) -> BoxFuture<'a, ()>;
}

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
