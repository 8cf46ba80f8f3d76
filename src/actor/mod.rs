//! Actor-based RPC dispatch: addressable actors exchanging envelopes
//! locally or across the cluster bus.

pub mod actor;
pub mod envelope;
pub mod mailbox;
pub mod path;
pub mod system;

pub use actor::{Actor, BoxFuture};
pub use envelope::Envelope;
pub use path::ActorPath;
pub use system::ActorSystem;
