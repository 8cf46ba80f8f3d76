//! The client session agent.

pub mod agent;
pub mod command;
pub mod listener;
pub mod registry;
pub mod session;
pub mod transport;

pub use agent::{AgentHandle, SendItem};
pub use command::{Command, CommandTable};
pub use registry::SessionRegistry;
pub use session::{Session, SessionState};
