//! agentrun - Supervise coding-agent CLIs and normalize their output streams

pub mod cli;
pub mod config;
pub mod error;
pub mod monitor;
pub mod normalize;
pub mod output;
pub mod provider;
pub mod session;
pub mod stream;

pub use error::{FrameParseError, StreamReadError, SupervisorError};
pub use normalize::{EventKind, UnifiedEvent};
pub use provider::{ProviderMapping, ProviderRegistry};
pub use session::{AgentCommand, SessionLimits, SessionRecord, SessionRequest, Supervisor, TerminationReason};
