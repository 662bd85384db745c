//! Session supervision module

pub mod command;
pub mod liveness;
pub mod model;
pub mod pipeline;
pub mod process;
pub mod supervisor;

pub use command::AgentCommand;
pub use liveness::LivenessTracker;
pub use model::{Session, SessionLimits, SessionRecord, SessionRequest, SessionState, TerminationReason};
pub use pipeline::{PipelineOutput, SessionPipeline};
pub use process::ProcessHandle;
pub use supervisor::Supervisor;
