//! Activity monitoring module
//! Watches a provider's state directory for evidence of progress while the
//! output stream is quiet

pub mod directory;
pub mod location;
pub mod monitor_trait;
pub mod state;

pub use directory::{ActivityMonitor, DirectoryProbe};
pub use location::resolve_state_dir;
pub use monitor_trait::{ActivityProbe, MonitorError};
pub use state::{ActivitySample, LivenessSignal};
