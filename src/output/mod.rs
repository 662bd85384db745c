//! Consumers of the normalized event sequence

pub mod audit;
pub mod summary;

pub use audit::{AuditHeader, AuditRecord};
pub use summary::{render_event_line, render_summary};
