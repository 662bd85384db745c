//! Error types shared by the stream and session layers

use std::io;

use crate::stream::StreamSource;

/// Failures that stop a session before it reaches `running`
#[derive(Debug, thiserror::Error)]
pub enum SupervisorError {
    #[error("executable not found: {executable}")]
    ExecutableNotFound { executable: String },
    #[error("failed to spawn {executable}: {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },
    #[error("spawned process has no {stream} pipe")]
    MissingPipe { stream: StreamSource },
    #[error("empty command")]
    EmptyCommand,
}

/// A candidate frame that was expected to be JSON but did not parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unparseable frame: {reason}")]
pub struct FrameParseError {
    pub raw: String,
    pub reason: String,
}

impl FrameParseError {
    pub fn new(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            reason: reason.into(),
        }
    }
}

/// A read on one of the process pipes failed
#[derive(Debug, thiserror::Error)]
#[error("failed reading {source_stream}: {source}")]
pub struct StreamReadError {
    pub source_stream: StreamSource,
    #[source]
    pub source: io::Error,
}
