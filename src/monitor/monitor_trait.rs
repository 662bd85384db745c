//! Activity probe trait

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::state::ActivitySample;

/// Source of side-channel evidence that a quiet agent is still working
///
/// The supervisor only ever asks for samples; a probe never touches the
/// subprocess itself.
#[async_trait]
pub trait ActivityProbe: Send + Sync {
    /// Take one snapshot of the watched files
    async fn sample(&self) -> Result<ActivitySample, MonitorError>;

    /// Location being watched, for logging
    fn location(&self) -> &Path;
}

/// Errors that can occur while sampling a state location
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("state location not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("state location unreadable: {}: {source}", .path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MonitorError {
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            MonitorError::NotFound(path.to_path_buf())
        } else {
            MonitorError::Unavailable {
                path: path.to_path_buf(),
                source: err,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_io_error_maps_to_not_found() {
        let err = MonitorError::from_io(
            Path::new("/tmp/missing"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, MonitorError::NotFound(_)));
        assert_eq!(err.to_string(), "state location not found: /tmp/missing");
    }

    #[test]
    fn other_io_errors_map_to_unavailable() {
        let err = MonitorError::from_io(
            Path::new("/root/private"),
            io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        );
        assert_eq!(
            err.to_string(),
            "state location unreadable: /root/private: permission denied"
        );
    }
}
