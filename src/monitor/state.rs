//! Liveness state definitions

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Derived judgment of whether a session is still making progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessSignal {
    /// The process wrote output recently
    StreamActive,

    /// Output is quiet but the watched files are changing
    FileActive,

    /// Nothing changed since the last poll
    Idle,

    /// The state location cannot be found or read although it should exist by now
    Dead,
}

impl LivenessSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessSignal::StreamActive => "stream_active",
            LivenessSignal::FileActive => "file_active",
            LivenessSignal::Idle => "idle",
            LivenessSignal::Dead => "dead",
        }
    }

    /// True for the signals that hold off an activity timeout
    pub fn is_active(&self) -> bool {
        matches!(self, LivenessSignal::StreamActive | LivenessSignal::FileActive)
    }
}

impl fmt::Display for LivenessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate of the watched files at one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivitySample {
    pub max_mtime: Option<SystemTime>,
    pub total_size: u64,
    pub file_count: usize,
}

impl ActivitySample {
    /// Fold one file's metadata into the sample
    pub fn record(&mut self, modified: Option<SystemTime>, size: u64) {
        self.file_count += 1;
        self.total_size = self.total_size.saturating_add(size);
        if let Some(modified) = modified {
            self.max_mtime = Some(match self.max_mtime {
                Some(current) if current >= modified => current,
                _ => modified,
            });
        }
    }

    /// True when the newest modification time or the total size grew
    pub fn advanced_since(&self, previous: &ActivitySample) -> bool {
        let newer = match (self.max_mtime, previous.max_mtime) {
            (Some(now), Some(before)) => now > before,
            (Some(_), None) => true,
            _ => false,
        };
        newer || self.total_size > previous.total_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn record_tracks_newest_mtime_and_size() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let t1 = t0 + Duration::from_secs(5);
        let mut sample = ActivitySample::default();
        sample.record(Some(t1), 10);
        sample.record(Some(t0), 20);
        sample.record(None, 1);
        assert_eq!(sample.max_mtime, Some(t1));
        assert_eq!(sample.total_size, 31);
        assert_eq!(sample.file_count, 3);
    }

    #[test]
    fn growth_in_either_dimension_counts_as_progress() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(100);
        let base = ActivitySample {
            max_mtime: Some(t0),
            total_size: 10,
            file_count: 1,
        };
        let grown = ActivitySample { total_size: 11, ..base };
        let touched = ActivitySample {
            max_mtime: Some(t0 + Duration::from_millis(1)),
            ..base
        };
        let shrunk = ActivitySample { total_size: 5, ..base };

        assert!(grown.advanced_since(&base));
        assert!(touched.advanced_since(&base));
        assert!(!base.advanced_since(&base));
        assert!(!shrunk.advanced_since(&base));
    }

    #[test]
    fn only_stream_and_file_activity_are_active() {
        assert!(LivenessSignal::StreamActive.is_active());
        assert!(LivenessSignal::FileActive.is_active());
        assert!(!LivenessSignal::Idle.is_active());
        assert!(!LivenessSignal::Dead.is_active());
        assert_eq!(LivenessSignal::FileActive.to_string(), "file_active");
    }
}
