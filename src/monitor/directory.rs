//! Filesystem side-channel monitor

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::monitor_trait::{ActivityProbe, MonitorError};
use super::state::{ActivitySample, LivenessSignal};

/// How deep an unfiltered walk descends below the state directory
const MAX_WALK_DEPTH: usize = 4;

/// Samples modification times and sizes under a provider's state directory
pub struct DirectoryProbe {
    root: PathBuf,
    /// File names relative to `root`; empty means every file in the tree
    watched: Vec<String>,
    /// Tree walks skip files last modified before this
    since: Option<SystemTime>,
}

impl DirectoryProbe {
    pub fn new(root: impl Into<PathBuf>, watched: Vec<String>) -> Self {
        Self {
            root: root.into(),
            watched,
            since: None,
        }
    }

    /// Ignore files in a shared tree that have not been touched since `at`,
    /// so state left by earlier sessions does not count toward this one
    pub fn modified_since(mut self, at: SystemTime) -> Self {
        self.since = Some(at);
        self
    }

    fn is_stale(&self, modified: Option<SystemTime>) -> bool {
        matches!((self.since, modified), (Some(since), Some(at)) if at < since)
    }

    async fn sample_watched(&self) -> ActivitySample {
        let mut sample = ActivitySample::default();
        for name in &self.watched {
            // A watched file that does not exist yet is not an error
            if let Ok(meta) = tokio::fs::metadata(self.root.join(name)).await {
                sample.record(meta.modified().ok(), meta.len());
            }
        }
        sample
    }

    async fn sample_tree(&self) -> Result<ActivitySample, MonitorError> {
        let mut sample = ActivitySample::default();
        let mut pending = vec![(self.root.clone(), 0usize)];
        while let Some((dir, depth)) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == self.root => return Err(MonitorError::from_io(&dir, e)),
                Err(e) => {
                    debug!(path = %dir.display(), error = %e, "skipping unreadable directory");
                    continue;
                }
            };
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        debug!(path = %dir.display(), error = %e, "directory listing interrupted");
                        break;
                    }
                };
                let Ok(meta) = entry.metadata().await else {
                    continue;
                };
                if meta.is_dir() {
                    if depth < MAX_WALK_DEPTH {
                        pending.push((entry.path(), depth + 1));
                    }
                } else {
                    let modified = meta.modified().ok();
                    if !self.is_stale(modified) {
                        sample.record(modified, meta.len());
                    }
                }
            }
        }
        Ok(sample)
    }
}

#[async_trait]
impl ActivityProbe for DirectoryProbe {
    async fn sample(&self) -> Result<ActivitySample, MonitorError> {
        let meta = tokio::fs::metadata(&self.root)
            .await
            .map_err(|e| MonitorError::from_io(&self.root, e))?;

        if !meta.is_dir() {
            let mut sample = ActivitySample::default();
            sample.record(meta.modified().ok(), meta.len());
            return Ok(sample);
        }

        if self.watched.is_empty() {
            self.sample_tree().await
        } else {
            Ok(self.sample_watched().await)
        }
    }

    fn location(&self) -> &Path {
        &self.root
    }
}

/// Turns successive probe samples into liveness signals
pub struct ActivityMonitor {
    probe: Arc<dyn ActivityProbe>,
    /// How long the state location may be missing before it counts as dead
    startup_grace: Duration,
    last: Option<ActivitySample>,
    missing_seen: bool,
    warned: bool,
}

impl ActivityMonitor {
    pub fn new(probe: Arc<dyn ActivityProbe>, startup_grace: Duration) -> Self {
        Self {
            probe,
            startup_grace,
            last: None,
            missing_seen: false,
            warned: false,
        }
    }

    pub fn location(&self) -> &Path {
        self.probe.location()
    }

    /// Poll the probe once.
    ///
    /// `running_for` is the age of the process; a location that is absent
    /// during the start-up grace reads as idle rather than dead.
    pub async fn poll(&mut self, running_for: Duration) -> LivenessSignal {
        match self.probe.sample().await {
            Ok(sample) => {
                let signal = match &self.last {
                    Some(previous) if sample.advanced_since(previous) => LivenessSignal::FileActive,
                    Some(_) => LivenessSignal::Idle,
                    // The location appearing after an absence is progress in itself
                    None if self.missing_seen => LivenessSignal::FileActive,
                    None => LivenessSignal::Idle,
                };
                if self.warned {
                    info!(location = %self.location().display(), "state location available again");
                    self.warned = false;
                }
                self.missing_seen = false;
                self.last = Some(sample);
                signal
            }
            Err(e) => {
                self.last = None;
                self.missing_seen = true;
                if running_for < self.startup_grace {
                    debug!(error = %e, "state location not ready during start-up");
                    return LivenessSignal::Idle;
                }
                if !self.warned {
                    warn!(error = %e, "activity monitor unavailable; relying on stream activity");
                    self.warned = true;
                }
                LivenessSignal::Dead
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::SystemTime;

    /// Replays a fixed list of samples
    struct ScriptedProbe {
        steps: Mutex<Vec<Option<u64>>>,
        root: PathBuf,
    }

    impl ScriptedProbe {
        fn new(mut steps: Vec<Option<u64>>) -> Arc<Self> {
            steps.reverse();
            Arc::new(Self {
                steps: Mutex::new(steps),
                root: PathBuf::from("/scripted"),
            })
        }
    }

    #[async_trait]
    impl ActivityProbe for ScriptedProbe {
        async fn sample(&self) -> Result<ActivitySample, MonitorError> {
            let step = self.steps.lock().unwrap().pop().flatten();
            match step {
                Some(size) => Ok(ActivitySample {
                    max_mtime: Some(SystemTime::UNIX_EPOCH),
                    total_size: size,
                    file_count: 1,
                }),
                None => Err(MonitorError::NotFound(self.root.clone())),
            }
        }

        fn location(&self) -> &Path {
            &self.root
        }
    }

    #[tokio::test]
    async fn first_sample_is_a_baseline() {
        let mut monitor = ActivityMonitor::new(ScriptedProbe::new(vec![Some(1), Some(5), Some(5)]), Duration::ZERO);
        let up = Duration::from_secs(60);
        assert_eq!(monitor.poll(up).await, LivenessSignal::Idle);
        assert_eq!(monitor.poll(up).await, LivenessSignal::FileActive);
        assert_eq!(monitor.poll(up).await, LivenessSignal::Idle);
    }

    #[tokio::test]
    async fn missing_location_is_idle_during_startup_then_dead() {
        let probe = ScriptedProbe::new(vec![None, None]);
        let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(30));
        assert_eq!(monitor.poll(Duration::from_secs(1)).await, LivenessSignal::Idle);
        assert_eq!(monitor.poll(Duration::from_secs(31)).await, LivenessSignal::Dead);
    }

    #[tokio::test]
    async fn late_appearance_counts_as_activity() {
        let probe = ScriptedProbe::new(vec![None, Some(3), Some(3)]);
        let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(30));
        assert_eq!(monitor.poll(Duration::from_secs(1)).await, LivenessSignal::Idle);
        assert_eq!(monitor.poll(Duration::from_secs(2)).await, LivenessSignal::FileActive);
        assert_eq!(monitor.poll(Duration::from_secs(3)).await, LivenessSignal::Idle);
    }

    #[tokio::test]
    async fn directory_probe_reports_missing_root() {
        let probe = DirectoryProbe::new("/nonexistent/agentrun/state", Vec::new());
        let err = probe.sample().await.unwrap_err();
        assert!(matches!(err, MonitorError::NotFound(_)));
    }

    #[tokio::test]
    async fn directory_probe_sums_watched_files_only() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("history.md"), b"hello").unwrap();
        std::fs::write(dir.path().join("other.log"), b"ignored bytes").unwrap();

        let probe = DirectoryProbe::new(
            dir.path(),
            vec!["history.md".to_string(), "not-yet.md".to_string()],
        );
        let sample = probe.sample().await.unwrap();
        assert_eq!(sample.file_count, 1);
        assert_eq!(sample.total_size, 5);
    }

    #[tokio::test]
    async fn directory_probe_walks_nested_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("project").join("session");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(nested.join("log.jsonl"), b"{}\n").unwrap();
        std::fs::write(dir.path().join("top.json"), b"[]").unwrap();

        let probe = DirectoryProbe::new(dir.path(), Vec::new());
        let sample = probe.sample().await.unwrap();
        assert_eq!(sample.file_count, 2);
        assert_eq!(sample.total_size, 5);
        assert!(sample.max_mtime.is_some());
    }

    #[tokio::test]
    async fn directory_probe_skips_files_older_than_session() {
        let dir = tempfile::TempDir::new().unwrap();
        let old = dir.path().join("old.jsonl");
        std::fs::write(&old, b"previous session").unwrap();
        let hour_ago = SystemTime::now() - Duration::from_secs(3600);
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(hour_ago)
            .unwrap();
        std::fs::write(dir.path().join("new.jsonl"), b"{}").unwrap();

        let probe = DirectoryProbe::new(dir.path(), Vec::new())
            .modified_since(SystemTime::now() - Duration::from_secs(60));
        let sample = probe.sample().await.unwrap();
        assert_eq!(sample.file_count, 1);
        assert_eq!(sample.total_size, 2);
    }
}
