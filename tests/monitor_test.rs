// Tests for the filesystem activity monitor

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use agentrun::monitor::{
    resolve_state_dir, ActivityMonitor, ActivityProbe, DirectoryProbe, LivenessSignal, MonitorError,
};
use tempfile::TempDir;

const RUNNING: Duration = Duration::from_secs(120);

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().create(true).append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

#[tokio::test]
async fn test_growing_file_is_file_active() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("session.jsonl");
    append(&log, "{}\n");

    let probe = Arc::new(DirectoryProbe::new(dir.path(), Vec::new()));
    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(5));

    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);
    append(&log, "{\"more\":true}\n");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::FileActive);
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);
}

#[tokio::test]
async fn test_new_file_in_subdirectory_is_file_active() {
    let dir = TempDir::new().unwrap();
    let probe = Arc::new(DirectoryProbe::new(dir.path(), Vec::new()));
    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(5));

    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);
    let nested = dir.path().join("project-a");
    fs::create_dir_all(&nested).unwrap();
    append(&nested.join("log.jsonl"), "line\n");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::FileActive);
}

#[tokio::test]
async fn test_absent_directory_is_dead_after_startup_grace() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("never-created");
    let probe = Arc::new(DirectoryProbe::new(&missing, Vec::new()));

    let err = probe.sample().await.unwrap_err();
    assert!(matches!(err, MonitorError::NotFound(_)));

    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(10));
    assert_eq!(monitor.poll(Duration::from_secs(2)).await, LivenessSignal::Idle);
    assert_eq!(monitor.poll(Duration::from_secs(9)).await, LivenessSignal::Idle);
    assert_eq!(monitor.poll(Duration::from_secs(11)).await, LivenessSignal::Dead);
    assert_eq!(monitor.poll(Duration::from_secs(12)).await, LivenessSignal::Dead);
}

#[tokio::test]
async fn test_directory_created_after_start_is_not_dead() {
    let dir = TempDir::new().unwrap();
    let state = dir.path().join("state");
    let probe = Arc::new(DirectoryProbe::new(&state, Vec::new()));
    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(10));

    assert_eq!(monitor.poll(Duration::from_secs(1)).await, LivenessSignal::Idle);
    fs::create_dir_all(&state).unwrap();
    append(&state.join("a.log"), "x");
    assert_eq!(monitor.poll(Duration::from_secs(3)).await, LivenessSignal::FileActive);
    assert_eq!(monitor.poll(Duration::from_secs(4)).await, LivenessSignal::Idle);
}

#[tokio::test]
async fn test_watched_files_ignore_other_changes() {
    let dir = TempDir::new().unwrap();
    let history = dir.path().join(".aider.chat.history.md");
    append(&history, "# chat\n");

    let probe = Arc::new(DirectoryProbe::new(
        dir.path(),
        vec![".aider.chat.history.md".to_string()],
    ));
    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(5));
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);

    append(&dir.path().join("unrelated.txt"), "noise");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);

    append(&history, "> user: hi\n");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::FileActive);
}

#[tokio::test]
async fn test_sibling_project_writes_do_not_count() {
    let home = TempDir::new().unwrap();
    let projects = home.path().join("projects");
    let ours = projects.join("-work-repo");
    let theirs = projects.join("-work-other");
    fs::create_dir_all(&ours).unwrap();
    fs::create_dir_all(&theirs).unwrap();
    append(&ours.join("s1.jsonl"), "{}\n");
    append(&theirs.join("s2.jsonl"), "{}\n");

    let root = resolve_state_dir(&projects.join("{project}"), Path::new("/work/repo"));
    assert_eq!(root, ours);

    let probe = Arc::new(DirectoryProbe::new(root, Vec::new()));
    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(5));
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);

    append(&theirs.join("s2.jsonl"), "{\"other\":true}\n");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);

    append(&ours.join("s1.jsonl"), "{\"ours\":true}\n");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::FileActive);
}

#[tokio::test]
async fn test_shared_tree_ignores_files_from_earlier_sessions() {
    let dir = TempDir::new().unwrap();
    let earlier = dir.path().join("2026").join("01").join("rollout-a.jsonl");
    fs::create_dir_all(earlier.parent().unwrap()).unwrap();
    append(&earlier, "{}\n");
    OpenOptions::new()
        .write(true)
        .open(&earlier)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(7200))
        .unwrap();

    let probe = DirectoryProbe::new(dir.path(), Vec::new())
        .modified_since(SystemTime::now() - Duration::from_secs(60));
    let sample = probe.sample().await.unwrap();
    assert_eq!(sample.file_count, 0);

    let probe = Arc::new(probe);
    let mut monitor = ActivityMonitor::new(probe, Duration::from_secs(5));
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::Idle);
    append(&dir.path().join("2026").join("01").join("rollout-b.jsonl"), "{}\n");
    assert_eq!(monitor.poll(RUNNING).await, LivenessSignal::FileActive);
}
