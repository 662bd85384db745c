//! Session state, limits and the final record

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::command::AgentCommand;
use crate::normalize::{EventKind, UnifiedEvent};
use crate::stream::{DecoderOptions, FramingMode};

/// Lifecycle of one supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Running,
    /// Stopped on request
    GracefulStop,
    TimedOut,
    ActivityTimeout,
    Exited,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Starting | SessionState::Running)
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The process exited on its own
    Exited,
    /// The absolute wall-clock ceiling was reached
    TimedOut,
    /// Silent past the grace window with no file activity
    ActivityTimeout,
    /// An external cancellation request
    Cancelled,
    /// The process could no longer be observed
    ProcessLost,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Exited => "exited",
            TerminationReason::TimedOut => "timed_out",
            TerminationReason::ActivityTimeout => "activity_timeout",
            TerminationReason::Cancelled => "cancelled",
            TerminationReason::ProcessLost => "process_lost",
        }
    }

    /// Terminal state a session enters for this reason
    pub fn state(&self) -> SessionState {
        match self {
            TerminationReason::Exited | TerminationReason::ProcessLost => SessionState::Exited,
            TerminationReason::TimedOut => SessionState::TimedOut,
            TerminationReason::ActivityTimeout => SessionState::ActivityTimeout,
            TerminationReason::Cancelled => SessionState::GracefulStop,
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timing policy supplied at session start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Absolute wall-clock ceiling
    pub timeout: Duration,
    /// How long the session may be silent before an activity timeout
    pub activity_grace: Duration,
    pub poll_interval: Duration,
    /// Wait between the interrupt and the forced kill
    pub kill_grace: Duration,
    /// How long the state location may be missing before it counts as dead
    pub monitor_startup_grace: Duration,
    pub decoder: DecoderOptions,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30 * 60),
            activity_grace: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(5),
            kill_grace: Duration::from_secs(10),
            monitor_startup_grace: Duration::from_secs(30),
            decoder: DecoderOptions::default(),
        }
    }
}

/// Everything needed to start one session
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub provider: String,
    pub command: AgentCommand,
    /// Replaces the provider's state directory for this session
    pub state_dir: Option<PathBuf>,
}

impl SessionRequest {
    pub fn new(provider: impl Into<String>, command: AgentCommand) -> Self {
        Self {
            provider: provider.into(),
            command,
            state_dir: None,
        }
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }
}

/// One supervised run, from spawn to termination
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    provider: String,
    state: SessionState,
    framing: Option<FramingMode>,
    events: Vec<UnifiedEvent>,
    started_at: DateTime<Utc>,
    started: Instant,
    last_output_at: Option<DateTime<Utc>>,
    termination: Option<TerminationReason>,
    exit_code: Option<i32>,
    finished_at: Option<DateTime<Utc>>,
    duration: Option<Duration>,
}

impl Session {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            state: SessionState::Starting,
            framing: None,
            events: Vec::new(),
            started_at: Utc::now(),
            started: Instant::now(),
            last_output_at: None,
            termination: None,
            exit_code: None,
            finished_at: None,
            duration: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn framing(&self) -> Option<FramingMode> {
        self.framing
    }

    pub fn events(&self) -> &[UnifiedEvent] {
        &self.events
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.termination
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn mark_running(&mut self) {
        if self.state == SessionState::Starting {
            self.state = SessionState::Running;
        }
    }

    /// Fix the framing mode; later calls are ignored
    pub fn set_framing(&mut self, mode: FramingMode) -> bool {
        if self.framing.is_some() {
            return false;
        }
        self.framing = Some(mode);
        true
    }

    pub fn record_output(&mut self) {
        self.last_output_at = Some(Utc::now());
    }

    /// Append an event; the sequence must grow and a finished session is closed
    pub fn push_event(&mut self, event: UnifiedEvent) -> bool {
        if self.termination.is_some() {
            return false;
        }
        if let Some(last) = self.events.last() {
            if event.sequence <= last.sequence {
                return false;
            }
        }
        self.events.push(event);
        true
    }

    /// Fix the terminal state.
    ///
    /// Returns false, changing nothing, when the session already ended.
    pub fn terminate(&mut self, reason: TerminationReason, exit_code: Option<i32>) -> bool {
        if self.termination.is_some() {
            return false;
        }
        self.termination = Some(reason);
        self.state = reason.state();
        self.exit_code = exit_code;
        self.finished_at = Some(Utc::now());
        self.duration = Some(self.started.elapsed());
        true
    }

    pub fn into_record(self) -> SessionRecord {
        let duration = self.duration.unwrap_or_else(|| self.started.elapsed());
        SessionRecord {
            id: self.id,
            provider: self.provider,
            state: self.state,
            framing: self.framing,
            termination_reason: self.termination,
            exit_code: self.exit_code,
            started_at: self.started_at,
            last_output_at: self.last_output_at,
            finished_at: self.finished_at,
            duration_ms: duration_millis(duration),
            events: self.events,
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Final, immutable view of a session for output and audit consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub provider: String,
    pub state: SessionState,
    pub framing: Option<FramingMode>,
    pub termination_reason: Option<TerminationReason>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub last_output_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub events: Vec<UnifiedEvent>,
}

impl SessionRecord {
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.iter().filter(|e| e.kind == kind).count()
    }

    pub fn events_of(&self, kind: EventKind) -> impl Iterator<Item = &UnifiedEvent> {
        self.events.iter().filter(move |e| e.kind == kind)
    }
}
