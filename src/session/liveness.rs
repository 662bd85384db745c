//! Combines stream silence with monitor evidence

use std::time::{Duration, Instant};

use crate::monitor::LivenessSignal;

/// Per-session liveness bookkeeping, recomputed on every timer tick
#[derive(Debug, Clone)]
pub struct LivenessTracker {
    started: Instant,
    grace: Duration,
    last_output: Option<Instant>,
    last_file_activity: Option<Instant>,
    last_probe: Option<LivenessSignal>,
}

impl LivenessTracker {
    pub fn new(started: Instant, grace: Duration) -> Self {
        Self {
            started,
            grace,
            last_output: None,
            last_file_activity: None,
            last_probe: None,
        }
    }

    pub fn record_output(&mut self, at: Instant) {
        self.last_output = Some(at);
    }

    pub fn record_probe(&mut self, signal: LivenessSignal, at: Instant) {
        if signal == LivenessSignal::FileActive {
            self.last_file_activity = Some(at);
        }
        self.last_probe = Some(signal);
    }

    /// Most recent evidence of progress, or the session start
    fn last_progress(&self) -> Instant {
        [self.last_output, self.last_file_activity]
            .into_iter()
            .flatten()
            .fold(self.started, Instant::max)
    }

    /// Time since the last evidence of progress
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_progress())
    }

    pub fn current(&self, now: Instant) -> LivenessSignal {
        let recent = |at: Option<Instant>| {
            at.is_some_and(|at| now.saturating_duration_since(at) < self.grace)
        };
        let output_newer = match (self.last_output, self.last_file_activity) {
            (Some(out), Some(file)) => out >= file,
            (Some(_), None) => true,
            _ => false,
        };
        if output_newer && recent(self.last_output) {
            LivenessSignal::StreamActive
        } else if recent(self.last_file_activity) {
            LivenessSignal::FileActive
        } else if recent(self.last_output) {
            LivenessSignal::StreamActive
        } else {
            match self.last_probe {
                Some(LivenessSignal::Dead) => LivenessSignal::Dead,
                _ => LivenessSignal::Idle,
            }
        }
    }

    /// True once the session has been quiet past the grace window and the
    /// monitor has nothing to show for it
    pub fn should_time_out(&self, now: Instant) -> bool {
        self.quiet_for(now) >= self.grace && !self.current(now).is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRACE: Duration = Duration::from_secs(10);

    #[test]
    fn silent_session_times_out_after_grace() {
        let start = Instant::now();
        let tracker = LivenessTracker::new(start, GRACE);
        assert!(!tracker.should_time_out(start + Duration::from_secs(9)));
        assert!(tracker.should_time_out(start + Duration::from_secs(10)));
        assert_eq!(tracker.current(start + Duration::from_secs(10)), LivenessSignal::Idle);
    }

    #[test]
    fn output_resets_the_window() {
        let start = Instant::now();
        let mut tracker = LivenessTracker::new(start, GRACE);
        tracker.record_output(start + Duration::from_secs(8));
        let now = start + Duration::from_secs(12);
        assert_eq!(tracker.current(now), LivenessSignal::StreamActive);
        assert!(!tracker.should_time_out(now));
        assert!(tracker.should_time_out(start + Duration::from_secs(18)));
    }

    #[test]
    fn file_activity_keeps_a_silent_session_alive() {
        let start = Instant::now();
        let mut tracker = LivenessTracker::new(start, GRACE);
        for secs in [5, 10, 15, 20] {
            tracker.record_probe(LivenessSignal::FileActive, start + Duration::from_secs(secs));
        }
        let now = start + Duration::from_secs(22);
        assert_eq!(tracker.current(now), LivenessSignal::FileActive);
        assert!(!tracker.should_time_out(now));
    }

    #[test]
    fn dead_monitor_is_reported_once_quiet() {
        let start = Instant::now();
        let mut tracker = LivenessTracker::new(start, GRACE);
        tracker.record_probe(LivenessSignal::Dead, start + Duration::from_secs(3));
        let now = start + Duration::from_secs(11);
        assert_eq!(tracker.current(now), LivenessSignal::Dead);
        assert!(tracker.should_time_out(now));
    }
}
