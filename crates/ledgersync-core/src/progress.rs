//! Progress reporting for background passes
//!
//! A pass publishes [`Progress`] values through a [`ProgressSink`]; the
//! usual sink is the sending half of a `tokio::sync::watch` channel so any
//! thread can observe the latest value.

use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressState {
    Starting,
    Running,
    Finished,
}

/// Snapshot of a pass's progress.
///
/// Counters are only meaningful while [`ProgressState::Running`]; the
/// accessors return `None` in any other state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    state: ProgressState,
    current: u64,
    total: u64,
    indeterminate: bool,
    error: Option<String>,
}

impl Default for Progress {
    fn default() -> Self {
        Self::starting()
    }
}

impl Progress {
    pub fn starting() -> Self {
        Self {
            state: ProgressState::Starting,
            current: 0,
            total: 0,
            indeterminate: true,
            error: None,
        }
    }

    /// Running with an unknown total
    pub fn indeterminate() -> Self {
        Self {
            state: ProgressState::Running,
            ..Self::starting()
        }
    }

    /// Running with a total; a total of zero or less stays indeterminate
    pub fn running(current: u64, total: i64) -> Self {
        let mut progress = Self::indeterminate();
        progress.set_current(current);
        progress.set_total(total);
        progress
    }

    pub fn finished(error: Option<String>) -> Self {
        Self {
            state: ProgressState::Finished,
            error,
            ..Self::starting()
        }
    }

    pub fn state(&self) -> ProgressState {
        self.state
    }

    pub fn is_indeterminate(&self) -> bool {
        self.indeterminate
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current(&self) -> Option<u64> {
        (self.state == ProgressState::Running).then_some(self.current)
    }

    pub fn total(&self) -> Option<u64> {
        (self.state == ProgressState::Running && !self.indeterminate).then_some(self.total)
    }

    pub fn set_current(&mut self, current: u64) {
        self.current = current;
        self.state = ProgressState::Running;
    }

    pub fn set_total(&mut self, total: i64) {
        self.state = ProgressState::Running;
        if total > 0 {
            self.total = total as u64;
            self.indeterminate = false;
        } else {
            self.total = 0;
            self.indeterminate = true;
        }
    }

    /// Raise the total to `candidate` if it is unknown or smaller
    pub fn raise_total(&mut self, candidate: u64) -> bool {
        if self.indeterminate || self.total < candidate {
            self.set_total(candidate as i64);
            true
        } else {
            false
        }
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.state, self.indeterminate) {
            (ProgressState::Starting, _) => write!(f, "starting"),
            (ProgressState::Running, true) => write!(f, "{} processed", self.current),
            (ProgressState::Running, false) => write!(f, "{}/{}", self.current, self.total),
            (ProgressState::Finished, _) => match &self.error {
                Some(e) => write!(f, "failed: {}", e),
                None => write!(f, "done"),
            },
        }
    }
}

/// Receiver of progress updates; may be called from any thread
pub trait ProgressSink: Send + Sync {
    fn publish(&self, progress: Progress);
}

impl ProgressSink for watch::Sender<Progress> {
    fn publish(&self, progress: Progress) {
        self.send_replace(progress);
    }
}

/// Sink that drops every update
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&self, _progress: Progress) {}
}

/// Sink that keeps every update, in order
#[derive(Debug, Default)]
pub struct RecordingSink {
    updates: Mutex<Vec<Progress>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<Progress> {
        self.updates.lock().map(|u| u.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<Progress> {
        self.updates().pop()
    }
}

impl ProgressSink for RecordingSink {
    fn publish(&self, progress: Progress) {
        if let Ok(mut updates) = self.updates.lock() {
            updates.push(progress);
        }
    }
}

/// Create a watch channel seeded with [`Progress::starting`]
pub fn progress_channel() -> (watch::Sender<Progress>, watch::Receiver<Progress>) {
    watch::channel(Progress::starting())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_hidden_outside_running() {
        let starting = Progress::starting();
        assert_eq!(starting.current(), None);
        let finished = Progress::finished(Some("boom".to_string()));
        assert_eq!(finished.total(), None);
        assert_eq!(finished.error(), Some("boom"));
    }

    #[test]
    fn test_non_positive_total_is_indeterminate() {
        let progress = Progress::running(3, -1);
        assert!(progress.is_indeterminate());
        assert_eq!(progress.current(), Some(3));
        assert_eq!(progress.total(), None);

        let progress = Progress::running(3, 10);
        assert_eq!(progress.total(), Some(10));
    }

    #[test]
    fn test_raise_total() {
        let mut progress = Progress::indeterminate();
        assert!(progress.raise_total(5));
        assert!(!progress.raise_total(4));
        assert!(progress.raise_total(9));
        assert_eq!(progress.total(), Some(9));
    }

    #[test]
    fn test_watch_sink_delivers_latest() {
        let (tx, rx) = progress_channel();
        tx.publish(Progress::running(1, 2));
        tx.publish(Progress::finished(None));
        assert_eq!(rx.borrow().state(), ProgressState::Finished);
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.publish(Progress::indeterminate());
        sink.publish(Progress::finished(None));
        assert_eq!(sink.updates().len(), 2);
        assert_eq!(sink.last().unwrap().state(), ProgressState::Finished);
    }
}
