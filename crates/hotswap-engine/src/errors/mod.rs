//! Error classifier: turns subsystem failures into [`ErrorReport`]s and
//! watches for a class failing redefinition repeatedly in a short
//! window, which the orchestrator treats as a signal to stop retrying
//! that class automatically and surface it for operator attention.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use std::time::{Duration, Instant};

use hotswap_core::model::error_report::{ErrorKind, ErrorReport, EventSnapshot};

use crate::eventlog::{EventLog, EventLogResult};

/// Default bound on how many of the most recent events an
/// [`EventSnapshot`] carries, matching the spec's default of 256.
pub const DEFAULT_EVENT_SNAPSHOT_WINDOW: usize = 256;

/// Rolling window of recent redefinition failures for a single type
/// key. Shaped the same way a circuit breaker's rolling failure count
/// is: a bounded deque of timestamps, pruned to the window on every
/// check rather than on a timer.
struct FailureWindow {
    timestamps: VecDeque<Instant>,
}

impl FailureWindow {
    fn new() -> Self {
        Self {
            timestamps: VecDeque::new(),
        }
    }

    fn record(&mut self, now: Instant, window: Duration) {
        self.timestamps.push_back(now);
        self.prune(now, window);
    }

    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(&front) = self.timestamps.front() {
            if now.duration_since(front) > window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn count(&self) -> usize {
        self.timestamps.len()
    }
}

/// Classifies errors and tracks per-class failure patterns over a
/// configurable window and threshold (default: 3 failures).
pub struct ErrorClassifier {
    window: Duration,
    threshold: usize,
    failures: RwLock<HashMap<String, FailureWindow>>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), 3)
    }
}

impl ErrorClassifier {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            window,
            threshold,
            failures: RwLock::new(HashMap::new()),
        }
    }

    /// Records a redefinition failure for `type_key` and reports
    /// whether this class has now crossed the instability threshold
    /// within the rolling window.
    pub fn record_failure(&self, type_key: &str) -> bool {
        let now = Instant::now();
        let mut failures = self.failures.write().expect("classifier lock poisoned");
        let entry = failures.entry(type_key.to_string()).or_insert_with(FailureWindow::new);
        entry.record(now, self.window);
        entry.count() >= self.threshold
    }

    pub fn failure_count(&self, type_key: &str) -> usize {
        let now = Instant::now();
        let mut failures = self.failures.write().expect("classifier lock poisoned");
        match failures.get_mut(type_key) {
            Some(entry) => {
                entry.prune(now, self.window);
                entry.count()
            }
            None => 0,
        }
    }

    pub fn clear(&self, type_key: &str) {
        self.failures.write().expect("classifier lock poisoned").remove(type_key);
    }
}

/// Classifies a filesystem watcher error. Persistent inability to watch
/// a path (permissions, path removed out from under the watcher) is a
/// `filesystem-error`; a one-off transient read failure during
/// write-settling is reported the same way since the watcher itself
/// already retries those internally.
pub fn classify_filesystem_error(message: impl Into<String>) -> ErrorReport {
    ErrorReport::new(ErrorKind::FilesystemError, message)
}

pub fn classify_validation_error(type_key: &str, message: impl Into<String>) -> ErrorReport {
    ErrorReport::new(ErrorKind::ValidationError, message).with_type_key(type_key)
}

pub fn classify_redefinition_failure(type_key: &str, message: impl Into<String>) -> ErrorReport {
    ErrorReport::new(ErrorKind::RedefinitionFailure, message).with_type_key(type_key)
}

pub fn classify_instance_update_error(type_key: &str, message: impl Into<String>) -> ErrorReport {
    ErrorReport::new(ErrorKind::InstanceUpdateError, message).with_type_key(type_key)
}

/// Critical-system errors bypass rollback entirely; this constructor
/// exists separately so call sites can't accidentally route one through
/// the ordinary recoverable-error path.
pub fn classify_critical_system_error(message: impl Into<String>) -> ErrorReport {
    ErrorReport::new(ErrorKind::CriticalSystemError, message)
}

/// Attaches a bounded [`EventSnapshot`] to `report` for post-mortem
/// diagnosis, "when feasible" per the spec: a failure to read the event
/// log to build the snapshot is logged and the report is returned
/// unenriched rather than compounding one failure with another.
pub async fn enrich_with_snapshot(report: ErrorReport, log: &EventLog, window: usize) -> ErrorReport {
    match build_event_snapshot(log, window).await {
        Ok(snapshot) => report.with_snapshot(snapshot),
        Err(e) => {
            tracing::warn!(error = %e, "failed to build event snapshot to enrich error report");
            report
        }
    }
}

async fn build_event_snapshot(log: &EventLog, window: usize) -> EventLogResult<EventSnapshot> {
    let mut all = Vec::new();
    for kind in log.aggregate_kinds().await? {
        all.extend(log.events_of_type(kind).await?);
    }
    all.sort_by_key(|e| e.recorded_at);
    let start = all.len().saturating_sub(window);
    let recent_events = all.split_off(start);

    let mut environment = HashMap::new();
    for (key, value) in std::env::vars() {
        if key.starts_with("HOTSWAP_") {
            environment.insert(key, value);
        }
    }
    let thread_label = std::thread::current()
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:?}", std::thread::current().id()));

    Ok(EventSnapshot::new(recent_events, environment, thread_label, HashMap::new(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn threshold_trips_after_enough_failures_in_window() {
        let classifier = ErrorClassifier::new(Duration::from_secs(60), 3);
        assert!(!classifier.record_failure("com.acme.Widget"));
        assert!(!classifier.record_failure("com.acme.Widget"));
        assert!(classifier.record_failure("com.acme.Widget"));
    }

    #[test]
    fn failures_outside_the_window_are_pruned() {
        let classifier = ErrorClassifier::new(Duration::from_millis(20), 2);
        assert!(!classifier.record_failure("com.acme.Widget"));
        sleep(Duration::from_millis(40));
        assert_eq!(classifier.failure_count("com.acme.Widget"), 0);
    }

    #[test]
    fn clear_resets_the_window() {
        let classifier = ErrorClassifier::new(Duration::from_secs(60), 1);
        classifier.record_failure("com.acme.Widget");
        classifier.clear("com.acme.Widget");
        assert_eq!(classifier.failure_count("com.acme.Widget"), 0);
    }

    #[tokio::test]
    async fn enrichment_attaches_the_most_recent_events_bounded_by_window() {
        use hotswap_core::model::event::{AggregateEvent, AggregateKind, EventEnvelope};

        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let aggregate_id = uuid::Uuid::new_v4();
        let mut envelope = EventEnvelope::first(
            AggregateKind::Runtime,
            aggregate_id,
            AggregateEvent::RuntimeStarted { watch_paths: vec![] },
        );
        log.append(&envelope).await.unwrap();
        for _ in 0..4 {
            envelope = envelope.next(AggregateEvent::RuntimeStopped);
            log.append(&envelope).await.unwrap();
        }

        let report = classify_critical_system_error("disk full");
        let enriched = enrich_with_snapshot(report, &log, 2).await;
        let snapshot = enriched.snapshot.expect("expected an attached snapshot");
        assert_eq!(snapshot.recent_events.len(), 2);
        assert_eq!(snapshot.recent_events.last().unwrap().version, 5);
    }
}
