//! In-memory recording doubles for the collaborators tests most often
//! need to observe without standing up the real filesystem-backed event
//! log or a host redefinition primitive.

use std::sync::Mutex;

use crate::model::error_report::ErrorReport;
use crate::model::event::EventEnvelope;

/// Captures every envelope appended to it, in order, behind a mutex so
/// it can be shared across tokio tasks in a test without extra
/// wiring.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, envelope: EventEnvelope) {
        self.events.lock().expect("sink mutex poisoned").push(envelope);
    }

    pub fn recorded(&self) -> Vec<EventEnvelope> {
        self.events.lock().expect("sink mutex poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("sink mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Captures every error report handed to it, for tests asserting on the
/// error classifier's pattern-detection behavior without a real
/// redefinition pipeline.
#[derive(Default)]
pub struct RecordingErrorSink {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, report: ErrorReport) {
        self.reports.lock().expect("sink mutex poisoned").push(report);
    }

    pub fn reports_for(&self, type_key: &str) -> usize {
        self.reports
            .lock()
            .expect("sink mutex poisoned")
            .iter()
            .filter(|r| r.type_key.as_deref() == Some(type_key))
            .count()
    }
}
