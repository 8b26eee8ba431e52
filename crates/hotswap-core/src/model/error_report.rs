//! The error taxonomy every subsystem classifies its failures into
//! before they reach the event log or the error classifier's
//! pattern-detection window.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::EventEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ValidationError,
    RedefinitionFailure,
    InstanceUpdateError,
    FilesystemError,
    CriticalSystemError,
    ConfigurationError,
    CommunicationError,
    SecurityError,
    ResourceExhaustion,
    Unknown,
}

impl ErrorKind {
    /// Critical-system errors bypass rollback entirely and go straight
    /// to emergency shutdown; everything else is recoverable in the
    /// ordinary sense (retried, rolled back, or just reported).
    pub fn is_critical(&self) -> bool {
        matches!(self, Self::CriticalSystemError)
    }

    /// The default severity for this kind.
    pub fn default_severity(&self) -> Severity {
        match self {
            Self::ValidationError => Severity::Warning,
            Self::RedefinitionFailure => Severity::Error,
            Self::InstanceUpdateError => Severity::Error,
            Self::FilesystemError => Severity::Error,
            Self::CriticalSystemError => Severity::Critical,
            Self::ConfigurationError => Severity::Error,
            Self::CommunicationError => Severity::Error,
            Self::SecurityError => Severity::Error,
            Self::ResourceExhaustion => Severity::Critical,
            Self::Unknown => Severity::Warning,
        }
    }

    /// The default recovery recommendation for this kind.
    pub fn default_recovery(&self) -> RecoveryStrategy {
        match self {
            Self::ValidationError => RecoveryStrategy::RejectChange,
            Self::RedefinitionFailure => RecoveryStrategy::RollbackChanges,
            Self::InstanceUpdateError => RecoveryStrategy::PreserveCurrentState,
            Self::FilesystemError => RecoveryStrategy::RetryOperation,
            Self::CriticalSystemError => RecoveryStrategy::EmergencyShutdown,
            Self::ConfigurationError => RecoveryStrategy::ManualIntervention,
            Self::CommunicationError => RecoveryStrategy::RetryOperation,
            Self::SecurityError => RecoveryStrategy::ManualIntervention,
            Self::ResourceExhaustion => RecoveryStrategy::EmergencyShutdown,
            Self::Unknown => RecoveryStrategy::ManualIntervention,
        }
    }

    /// Whether this kind is, in the ordinary case, recoverable at all.
    /// `CriticalSystemError` and `ResourceExhaustion` are not; everything
    /// else is handled one way or another by its recovery strategy
    /// rather than terminating the process.
    pub fn default_recoverable(&self) -> bool {
        !matches!(self, Self::CriticalSystemError | Self::ResourceExhaustion)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
    Fatal,
}

/// The recommended recovery strategy accompanying an [`ErrorReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    RejectChange,
    RollbackChanges,
    PreserveCurrentState,
    RetryOperation,
    ManualIntervention,
    EmergencyShutdown,
}

/// A bounded, most-recent window of events plus enough ambient context
/// to reconstruct what the process was doing, attached to an
/// [`ErrorReport`] for post-mortem diagnosis. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSnapshot {
    pub recent_events: Vec<EventEnvelope>,
    pub environment: HashMap<String, String>,
    pub thread_label: String,
    pub perf_counters: HashMap<String, f64>,
    /// Event ids this snapshot's triggering failure causally followed,
    /// oldest first, when that chain could be reconstructed from
    /// correlation ids. Not every failure has one.
    pub causal_chain: Option<Vec<Uuid>>,
}

impl EventSnapshot {
    /// `recent_events` is expected to already be the trimmed
    /// most-recent-`M` slice (default `M` = 256); this constructor does
    /// not do the trimming itself so callers can share one ring buffer
    /// across many reports.
    pub fn new(
        recent_events: Vec<EventEnvelope>,
        environment: HashMap<String, String>,
        thread_label: impl Into<String>,
        perf_counters: HashMap<String, f64>,
        causal_chain: Option<Vec<Uuid>>,
    ) -> Self {
        Self {
            recent_events,
            environment,
            thread_label: thread_label.into(),
            perf_counters,
            causal_chain,
        }
    }
}

/// A classified failure, carrying enough context to decide a recovery
/// strategy and to be folded into the event log as a domain event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub severity: Severity,
    pub recovery: RecoveryStrategy,
    pub recoverable: bool,
    pub message: String,
    pub type_key: Option<String>,
    pub operation: Option<String>,
    pub correlation_id: Option<Uuid>,
    pub snapshot: Option<EventSnapshot>,
    pub occurred_at: chrono::DateTime<chrono::Utc>,
}

impl ErrorReport {
    /// Builds a report using `kind`'s default severity, recovery
    /// strategy and recoverable flag; use the `with_*` builders for a
    /// call site that knows better.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            severity: kind.default_severity(),
            recovery: kind.default_recovery(),
            recoverable: kind.default_recoverable(),
            kind,
            message: message.into(),
            type_key: None,
            operation: None,
            correlation_id: None,
            snapshot: None,
            occurred_at: chrono::Utc::now(),
        }
    }

    pub fn with_type_key(mut self, type_key: impl Into<String>) -> Self {
        self.type_key = Some(type_key.into());
        self
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_snapshot(mut self, snapshot: EventSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_recovery(mut self, recovery: RecoveryStrategy) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn unrecoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_system_errors_are_unrecoverable_by_default() {
        let report = ErrorReport::new(ErrorKind::CriticalSystemError, "out of memory");
        assert!(!report.recoverable);
        assert_eq!(report.severity, Severity::Critical);
        assert_eq!(report.recovery, RecoveryStrategy::EmergencyShutdown);
    }

    #[test]
    fn validation_errors_default_to_warning_and_reject_change() {
        let report = ErrorReport::new(ErrorKind::ValidationError, "field added");
        assert_eq!(report.severity, Severity::Warning);
        assert_eq!(report.recovery, RecoveryStrategy::RejectChange);
        assert!(report.recoverable);
    }

    #[test]
    fn builders_compose() {
        let report = ErrorReport::new(ErrorKind::RedefinitionFailure, "runtime rejected")
            .with_type_key("com.acme.Widget")
            .with_operation("redefine")
            .with_correlation_id(Uuid::new_v4());
        assert_eq!(report.type_key.as_deref(), Some("com.acme.Widget"));
        assert_eq!(report.operation.as_deref(), Some("redefine"));
        assert!(report.correlation_id.is_some());
    }
}
