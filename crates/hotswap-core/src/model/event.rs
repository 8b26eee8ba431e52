//! The event-sourced core: aggregates, their events, and the envelope
//! the event log persists.
//!
//! Four aggregates are tracked: `Runtime` (the watched process/host as a
//! whole), `User` (identity bind/unbind), `ValidationSession` (one
//! artifact run through the validator) and `HotSwapRequest` (one
//! end-to-end change). Every aggregate's events are appended to their
//! own per-aggregate, strictly version-ordered log; see
//! `hotswap_engine::eventlog`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum AggregateKind {
    Runtime,
    User,
    ValidationSession,
    HotSwapRequest,
}

impl AggregateKind {
    /// The directory name this aggregate kind's events are filed under.
    pub fn dir_name(&self) -> &'static str {
        match self {
            Self::Runtime => "runtime",
            Self::User => "user",
            Self::ValidationSession => "validation-session",
            Self::HotSwapRequest => "hot-swap-request",
        }
    }
}

/// Domain events for each aggregate. Each variant's payload is the
/// minimum data needed to fold the event into the aggregate's state;
/// anything derivable from prior events (counts, durations) is computed
/// during replay, not stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_kind")]
pub enum AggregateEvent {
    // Runtime aggregate
    RuntimeStarted { watch_paths: Vec<String> },
    RuntimeWatcherDegraded { reason: String },
    RuntimeWatcherRecovered,
    RuntimeStopped,

    // User aggregate
    UserIdentityBound { source: String, identifier: String },
    UserIdentityUnbound,

    // ValidationSession aggregate
    ValidationSessionOpened { type_key: String },
    ValidationSessionAccepted { category: String },
    ValidationSessionRejected { reason: String, detail: String },

    // HotSwapRequest aggregate
    HotSwapRequested { type_key: String },
    HotSwapSnapshotCaptured { snapshot_id: Uuid },
    HotSwapRedefined { instances_affected: usize },
    HotSwapInstancesUpdated {
        updated: usize,
        failed: usize,
        total: usize,
        strategy: String,
        duration_ms: u64,
        detail: String,
    },
    HotSwapCommitted,
    HotSwapFailed { reason: String },
    HotSwapRolledBack { resolution: String },
}

impl AggregateEvent {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::RuntimeStarted { .. } => "RuntimeStarted",
            Self::RuntimeWatcherDegraded { .. } => "RuntimeWatcherDegraded",
            Self::RuntimeWatcherRecovered => "RuntimeWatcherRecovered",
            Self::RuntimeStopped => "RuntimeStopped",
            Self::UserIdentityBound { .. } => "UserIdentityBound",
            Self::UserIdentityUnbound => "UserIdentityUnbound",
            Self::ValidationSessionOpened { .. } => "ValidationSessionOpened",
            Self::ValidationSessionAccepted { .. } => "ValidationSessionAccepted",
            Self::ValidationSessionRejected { .. } => "ValidationSessionRejected",
            Self::HotSwapRequested { .. } => "HotSwapRequested",
            Self::HotSwapSnapshotCaptured { .. } => "HotSwapSnapshotCaptured",
            Self::HotSwapRedefined { .. } => "HotSwapRedefined",
            Self::HotSwapInstancesUpdated { .. } => "HotSwapInstancesUpdated",
            Self::HotSwapCommitted => "HotSwapCommitted",
            Self::HotSwapFailed { .. } => "HotSwapFailed",
            Self::HotSwapRolledBack { .. } => "HotSwapRolledBack",
        }
    }
}

/// The current schema version this build writes and expects to read.
/// A persisted event with a newer version than this is fatal for that
/// aggregate's replay (see `hotswap_engine::eventlog::replay`); an older
/// one is a candidate for a monotonic, idempotent migration.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The persisted unit: one domain event plus the causality/version
/// bookkeeping the log needs to replay aggregates deterministically and
/// detect out-of-order writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub aggregate_kind: AggregateKind,
    pub aggregate_id: Uuid,
    /// 1-based, strictly increasing per aggregate instance. The event
    /// log refuses to append an envelope whose version does not equal
    /// the aggregate's current version + 1.
    pub version: u64,
    /// The event_id of the envelope this one causally follows, or `None`
    /// for an aggregate's first event.
    pub caused_by: Option<EventId>,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
    /// Schema version of `payload`'s shape, defaulted via `#[serde(default
    /// = ...)]` so events written before this field existed still replay.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    /// Who caused this event, when the event has a user-observable
    /// cause. Folded in from the ambient [`crate::identity`] resolution
    /// at append time.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Shared across every aggregate touched while handling one
    /// user-observable action (here: one artifact change), so a reader
    /// can reconstruct cross-aggregate causality from `events_between`
    /// or `events_of_type` output alone.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    pub payload: AggregateEvent,
}

fn default_schema_version() -> u32 {
    1
}

impl EventEnvelope {
    pub fn first(aggregate_kind: AggregateKind, aggregate_id: Uuid, payload: AggregateEvent) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_kind,
            aggregate_id,
            version: 1,
            caused_by: None,
            recorded_at: chrono::Utc::now(),
            schema_version: CURRENT_SCHEMA_VERSION,
            user_id: None,
            correlation_id: None,
            payload,
        }
    }

    pub fn next(&self, payload: AggregateEvent) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_kind: self.aggregate_kind,
            aggregate_id: self.aggregate_id,
            version: self.version + 1,
            caused_by: Some(self.event_id),
            recorded_at: chrono::Utc::now(),
            schema_version: CURRENT_SCHEMA_VERSION,
            // A whole change's causal chain shares one user and one
            // correlation id by default; `with_user`/`with_correlation`
            // let a caller override either explicitly.
            user_id: self.user_id.clone(),
            correlation_id: self.correlation_id,
            payload,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// The zero-padded, lexicographically version-ordered filename this
    /// envelope is persisted under.
    pub fn file_name(&self) -> String {
        format!("{:010}-{}.json", self.version, self.event_id.0)
    }
}
