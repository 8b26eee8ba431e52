//! Append-only, per-aggregate, file-backed event log.
//!
//! Each aggregate instance owns a directory at
//! `<root>/<aggregate-kind>/<aggregate-id>/`, with one file per event
//! named by its zero-padded version so a directory listing sorts in
//! version order. Appends are atomic: the envelope is written to a
//! `.tmp` sibling and renamed into place, so a crash mid-write never
//! leaves a half-written event file for replay to trip over.

pub mod replay;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use hotswap_core::model::event::{AggregateKind, EventEnvelope, EventId, CURRENT_SCHEMA_VERSION};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum EventLogError {
    #[error("I/O error writing event log at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize event envelope: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(
        "version conflict appending to aggregate {aggregate_id}: expected version {expected}, got {actual}"
    )]
    VersionConflict {
        aggregate_id: uuid::Uuid,
        expected: u64,
        actual: u64,
    },

    #[error(
        "broken causal chain appending to aggregate {aggregate_id}: expected caused_by {expected:?}, got {actual:?}"
    )]
    PreviousMismatch {
        aggregate_id: uuid::Uuid,
        expected: Option<EventId>,
        actual: Option<EventId>,
    },

    #[error(
        "event {event_id} for aggregate {aggregate_id} has schema version {found}, newer than this reader's {CURRENT_SCHEMA_VERSION}"
    )]
    SchemaTooNew {
        aggregate_id: uuid::Uuid,
        event_id: uuid::Uuid,
        found: u32,
    },
}

pub type EventLogResult<T> = Result<T, EventLogError>;

/// Appends events to, and replays events from, the on-disk log rooted
/// at `root`. Holds one `tokio::sync::Mutex` per aggregate so
/// concurrent appends to different aggregates never block each other,
/// while appends to the *same* aggregate are serialized to keep the
/// version sequence gap-free.
pub struct EventLog {
    root: PathBuf,
    aggregate_locks: Mutex<HashMap<(AggregateKind, uuid::Uuid), Arc<Mutex<()>>>>,
}

impl EventLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            aggregate_locks: Mutex::new(HashMap::new()),
        }
    }

    fn aggregate_dir(&self, kind: AggregateKind, aggregate_id: uuid::Uuid) -> PathBuf {
        self.root.join(kind.dir_name()).join(aggregate_id.to_string())
    }

    async fn lock_for(&self, kind: AggregateKind, aggregate_id: uuid::Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.aggregate_locks.lock().await;
        locks
            .entry((kind, aggregate_id))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Appends `envelope`, failing with [`EventLogError::VersionConflict`]
    /// if another writer has already appended an event at or past this
    /// version for the same aggregate, or with
    /// [`EventLogError::PreviousMismatch`] if `envelope.caused_by` does
    /// not point at the aggregate's actual last event (or isn't `None`
    /// on the very first event).
    pub async fn append(&self, envelope: &EventEnvelope) -> EventLogResult<()> {
        let lock = self
            .lock_for(envelope.aggregate_kind, envelope.aggregate_id)
            .await;
        let _guard = lock.lock().await;

        let last = self
            .last_envelope(envelope.aggregate_kind, envelope.aggregate_id)
            .await?;
        let current = last.as_ref().map(|e| e.version).unwrap_or(0);
        if envelope.version != current + 1 {
            return Err(EventLogError::VersionConflict {
                aggregate_id: envelope.aggregate_id,
                expected: current + 1,
                actual: envelope.version,
            });
        }

        let expected_caused_by = last.as_ref().map(|e| e.event_id);
        if envelope.caused_by != expected_caused_by {
            return Err(EventLogError::PreviousMismatch {
                aggregate_id: envelope.aggregate_id,
                expected: expected_caused_by,
                actual: envelope.caused_by,
            });
        }

        let dir = self.aggregate_dir(envelope.aggregate_kind, envelope.aggregate_id);
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| EventLogError::Io { path: dir.clone(), source })?;

        let final_path = dir.join(envelope.file_name());
        let tmp_path = dir.join(format!("{}.tmp", envelope.file_name()));

        let bytes = serde_json::to_vec_pretty(envelope)?;
        fs::write(&tmp_path, &bytes)
            .await
            .map_err(|source| EventLogError::Io { path: tmp_path.clone(), source })?;
        fs::rename(&tmp_path, &final_path)
            .await
            .map_err(|source| EventLogError::Io { path: final_path, source })?;

        tracing::debug!(
            aggregate_kind = ?envelope.aggregate_kind,
            aggregate_id = %envelope.aggregate_id,
            version = envelope.version,
            event = envelope.payload.kind_name(),
            "appended event"
        );
        Ok(())
    }

    /// Reads every event persisted for an aggregate, already in version
    /// order because filenames sort that way.
    pub async fn events_of(
        &self,
        kind: AggregateKind,
        aggregate_id: uuid::Uuid,
    ) -> EventLogResult<Vec<EventEnvelope>> {
        let dir = self.aggregate_dir(kind, aggregate_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(EventLogError::Io { path: dir, source }),
        };

        let mut file_names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| EventLogError::Io { path: dir.clone(), source })?
        {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(".json") {
                file_names.push(name.into_owned());
            }
        }
        file_names.sort();

        let mut envelopes = Vec::with_capacity(file_names.len());
        for name in file_names {
            let path = dir.join(&name);
            let bytes = fs::read(&path)
                .await
                .map_err(|source| EventLogError::Io { path: path.clone(), source })?;
            let envelope: EventEnvelope = serde_json::from_slice(&bytes)?;
            if envelope.schema_version > CURRENT_SCHEMA_VERSION {
                return Err(EventLogError::SchemaTooNew {
                    aggregate_id,
                    event_id: envelope.event_id.0,
                    found: envelope.schema_version,
                });
            }
            envelopes.push(envelope);
        }
        Ok(envelopes)
    }

    /// The last persisted envelope for an aggregate, or `None` if it has
    /// never had an event appended. Used both to compute the current
    /// version and to check the `caused_by` causal chain on append.
    async fn last_envelope(
        &self,
        kind: AggregateKind,
        aggregate_id: uuid::Uuid,
    ) -> EventLogResult<Option<EventEnvelope>> {
        Ok(self.events_of(kind, aggregate_id).await?.into_iter().last())
    }

    async fn current_version(
        &self,
        kind: AggregateKind,
        aggregate_id: uuid::Uuid,
    ) -> EventLogResult<u64> {
        Ok(self
            .last_envelope(kind, aggregate_id)
            .await?
            .map(|e| e.version)
            .unwrap_or(0))
    }

    /// The current version of `aggregate`, or 0 if it has never had an
    /// event appended.
    pub async fn current_version_of(
        &self,
        kind: AggregateKind,
        aggregate_id: uuid::Uuid,
    ) -> EventLogResult<u64> {
        self.current_version(kind, aggregate_id).await
    }

    /// Whether any event has ever been appended for this aggregate.
    pub async fn exists(&self, kind: AggregateKind, aggregate_id: uuid::Uuid) -> EventLogResult<bool> {
        Ok(self.current_version(kind, aggregate_id).await? > 0)
    }

    /// Every aggregate id that has at least one event under `kind`.
    pub async fn aggregate_ids_of(&self, kind: AggregateKind) -> EventLogResult<Vec<uuid::Uuid>> {
        let kind_dir = self.root.join(kind.dir_name());
        let mut entries = match fs::read_dir(&kind_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(EventLogError::Io { path: kind_dir, source }),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| EventLogError::Io { path: kind_dir.clone(), source })?
        {
            if let Ok(id) = uuid::Uuid::parse_str(&entry.file_name().to_string_lossy()) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// Every aggregate kind that has at least one aggregate directory
    /// under this log's root.
    pub async fn aggregate_kinds(&self) -> EventLogResult<Vec<AggregateKind>> {
        const ALL: [AggregateKind; 4] = [
            AggregateKind::Runtime,
            AggregateKind::User,
            AggregateKind::ValidationSession,
            AggregateKind::HotSwapRequest,
        ];
        let mut present = Vec::new();
        for kind in ALL {
            if tokio::fs::try_exists(self.root.join(kind.dir_name())).await.unwrap_or(false) {
                present.push(kind);
            }
        }
        Ok(present)
    }

    /// Every event of a given kind across all aggregates, flattened and
    /// re-sorted by `recorded_at` (version order within an aggregate,
    /// but aggregates themselves are only partially ordered against
    /// each other — this gives callers a best-effort total order).
    pub async fn events_of_type(&self, kind: AggregateKind) -> EventLogResult<Vec<EventEnvelope>> {
        let mut all = Vec::new();
        for aggregate_id in self.aggregate_ids_of(kind).await? {
            all.extend(self.events_of(kind, aggregate_id).await?);
        }
        all.sort_by_key(|e| e.recorded_at);
        Ok(all)
    }

    /// Every event across every aggregate kind whose `recorded_at` falls
    /// in `[t0, t1]` inclusive, sorted by `recorded_at`.
    pub async fn events_between(
        &self,
        t0: chrono::DateTime<chrono::Utc>,
        t1: chrono::DateTime<chrono::Utc>,
    ) -> EventLogResult<Vec<EventEnvelope>> {
        let mut all = Vec::new();
        for kind in self.aggregate_kinds().await? {
            for aggregate_id in self.aggregate_ids_of(kind).await? {
                for envelope in self.events_of(kind, aggregate_id).await? {
                    if envelope.recorded_at >= t0 && envelope.recorded_at <= t1 {
                        all.push(envelope);
                    }
                }
            }
        }
        all.sort_by_key(|e| e.recorded_at);
        Ok(all)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Folds an aggregate's events into its current state. Unknown event
/// kinds (a future version's events replayed by an older binary) are
/// skipped with a warning rather than failing replay.
pub trait AggregateRoot: Sized {
    fn aggregate_kind() -> AggregateKind;
    fn new(aggregate_id: uuid::Uuid) -> Self;
    fn apply(&mut self, envelope: &EventEnvelope);
}

pub fn replay<T: AggregateRoot>(aggregate_id: uuid::Uuid, events: &[EventEnvelope]) -> T {
    let mut aggregate = T::new(aggregate_id);
    for envelope in events {
        aggregate.apply(envelope);
    }
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_core::model::event::{AggregateEvent, EventEnvelope};

    #[tokio::test]
    async fn append_then_read_round_trips_in_version_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let aggregate_id = uuid::Uuid::new_v4();

        let first = EventEnvelope::first(
            AggregateKind::Runtime,
            aggregate_id,
            AggregateEvent::RuntimeStarted {
                watch_paths: vec!["/tmp".into()],
            },
        );
        let second = first.next(AggregateEvent::RuntimeStopped);

        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let events = log.events_of(AggregateKind::Runtime, aggregate_id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].version, 1);
        assert_eq!(events[1].version, 2);
    }

    #[tokio::test]
    async fn append_rejects_out_of_order_version() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let aggregate_id = uuid::Uuid::new_v4();

        let mut second = EventEnvelope::first(
            AggregateKind::Runtime,
            aggregate_id,
            AggregateEvent::RuntimeStarted { watch_paths: vec![] },
        );
        second.version = 2;

        let result = log.append(&second).await;
        assert!(matches!(result, Err(EventLogError::VersionConflict { .. })));
    }

    #[tokio::test]
    async fn append_rejects_first_event_with_a_caused_by() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let aggregate_id = uuid::Uuid::new_v4();

        let mut first = EventEnvelope::first(
            AggregateKind::Runtime,
            aggregate_id,
            AggregateEvent::RuntimeStarted { watch_paths: vec![] },
        );
        first.caused_by = Some(hotswap_core::model::event::EventId::new());

        let result = log.append(&first).await;
        assert!(matches!(result, Err(EventLogError::PreviousMismatch { .. })));
    }

    #[tokio::test]
    async fn append_rejects_broken_causal_chain() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let aggregate_id = uuid::Uuid::new_v4();

        let first = EventEnvelope::first(
            AggregateKind::Runtime,
            aggregate_id,
            AggregateEvent::RuntimeStarted { watch_paths: vec![] },
        );
        log.append(&first).await.unwrap();

        let mut second = first.next(AggregateEvent::RuntimeStopped);
        second.caused_by = Some(hotswap_core::model::event::EventId::new());

        let result = log.append(&second).await;
        assert!(matches!(result, Err(EventLogError::PreviousMismatch { .. })));
    }

    #[tokio::test]
    async fn exists_and_aggregate_ids_of_reflect_appended_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());
        let aggregate_id = uuid::Uuid::new_v4();

        assert!(!log.exists(AggregateKind::Runtime, aggregate_id).await.unwrap());

        let first = EventEnvelope::first(
            AggregateKind::Runtime,
            aggregate_id,
            AggregateEvent::RuntimeStarted { watch_paths: vec![] },
        );
        log.append(&first).await.unwrap();

        assert!(log.exists(AggregateKind::Runtime, aggregate_id).await.unwrap());
        assert_eq!(
            log.aggregate_ids_of(AggregateKind::Runtime).await.unwrap(),
            vec![aggregate_id]
        );
        assert!(log.aggregate_kinds().await.unwrap().contains(&AggregateKind::Runtime));
    }

    #[tokio::test]
    async fn events_of_type_flattens_across_aggregates() {
        let dir = tempfile::tempdir().unwrap();
        let log = EventLog::new(dir.path());

        for _ in 0..3 {
            let envelope = EventEnvelope::first(
                AggregateKind::Runtime,
                uuid::Uuid::new_v4(),
                AggregateEvent::RuntimeStarted { watch_paths: vec![] },
            );
            log.append(&envelope).await.unwrap();
        }

        let events = log.events_of_type(AggregateKind::Runtime).await.unwrap();
        assert_eq!(events.len(), 3);
    }
}
