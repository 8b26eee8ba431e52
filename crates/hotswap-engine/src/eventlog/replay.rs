//! Replaying every aggregate of a kind back into memory, used on
//! startup to rebuild in-memory state (e.g. open hot-swap requests that
//! never reached `Committed`) from the durable log.

use hotswap_core::model::event::{AggregateKind, EventEnvelope};
use uuid::Uuid;

use super::{EventLog, EventLogResult};

/// How far through a full-log replay the engine has gotten; useful for
/// progress reporting on logs with many aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayPosition {
    pub aggregates_replayed: usize,
    pub aggregates_total: usize,
}

/// Receives each aggregate's events as replay reaches it. Implementors
/// fold the events into whatever in-memory structure they maintain;
/// the replay engine itself holds no opinion about aggregate state.
pub trait ReplayHandler {
    fn on_aggregate(&mut self, aggregate_id: Uuid, events: &[EventEnvelope]);
}

/// Walks every aggregate directory under a kind and hands its events to
/// a [`ReplayHandler`], in no particular order across aggregates (each
/// aggregate's own events are still delivered in version order).
pub struct EventReplayEngine<'a> {
    log: &'a EventLog,
}

impl<'a> EventReplayEngine<'a> {
    pub fn new(log: &'a EventLog) -> Self {
        Self { log }
    }

    pub async fn replay_all(
        &self,
        kind: AggregateKind,
        handler: &mut dyn ReplayHandler,
    ) -> EventLogResult<ReplayPosition> {
        let kind_dir = self.log.root().join(kind.dir_name());
        let mut aggregate_ids = Vec::new();

        let mut entries = match tokio::fs::read_dir(&kind_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ReplayPosition {
                    aggregates_replayed: 0,
                    aggregates_total: 0,
                })
            }
            Err(source) => {
                return Err(super::EventLogError::Io {
                    path: kind_dir,
                    source,
                })
            }
        };

        while let Some(entry) = entries.next_entry().await.map_err(|source| super::EventLogError::Io {
            path: kind_dir.clone(),
            source,
        })? {
            if let Ok(id) = Uuid::parse_str(&entry.file_name().to_string_lossy()) {
                aggregate_ids.push(id);
            }
        }

        let total = aggregate_ids.len();
        for (i, aggregate_id) in aggregate_ids.into_iter().enumerate() {
            let events = self.log.events_of(kind, aggregate_id).await?;
            handler.on_aggregate(aggregate_id, &events);
            tracing::trace!(aggregate_id = %aggregate_id, index = i, total, "replayed aggregate");
        }

        Ok(ReplayPosition {
            aggregates_replayed: total,
            aggregates_total: total,
        })
    }
}
