//! Crash-recovery fold: replays the `HotSwapRequest` aggregate log and
//! identifies every request a prior process left in a non-terminal
//! state, so the orchestrator can roll each one back to its captured
//! snapshot on startup rather than silently carrying forward a
//! half-applied change.

use hotswap_core::model::event::{AggregateEvent, AggregateKind, EventEnvelope};
use uuid::Uuid;

use crate::eventlog::replay::ReplayHandler;
use crate::eventlog::AggregateRoot;

/// Folds a `HotSwapRequest` aggregate down to just what recovery
/// needs: the type key, the last captured rollback snapshot, the most
/// recent event (so a recovery outcome can be appended onto the same
/// causal chain), and whether the request ever reached a terminal
/// event.
#[derive(Debug, Clone, Default)]
pub struct HotSwapRequestState {
    pub type_key: String,
    pub snapshot_id: Option<Uuid>,
    pub last_event: Option<EventEnvelope>,
    pub terminal: bool,
}

impl AggregateRoot for HotSwapRequestState {
    fn aggregate_kind() -> AggregateKind {
        AggregateKind::HotSwapRequest
    }

    fn new(_aggregate_id: Uuid) -> Self {
        Self::default()
    }

    fn apply(&mut self, envelope: &EventEnvelope) {
        match &envelope.payload {
            AggregateEvent::HotSwapRequested { type_key } => {
                self.type_key = type_key.clone();
            }
            AggregateEvent::HotSwapSnapshotCaptured { snapshot_id } => {
                self.snapshot_id = Some(*snapshot_id);
            }
            AggregateEvent::HotSwapCommitted
            | AggregateEvent::HotSwapFailed { .. }
            | AggregateEvent::HotSwapRolledBack { .. } => {
                self.terminal = true;
            }
            _ => {}
        }
        self.last_event = Some(envelope.clone());
    }
}

/// Collects every `HotSwapRequest` aggregate a full-log replay visits
/// that never reached a terminal event.
#[derive(Default)]
pub struct RecoveryHandler {
    pub interrupted: Vec<(Uuid, HotSwapRequestState)>,
}

impl ReplayHandler for RecoveryHandler {
    fn on_aggregate(&mut self, aggregate_id: Uuid, events: &[EventEnvelope]) {
        if events.is_empty() {
            return;
        }
        let state: HotSwapRequestState = crate::eventlog::replay(aggregate_id, events);
        if !state.terminal {
            self.interrupted.push((aggregate_id, state));
        }
    }
}
