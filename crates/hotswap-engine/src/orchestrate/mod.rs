//! Hot-swap orchestrator: the state machine that takes one settled
//! artifact change from `Detected` through to `Done`, `Rejected` or
//! `Failed`, driving every other subsystem in the crate along the way.
//!
//! Changes to the same type key are serialized by a per-type-key lock
//! so a second change for a class already in flight waits until the
//! first reaches a terminal state; changes to different type keys run
//! fully concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hotswap_core::config::ValidationVerbosity;
use hotswap_core::model::artifact::ArtifactEvent;
use hotswap_core::model::event::{AggregateEvent, AggregateKind, EventEnvelope};
use hotswap_core::model::hotswap::{HotSwapRequest, HotSwapRequestId, RedefinitionOutcome};
use hotswap_core::model::snapshot::{ConflictResolution, RollbackResult, RollbackSnapshot};
use hotswap_core::model::user::UserIdentity;
use hotswap_core::model::validation::ValidationOutcome;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::{self, ErrorClassifier};
use crate::eventlog::{EventLog, EventLogError};
use crate::redefine::RedefinitionPrimitive;
use crate::rollback::RollbackManager;
use crate::track::{preserver, InstanceTracker};
use crate::update::adapters::{FrameworkAdapter, FrameworkAdapterRegistry};
use crate::update::{self, UpdateReport};
use crate::validate::{self, ClassRegistry, ParsedClassFile};

pub mod recovery;

/// Bound on how long a single rollback (reinstall previous bytecode +
/// restore preserved instance state) is allowed to take before it is
/// treated as a timeout rather than an ordinary failure.
const ROLLBACK_TIMEOUT: Duration = Duration::from_secs(30);

/// States a single artifact change moves through. Every field value
/// reaching a terminal state (`Done`, `Rejected`, `Failed`) is final —
/// a later change to the same class starts a fresh `HotSwapRequest`
/// aggregate rather than resuming this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeState {
    Detected,
    Validating,
    Snapshotting,
    Requesting,
    Redefining,
    UpdatingInstances,
    Committing,
    Done,
    Rejected,
    RollingBack,
    Failed,
}

impl ChangeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Rejected | Self::Failed)
    }
}

/// The result of running one artifact change through the orchestrator.
#[derive(Debug, Clone)]
pub struct ChangeOutcome {
    pub request_id: Option<HotSwapRequestId>,
    pub type_key: String,
    pub final_state: ChangeState,
    pub detail: String,
}

/// Drives the `Detected -> ... -> Done/Rejected/Failed` state machine,
/// wiring together the validator, rollback manager, instance tracker,
/// instance updater, framework adapter registry, redefinition
/// primitive and error classifier. One instance is shared across every
/// in-flight change.
pub struct HotSwapOrchestrator {
    event_log: Arc<EventLog>,
    class_registry: Arc<dyn ClassRegistry>,
    rollback: Arc<RollbackManager>,
    tracker: Arc<InstanceTracker>,
    adapters: Arc<FrameworkAdapterRegistry>,
    redefiner: Arc<dyn RedefinitionPrimitive>,
    classifier: Arc<ErrorClassifier>,
    runtime_id: Uuid,
    strict_mode: bool,
    validation_verbosity: ValidationVerbosity,
    type_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HotSwapOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        event_log: Arc<EventLog>,
        class_registry: Arc<dyn ClassRegistry>,
        rollback: Arc<RollbackManager>,
        tracker: Arc<InstanceTracker>,
        adapters: Arc<FrameworkAdapterRegistry>,
        redefiner: Arc<dyn RedefinitionPrimitive>,
        classifier: Arc<ErrorClassifier>,
        runtime_id: Uuid,
        strict_mode: bool,
        validation_verbosity: ValidationVerbosity,
    ) -> Self {
        Self {
            event_log,
            class_registry,
            rollback,
            tracker,
            adapters,
            redefiner,
            classifier,
            runtime_id,
            strict_mode,
            validation_verbosity,
            type_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for_type(&self, type_key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.type_locks.lock().await;
        locks
            .entry(type_key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handles one settled `Created`/`Modified` artifact change end to
    /// end. Changes to the same type key queue behind each other;
    /// changes to different type keys never block one another.
    pub async fn handle_artifact_change(
        &self,
        event: ArtifactEvent,
        requested_by: UserIdentity,
    ) -> ChangeOutcome {
        let type_key = event.artifact.dotted_class_name.clone();
        let user_id = requested_by.identifier().to_string();
        let correlation_id = event.correlation_id;
        let lock = self.lock_for_type(&type_key).await;
        let _guard = lock.lock().await;

        if event.is_deleted() {
            tracing::debug!(type_key, "artifact deleted, nothing to redefine");
            return ChangeOutcome {
                request_id: None,
                type_key,
                final_state: ChangeState::Rejected,
                detail: "deletions are not hot-swapped".to_string(),
            };
        }

        // Detected -> Validating
        let validation_session_id = Uuid::new_v4();
        if let Err(e) = self
            .append(
                AggregateKind::ValidationSession,
                validation_session_id,
                None,
                AggregateEvent::ValidationSessionOpened { type_key: type_key.clone() },
                &user_id,
                correlation_id,
            )
            .await
        {
            return self.event_log_failure(type_key, e).await;
        }

        let previous_bytecode = self.class_registry.currently_loaded(&type_key);
        let outcome = validate::validate(
            &type_key,
            previous_bytecode.as_deref(),
            &event.bytes,
            self.class_registry.as_ref(),
        );

        match outcome {
            ValidationOutcome::Rejected { reason, detail } => {
                let recorded_detail = match self.validation_verbosity {
                    ValidationVerbosity::Detailed => detail.clone(),
                    ValidationVerbosity::Summary => format!("{reason:?}"),
                };
                let _ = self
                    .append(
                        AggregateKind::ValidationSession,
                        validation_session_id,
                        None,
                        AggregateEvent::ValidationSessionRejected {
                            reason: format!("{reason:?}"),
                            detail: recorded_detail,
                        },
                        &user_id,
                        correlation_id,
                    )
                    .await;
                let report = errors::classify_validation_error(&type_key, detail.clone());
                tracing::info!(type_key, reason = ?reason, "validation rejected change");
                return ChangeOutcome {
                    request_id: None,
                    type_key,
                    final_state: ChangeState::Rejected,
                    detail: format!("{:?}: {}", report.kind, detail),
                };
            }
            ValidationOutcome::Accepted { category } => {
                let _ = self
                    .append(
                        AggregateKind::ValidationSession,
                        validation_session_id,
                        None,
                        AggregateEvent::ValidationSessionAccepted {
                            category: format!("{category:?}"),
                        },
                        &user_id,
                        correlation_id,
                    )
                    .await;
            }
        }

        // Validating -> Snapshotting
        let handles = self.tracker.live_instances_of(&type_key);
        let instance_states = match self.adapters.adapter_for(&type_key) {
            Some(adapter) => adapter.capture_states(&handles).await,
            None => {
                let layout = type_layout_for(previous_bytecode.as_deref(), &event.bytes);
                self.tracker.capture_preserved(&handles, &layout)
            }
        };
        let previous_for_rollback = previous_bytecode.clone().unwrap_or_default();
        let snapshot = RollbackSnapshot::new(type_key.clone(), previous_for_rollback, instance_states);
        let snapshot_id = snapshot.id;
        self.rollback.capture(snapshot);

        // Snapshotting -> Requesting: create the HotSwapRequest aggregate
        // now that there is something durable to roll back to.
        let request = HotSwapRequest::new(
            type_key.clone(),
            event.artifact.clone(),
            event.bytes.clone(),
            previous_bytecode,
            requested_by,
        );
        let request_id = request.id;

        let mut last_event = match self
            .append(
                AggregateKind::HotSwapRequest,
                request_id.0,
                None,
                AggregateEvent::HotSwapRequested { type_key: type_key.clone() },
                &user_id,
                correlation_id,
            )
            .await
        {
            Ok(envelope) => envelope,
            Err(e) => return self.event_log_failure(type_key, e).await,
        };
        last_event = match self
            .append(
                AggregateKind::HotSwapRequest,
                request_id.0,
                Some(&last_event),
                AggregateEvent::HotSwapSnapshotCaptured { snapshot_id },
                &user_id,
                correlation_id,
            )
            .await
        {
            Ok(envelope) => envelope,
            Err(e) => return self.event_log_failure(type_key, e).await,
        };

        // Requesting -> Redefining
        let redefinition = self.redefiner.redefine(&type_key, &request.new_bytecode).await;
        let redefinition = match redefinition {
            Ok(outcome) => outcome,
            Err(e) => {
                let report = errors::classify_redefinition_failure(&type_key, e.to_string());
                let report =
                    errors::enrich_with_snapshot(report, &self.event_log, errors::DEFAULT_EVENT_SNAPSHOT_WINDOW).await;
                tracing::error!(
                    type_key,
                    error = %report.message,
                    recent_events = report.snapshot.as_ref().map(|s| s.recent_events.len()).unwrap_or(0),
                    "redefinition primitive unreachable"
                );
                self.classifier.record_failure(&type_key);
                let _ = self
                    .append(
                        AggregateKind::HotSwapRequest,
                        request_id.0,
                        Some(&last_event),
                        AggregateEvent::HotSwapFailed { reason: report.message.clone() },
                        &user_id,
                        correlation_id,
                    )
                    .await;
                return ChangeOutcome {
                    request_id: Some(request_id),
                    type_key,
                    final_state: ChangeState::Failed,
                    detail: report.message,
                };
            }
        };

        match redefinition {
            RedefinitionOutcome::Succeeded { instances_affected, .. } => {
                last_event = match self
                    .append(
                        AggregateKind::HotSwapRequest,
                        request_id.0,
                        Some(&last_event),
                        AggregateEvent::HotSwapRedefined { instances_affected },
                        &user_id,
                        correlation_id,
                    )
                    .await
                {
                    Ok(envelope) => envelope,
                    Err(e) => return self.event_log_failure(type_key, e).await,
                };
            }
            RedefinitionOutcome::ClassNotLoaded { .. } => {
                tracing::debug!(type_key, "class not loaded, nothing to update");
                return self
                    .commit(
                        type_key,
                        request_id,
                        last_event,
                        "class not loaded; nothing redefined".into(),
                        &user_id,
                        correlation_id,
                    )
                    .await;
            }
            RedefinitionOutcome::RejectedByRuntime { reason, .. } => {
                self.classifier.record_failure(&type_key);
                return self
                    .roll_back(type_key, request_id, last_event, snapshot_id, reason, &user_id, correlation_id)
                    .await;
            }
            RedefinitionOutcome::Unexpected { cause } => {
                self.classifier.record_failure(&type_key);
                return self
                    .roll_back(type_key, request_id, last_event, snapshot_id, cause, &user_id, correlation_id)
                    .await;
            }
        }

        // Redefining -> UpdatingInstances
        let report: UpdateReport = update::update_instances(
            &type_key,
            &request.new_bytecode,
            self.tracker.as_ref(),
            self.adapters.as_ref(),
            self.strict_mode,
        )
        .await;

        last_event = match self
            .append(
                AggregateKind::HotSwapRequest,
                request_id.0,
                Some(&last_event),
                AggregateEvent::HotSwapInstancesUpdated {
                    updated: report.updated,
                    failed: report.failed,
                    total: report.updated + report.failed,
                    strategy: report.strategy.label().to_string(),
                    duration_ms: report.duration.as_millis() as u64,
                    detail: report.detail(),
                },
                &user_id,
                correlation_id,
            )
            .await
        {
            Ok(envelope) => envelope,
            Err(e) => return self.event_log_failure(type_key, e).await,
        };

        if self.strict_mode && report.failed > 0 {
            let reason = format!("{} of {} instance updates failed", report.failed, report.updated + report.failed);
            return self
                .roll_back(type_key, request_id, last_event, snapshot_id, reason, &user_id, correlation_id)
                .await;
        }

        // UpdatingInstances -> Committing -> Done
        self.commit(
            type_key,
            request_id,
            last_event,
            format!("{} instance(s) updated", report.updated),
            &user_id,
            correlation_id,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn commit(
        &self,
        type_key: String,
        request_id: HotSwapRequestId,
        last_event: EventEnvelope,
        detail: String,
        user_id: &str,
        correlation_id: Uuid,
    ) -> ChangeOutcome {
        if let Err(e) = self
            .append(
                AggregateKind::HotSwapRequest,
                request_id.0,
                Some(&last_event),
                AggregateEvent::HotSwapCommitted,
                user_id,
                correlation_id,
            )
            .await
        {
            return self.event_log_failure(type_key, e).await;
        }
        ChangeOutcome {
            request_id: Some(request_id),
            type_key,
            final_state: ChangeState::Done,
            detail,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn roll_back(
        &self,
        type_key: String,
        request_id: HotSwapRequestId,
        last_event: EventEnvelope,
        snapshot_id: Uuid,
        reason: String,
        user_id: &str,
        correlation_id: Uuid,
    ) -> ChangeOutcome {
        tracing::warn!(type_key, reason = %reason, "rolling back hot-swap");

        // The orchestrator has no generic way to read an arbitrary
        // tracked instance's *current* field state back out (that
        // requires the concrete type an adapter knows, not an `Any`
        // handle), so its own rollback path always treats the snapshot
        // as authoritative — equivalent to `ForceSnapshot`. An adapter
        // with real current-state visibility can apply a different
        // `ConflictResolution` itself inside `restore_states` using
        // `rollback::resolve_conflict`.
        let resolution = ConflictResolution::ForceSnapshot;
        let result = self
            .rollback
            .rollback(
                snapshot_id,
                resolution,
                self.redefiner.as_ref(),
                &self.adapters,
                &self.tracker,
                None,
                ROLLBACK_TIMEOUT,
            )
            .await;
        let reinstalled = result.is_success();

        let event = match &result {
            RollbackResult::Succeeded => AggregateEvent::HotSwapRolledBack { resolution: format!("{resolution:?}") },
            RollbackResult::Failed { reason: why } => AggregateEvent::HotSwapFailed {
                reason: format!("rollback could not reinstall previous bytecode: {reason} ({why})"),
            },
            RollbackResult::Timeout => AggregateEvent::HotSwapFailed {
                reason: format!("rollback timed out while reinstalling previous bytecode: {reason}"),
            },
        };
        let final_state = if reinstalled { ChangeState::Done } else { ChangeState::Failed };

        let _ = self
            .append(AggregateKind::HotSwapRequest, request_id.0, Some(&last_event), event, user_id, correlation_id)
            .await;

        ChangeOutcome {
            request_id: Some(request_id),
            type_key,
            final_state,
            detail: reason,
        }
    }

    async fn event_log_failure(&self, type_key: String, error: EventLogError) -> ChangeOutcome {
        let report = errors::classify_critical_system_error(error.to_string());
        let report = errors::enrich_with_snapshot(report, &self.event_log, errors::DEFAULT_EVENT_SNAPSHOT_WINDOW).await;
        tracing::error!(
            type_key,
            error = %report.message,
            recent_events = report.snapshot.as_ref().map(|s| s.recent_events.len()).unwrap_or(0),
            "event log append failed, aborting change"
        );
        ChangeOutcome {
            request_id: None,
            type_key,
            final_state: ChangeState::Failed,
            detail: report.message,
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn append(
        &self,
        kind: AggregateKind,
        aggregate_id: Uuid,
        caused_by: Option<&EventEnvelope>,
        payload: AggregateEvent,
        user_id: &str,
        correlation_id: Uuid,
    ) -> Result<EventEnvelope, EventLogError> {
        let envelope = match caused_by {
            Some(prior) => prior.next(payload),
            None => EventEnvelope::first(kind, aggregate_id, payload),
        };
        let envelope = envelope.with_user(user_id).with_correlation_id(correlation_id);
        self.event_log.append(&envelope).await?;
        Ok(envelope)
    }

    /// Replays the durable `HotSwapRequest` log and rolls back every
    /// request a prior process left in a non-terminal state — the
    /// crash-recovery path for a process that died mid-swap, between
    /// `Redefining` and `Committing`. Intended to run once, at startup,
    /// before the watcher loop begins delivering new artifact changes.
    pub async fn recover_interrupted_requests(&self) {
        let mut handler = recovery::RecoveryHandler::default();
        let engine = crate::eventlog::replay::EventReplayEngine::new(&self.event_log);
        if let Err(e) = engine.replay_all(AggregateKind::HotSwapRequest, &mut handler).await {
            tracing::error!(error = %e, "failed to replay hot-swap request log for crash recovery");
            return;
        }

        for (aggregate_id, state) in handler.interrupted {
            let Some(last_event) = state.last_event.clone() else {
                continue;
            };
            let Some(snapshot_id) = state.snapshot_id else {
                tracing::warn!(
                    aggregate_id = %aggregate_id,
                    type_key = %state.type_key,
                    "interrupted hot-swap request has no snapshot to recover to, marking failed"
                );
                let envelope = last_event.next(AggregateEvent::HotSwapFailed {
                    reason: "process crashed before a rollback snapshot was captured".to_string(),
                });
                if let Err(e) = self.event_log.append(&envelope).await {
                    tracing::error!(aggregate_id = %aggregate_id, error = %e, "failed to record crash-recovery outcome");
                }
                continue;
            };

            tracing::warn!(
                aggregate_id = %aggregate_id,
                type_key = %state.type_key,
                "recovering interrupted hot-swap request left by a prior process"
            );
            let result = self
                .rollback
                .rollback(
                    snapshot_id,
                    ConflictResolution::ForceSnapshot,
                    self.redefiner.as_ref(),
                    &self.adapters,
                    &self.tracker,
                    None,
                    ROLLBACK_TIMEOUT,
                )
                .await;

            let event = match &result {
                RollbackResult::Succeeded => {
                    AggregateEvent::HotSwapRolledBack { resolution: "crash recovery".to_string() }
                }
                RollbackResult::Failed { reason } => {
                    AggregateEvent::HotSwapFailed { reason: format!("crash recovery rollback failed: {reason}") }
                }
                RollbackResult::Timeout => {
                    AggregateEvent::HotSwapFailed { reason: "crash recovery rollback timed out".to_string() }
                }
            };
            let envelope = last_event.next(event);
            if let Err(e) = self.event_log.append(&envelope).await {
                tracing::error!(aggregate_id = %aggregate_id, error = %e, "failed to record crash-recovery outcome");
            }
        }
    }

    /// Records a filesystem-watcher overflow against the runtime
    /// aggregate this orchestrator was constructed for, so a full
    /// rescan can be triggered and the gap is visible on replay.
    pub async fn handle_watcher_overflow(&self) {
        let payload = AggregateEvent::RuntimeWatcherDegraded {
            reason: "filesystem watcher overflow, events may have been dropped".to_string(),
        };
        let prior = self
            .event_log
            .events_of(AggregateKind::Runtime, self.runtime_id)
            .await
            .ok()
            .and_then(|events| events.into_iter().last());
        let envelope = match &prior {
            Some(prior) => prior.next(payload),
            None => EventEnvelope::first(AggregateKind::Runtime, self.runtime_id, payload),
        };
        if let Err(e) = self.event_log.append(&envelope).await {
            tracing::error!(error = %e, "failed to record watcher overflow");
        }
    }
}

/// Rebuilds the field layout the reflective-field-copy path needs to
/// capture/restore generically, from whichever bytecode is available:
/// the previous version if the class was already loaded, else the new
/// one being applied for the first time.
fn type_layout_for(previous_bytecode: Option<&[u8]>, new_bytecode: &[u8]) -> preserver::TypeLayout {
    let bytes = previous_bytecode.unwrap_or(new_bytecode);
    match ParsedClassFile::parse(bytes) {
        Ok(class_file) => preserver::TypeLayout::from_fields(&class_file.fields, &class_file.field_mutability),
        Err(_) => preserver::TypeLayout::default(),
    }
}
