//! End-to-end coverage of `HotSwapOrchestrator::handle_artifact_change`
//! against a real, file-backed event log: the three scenarios a single
//! settled artifact change can resolve into (`Done`, `Rejected`,
//! rollback-to-`Done`), asserted against what actually lands on disk
//! rather than just the in-memory outcome.

use std::sync::Arc;

use hotswap_core::config::ValidationVerbosity;
use hotswap_core::model::artifact::{ArtifactChange, ArtifactEvent, ArtifactKind};
use hotswap_core::model::event::AggregateKind;
use hotswap_core::testing::fixtures::{minimal_class_bytes, sample_artifact_path, sample_user_identity};
use hotswap_engine::errors::ErrorClassifier;
use hotswap_engine::eventlog::EventLog;
use hotswap_engine::orchestrate::ChangeState;
use hotswap_engine::redefine::{RedefinitionPrimitive, RejectOnceThenSucceedPrimitive, SimulatedRedefinitionPrimitive};
use hotswap_engine::rollback::RollbackManager;
use hotswap_engine::track::InstanceTracker;
use hotswap_engine::update::adapters::FrameworkAdapterRegistry;
use hotswap_engine::validate::ClassRegistry;
use hotswap_engine::HotSwapOrchestrator;
use uuid::Uuid;

struct FixedRegistry(Vec<u8>);
impl ClassRegistry for FixedRegistry {
    fn currently_loaded(&self, _type_key: &str) -> Option<Vec<u8>> {
        Some(self.0.clone())
    }
}

fn orchestrator(
    dir: &std::path::Path,
    registry: Arc<dyn ClassRegistry>,
    redefiner: Arc<dyn RedefinitionPrimitive>,
) -> (HotSwapOrchestrator, Arc<EventLog>) {
    let event_log = Arc::new(EventLog::new(dir));
    let orch = HotSwapOrchestrator::new(
        event_log.clone(),
        registry,
        Arc::new(RollbackManager::new(3)),
        Arc::new(InstanceTracker::new()),
        Arc::new(FrameworkAdapterRegistry::new()),
        redefiner,
        Arc::new(ErrorClassifier::default()),
        Uuid::new_v4(),
        true,
        ValidationVerbosity::Detailed,
    );
    (orch, event_log)
}

fn created_event(bytes: Vec<u8>) -> ArtifactEvent {
    ArtifactEvent::new(
        sample_artifact_path("com.example.A"),
        ArtifactKind::TopLevelClass,
        ArtifactChange::Modified { size: bytes.len() as u64 },
        bytes,
    )
}

#[tokio::test]
async fn compatible_method_body_change_commits_with_reflective_field_copy() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = minimal_class_bytes(1, 1);
    let registry: Arc<dyn ClassRegistry> = Arc::new(FixedRegistry(bytes.clone()));
    let redefiner: Arc<dyn RedefinitionPrimitive> = Arc::new(SimulatedRedefinitionPrimitive::new(1));
    let (orch, event_log) = orchestrator(dir.path(), registry, redefiner);

    let outcome = orch.handle_artifact_change(created_event(bytes), sample_user_identity()).await;
    assert_eq!(outcome.final_state, ChangeState::Done);
    let request_id = outcome.request_id.expect("accepted change opens a HotSwapRequest aggregate");

    let events = event_log
        .events_of(AggregateKind::HotSwapRequest, request_id.0)
        .await
        .unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.payload.kind_name()).collect();
    assert_eq!(
        kinds,
        vec![
            "HotSwapRequested",
            "HotSwapSnapshotCaptured",
            "HotSwapRedefined",
            "HotSwapInstancesUpdated",
            "HotSwapCommitted",
        ]
    );

    use hotswap_core::model::event::AggregateEvent;
    match &events[3].payload {
        AggregateEvent::HotSwapInstancesUpdated { strategy, updated, failed, .. } => {
            assert_eq!(strategy, "reflective-field-copy");
            assert_eq!(*updated, 0);
            assert_eq!(*failed, 0);
        }
        other => panic!("expected HotSwapInstancesUpdated, got {other:?}"),
    }

    // Every event in the chain carries the correlation id the artifact
    // change itself was tagged with, and the resolved user identity.
    for event in &events {
        assert_eq!(event.user_id.as_deref(), Some("test-user"));
        assert!(event.correlation_id.is_some());
    }
}

#[tokio::test]
async fn field_addition_is_rejected_and_opens_no_hot_swap_request() {
    let dir = tempfile::tempdir().unwrap();
    let previous = minimal_class_bytes(1, 1);
    let new = minimal_class_bytes(2, 1);
    let registry: Arc<dyn ClassRegistry> = Arc::new(FixedRegistry(previous));
    let redefiner: Arc<dyn RedefinitionPrimitive> = Arc::new(SimulatedRedefinitionPrimitive::new(0));
    let (orch, event_log) = orchestrator(dir.path(), registry, redefiner);

    let outcome = orch.handle_artifact_change(created_event(new), sample_user_identity()).await;
    assert_eq!(outcome.final_state, ChangeState::Rejected);
    assert!(outcome.request_id.is_none());
    assert!(event_log.aggregate_ids_of(AggregateKind::HotSwapRequest).await.unwrap().is_empty());

    let sessions = event_log.events_of_type(AggregateKind::ValidationSession).await.unwrap();
    let kinds: Vec<&str> = sessions.iter().map(|e| e.payload.kind_name()).collect();
    assert_eq!(kinds, vec!["ValidationSessionOpened", "ValidationSessionRejected"]);
}

#[tokio::test]
async fn runtime_rejection_rolls_back_and_reaches_done() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = minimal_class_bytes(1, 1);
    let registry: Arc<dyn ClassRegistry> = Arc::new(FixedRegistry(bytes.clone()));
    let redefiner: Arc<dyn RedefinitionPrimitive> =
        Arc::new(RejectOnceThenSucceedPrimitive::new("schema drift detected late", "revert"));
    let (orch, event_log) = orchestrator(dir.path(), registry, redefiner);

    let outcome = orch.handle_artifact_change(created_event(bytes), sample_user_identity()).await;
    assert_eq!(outcome.final_state, ChangeState::Done);
    let request_id = outcome.request_id.unwrap();

    let events = event_log
        .events_of(AggregateKind::HotSwapRequest, request_id.0)
        .await
        .unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.payload.kind_name()).collect();
    assert_eq!(kinds, vec!["HotSwapRequested", "HotSwapSnapshotCaptured", "HotSwapRolledBack"]);
}
