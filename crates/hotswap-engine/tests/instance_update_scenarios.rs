//! Instance-tracker-facing scenarios: the orchestrator updating every
//! live, tracked instance of a redefined class, and the tracker's
//! enable/disable gating staying in force across a full change.

use std::sync::Arc;

use hotswap_core::config::ValidationVerbosity;
use hotswap_core::model::artifact::{ArtifactChange, ArtifactEvent, ArtifactKind};
use hotswap_core::model::event::{AggregateEvent, AggregateKind};
use hotswap_core::testing::fixtures::{minimal_class_bytes, sample_artifact_path, sample_user_identity};
use hotswap_engine::errors::ErrorClassifier;
use hotswap_engine::eventlog::EventLog;
use hotswap_engine::orchestrate::ChangeState;
use hotswap_engine::redefine::{RedefinitionPrimitive, SimulatedRedefinitionPrimitive};
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

fn changed_event(bytes: Vec<u8>) -> ArtifactEvent {
    ArtifactEvent::new(
        sample_artifact_path("com.example.Widget"),
        ArtifactKind::TopLevelClass,
        ArtifactChange::Modified { size: bytes.len() as u64 },
        bytes,
    )
}

#[tokio::test]
async fn every_live_tracked_instance_is_counted_as_updated() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = minimal_class_bytes(1, 1);
    let registry: Arc<dyn ClassRegistry> = Arc::new(FixedRegistry(bytes.clone()));
    let redefiner: Arc<dyn RedefinitionPrimitive> = Arc::new(SimulatedRedefinitionPrimitive::new(3));
    let event_log = Arc::new(EventLog::new(dir.path()));
    let tracker = Arc::new(InstanceTracker::new());

    tracker.enable("com.example.Widget");
    let live: Vec<Arc<dyn std::any::Any + Send + Sync>> = (0..3)
        .map(|i| Arc::new(i as i32) as Arc<dyn std::any::Any + Send + Sync>)
        .collect();
    for instance in &live {
        tracker.register("com.example.Widget", instance);
    }
    assert_eq!(tracker.live_count_of("com.example.Widget"), 3);

    let orch = HotSwapOrchestrator::new(
        event_log.clone(),
        registry,
        Arc::new(RollbackManager::new(3)),
        tracker.clone(),
        Arc::new(FrameworkAdapterRegistry::new()),
        redefiner,
        Arc::new(ErrorClassifier::default()),
        Uuid::new_v4(),
        true,
        ValidationVerbosity::Detailed,
    );

    let outcome = orch.handle_artifact_change(changed_event(bytes), sample_user_identity()).await;
    assert_eq!(outcome.final_state, ChangeState::Done);

    let events = event_log
        .events_of(AggregateKind::HotSwapRequest, outcome.request_id.unwrap().0)
        .await
        .unwrap();
    let updated = events
        .iter()
        .find_map(|e| match &e.payload {
            AggregateEvent::HotSwapInstancesUpdated { updated, total, .. } => Some((*updated, *total)),
            _ => None,
        })
        .expect("an InstancesUpdated event was recorded");
    assert_eq!(updated, (3, 3));

    // The instances are still live and resolvable after the swap since
    // the caller retains ownership throughout.
    assert_eq!(tracker.live_count_of("com.example.Widget"), 3);
}

#[tokio::test]
async fn dropping_an_instance_before_the_update_shrinks_the_live_set() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = minimal_class_bytes(1, 1);
    let registry: Arc<dyn ClassRegistry> = Arc::new(FixedRegistry(bytes.clone()));
    let redefiner: Arc<dyn RedefinitionPrimitive> = Arc::new(SimulatedRedefinitionPrimitive::new(1));
    let event_log = Arc::new(EventLog::new(dir.path()));
    let tracker = Arc::new(InstanceTracker::new());

    tracker.enable("com.example.Widget");
    let surviving: Arc<dyn std::any::Any + Send + Sync> = Arc::new(1i32);
    let dropped: Arc<dyn std::any::Any + Send + Sync> = Arc::new(2i32);
    tracker.register("com.example.Widget", &surviving);
    tracker.register("com.example.Widget", &dropped);
    drop(dropped);

    let orch = HotSwapOrchestrator::new(
        event_log.clone(),
        registry,
        Arc::new(RollbackManager::new(3)),
        tracker.clone(),
        Arc::new(FrameworkAdapterRegistry::new()),
        redefiner,
        Arc::new(ErrorClassifier::default()),
        Uuid::new_v4(),
        true,
        ValidationVerbosity::Detailed,
    );

    let outcome = orch.handle_artifact_change(changed_event(bytes), sample_user_identity()).await;
    assert_eq!(outcome.final_state, ChangeState::Done);

    let events = event_log
        .events_of(AggregateKind::HotSwapRequest, outcome.request_id.unwrap().0)
        .await
        .unwrap();
    let updated = events.iter().find_map(|e| match &e.payload {
        AggregateEvent::HotSwapInstancesUpdated { updated, .. } => Some(*updated),
        _ => None,
    });
    assert_eq!(updated, Some(1));
}

#[test]
fn disabling_a_type_key_stops_new_registrations_without_evicting_live_ones() {
    let tracker = InstanceTracker::new();
    tracker.enable("com.example.Widget");
    let instance: Arc<dyn std::any::Any + Send + Sync> = Arc::new(7i32);
    tracker.register("com.example.Widget", &instance);
    assert_eq!(tracker.live_count_of("com.example.Widget"), 1);

    tracker.disable("com.example.Widget");
    let late_instance: Arc<dyn std::any::Any + Send + Sync> = Arc::new(8i32);
    tracker.register("com.example.Widget", &late_instance);

    // The instance registered before disable is untouched; the one
    // registered after is silently dropped by `track`.
    assert_eq!(tracker.live_count_of("com.example.Widget"), 1);
}
