//! Snapshot & rollback manager: captures a [`RollbackSnapshot`] before
//! every hot-swap is applied, retains a bounded number per class, and
//! reconciles a rollback against whatever current state has moved on
//! to since the snapshot was taken.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use hotswap_core::model::hotswap::RedefinitionOutcome;
use hotswap_core::model::snapshot::{
    CascadingRollbackResult, ConflictResolution, RollbackResult, RollbackSnapshot, StateSnapshot,
};
use uuid::Uuid;

use crate::redefine::RedefinitionPrimitive;
use crate::track::preserver::TypeLayout;
use crate::track::InstanceTracker;
use crate::update::adapters::FrameworkAdapterRegistry;
use crate::validate::ParsedClassFile;

/// Keeps the last `retention_per_class` [`RollbackSnapshot`]s for each
/// type key, oldest pruned first.
pub struct RollbackManager {
    retention_per_class: usize,
    snapshots: RwLock<HashMap<String, Vec<RollbackSnapshot>>>,
}

impl RollbackManager {
    pub fn new(retention_per_class: usize) -> Self {
        Self {
            retention_per_class,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    pub fn capture(&self, snapshot: RollbackSnapshot) {
        let mut by_type = self.snapshots.write().expect("rollback lock poisoned");
        let entries = by_type.entry(snapshot.type_key.clone()).or_default();
        entries.push(snapshot);
        while entries.len() > self.retention_per_class {
            entries.remove(0);
        }
    }

    pub fn latest_for(&self, type_key: &str) -> Option<RollbackSnapshot> {
        self.snapshots
            .read()
            .expect("rollback lock poisoned")
            .get(type_key)
            .and_then(|entries| entries.last().cloned())
    }

    pub fn retained_count_for(&self, type_key: &str) -> usize {
        self.snapshots
            .read()
            .expect("rollback lock poisoned")
            .get(type_key)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Finds a retained snapshot by id regardless of which type key it
    /// is filed under. Snapshot ids are globally unique, so a linear
    /// scan of each type's small retained list is cheap enough not to
    /// warrant a second id-keyed index.
    pub fn find(&self, snapshot_id: Uuid) -> Option<RollbackSnapshot> {
        self.snapshots
            .read()
            .expect("rollback lock poisoned")
            .values()
            .flatten()
            .find(|s| s.id == snapshot_id)
            .cloned()
    }

    /// Rolls back a single retained snapshot: re-installs its previous
    /// bytecode through `redefiner` and restores its preserved instance
    /// state — through a registered framework adapter if one exists for
    /// the snapshot's type key, or else generically through `tracker`
    /// using a [`TypeLayout`] rebuilt from the previous bytecode's own
    /// field table. Bounded by `timeout`, distinct from an ordinary
    /// failure.
    ///
    /// `current_states`, when supplied, lets `resolution` reconcile
    /// against state that has moved on since the snapshot was captured;
    /// with no generic way to read a tracked instance's current field
    /// state back out, a caller with nothing to supply gets the
    /// snapshot treated as authoritative, equivalent to `ForceSnapshot`.
    #[allow(clippy::too_many_arguments)]
    pub async fn rollback(
        &self,
        snapshot_id: Uuid,
        resolution: ConflictResolution,
        redefiner: &dyn RedefinitionPrimitive,
        adapters: &FrameworkAdapterRegistry,
        tracker: &InstanceTracker,
        current_states: Option<&[StateSnapshot]>,
        timeout: Duration,
    ) -> RollbackResult {
        let Some(snapshot) = self.find(snapshot_id) else {
            return RollbackResult::Failed {
                reason: format!("no retained rollback snapshot with id {snapshot_id}"),
            };
        };

        let reinstall = tokio::time::timeout(
            timeout,
            redefiner.redefine(&snapshot.type_key, &snapshot.previous_bytecode),
        )
        .await;
        let outcome = match reinstall {
            Err(_) => return RollbackResult::Timeout,
            Ok(Err(e)) => return RollbackResult::Failed { reason: e.to_string() },
            Ok(Ok(outcome)) => outcome,
        };
        if !matches!(
            outcome,
            RedefinitionOutcome::Succeeded { .. } | RedefinitionOutcome::ClassNotLoaded { .. }
        ) {
            return RollbackResult::Failed {
                reason: format!("redefinition primitive refused to reinstall previous bytecode: {outcome:?}"),
            };
        }

        let resolved: Vec<StateSnapshot> = snapshot
            .instance_states
            .iter()
            .map(|captured| {
                let current =
                    current_states.and_then(|states| states.iter().find(|s| s.instance == captured.instance));
                match resolve_conflict(resolution, captured, current) {
                    ConflictOutcome::Restore(fields) => StateSnapshot::new(captured.instance, fields),
                    ConflictOutcome::Aborted | ConflictOutcome::NeedsManualDecision => captured.clone(),
                }
            })
            .collect();

        if let Some(adapter) = adapters.adapter_for(&snapshot.type_key) {
            if let Err(e) = adapter.restore_states(&resolved).await {
                return RollbackResult::Failed {
                    reason: format!("instance state restore failed: {e}"),
                };
            }
        } else if !resolved.is_empty() {
            let layout = match ParsedClassFile::parse(&snapshot.previous_bytecode) {
                Ok(class_file) => TypeLayout::from_fields(&class_file.fields, &class_file.field_mutability),
                Err(_) => TypeLayout::default(),
            };
            tracker.restore_preserved(&resolved, &layout);
        }

        RollbackResult::Succeeded
    }

    /// Rolls back several snapshots independently, e.g. when a single
    /// user-observable change cascades across more than one
    /// interdependent type key. Every item is attempted even after an
    /// earlier one fails; `overall_success` is true only when all of
    /// them succeeded.
    pub async fn rollback_many(
        &self,
        items: &[(Uuid, ConflictResolution)],
        redefiner: &dyn RedefinitionPrimitive,
        adapters: &FrameworkAdapterRegistry,
        tracker: &InstanceTracker,
        timeout: Duration,
    ) -> CascadingRollbackResult {
        let mut results = Vec::with_capacity(items.len());
        let mut overall_success = true;
        for (snapshot_id, resolution) in items {
            let result = self
                .rollback(*snapshot_id, *resolution, redefiner, adapters, tracker, None, timeout)
                .await;
            overall_success &= result.is_success();
            results.push((*snapshot_id, result));
        }
        CascadingRollbackResult { results, overall_success }
    }
}

/// Reconciles one instance's snapshotted state against its current
/// state per `resolution`. `current` is `None` when the instance no
/// longer exists (dropped since the snapshot was captured) — only
/// `PreferSnapshot`/`ForceSnapshot` produce a value to restore in that
/// case, since there is nothing to merge or prefer-current against.
pub fn resolve_conflict(
    resolution: ConflictResolution,
    snapshot: &StateSnapshot,
    current: Option<&StateSnapshot>,
) -> ConflictOutcome {
    match resolution {
        ConflictResolution::Abort => ConflictOutcome::Aborted,
        ConflictResolution::Manual => ConflictOutcome::NeedsManualDecision,
        ConflictResolution::PreferSnapshot | ConflictResolution::ForceSnapshot => {
            ConflictOutcome::Restore(snapshot.fields.clone())
        }
        ConflictResolution::PreferCurrent => match current {
            Some(current) => ConflictOutcome::Restore(current.fields.clone()),
            None => ConflictOutcome::Restore(snapshot.fields.clone()),
        },
        ConflictResolution::Merge => {
            let mut merged = snapshot.fields.clone();
            if let Some(current) = current {
                // Snapshot values win only where current state still
                // matches what was captured; anything current has since
                // diverged on is left as current, since that divergence
                // happened after the snapshot and outside the hot-swap.
                for (field, current_value) in &current.fields {
                    match snapshot.fields.get(field) {
                        Some(snapshot_value) if snapshot_value == current_value => {}
                        _ => {
                            merged.insert(field.clone(), current_value.clone());
                        }
                    }
                }
            }
            ConflictOutcome::Restore(merged)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConflictOutcome {
    Restore(std::collections::HashMap<String, serde_json::Value>),
    Aborted,
    NeedsManualDecision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_core::model::instance::InstanceId;
    use serde_json::json;

    fn snapshot(fields: &[(&str, serde_json::Value)]) -> StateSnapshot {
        StateSnapshot::new(
            InstanceId::new(),
            fields.iter().map(|(k, v)| (k.to_string(), v.clone())).collect(),
        )
    }

    #[test]
    fn retention_prunes_oldest_first() {
        let manager = RollbackManager::new(2);
        for i in 0..3 {
            manager.capture(RollbackSnapshot::new("com.acme.Widget", vec![i as u8], vec![]));
        }
        assert_eq!(manager.retained_count_for("com.acme.Widget"), 2);
        assert_eq!(manager.latest_for("com.acme.Widget").unwrap().previous_bytecode, vec![2]);
    }

    #[test]
    fn merge_keeps_current_divergence_but_restores_untouched_fields() {
        let snap = snapshot(&[("a", json!(1)), ("b", json!(2))]);
        let current = snapshot(&[("a", json!(1)), ("b", json!(99))]);
        let outcome = resolve_conflict(ConflictResolution::Merge, &snap, Some(&current));
        match outcome {
            ConflictOutcome::Restore(fields) => {
                assert_eq!(fields.get("a"), Some(&json!(1)));
                assert_eq!(fields.get("b"), Some(&json!(99)));
            }
            other => panic!("expected Restore, got {other:?}"),
        }
    }

    #[test]
    fn force_snapshot_ignores_current_entirely() {
        let snap = snapshot(&[("a", json!(1))]);
        let current = snapshot(&[("a", json!(99))]);
        let outcome = resolve_conflict(ConflictResolution::ForceSnapshot, &snap, Some(&current));
        assert_eq!(outcome, ConflictOutcome::Restore(snap.fields));
    }

    #[test]
    fn abort_never_produces_a_restore() {
        let snap = snapshot(&[("a", json!(1))]);
        assert_eq!(
            resolve_conflict(ConflictResolution::Abort, &snap, None),
            ConflictOutcome::Aborted
        );
    }

    #[tokio::test]
    async fn rollback_reinstalls_previous_bytecode_and_succeeds() {
        use crate::redefine::SimulatedRedefinitionPrimitive;

        let manager = RollbackManager::new(1);
        let snapshot = RollbackSnapshot::new("com.acme.Widget", vec![1, 2, 3], vec![]);
        let id = snapshot.id;
        manager.capture(snapshot);

        let redefiner = SimulatedRedefinitionPrimitive::new(0);
        let adapters = FrameworkAdapterRegistry::new();
        let tracker = InstanceTracker::new();
        let result = manager
            .rollback(id, ConflictResolution::ForceSnapshot, &redefiner, &adapters, &tracker, None, Duration::from_secs(1))
            .await;
        assert_eq!(result, RollbackResult::Succeeded);
    }

    #[tokio::test]
    async fn rollback_many_reports_cascading_success() {
        use crate::redefine::SimulatedRedefinitionPrimitive;

        let manager = RollbackManager::new(1);
        let snap_c = RollbackSnapshot::new("com.acme.C", vec![1], vec![]);
        let snap_d = RollbackSnapshot::new("com.acme.D", vec![2], vec![]);
        let (id_c, id_d) = (snap_c.id, snap_d.id);
        manager.capture(snap_c);
        manager.capture(snap_d);

        let redefiner = SimulatedRedefinitionPrimitive::new(0);
        let adapters = FrameworkAdapterRegistry::new();
        let tracker = InstanceTracker::new();
        let result = manager
            .rollback_many(
                &[(id_c, ConflictResolution::ForceSnapshot), (id_d, ConflictResolution::ForceSnapshot)],
                &redefiner,
                &adapters,
                &tracker,
                Duration::from_secs(1),
            )
            .await;
        assert!(result.overall_success);
        assert!(result.results.iter().all(|(_, r)| r.is_success()));
    }

    #[tokio::test]
    async fn rollback_missing_snapshot_is_a_failure_not_a_panic() {
        use crate::redefine::SimulatedRedefinitionPrimitive;

        let manager = RollbackManager::new(1);
        let redefiner = SimulatedRedefinitionPrimitive::new(0);
        let adapters = FrameworkAdapterRegistry::new();
        let tracker = InstanceTracker::new();
        let result = manager
            .rollback(Uuid::new_v4(), ConflictResolution::ForceSnapshot, &redefiner, &adapters, &tracker, None, Duration::from_secs(1))
            .await;
        assert!(matches!(result, RollbackResult::Failed { .. }));
    }
}
