//! Instance tracker: a non-owning registry of live instances per type
//! key, built on [`std::sync::Weak`] so tracked instances remain free
//! to be dropped by their actual owner at any time.

pub mod preserver;

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};

use hotswap_core::model::instance::{InstanceHandle, InstanceId};
use hotswap_core::model::snapshot::StateSnapshot;

use preserver::{Preservable, TypeLayout};

type TrackedObject = dyn Any + Send + Sync;

/// Registers and resolves live instances, pruning stale weak references
/// as it goes. Never holds a strong reference to a tracked instance —
/// registering one does not keep it alive.
#[derive(Default)]
pub struct InstanceTracker {
    by_type: RwLock<HashMap<String, Vec<(InstanceHandle, Weak<TrackedObject>)>>>,
    enabled: RwLock<HashSet<String>>,
    preservable: RwLock<HashMap<InstanceId, Weak<dyn Preservable>>>,
}

impl InstanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables tracking for `type_key`. Idempotent.
    pub fn enable(&self, type_key: &str) {
        self.enabled
            .write()
            .expect("tracker lock poisoned")
            .insert(type_key.to_string());
    }

    /// Disables tracking for `type_key`. Already-tracked instances are
    /// left in place — `disable` only gates future `register` calls —
    /// but callers that want a clean slate can follow it with
    /// `deregister` on each live handle.
    pub fn disable(&self, type_key: &str) {
        self.enabled
            .write()
            .expect("tracker lock poisoned")
            .remove(type_key);
    }

    pub fn is_enabled(&self, type_key: &str) -> bool {
        self.enabled
            .read()
            .expect("tracker lock poisoned")
            .contains(type_key)
    }

    /// Registers `instance` under `type_key`, returning the handle
    /// other subsystems use to refer to it. The caller retains full
    /// ownership; the tracker only observes the instance through the
    /// weak reference it takes here. A no-op when `type_key` has not
    /// been `enable`d: the returned handle is still valid to hold but
    /// will never resolve to anything, since nothing was recorded.
    pub fn register(&self, type_key: &str, instance: &Arc<TrackedObject>) -> InstanceHandle {
        let handle = InstanceHandle::new(type_key);
        if !self.is_enabled(type_key) {
            return handle;
        }
        let mut by_type = self.by_type.write().expect("tracker lock poisoned");
        by_type
            .entry(type_key.to_string())
            .or_default()
            .push((handle.clone(), Arc::downgrade(instance)));
        handle
    }

    /// Registers `instance` the same as [`Self::register`], and
    /// additionally remembers `preservable` so the reflective
    /// field-copy path can capture and restore its state generically
    /// across a redefinition via [`Self::capture_preserved`] and
    /// [`Self::restore_preserved`] — without the orchestrator ever
    /// needing to downcast the opaque tracked instance itself.
    pub fn register_preservable(
        &self,
        type_key: &str,
        instance: &Arc<TrackedObject>,
        preservable: &Arc<dyn Preservable>,
    ) -> InstanceHandle {
        let handle = self.register(type_key, instance);
        self.preservable
            .write()
            .expect("tracker lock poisoned")
            .insert(handle.id, Arc::downgrade(preservable));
        handle
    }

    /// Captures field state, restricted to `layout`, for every handle in
    /// `handles` that was registered through [`Self::register_preservable`].
    /// Handles registered only through the plain [`Self::register`] have
    /// nothing generic to capture and are silently skipped — an adapter
    /// with its own typed access is still free to capture their state
    /// itself via [`crate::update::adapters::FrameworkAdapter::capture_states`].
    pub fn capture_preserved(&self, handles: &[InstanceHandle], layout: &TypeLayout) -> Vec<StateSnapshot> {
        let preservable = self.preservable.read().expect("tracker lock poisoned");
        handles
            .iter()
            .filter_map(|h| {
                preservable
                    .get(&h.id)
                    .and_then(Weak::upgrade)
                    .map(|p| preserver::capture(h.id, layout, p.as_ref()))
            })
            .collect()
    }

    /// Restores previously captured state, restricted to `layout`, back
    /// into whichever of `snapshots`' instances are still alive and were
    /// registered through [`Self::register_preservable`].
    pub fn restore_preserved(&self, snapshots: &[StateSnapshot], layout: &TypeLayout) {
        let preservable = self.preservable.read().expect("tracker lock poisoned");
        for snapshot in snapshots {
            if let Some(p) = preservable.get(&snapshot.instance).and_then(Weak::upgrade) {
                preserver::restore(snapshot, layout, p.as_ref());
            }
        }
    }

    /// Resolves a handle to its instance, if it is still alive. Also
    /// prunes any entries for the same type key that have gone stale.
    pub fn resolve(&self, handle: &InstanceHandle) -> Option<Arc<TrackedObject>> {
        let mut by_type = self.by_type.write().expect("tracker lock poisoned");
        let entries = by_type.get_mut(&handle.type_key)?;
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries
            .iter()
            .find(|(h, _)| h.id == handle.id)
            .and_then(|(_, weak)| weak.upgrade())
    }

    /// All handles still alive for a type key, pruning stale ones first.
    pub fn live_instances_of(&self, type_key: &str) -> Vec<InstanceHandle> {
        let mut by_type = self.by_type.write().expect("tracker lock poisoned");
        let Some(entries) = by_type.get_mut(type_key) else {
            return Vec::new();
        };
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        entries.iter().map(|(h, _)| h.clone()).collect()
    }

    pub fn live_count_of(&self, type_key: &str) -> usize {
        self.live_instances_of(type_key).len()
    }

    pub fn deregister(&self, handle: &InstanceHandle) {
        let mut by_type = self.by_type.write().expect("tracker lock poisoned");
        if let Some(entries) = by_type.get_mut(&handle.type_key) {
            entries.retain(|(h, _)| h.id != handle.id);
        }
        self.preservable.write().expect("tracker lock poisoned").remove(&handle.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use preserver::FieldDescriptor;
    use std::sync::Mutex;

    struct FakePreservable {
        fields: Mutex<HashMap<String, serde_json::Value>>,
    }

    impl Preservable for FakePreservable {
        fn capture_fields(&self) -> HashMap<String, serde_json::Value> {
            self.fields.lock().unwrap().clone()
        }

        fn restore_fields(&self, fields: &HashMap<String, serde_json::Value>) {
            *self.fields.lock().unwrap() = fields.clone();
        }
    }

    #[test]
    fn capture_and_restore_preserved_round_trip_through_the_tracker() {
        let tracker = InstanceTracker::new();
        tracker.enable("com.acme.Widget");
        let layout = TypeLayout {
            fields: vec![FieldDescriptor { identifier: "count".to_string(), mutable: true }],
        };

        let instance: Arc<TrackedObject> = Arc::new(());
        let preservable: Arc<dyn Preservable> = Arc::new(FakePreservable {
            fields: Mutex::new(HashMap::from([("count".to_string(), serde_json::json!(1))])),
        });
        let handle = tracker.register_preservable("com.acme.Widget", &instance, &preservable);

        let captured = tracker.capture_preserved(&[handle.clone()], &layout);
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].fields.get("count"), Some(&serde_json::json!(1)));

        let restored = vec![StateSnapshot::new(handle.id, HashMap::from([("count".to_string(), serde_json::json!(2))]))];
        tracker.restore_preserved(&restored, &layout);
        assert_eq!(preservable.capture_fields().get("count"), Some(&serde_json::json!(2)));
    }

    #[test]
    fn resolves_live_instance_and_loses_dropped_one() {
        let tracker = InstanceTracker::new();
        tracker.enable("com.acme.Widget");
        let instance: Arc<TrackedObject> = Arc::new(42i32);
        let handle = tracker.register("com.acme.Widget", &instance);

        assert_eq!(tracker.live_count_of("com.acme.Widget"), 1);
        assert!(tracker.resolve(&handle).is_some());

        drop(instance);
        assert!(tracker.resolve(&handle).is_none());
        assert_eq!(tracker.live_count_of("com.acme.Widget"), 0);
    }

    #[test]
    fn deregister_removes_handle_even_if_still_alive() {
        let tracker = InstanceTracker::new();
        tracker.enable("com.acme.Widget");
        let instance: Arc<TrackedObject> = Arc::new(42i32);
        let handle = tracker.register("com.acme.Widget", &instance);
        tracker.deregister(&handle);
        assert_eq!(tracker.live_count_of("com.acme.Widget"), 0);
    }

    #[test]
    fn register_on_disabled_type_key_is_a_no_op() {
        let tracker = InstanceTracker::new();
        let instance: Arc<TrackedObject> = Arc::new(42i32);
        tracker.register("com.acme.Widget", &instance);
        assert_eq!(tracker.live_count_of("com.acme.Widget"), 0);

        tracker.enable("com.acme.Widget");
        tracker.register("com.acme.Widget", &instance);
        assert_eq!(tracker.live_count_of("com.acme.Widget"), 1);

        tracker.disable("com.acme.Widget");
        tracker.register("com.acme.Widget", &instance);
        assert_eq!(tracker.live_count_of("com.acme.Widget"), 1);
    }
}
