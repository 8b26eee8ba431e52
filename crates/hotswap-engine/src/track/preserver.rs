//! State preserver: carries field values across a redefinition so a
//! `reflective-field-copy` instance update doesn't lose data the old
//! instance held.

use std::collections::HashMap;

use hotswap_core::model::instance::InstanceId;
use hotswap_core::model::snapshot::StateSnapshot;

use crate::validate::{FieldMutability, FieldSignature};

/// One field's shape as derived from the validator's field table, plus
/// whether it can be migrated without special handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub identifier: String,
    pub mutable: bool,
}

/// A type's field layout, computed once per redefinition (from the
/// validator's accepted comparison) and reused for every instance of
/// that type rather than re-derived per instance.
#[derive(Debug, Clone, Default)]
pub struct TypeLayout {
    pub fields: Vec<FieldDescriptor>,
}

impl TypeLayout {
    pub fn from_fields(fields: &[FieldSignature], mutability: &[FieldMutability]) -> Self {
        let descriptors = fields
            .iter()
            .zip(mutability.iter())
            .map(|(f, m)| FieldDescriptor {
                identifier: f.name.clone(),
                mutable: !m.is_final,
            })
            .collect();
        Self { fields: descriptors }
    }
}

/// Implemented by whatever in-process representation a tracked instance
/// has, so the preserver can lift its field state out before an update
/// and push it back in afterward without knowing the concrete type.
///
/// `restore_fields` takes `&self`, not `&mut self`: the instance tracker
/// only ever hands out shared `Arc<dyn Preservable>` handles (it never
/// owns a tracked instance outright), so implementors carry their field
/// state behind interior mutability (a `Mutex`, a `RwLock`, atomics)
/// the same way any other framework-managed shared instance would.
pub trait Preservable: Send + Sync {
    fn capture_fields(&self) -> HashMap<String, serde_json::Value>;
    fn restore_fields(&self, fields: &HashMap<String, serde_json::Value>);
}

/// Captures a [`StateSnapshot`] for one instance, restricted to the
/// fields the layout says exist (and are worth carrying forward) on
/// the class version being replaced.
pub fn capture(
    instance_id: InstanceId,
    layout: &TypeLayout,
    instance: &dyn Preservable,
) -> StateSnapshot {
    let mut captured = instance.capture_fields();
    captured.retain(|name, _| layout.fields.iter().any(|f| &f.identifier == name));
    StateSnapshot::new(instance_id, captured)
}

/// Restores a snapshot's fields into `instance`, carrying forward only
/// fields still present (by name) in `layout` — fields the new class
/// version dropped are silently not restored, since the validator
/// already rejected any redefinition that would have removed a field,
/// so this only matters when restoring across a rollback to an older
/// layout.
pub fn restore(snapshot: &StateSnapshot, layout: &TypeLayout, instance: &dyn Preservable) {
    let fields: HashMap<String, serde_json::Value> = snapshot
        .fields
        .iter()
        .filter(|(name, _)| layout.fields.iter().any(|f| &f.identifier == *name))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    instance.restore_fields(&fields);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeInstance {
        fields: Mutex<HashMap<String, serde_json::Value>>,
    }

    impl Preservable for FakeInstance {
        fn capture_fields(&self) -> HashMap<String, serde_json::Value> {
            self.fields.lock().unwrap().clone()
        }

        fn restore_fields(&self, fields: &HashMap<String, serde_json::Value>) {
            *self.fields.lock().unwrap() = fields.clone();
        }
    }

    #[test]
    fn capture_drops_fields_not_in_layout() {
        let instance = FakeInstance {
            fields: Mutex::new(HashMap::from([
                ("kept".to_string(), json!(1)),
                ("dropped".to_string(), json!(2)),
            ])),
        };
        let layout = TypeLayout {
            fields: vec![FieldDescriptor {
                identifier: "kept".to_string(),
                mutable: true,
            }],
        };
        let snapshot = capture(InstanceId::new(), &layout, &instance);
        assert_eq!(snapshot.fields.len(), 1);
        assert!(snapshot.fields.contains_key("kept"));
    }

    #[test]
    fn restore_writes_back_only_layout_fields() {
        let instance = FakeInstance {
            fields: Mutex::new(HashMap::new()),
        };
        let layout = TypeLayout {
            fields: vec![FieldDescriptor {
                identifier: "kept".to_string(),
                mutable: true,
            }],
        };
        let snapshot = StateSnapshot::new(
            InstanceId::new(),
            HashMap::from([
                ("kept".to_string(), json!("value")),
                ("stale".to_string(), json!("ignored")),
            ]),
        );
        restore(&snapshot, &layout, &instance);
        let restored = instance.fields.into_inner().unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored.get("kept").unwrap(), &json!("value"));
    }
}
