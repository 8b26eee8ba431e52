//! Rollback snapshots and the conflict-resolution choices rolling one
//! back can require.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instance::InstanceId;

/// Preserved field values for a single instance, captured by the state
/// preserver immediately before an update is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub instance: InstanceId,
    pub fields: HashMap<String, serde_json::Value>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl StateSnapshot {
    pub fn new(instance: InstanceId, fields: HashMap<String, serde_json::Value>) -> Self {
        Self {
            instance,
            fields,
            captured_at: chrono::Utc::now(),
        }
    }
}

/// Everything needed to undo a single hot-swap: the bytecode the class
/// had before, and the state of every instance tracked under that type
/// key at the moment the swap was about to be applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub id: Uuid,
    pub type_key: String,
    pub previous_bytecode: Vec<u8>,
    pub instance_states: Vec<StateSnapshot>,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl RollbackSnapshot {
    pub fn new(
        type_key: impl Into<String>,
        previous_bytecode: Vec<u8>,
        instance_states: Vec<StateSnapshot>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            type_key: type_key.into(),
            previous_bytecode,
            instance_states,
            captured_at: chrono::Utc::now(),
        }
    }
}

/// Outcome of rolling back a single snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RollbackResult {
    Succeeded,
    Failed { reason: String },
    Timeout,
}

impl RollbackResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

/// Outcome of rolling back several snapshots together, e.g. when one
/// change's validation failure cascades across more than one
/// interdependent type-key. Each snapshot is rolled back independently;
/// `overall_success` is `true` only when every one of them succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CascadingRollbackResult {
    pub results: Vec<(Uuid, RollbackResult)>,
    pub overall_success: bool,
}

/// How to reconcile a rollback against state that has moved on since the
/// snapshot was captured (new instances created, other fields mutated by
/// application code in the interim).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    /// Field-by-field merge: snapshot values win only where current
    /// state still matches what was captured.
    Merge,
    PreferSnapshot,
    PreferCurrent,
    Abort,
    /// Overwrite current state unconditionally with the snapshot.
    ForceSnapshot,
    /// Surface the conflict and wait for an operator decision.
    Manual,
}
