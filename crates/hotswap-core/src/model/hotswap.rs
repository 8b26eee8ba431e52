//! A single requested change to a loaded class, and what came of it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::ArtifactPath;
use super::user::UserIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct HotSwapRequestId(pub Uuid);

impl HotSwapRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HotSwapRequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// A validated, snapshot-backed request to redefine a class, queued
/// behind the per-type-key serialization lock until the orchestrator
/// can act on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HotSwapRequest {
    pub id: HotSwapRequestId,
    pub type_key: String,
    pub artifact: ArtifactPath,
    pub new_bytecode: Vec<u8>,
    pub previous_bytecode: Option<Vec<u8>>,
    pub requested_by: UserIdentity,
    pub requested_at: chrono::DateTime<chrono::Utc>,
}

impl HotSwapRequest {
    pub fn new(
        type_key: impl Into<String>,
        artifact: ArtifactPath,
        new_bytecode: Vec<u8>,
        previous_bytecode: Option<Vec<u8>>,
        requested_by: UserIdentity,
    ) -> Self {
        Self {
            id: HotSwapRequestId::new(),
            type_key: type_key.into(),
            artifact,
            new_bytecode,
            previous_bytecode,
            requested_by,
            requested_at: chrono::Utc::now(),
        }
    }
}

/// What the host redefinition primitive reported back. `duration_millis`
/// is measured from submission to the primitive returning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RedefinitionOutcome {
    /// The primitive applied the swap; `instances_affected` is whatever
    /// count it reports, not necessarily the tracker's own count.
    Succeeded {
        instances_affected: usize,
        duration_millis: u64,
    },
    /// The primitive itself refused the change (e.g. it independently
    /// detected a schema change the validator missed). Distinct from a
    /// validator rejection: this is reported *after* a request was
    /// accepted and submitted.
    RejectedByRuntime {
        reason: String,
        recovery_hint: String,
    },
    /// The named class has no loaded representation to redefine. Not
    /// treated as a failure requiring rollback: there is nothing to roll
    /// back to.
    ClassNotLoaded { type_key: String },
    /// Anything else the primitive surfaced that does not fit the other
    /// variants (a panic caught at the FFI boundary, a timeout).
    Unexpected { cause: String },
}

impl RedefinitionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Whether this outcome should drive the orchestrator into
    /// `RollingBack`. `RejectedByRuntime` and `Unexpected` both do;
    /// `ClassNotLoaded` instead goes straight to `Committing` since
    /// there was nothing to undo.
    pub fn requires_rollback(&self) -> bool {
        matches!(self, Self::RejectedByRuntime { .. } | Self::Unexpected { .. })
    }
}
