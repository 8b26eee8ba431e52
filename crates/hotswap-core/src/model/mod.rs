//! Domain model for the hot-swap engine.
//!
//! Every type here is plain data: no I/O, no locking, no async. The
//! engine crate builds behavior around these shapes; this crate only
//! describes them and the invariants that follow from their fields.

pub mod artifact;
pub mod error_report;
pub mod event;
pub mod hotswap;
pub mod instance;
pub mod snapshot;
pub mod user;
pub mod validation;

pub use artifact::{ArtifactChange, ArtifactEvent, ArtifactKind, ArtifactOrigin, ArtifactPath, WatchEvent};
pub use error_report::{ErrorKind, ErrorReport, EventSnapshot, RecoveryStrategy, Severity};
pub use event::{AggregateEvent, AggregateKind, EventEnvelope, EventId};
pub use hotswap::{HotSwapRequest, HotSwapRequestId, RedefinitionOutcome};
pub use instance::{InstanceHandle, InstanceId, InstanceUpdateStrategy};
pub use snapshot::{CascadingRollbackResult, ConflictResolution, RollbackResult, RollbackSnapshot, StateSnapshot};
pub use user::UserIdentity;
pub use validation::{RejectionReason, ValidationOutcome, ValidationSessionId};
