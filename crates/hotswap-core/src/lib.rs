//! # Hot-Swap Engine Core
//!
//! Domain model, error taxonomy, configuration and user-identity
//! primitives shared by every other crate in the workspace. Nothing
//! here touches the filesystem, spawns a task, or holds a lock; that is
//! [`hotswap_engine`](https://docs.rs/hotswap-engine)'s job.
//!
//! ## Core Concepts
//!
//! - [`model`] — the data model: artifacts, validation outcomes,
//!   hot-swap requests, instance handles, rollback snapshots, and the
//!   event-sourced aggregates' events and envelopes.
//! - [`config`] — [`config::HotswapConfig`], loaded from TOML and
//!   environment overrides.
//! - [`identity`] — resolves and scopes the [`model::UserIdentity`] a
//!   hot-swap request is attributed to.
//! - [`error`] — this crate's own operational errors.

pub mod config;
pub mod error;
pub mod identity;
pub mod model;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::HotswapConfig;
pub use error::{CoreError, Result};

/// Current version of the hot-swap engine core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for downstream crates.
pub mod prelude {
    pub use crate::config::HotswapConfig;
    pub use crate::model::{
        AggregateEvent, AggregateKind, ArtifactChange, ArtifactEvent, ArtifactKind, ArtifactOrigin,
        ArtifactPath, CascadingRollbackResult, ConflictResolution, ErrorKind, ErrorReport, EventEnvelope,
        EventSnapshot, HotSwapRequest, HotSwapRequestId, InstanceHandle, InstanceId, InstanceUpdateStrategy,
        RedefinitionOutcome, RejectionReason, RollbackResult, RollbackSnapshot, Severity, StateSnapshot,
        UserIdentity, ValidationOutcome, ValidationSessionId, WatchEvent,
    };
    pub use crate::{CoreError, Result};
}
