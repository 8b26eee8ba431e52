//! # Hot-Swap Engine
//!
//! Active subsystems built on top of `hotswap-core`'s domain model:
//! the filesystem watcher, bytecode validator, instance tracker and
//! updater, framework adapter registry, snapshot/rollback manager,
//! error classifier, event-sourced log, and the orchestrator that
//! drives them all through one artifact change.
//!
//! ## Core Components
//!
//! - [`watch`] — filesystem watcher and artifact classifier.
//! - [`validate`] — class-file parser and compatibility classifier.
//! - [`track`] — non-owning live instance registry and state preserver.
//! - [`update`] — instance updater and framework adapter registry.
//! - [`redefine`] — the host redefinition primitive seam.
//! - [`rollback`] — rollback snapshot retention and conflict resolution.
//! - [`errors`] — error classification and per-class failure tracking.
//! - [`eventlog`] — append-only, per-aggregate event log and replay.
//! - [`orchestrate`] — the state machine tying every subsystem above
//!   together for one artifact change.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod errors;
pub mod eventlog;
pub mod orchestrate;
pub mod redefine;
pub mod rollback;
pub mod track;
pub mod update;
pub mod validate;
pub mod watch;

pub use orchestrate::{ChangeOutcome, ChangeState, HotSwapOrchestrator};

/// Current version of the hot-swap engine.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports for downstream crates.
pub mod prelude {
    pub use crate::errors::ErrorClassifier;
    pub use crate::eventlog::{AggregateRoot, EventLog};
    pub use crate::orchestrate::{ChangeOutcome, ChangeState, HotSwapOrchestrator};
    pub use crate::redefine::RedefinitionPrimitive;
    pub use crate::rollback::RollbackManager;
    pub use crate::track::InstanceTracker;
    pub use crate::update::adapters::FrameworkAdapterRegistry;
    pub use crate::validate::ClassRegistry;
    pub use crate::watch::FilesystemWatcher;
    pub use hotswap_core::prelude::*;
}
