//! Framework adapter registry: pluggable per-type-key strategies for
//! actually mutating a tracked instance (a DI container's proxy
//! refresh, a web framework's request-scoped bean recreation, ...).
//! The orchestrator never knows which framework, if any, owns a given
//! type key — it only calls through whatever adapter is registered.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use hotswap_core::model::instance::InstanceHandle;
use hotswap_core::model::snapshot::StateSnapshot;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("framework adapter for {type_key} failed: {reason}")]
    Failed { type_key: String, reason: String },
}

/// Scope semantics an adapter's managed instances live under, used by
/// the updater to decide whether an update must preserve instance
/// identity (singleton, session-scoped) or may simply substitute
/// references the next time the scope's instance is resolved
/// (per-request).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdapterScope {
    /// One long-lived instance shared by every caller; updates must
    /// preserve its identity and field state in place.
    Singleton,
    /// A fresh instance per request; a redefinition only needs to make
    /// sure the *next* request gets the new behavior.
    PerRequest,
    /// An instance shared for the lifetime of one user session;
    /// treated like `Singleton` for identity purposes but distinct for
    /// reporting.
    PerSession,
    /// A framework-specific scope this adapter knows about but the
    /// updater has no generic policy for.
    Custom(String),
}

#[async_trait]
pub trait FrameworkAdapter: Send + Sync {
    /// Rebinds whatever proxy or indirection this adapter manages for
    /// `handle` to the redefined target. Used as the `proxy-rebind`
    /// strategy when [`FrameworkAdapter::recreate_capable`] is `false`
    /// and [`FrameworkAdapter::proxy_managed`] is `true`.
    async fn apply_update(
        &self,
        handle: &InstanceHandle,
        new_bytecode: &[u8],
    ) -> Result<(), AdapterError>;

    /// Whether this adapter can allocate a fresh instance through its
    /// own factory rather than updating the existing one in place. The
    /// updater prefers `factory-recreate` over every other strategy when
    /// this is `true`.
    fn recreate_capable(&self) -> bool {
        false
    }

    /// Whether this adapter's instances sit behind a proxy or other
    /// indirection that a generic reflective field copy cannot reach,
    /// so the updater must route through [`Self::apply_update`] instead.
    /// An adapter registered only to capture/restore state around a
    /// redefinition (with instances the updater can otherwise reach
    /// directly) should leave this at its default of `false`, so the
    /// spec's preferred reflective-field-copy path still applies.
    fn proxy_managed(&self) -> bool {
        false
    }

    /// Scope semantics of the instances this adapter manages, used to
    /// decide whether an update must preserve identity in place
    /// (`Singleton`/`PerSession`) or may substitute references the next
    /// time the scope resolves an instance (`PerRequest`).
    fn scope(&self) -> AdapterScope {
        AdapterScope::Singleton
    }

    /// Allocates a replacement instance for `handle` through this
    /// adapter's factory. Only called when [`Self::recreate_capable`]
    /// returns `true`; the default implementation is never reached in
    /// that case, so it exists purely so implementors that never
    /// advertise recreate support don't have to provide one.
    async fn recreate(&self, handle: &InstanceHandle) -> Result<(), AdapterError> {
        Err(AdapterError::Failed {
            type_key: handle.type_key.clone(),
            reason: "adapter does not support recreate".to_string(),
        })
    }

    /// Refreshes every `PerRequest`-scoped instance of `type_key` in one
    /// call, rather than per-handle — a request-scoped container
    /// typically has no durable handle to rebind, only a factory that
    /// the next request will call into, so there is nothing to iterate
    /// per instance. Returns how many instances were affected. Only
    /// called when [`Self::scope`] is [`AdapterScope::PerRequest`].
    async fn refresh_proxy(&self, _type_key: &str, _new_bytecode: &[u8]) -> Result<usize, AdapterError> {
        Ok(0)
    }

    /// Captures pre-update field state for `handles`, for the rollback
    /// manager to restore from if this redefinition later has to be
    /// undone. Adapters with nothing to preserve (proxy-rebind, a
    /// framework with no addressable field state) leave this at its
    /// default of capturing nothing.
    async fn capture_states(&self, _handles: &[InstanceHandle]) -> Vec<StateSnapshot> {
        Vec::new()
    }

    /// Restores previously captured field state back onto live
    /// instances during a rollback. Default is a no-op, matching the
    /// default of [`FrameworkAdapter::capture_states`].
    async fn restore_states(&self, _snapshots: &[StateSnapshot]) -> Result<(), AdapterError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FrameworkAdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn FrameworkAdapter>>>,
}

impl FrameworkAdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, type_key: impl Into<String>, adapter: Arc<dyn FrameworkAdapter>) {
        self.adapters
            .write()
            .expect("adapter registry lock poisoned")
            .insert(type_key.into(), adapter);
    }

    pub fn deregister(&self, type_key: &str) {
        self.adapters
            .write()
            .expect("adapter registry lock poisoned")
            .remove(type_key);
    }

    pub fn adapter_for(&self, type_key: &str) -> Option<Arc<dyn FrameworkAdapter>> {
        self.adapters
            .read()
            .expect("adapter registry lock poisoned")
            .get(type_key)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAdapter;

    #[async_trait]
    impl FrameworkAdapter for NoopAdapter {
        async fn apply_update(
            &self,
            _handle: &InstanceHandle,
            _new_bytecode: &[u8],
        ) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    #[test]
    fn register_then_lookup_then_deregister() {
        let registry = FrameworkAdapterRegistry::new();
        registry.register("com.acme.Widget", Arc::new(NoopAdapter));
        assert!(registry.adapter_for("com.acme.Widget").is_some());
        registry.deregister("com.acme.Widget");
        assert!(registry.adapter_for("com.acme.Widget").is_none());
    }
}
