//! Instance updater: resolves one [`InstanceUpdateStrategy`] per change
//! — a framework adapter's recreate support wins outright, otherwise a
//! plain reflective field copy applies since the validator already
//! rejected any change that would have broken field compatibility — and
//! applies it to every live instance the tracker knows about for the
//! redefined type key.

pub mod adapters;

use std::time::{Duration, Instant};

use hotswap_core::model::instance::{InstanceHandle, InstanceUpdateStrategy};

use crate::track::InstanceTracker;
use adapters::{AdapterError, AdapterScope, FrameworkAdapter, FrameworkAdapterRegistry};

/// Outcome of updating every live instance of a type key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateReport {
    pub strategy: InstanceUpdateStrategy,
    pub updated: usize,
    pub failed: usize,
    pub failures: Vec<String>,
    pub duration: Duration,
}

impl Default for UpdateReport {
    fn default() -> Self {
        Self {
            strategy: InstanceUpdateStrategy::ReflectiveFieldCopy,
            updated: 0,
            failed: 0,
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }
}

impl UpdateReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.updated + self.failed
    }

    /// A human-readable one-liner for the `InstancesUpdated` event's
    /// detail field.
    pub fn detail(&self) -> String {
        format!(
            "{} via {}: {} updated, {} failed",
            self.total(),
            self.strategy.label(),
            self.updated,
            self.failed
        )
    }
}

/// Resolves a strategy for `type_key` and applies it to every live
/// instance the tracker currently has for it. In `strict_mode`, the
/// first failure stops further instance updates for this call — the
/// caller is expected to treat any non-empty `failures` as grounds to
/// roll back the whole hot-swap when strict mode is on.
pub async fn update_instances(
    type_key: &str,
    new_bytecode: &[u8],
    tracker: &InstanceTracker,
    adapters: &FrameworkAdapterRegistry,
    strict_mode: bool,
) -> UpdateReport {
    let start = Instant::now();
    let adapter = adapters.adapter_for(type_key);
    let strategy = resolve_strategy(adapter.as_deref());

    let mut report = UpdateReport {
        strategy,
        ..UpdateReport::default()
    };

    // A per-request-scoped adapter has no durable per-instance handle
    // to iterate: refreshing its factory/container once is the whole
    // update, so this short-circuits before ever asking the tracker for
    // live instances.
    if strategy == InstanceUpdateStrategy::ProxyRebind {
        if let Some(adapter) = adapter.as_deref() {
            if adapter.scope() == AdapterScope::PerRequest {
                match adapter.refresh_proxy(type_key, new_bytecode).await {
                    Ok(count) => report.updated = count,
                    Err(e) => {
                        report.failed = 1;
                        report.failures.push(e.to_string());
                        tracing::warn!(type_key, error = %e, "per-request proxy refresh failed");
                    }
                }
                report.duration = start.elapsed();
                return report;
            }
        }
    }

    let handles = tracker.live_instances_of(type_key);
    for handle in handles {
        match apply_one(&handle, new_bytecode, strategy, adapter.as_deref()).await {
            Ok(()) => report.updated += 1,
            Err(e) => {
                report.failed += 1;
                report.failures.push(e.to_string());
                if strict_mode {
                    tracing::warn!(type_key, error = %e, "instance update failed in strict mode, stopping");
                    break;
                }
                tracing::warn!(type_key, error = %e, "instance update failed, continuing");
            }
        }
    }

    report.duration = start.elapsed();
    report
}

/// Implements the spec's strategy-selection order: recreate wins
/// outright when the adapter supports it; otherwise, since validation
/// already guarantees the old and new layouts are field-compatible, a
/// plain reflective field copy applies unless the adapter says its
/// instances sit behind a proxy a generic copy can't reach, in which
/// case proxy-rebind takes over.
fn resolve_strategy(adapter: Option<&dyn FrameworkAdapter>) -> InstanceUpdateStrategy {
    match adapter {
        Some(a) if a.recreate_capable() => InstanceUpdateStrategy::FactoryRecreate,
        Some(a) if a.proxy_managed() => InstanceUpdateStrategy::ProxyRebind,
        _ => InstanceUpdateStrategy::ReflectiveFieldCopy,
    }
}

async fn apply_one(
    handle: &InstanceHandle,
    new_bytecode: &[u8],
    strategy: InstanceUpdateStrategy,
    adapter: Option<&dyn FrameworkAdapter>,
) -> Result<(), AdapterError> {
    match (strategy, adapter) {
        (InstanceUpdateStrategy::FactoryRecreate, Some(adapter)) => adapter.recreate(handle).await,
        (InstanceUpdateStrategy::ProxyRebind, Some(adapter)) => adapter.apply_update(handle, new_bytecode).await,
        (InstanceUpdateStrategy::ReflectiveFieldCopy, _) => {
            // The host redefinition primitive is assumed to have
            // already updated in-place instances itself (field layouts
            // are guaranteed compatible by validation); any adapter
            // registered purely for capture/restore has nothing further
            // to do here.
            Ok(())
        }
        (InstanceUpdateStrategy::Skip, _) | (_, None) => Err(AdapterError::Failed {
            type_key: handle.type_key.clone(),
            reason: "no applicable update strategy for this instance".to_string(),
        }),
    }
}
