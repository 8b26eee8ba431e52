//! Live instances tracked against a type key, and how updates to them
//! should be applied.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

/// A non-owning handle into the instance tracker's table. The tracker
/// never holds a strong reference to the instance itself; tracked
/// instances are free to be garbage-collected/dropped by their owner at
/// any time, and the tracker observes that as the weak reference going
/// stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct InstanceHandle {
    pub id: InstanceId,
    pub type_key: String,
}

impl InstanceHandle {
    pub fn new(type_key: impl Into<String>) -> Self {
        Self {
            id: InstanceId::new(),
            type_key: type_key.into(),
        }
    }
}

/// How the instance updater brings the live instances of a redefined
/// type in line with the new class version. The updater resolves one of
/// these once per change, in order: a framework adapter that advertises
/// recreate support wins outright; otherwise the validator having
/// already rejected any schema change means the old and new layouts are
/// always field-compatible, so a plain reflective field copy applies
/// whenever no adapter is involved; a non-recreating adapter instead
/// rebinds its proxy to the new target; `Skip` is the fallback when none
/// of the above can be made to apply to a given instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstanceUpdateStrategy {
    /// Snapshot each instance's mutable fields and restore them after
    /// the redefinition, the default when no framework adapter is
    /// registered for the type key.
    ReflectiveFieldCopy,
    /// A registered framework adapter advertises recreate support:
    /// allocate a fresh instance through the adapter's factory instead
    /// of mutating the old one in place.
    FactoryRecreate,
    /// A registered framework adapter does not support recreate, so the
    /// instance is updated by rebinding whatever proxy sits in front of
    /// it to the redefined target.
    ProxyRebind,
    /// None of the above could be applied to this instance; it keeps
    /// running the old class version until it is naturally replaced.
    Skip,
}

impl InstanceUpdateStrategy {
    /// The spec's own name for this strategy, used verbatim in
    /// persisted events and operator-facing detail strings.
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReflectiveFieldCopy => "reflective-field-copy",
            Self::FactoryRecreate => "factory-recreate",
            Self::ProxyRebind => "proxy-rebind",
            Self::Skip => "skip",
        }
    }
}
