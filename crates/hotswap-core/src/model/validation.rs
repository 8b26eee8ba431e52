//! Outcomes of running a candidate artifact through the bytecode validator.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub struct ValidationSessionId(pub Uuid);

impl ValidationSessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ValidationSessionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Why the validator refused a candidate. Ordered roughly by how early
/// in the comparison pipeline the check fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Not a well-formed class file: bad magic, truncated header, or an
    /// index table that cannot be fully resolved.
    Malformed,
    /// A field was added to, or removed from, the type's layout.
    SchemaChangeFieldAdd,
    SchemaChangeFieldRemove,
    /// A method's name+descriptor signature changed, or the superclass
    /// / interface table changed.
    SignatureChange,
    /// Structurally different in some other way the validator does not
    /// attempt to characterize more specifically.
    IncompatibleOther,
}

impl RejectionReason {
    pub fn is_schema_change(&self) -> bool {
        matches!(
            self,
            Self::SchemaChangeFieldAdd | Self::SchemaChangeFieldRemove
        )
    }
}

/// Whether method bodies alone changed, or something else in the
/// accepted artifact did (used by tooling/tests, not by the redefinition
/// call itself).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptedCategory {
    MethodBodyOnly,
    MethodBodyPlus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationOutcome {
    Accepted {
        category: AcceptedCategory,
    },
    Rejected {
        reason: RejectionReason,
        detail: String,
    },
}

impl ValidationOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn rejected(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            detail: detail.into(),
        }
    }
}
