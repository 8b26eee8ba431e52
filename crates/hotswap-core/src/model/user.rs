//! User identity resolution for attributing hot-swap requests.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an identity came from, in the order the identity resolver
/// tries them: an explicit caller-supplied identity wins over a
/// configured source, which wins over one derived from the OS
/// environment, which wins over the anonymous fallback.
///
/// Equality is hand-written rather than derived: identifiers that look
/// like emails compare case-insensitively, and an anonymous identity
/// never equals anything else, including another anonymous one — each
/// carries its own generated suffix precisely so two unrelated
/// anonymous requests are never mistaken for the same caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum UserIdentity {
    Explicit { identifier: String },
    ConfiguredSource { identifier: String },
    EnvironmentDerived { identifier: String },
    Anonymous(Uuid),
}

impl UserIdentity {
    /// Builds a fresh anonymous identity with a new generated suffix.
    pub fn anonymous() -> Self {
        Self::Anonymous(Uuid::new_v4())
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::Explicit { identifier }
            | Self::ConfiguredSource { identifier }
            | Self::EnvironmentDerived { identifier } => identifier,
            Self::Anonymous(_) => "anonymous",
        }
    }

    pub fn source_label(&self) -> &'static str {
        match self {
            Self::Explicit { .. } => "explicit",
            Self::ConfiguredSource { .. } => "configured",
            Self::EnvironmentDerived { .. } => "environment",
            Self::Anonymous(_) => "anonymous",
        }
    }
}

impl PartialEq for UserIdentity {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Explicit { identifier: a }, Self::Explicit { identifier: b })
            | (Self::ConfiguredSource { identifier: a }, Self::ConfiguredSource { identifier: b })
            | (Self::EnvironmentDerived { identifier: a }, Self::EnvironmentDerived { identifier: b }) => {
                a.eq_ignore_ascii_case(b)
            }
            // Anonymous identities never equal another identity, not
            // even another anonymous one — each is a distinct caller
            // that happened not to supply one.
            _ => false,
        }
    }
}

impl Eq for UserIdentity {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_identifiers_compare_case_insensitively() {
        let a = UserIdentity::Explicit { identifier: "Alice@Example.com".into() };
        let b = UserIdentity::Explicit { identifier: "alice@example.com".into() };
        assert_eq!(a, b);
    }

    #[test]
    fn anonymous_never_equals_anything_including_itself() {
        let a = UserIdentity::anonymous();
        let b = UserIdentity::anonymous();
        assert_ne!(a, b);
        assert_ne!(a.clone(), a);
    }

    #[test]
    fn different_sources_never_compare_equal() {
        let explicit = UserIdentity::Explicit { identifier: "alice".into() };
        let configured = UserIdentity::ConfiguredSource { identifier: "alice".into() };
        assert_ne!(explicit, configured);
    }
}
