//! Bytecode validator: parses the class-file prefix needed to compare
//! two versions of the same class, and classifies the result per the
//! taxonomy in [`hotswap_core::model::validation`].

mod class_file;

use std::collections::BTreeSet;

use hotswap_core::model::validation::{AcceptedCategory, RejectionReason, ValidationOutcome};
use sha2::{Digest, Sha256};

use class_file::{ClassFile, ParseError};

pub use class_file::{ClassFile as ParsedClassFile, FieldMutability, FieldSignature, MethodSignature};

/// Something the orchestrator can ask for the currently-loaded
/// representation of a class when a request arrives with no previous
/// bytecode attached (first change seen for that class this run).
/// Resolves the open question of what to compare against in that case:
/// never an empty buffer, always whatever is actually loaded, or a
/// rejection if nothing is.
pub trait ClassRegistry: Send + Sync {
    fn currently_loaded(&self, type_key: &str) -> Option<Vec<u8>>;
}

/// Validates `new_bytecode` against `previous_bytecode`, resolving a
/// missing `previous_bytecode` via `registry` first.
pub fn validate(
    type_key: &str,
    previous_bytecode: Option<&[u8]>,
    new_bytecode: &[u8],
    registry: &dyn ClassRegistry,
) -> ValidationOutcome {
    let new_class = match ClassFile::parse(new_bytecode) {
        Ok(c) => c,
        Err(e) => return malformed(e),
    };

    let previous_bytes_owned;
    let previous_bytes = match previous_bytecode {
        Some(b) => b,
        None => match registry.currently_loaded(type_key) {
            Some(b) => {
                previous_bytes_owned = b;
                &previous_bytes_owned
            }
            None => {
                return ValidationOutcome::rejected(
                    RejectionReason::IncompatibleOther,
                    "no previous bytecode supplied and no currently-loaded class found in registry",
                );
            }
        },
    };

    let previous_class = match ClassFile::parse(previous_bytes) {
        Ok(c) => c,
        Err(e) => return malformed(e),
    };

    classify(&previous_class, &new_class)
}

fn malformed(e: ParseError) -> ValidationOutcome {
    ValidationOutcome::rejected(RejectionReason::Malformed, e.to_string())
}

fn classify(previous: &ClassFile, new: &ClassFile) -> ValidationOutcome {
    let prev_fields: BTreeSet<&FieldSignature> = previous.fields.iter().collect();
    let new_fields: BTreeSet<&FieldSignature> = new.fields.iter().collect();

    let removed = prev_fields.difference(&new_fields).count();
    let added = new_fields.difference(&prev_fields).count();
    if removed > 0 {
        return ValidationOutcome::rejected(
            RejectionReason::SchemaChangeFieldRemove,
            format!("{removed} field(s) removed"),
        );
    }
    if added > 0 {
        return ValidationOutcome::rejected(
            RejectionReason::SchemaChangeFieldAdd,
            format!("{added} field(s) added"),
        );
    }

    if previous.super_class != new.super_class || previous.interfaces != new.interfaces {
        return ValidationOutcome::rejected(
            RejectionReason::SignatureChange,
            "superclass or interface table changed",
        );
    }

    let prev_methods: BTreeSet<(&str, &str)> = previous
        .methods
        .iter()
        .map(|m| (m.name.as_str(), m.descriptor.as_str()))
        .collect();
    let new_methods: BTreeSet<(&str, &str)> = new
        .methods
        .iter()
        .map(|m| (m.name.as_str(), m.descriptor.as_str()))
        .collect();
    if prev_methods != new_methods {
        return ValidationOutcome::rejected(
            RejectionReason::SignatureChange,
            "method signatures changed",
        );
    }

    if previous.access_flags != new.access_flags {
        return ValidationOutcome::rejected(
            RejectionReason::IncompatibleOther,
            "class access flags changed",
        );
    }

    let category = if method_bodies_identical(previous, new) {
        AcceptedCategory::MethodBodyOnly
    } else {
        AcceptedCategory::MethodBodyPlus
    };
    ValidationOutcome::Accepted { category }
}

fn method_bodies_identical(previous: &ClassFile, new: &ClassFile) -> bool {
    let digest = |m: &MethodSignature| -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(m.code_attribute.as_deref().unwrap_or(&[]));
        hasher.finalize().into()
    };

    let mut prev_digests: Vec<(&str, &str, [u8; 32])> = previous
        .methods
        .iter()
        .map(|m| (m.name.as_str(), m.descriptor.as_str(), digest(m)))
        .collect();
    let mut new_digests: Vec<(&str, &str, [u8; 32])> = new
        .methods
        .iter()
        .map(|m| (m.name.as_str(), m.descriptor.as_str(), digest(m)))
        .collect();
    prev_digests.sort();
    new_digests.sort();
    prev_digests == new_digests
}

#[cfg(test)]
mod tests {
    use super::*;
    use hotswap_core::testing::minimal_class_bytes;

    struct NoPreviousClass;
    impl ClassRegistry for NoPreviousClass {
        fn currently_loaded(&self, _type_key: &str) -> Option<Vec<u8>> {
            None
        }
    }

    struct FixedPreviousClass(Vec<u8>);
    impl ClassRegistry for FixedPreviousClass {
        fn currently_loaded(&self, _type_key: &str) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    #[test]
    fn identical_classes_are_accepted_as_method_body_only() {
        let bytes = minimal_class_bytes(1, 1);
        let registry = NoPreviousClass;
        let outcome = validate("com.acme.Widget", Some(&bytes), &bytes, &registry);
        assert!(matches!(
            outcome,
            ValidationOutcome::Accepted {
                category: AcceptedCategory::MethodBodyOnly
            }
        ));
    }

    #[test]
    fn added_field_is_rejected() {
        let previous = minimal_class_bytes(1, 1);
        let new = minimal_class_bytes(2, 1);
        let registry = NoPreviousClass;
        let outcome = validate("com.acme.Widget", Some(&previous), &new, &registry);
        assert!(matches!(
            outcome,
            ValidationOutcome::Rejected {
                reason: RejectionReason::SchemaChangeFieldAdd,
                ..
            }
        ));
    }

    #[test]
    fn removed_field_is_rejected() {
        let previous = minimal_class_bytes(2, 1);
        let new = minimal_class_bytes(1, 1);
        let registry = NoPreviousClass;
        let outcome = validate("com.acme.Widget", Some(&previous), &new, &registry);
        assert!(matches!(
            outcome,
            ValidationOutcome::Rejected {
                reason: RejectionReason::SchemaChangeFieldRemove,
                ..
            }
        ));
    }

    #[test]
    fn malformed_bytes_are_rejected_as_malformed() {
        let registry = NoPreviousClass;
        let outcome = validate("com.acme.Widget", Some(&[0, 1, 2, 3]), &[0, 1, 2, 3], &registry);
        assert!(matches!(
            outcome,
            ValidationOutcome::Rejected {
                reason: RejectionReason::Malformed,
                ..
            }
        ));
    }

    #[test]
    fn missing_previous_bytecode_falls_back_to_registry() {
        let previous = minimal_class_bytes(1, 1);
        let new = minimal_class_bytes(1, 1);
        let registry = FixedPreviousClass(previous);
        let outcome = validate("com.acme.Widget", None, &new, &registry);
        assert!(outcome.is_accepted());
    }

    #[test]
    fn missing_previous_bytecode_and_empty_registry_is_rejected_not_compared_against_empty() {
        let new = minimal_class_bytes(1, 1);
        let registry = NoPreviousClass;
        let outcome = validate("com.acme.Widget", None, &new, &registry);
        assert!(matches!(
            outcome,
            ValidationOutcome::Rejected {
                reason: RejectionReason::IncompatibleOther,
                ..
            }
        ));
    }
}
