//! The redefinition primitive: the host-provided operation that
//! actually swaps a class's bytecode. Modeled as a trait because there
//! is no such operation available outside a running JVM with an attach
//! API — the orchestrator is built against this seam, and a real
//! JVM-attach backend plugs in behind it without the orchestrator
//! changing at all.

use std::time::Instant;

use async_trait::async_trait;
use hotswap_core::model::hotswap::RedefinitionOutcome;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RedefinitionError {
    #[error("host redefinition primitive is unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait RedefinitionPrimitive: Send + Sync {
    /// Submits `new_bytecode` for `type_key`. Only genuinely exceptional
    /// conditions (the primitive could not be reached at all) are an
    /// `Err`; everything the host itself reports back — success,
    /// refusal, "not loaded", an unexpected failure — is a
    /// [`RedefinitionOutcome`] variant instead, since those are ordinary,
    /// anticipated outcomes rather than failures of this call itself.
    async fn redefine(
        &self,
        type_key: &str,
        new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError>;
}

/// A redefinition primitive that always succeeds, reporting a
/// caller-supplied instance count as affected. Used in tests and as a
/// placeholder wiring until a real JVM-attach backend is available.
pub struct SimulatedRedefinitionPrimitive {
    instances_affected: usize,
}

impl SimulatedRedefinitionPrimitive {
    pub fn new(instances_affected: usize) -> Self {
        Self { instances_affected }
    }
}

#[async_trait]
impl RedefinitionPrimitive for SimulatedRedefinitionPrimitive {
    async fn redefine(
        &self,
        _type_key: &str,
        _new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError> {
        let started = Instant::now();
        Ok(RedefinitionOutcome::Succeeded {
            instances_affected: self.instances_affected,
            duration_millis: started.elapsed().as_millis() as u64,
        })
    }
}

/// A redefinition primitive that always reports a host-side rejection,
/// for exercising the orchestrator's rollback path in tests.
pub struct RejectingRedefinitionPrimitive {
    reason: String,
    recovery_hint: String,
}

impl RejectingRedefinitionPrimitive {
    pub fn new(reason: impl Into<String>, recovery_hint: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            recovery_hint: recovery_hint.into(),
        }
    }
}

#[async_trait]
impl RedefinitionPrimitive for RejectingRedefinitionPrimitive {
    async fn redefine(
        &self,
        _type_key: &str,
        _new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError> {
        Ok(RedefinitionOutcome::RejectedByRuntime {
            reason: self.reason.clone(),
            recovery_hint: self.recovery_hint.clone(),
        })
    }
}

/// A redefinition primitive that always reports the class as not
/// loaded, for exercising the orchestrator's `ClassNotLoaded` path
/// (straight to `Committing`, nothing to roll back).
pub struct ClassNotLoadedPrimitive;

#[async_trait]
impl RedefinitionPrimitive for ClassNotLoadedPrimitive {
    async fn redefine(
        &self,
        type_key: &str,
        _new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError> {
        Ok(RedefinitionOutcome::ClassNotLoaded {
            type_key: type_key.to_string(),
        })
    }
}

/// A redefinition primitive that rejects its first call and succeeds
/// every call after, modeling the realistic shape of a rollback: the
/// runtime refuses the *new* bytecode, but reinstalling the previous,
/// already-proven bytecode a moment later succeeds. Used to exercise
/// the orchestrator's rollback path end to end, including the
/// reinstall, rather than stopping at the initial rejection.
pub struct RejectOnceThenSucceedPrimitive {
    reason: String,
    recovery_hint: String,
    calls: std::sync::atomic::AtomicUsize,
}

impl RejectOnceThenSucceedPrimitive {
    pub fn new(reason: impl Into<String>, recovery_hint: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            recovery_hint: recovery_hint.into(),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RedefinitionPrimitive for RejectOnceThenSucceedPrimitive {
    async fn redefine(
        &self,
        _type_key: &str,
        _new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError> {
        let started = Instant::now();
        if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
            Ok(RedefinitionOutcome::RejectedByRuntime {
                reason: self.reason.clone(),
                recovery_hint: self.recovery_hint.clone(),
            })
        } else {
            Ok(RedefinitionOutcome::Succeeded {
                instances_affected: 0,
                duration_millis: started.elapsed().as_millis() as u64,
            })
        }
    }
}

/// A redefinition primitive that always reports an unexpected failure,
/// for exercising the orchestrator's rollback path via the `Unexpected`
/// branch rather than `RejectedByRuntime`.
pub struct UnexpectedFailurePrimitive {
    cause: String,
}

impl UnexpectedFailurePrimitive {
    pub fn new(cause: impl Into<String>) -> Self {
        Self { cause: cause.into() }
    }
}

#[async_trait]
impl RedefinitionPrimitive for UnexpectedFailurePrimitive {
    async fn redefine(
        &self,
        _type_key: &str,
        _new_bytecode: &[u8],
    ) -> Result<RedefinitionOutcome, RedefinitionError> {
        Ok(RedefinitionOutcome::Unexpected {
            cause: self.cause.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn simulated_primitive_always_succeeds() {
        let primitive = SimulatedRedefinitionPrimitive::new(3);
        let outcome = primitive.redefine("com.acme.Widget", &[]).await.unwrap();
        assert!(outcome.is_success());
        assert!(!outcome.requires_rollback());
    }

    #[tokio::test]
    async fn rejecting_primitive_requires_rollback() {
        let primitive = RejectingRedefinitionPrimitive::new("schema change", "revert the field");
        let outcome = primitive.redefine("com.acme.Widget", &[]).await.unwrap();
        assert!(outcome.requires_rollback());
    }

    #[tokio::test]
    async fn reject_once_then_succeed_rejects_first_and_succeeds_after() {
        let primitive = RejectOnceThenSucceedPrimitive::new("schema drift detected late", "revert");
        let first = primitive.redefine("com.acme.Widget", &[]).await.unwrap();
        assert!(first.requires_rollback());
        let second = primitive.redefine("com.acme.Widget", &[]).await.unwrap();
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn class_not_loaded_does_not_require_rollback() {
        let outcome = ClassNotLoadedPrimitive
            .redefine("com.acme.Widget", &[])
            .await
            .unwrap();
        assert!(matches!(outcome, RedefinitionOutcome::ClassNotLoaded { .. }));
        assert!(!outcome.requires_rollback());
    }
}
