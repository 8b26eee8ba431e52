//! Resolves who a hot-swap request should be attributed to, and lets
//! callers scope an explicit identity over a block of work.

use std::cell::RefCell;

use once_cell::sync::OnceCell;

use crate::model::user::UserIdentity;

thread_local! {
    static IDENTITY_STACK: RefCell<Vec<UserIdentity>> = const { RefCell::new(Vec::new()) };
}

/// The process-wide result of auto-identification (environment-derived,
/// or anonymous if the environment has nothing), computed once and
/// reused for the life of the process. Explicit and configured
/// identities are never memoized here — they are supplied fresh on
/// every call.
static AUTO_IDENTITY: OnceCell<UserIdentity> = OnceCell::new();

/// Resolves the current identity using the strategy chain: an explicit
/// identity bound via [`bind_scoped`] wins, then `configured_source`
/// (typically the config's `user_identity_override`), then an
/// environment-derived identity, then [`UserIdentity::anonymous`] —
/// with the last two memoized per process on first resolution.
pub fn resolve(configured_source: Option<&str>) -> UserIdentity {
    if let Some(explicit) = current_explicit() {
        return explicit;
    }
    if let Some(identifier) = configured_source {
        return UserIdentity::ConfiguredSource {
            identifier: identifier.to_string(),
        };
    }
    AUTO_IDENTITY
        .get_or_init(|| {
            environment_derived()
                .map(|identifier| UserIdentity::EnvironmentDerived { identifier })
                .unwrap_or_else(UserIdentity::anonymous)
        })
        .clone()
}

fn current_explicit() -> Option<UserIdentity> {
    IDENTITY_STACK.with(|stack| stack.borrow().last().cloned())
}

fn environment_derived() -> Option<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .ok()
        .filter(|s| !s.is_empty())
}

/// Binds `identity` as the explicit current identity for as long as the
/// returned guard lives. Restores whatever identity was previously bound
/// (including "none") on drop, even if the guard's scope unwinds through
/// a panic.
#[must_use]
pub struct ScopedIdentity {
    _private: (),
}

pub fn bind_scoped(identity: UserIdentity) -> ScopedIdentity {
    IDENTITY_STACK.with(|stack| stack.borrow_mut().push(identity));
    ScopedIdentity { _private: () }
}

impl Drop for ScopedIdentity {
    fn drop(&mut self) {
        IDENTITY_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_identity_wins_over_configured() {
        let _guard = bind_scoped(UserIdentity::Explicit {
            identifier: "alice".into(),
        });
        let resolved = resolve(Some("configured-bob"));
        assert_eq!(resolved.identifier(), "alice");
    }

    #[test]
    fn falls_back_through_the_chain() {
        assert_eq!(resolve(Some("configured-bob")).identifier(), "configured-bob");
    }

    #[test]
    fn auto_identification_is_memoized_per_process() {
        let first = resolve(None);
        let second = resolve(None);
        assert_eq!(first, second);
    }

    #[test]
    fn guard_restores_previous_identity_on_drop() {
        {
            let _outer = bind_scoped(UserIdentity::Explicit {
                identifier: "outer".into(),
            });
            {
                let _inner = bind_scoped(UserIdentity::Explicit {
                    identifier: "inner".into(),
                });
                assert_eq!(resolve(None).identifier(), "inner");
            }
            assert_eq!(resolve(None).identifier(), "outer");
        }
    }
}
