//! Per-request identity and its set-once binding
//!
//! A [`Principal`] is bound to a [`RequestContext`](crate::context::RequestContext)
//! exactly once: the authentication layer (or background-task setup) binds it
//! at request entry, and every later read sees the same value for the life
//! of the request.

use std::sync::OnceLock;

use crate::context::RequestContext;
use crate::error::KernelError;

/// Identity bound to a request
///
/// Equality requires the same variant and the same ids — `APIKey` compares
/// by `(api_key_id, project_id)`, `User` by `user_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Internal, trusted caller (background jobs, the persistence bridge)
    System,
    /// An authenticated human user
    User {
        /// Opaque user identifier
        user_id: String,
    },
    /// A project-scoped API key
    ApiKey {
        /// Opaque API key identifier
        api_key_id: String,
        /// Project the key is scoped to, if any
        project_id: Option<String>,
    },
    /// Test harness identity, only honored when [`set_test_mode`] is active
    Test,
    /// No identity could be established
    Unknown,
}

impl Principal {
    /// Short, stable label used in audit records and log fields
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User { .. } => "user",
            Self::ApiKey { .. } => "api_key",
            Self::Test => "test",
            Self::Unknown => "unknown",
        }
    }
}

/// Bind a principal to a context
///
/// If no principal is present, binds `p`. If an equal principal is already
/// present, returns the same context unchanged (idempotent). Otherwise
/// fails with [`KernelError::PrincipalConflict`].
pub fn with_principal(ctx: &RequestContext, principal: Principal) -> Result<RequestContext, KernelError> {
    match ctx.principal.get() {
        None => match ctx.principal.set(principal) {
            Ok(()) => Ok(ctx.clone()),
            // Lost a race with a concurrent bind; only acceptable if equal
            Err(rejected) => match ctx.principal.get() {
                Some(existing) if *existing == rejected => Ok(ctx.clone()),
                _ => Err(KernelError::PrincipalConflict),
            },
        },
        Some(existing) if *existing == principal => Ok(ctx.clone()),
        Some(_) => Err(KernelError::PrincipalConflict),
    }
}

/// Read the bound principal, if any, alongside whether one is present
///
/// Returns `(Principal::Unknown, false)` when nothing has been bound yet,
/// so callers can distinguish "not yet bound" from an explicit `Unknown`.
#[must_use]
pub fn get_principal(ctx: &RequestContext) -> (Principal, bool) {
    match ctx.principal.get() {
        Some(p) => (p.clone(), true),
        None => (Principal::Unknown, false),
    }
}

/// Require a bound principal, failing with [`KernelError::NoPrincipal`]
pub fn require_principal(ctx: &RequestContext) -> Result<Principal, KernelError> {
    ctx.principal.get().cloned().ok_or(KernelError::NoPrincipal)
}

/// Require the System principal specifically
pub fn require_system(ctx: &RequestContext) -> Result<(), KernelError> {
    match require_principal(ctx)? {
        Principal::System => Ok(()),
        _ => Err(KernelError::NotSystem),
    }
}

static TEST_MODE: OnceLock<std::sync::atomic::AtomicBool> = OnceLock::new();

fn test_mode_flag() -> &'static std::sync::atomic::AtomicBool {
    TEST_MODE.get_or_init(|| std::sync::atomic::AtomicBool::new(false))
}

/// Enable or disable treating `Principal::Test` as bypass-eligible
///
/// Intended for test setup only; production code never calls this.
pub fn set_test_mode(enabled: bool) {
    test_mode_flag().store(enabled, std::sync::atomic::Ordering::Relaxed);
}

pub(crate) fn test_mode_active() -> bool {
    test_mode_flag().load(std::sync::atomic::Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_then_idempotent_rebind_succeeds() {
        let ctx = RequestContext::empty();
        let p = Principal::User { user_id: "u1".to_owned() };
        let first = with_principal(&ctx, p.clone()).expect("first bind succeeds");
        let second = with_principal(&first, p.clone()).expect("idempotent rebind succeeds");
        assert_eq!(get_principal(&second).0, p);
    }

    #[test]
    fn conflicting_rebind_fails() {
        let ctx = RequestContext::empty();
        let bound = with_principal(&ctx, Principal::User { user_id: "u1".to_owned() }).unwrap();
        let err = with_principal(&bound, Principal::User { user_id: "u2".to_owned() }).unwrap_err();
        assert!(matches!(err, KernelError::PrincipalConflict));
    }

    #[test]
    fn unbound_context_reports_absent() {
        let ctx = RequestContext::empty();
        let (p, present) = get_principal(&ctx);
        assert!(!present);
        assert_eq!(p, Principal::Unknown);
        assert!(matches!(require_principal(&ctx), Err(KernelError::NoPrincipal)));
    }

    #[test]
    fn require_system_rejects_non_system() {
        let ctx = RequestContext::empty();
        let bound = with_principal(&ctx, Principal::User { user_id: "u1".to_owned() }).unwrap();
        assert!(matches!(require_system(&bound), Err(KernelError::NotSystem)));
    }
}
