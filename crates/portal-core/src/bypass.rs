//! Controlled privacy bypass, scoped and audited
//!
//! A [`BypassMarker`] may only be attached by the System principal (or the
//! Test principal when [`set_test_mode`](crate::principal::set_test_mode)
//! is active). `run_with_bypass` makes the marker visible only for the
//! duration of the supplied future, using a `tokio::task_local` so the
//! scoping survives `.await` points without leaking into sibling tasks.

use std::future::Future;
use std::sync::OnceLock;

use crate::context::RequestContext;
use crate::error::KernelError;
use crate::principal::{self, Principal, require_principal};

/// Record that privacy checks were intentionally suppressed for a region
#[derive(Debug, Clone)]
pub struct BypassMarker {
    /// Label of the principal that established the bypass
    pub principal: String,
    /// Stable short token explaining why (e.g. `"pipeline-audit"`)
    pub reason: String,
    /// Unix timestamp (seconds) the bypass was established
    pub timestamp: u64,
}

/// A single audit record emitted by the kernel
#[derive(Debug, Clone)]
pub struct AuditRecord {
    /// Unix timestamp (seconds)
    pub timestamp: u64,
    /// Label of the acting principal
    pub principal: String,
    /// Stable short reason token
    pub reason: String,
    /// Operation name (e.g. `"bypass"`)
    pub operation: &'static str,
    /// Entity the operation concerns (e.g. `"privacy"`)
    pub entity: &'static str,
    /// Optional free-form description
    pub description: Option<String>,
}

type AuditSink = dyn Fn(&AuditRecord) + Send + Sync;

static AUDIT_SINK: OnceLock<Box<AuditSink>> = OnceLock::new();

/// Install the process-wide audit sink
///
/// Production code should call this exactly once during startup; tests
/// may call it repeatedly only through a harness that serializes test
/// execution, since the sink is a `OnceLock` and later calls are no-ops.
pub fn set_audit_logger<F>(sink: F)
where
    F: Fn(&AuditRecord) + Send + Sync + 'static,
{
    let _ = AUDIT_SINK.set(Box::new(sink));
}

fn emit(record: &AuditRecord) {
    match AUDIT_SINK.get() {
        Some(sink) => sink(record),
        None => tracing::info!(
            principal = %record.principal,
            reason = %record.reason,
            operation = record.operation,
            entity = record.entity,
            "audit record (no sink installed)"
        ),
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Attach a bypass marker, invoking the audit sink exactly once
///
/// Succeeds only for the System principal (or Test, in test mode);
/// otherwise fails with [`KernelError::BypassForbidden`].
pub fn with_bypass(ctx: &RequestContext, reason: &str) -> Result<BypassMarker, KernelError> {
    let principal = require_principal(ctx)?;
    let eligible = matches!(principal, Principal::System) || (matches!(principal, Principal::Test) && principal::test_mode_active());
    if !eligible {
        return Err(KernelError::BypassForbidden);
    }

    let marker = BypassMarker {
        principal: principal.label().to_owned(),
        reason: reason.to_owned(),
        timestamp: unix_now(),
    };

    emit(&AuditRecord {
        timestamp: marker.timestamp,
        principal: marker.principal.clone(),
        reason: marker.reason.clone(),
        operation: "bypass",
        entity: "privacy",
        description: None,
    });

    Ok(marker)
}

tokio::task_local! {
    static ACTIVE_BYPASS: Option<BypassMarker>;
}

/// Run `f` with a bypass marker visible only for the duration of the
/// resulting future
///
/// Outside this scope `is_bypass_active` is false, even for the same
/// task, once the future returned here completes.
pub async fn run_with_bypass<F, Fut, T>(ctx: &RequestContext, reason: &str, f: F) -> Result<T, KernelError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let marker = with_bypass(ctx, reason)?;
    Ok(ACTIVE_BYPASS.scope(Some(marker), f()).await)
}

/// Whether a bypass marker is currently active on this task
#[must_use]
pub fn is_bypass_active() -> bool {
    ACTIVE_BYPASS.try_with(Option::is_some).unwrap_or(false)
}

/// The currently active bypass marker, if any
#[must_use]
pub fn get_bypass_info() -> Option<BypassMarker> {
    ACTIVE_BYPASS.try_with(Clone::clone).ok().flatten()
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::principal::with_principal;

    #[test]
    fn non_system_principal_is_refused() {
        let ctx = RequestContext::empty();
        let ctx = with_principal(&ctx, Principal::User { user_id: "u1".to_owned() }).unwrap();
        assert!(matches!(with_bypass(&ctx, "manual"), Err(KernelError::BypassForbidden)));
    }

    #[tokio::test]
    async fn scoped_bypass_is_only_visible_inside_the_scope() {
        let ctx = RequestContext::empty();
        let ctx = with_principal(&ctx, Principal::System).unwrap();

        assert!(!is_bypass_active());
        let seen_inside = run_with_bypass(&ctx, "gc-cleanup", || async { is_bypass_active() })
            .await
            .unwrap();
        assert!(seen_inside);
        assert!(!is_bypass_active());
    }

    #[tokio::test]
    async fn bypass_fires_audit_sink_exactly_once() {
        let calls: Arc<Mutex<Vec<AuditRecord>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = calls.clone();
        // Installing twice across the test binary is a no-op past the first;
        // this assertion only holds when this is the first test to install one.
        set_audit_logger(move |record| recorded.lock().unwrap().push(record.clone()));

        let ctx = RequestContext::empty();
        let ctx = with_principal(&ctx, Principal::System).unwrap();
        run_with_bypass(&ctx, "gc-cleanup", || async {}).await.unwrap();

        let seen = calls.lock().unwrap();
        assert!(seen.iter().any(|r| r.reason == "gc-cleanup" && r.principal == "system" && r.operation == "bypass"));
    }
}
