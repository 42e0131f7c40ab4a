//! Scope decisions: allow/deny for a (principal, scope, project) triple
//!
//! The registry and the decision function are both flat: `has_scope`
//! inspects the caller's held scopes and their closure under
//! [`ScopeDescriptor::implies`] without walking a membership/role graph,
//! per the design note against traversal over a graph that may contain
//! duplicated nodes.

use std::collections::HashSet;
use std::future::Future;

use crate::error::KernelError;
use crate::principal::Principal;

/// Level a scope slug may be granted at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeLevel {
    /// Granted system-wide, independent of any project
    System,
    /// Granted within a specific project
    Project,
}

/// Static description of one valid scope slug
#[derive(Debug, Clone, Copy)]
pub struct ScopeDescriptor {
    /// Opaque scope slug, e.g. `"read_channels"`
    pub slug: &'static str,
    /// Levels this scope may be granted at
    pub levels: &'static [ScopeLevel],
    /// Human-readable description
    pub description: &'static str,
    /// Scopes automatically held alongside this one (e.g. write implies
    /// read)
    pub implies: &'static [&'static str],
}

/// The complete set of valid scope slugs
pub static SCOPE_REGISTRY: &[ScopeDescriptor] = &[
    ScopeDescriptor {
        slug: "read_channels",
        levels: &[ScopeLevel::System, ScopeLevel::Project],
        description: "List and read configured upstream channels",
        implies: &[],
    },
    ScopeDescriptor {
        slug: "write_channels",
        levels: &[ScopeLevel::System, ScopeLevel::Project],
        description: "Create, update, or remove upstream channels",
        implies: &["read_channels"],
    },
    ScopeDescriptor {
        slug: "read_api_keys",
        levels: &[ScopeLevel::Project],
        description: "List and read project API keys",
        implies: &[],
    },
    ScopeDescriptor {
        slug: "write_api_keys",
        levels: &[ScopeLevel::Project],
        description: "Create, rotate, or revoke project API keys",
        implies: &["read_api_keys"],
    },
    ScopeDescriptor {
        slug: "read_usage",
        levels: &[ScopeLevel::System, ScopeLevel::Project],
        description: "Read recorded request/execution usage",
        implies: &[],
    },
    ScopeDescriptor {
        slug: "write_usage",
        levels: &[ScopeLevel::System],
        description: "Write or backfill usage records directly",
        implies: &["read_usage"],
    },
];

fn descriptor(slug: &str) -> Option<&'static ScopeDescriptor> {
    SCOPE_REGISTRY.iter().find(|d| d.slug == slug)
}

/// Closure of a held-scope set under `implies`, bounded by registry size
fn expand(held: &HashSet<&'static str>) -> HashSet<&'static str> {
    let mut expanded = held.clone();
    loop {
        let before = expanded.len();
        let additions: Vec<&'static str> = expanded
            .iter()
            .filter_map(|slug| descriptor(slug))
            .flat_map(|d| d.implies.iter().copied())
            .collect();
        expanded.extend(additions);
        if expanded.len() == before {
            break;
        }
    }
    expanded
}

/// A project membership entry on a [`UserContext`]
#[derive(Debug, Clone)]
pub struct ProjectMembership {
    /// Project this membership applies to
    pub project_id: String,
    /// Whether the user owns the project outright
    pub is_owner: bool,
    /// Scopes granted by this membership
    pub scopes: HashSet<&'static str>,
}

/// A role-derived scope grant on a [`UserContext`]
#[derive(Debug, Clone)]
pub struct ProjectRole {
    /// Project this role applies to
    pub project_id: String,
    /// Scopes granted by this role
    pub scopes: HashSet<&'static str>,
}

/// Loaded entity data for a User principal
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    /// Whether the user is a platform owner (bypasses all scope checks)
    pub is_owner: bool,
    /// System-level scopes held directly
    pub system_scopes: HashSet<&'static str>,
    /// Project memberships
    pub memberships: Vec<ProjectMembership>,
    /// Project-scoped role grants
    pub roles: Vec<ProjectRole>,
}

/// Loaded entity data for an APIKey principal
#[derive(Debug, Clone, Default)]
pub struct ApiKeyContext {
    /// Scopes granted directly to the key
    pub scopes: HashSet<&'static str>,
}

/// Everything the scope engine needs to decide one request
#[derive(Debug, Clone)]
pub struct ScopeContext<'a> {
    /// The request's bound principal
    pub principal: &'a Principal,
    /// Loaded user entity, present only for `Principal::User`
    pub user: Option<&'a UserContext>,
    /// Loaded API key entity, present only for `Principal::ApiKey`
    pub api_key: Option<&'a ApiKeyContext>,
    /// Project the target resource belongs to, if project-owned
    pub target_project_id: Option<&'a str>,
}

/// Decide whether `ctx` holds `scope`
///
/// Implements the decision rules in order: System/Test always
/// allow; an owning user always allows; otherwise system scopes, then
/// project membership/role scopes (expanded by `implies`); an API key
/// allows iff it holds the scope and its bound project matches the
/// target (when the target is project-owned).
#[must_use]
pub fn has_scope(ctx: &ScopeContext<'_>, scope: &str) -> bool {
    match ctx.principal {
        Principal::System | Principal::Test => true,
        Principal::User { .. } => {
            let Some(user) = ctx.user else { return false };
            if user.is_owner {
                return true;
            }

            let mut held: HashSet<&'static str> = user.system_scopes.clone();
            if let Some(project_id) = ctx.target_project_id {
                for membership in &user.memberships {
                    if membership.project_id == project_id {
                        if membership.is_owner {
                            return true;
                        }
                        held.extend(membership.scopes.iter().copied());
                    }
                }
                for role in &user.roles {
                    if role.project_id == project_id {
                        held.extend(role.scopes.iter().copied());
                    }
                }
            }

            expand(&held).contains(scope)
        }
        Principal::ApiKey { project_id, .. } => {
            let Some(api_key) = ctx.api_key else { return false };
            let project_matches = match ctx.target_project_id {
                Some(target) => project_id.as_deref() == Some(target),
                None => true,
            };
            project_matches && expand(&api_key.scopes).contains(scope)
        }
        Principal::Unknown => false,
    }
}

/// `has_scope`, failing with [`KernelError::InsufficientScope`] on denial
pub fn require_scope(ctx: &ScopeContext<'_>, scope: &str) -> Result<(), KernelError> {
    if has_scope(ctx, scope) {
        Ok(())
    } else {
        Err(KernelError::InsufficientScope { scope: scope.to_owned() })
    }
}

/// Allow/deny decision attached to a scope-gated region, for downstream
/// ORM-level filters to consume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDecision {
    /// The scope check passed
    Allow,
    /// The scope check failed
    Deny,
}

tokio::task_local! {
    static ACTIVE_SCOPE_DECISION: ScopeDecision;
}

/// Compute and return the decision for `scope`, without scoping it to a
/// region. Callers that only need the boolean should use `has_scope`
/// directly; this exists for call sites that want the `Allow`/`Deny`
/// value itself (e.g. to pass to a predicate builder).
#[must_use]
pub fn with_scope_decision(ctx: &ScopeContext<'_>, scope: &str) -> ScopeDecision {
    if has_scope(ctx, scope) {
        ScopeDecision::Allow
    } else {
        ScopeDecision::Deny
    }
}

/// Run `f` with the scope decision for `scope` visible only inside it
pub async fn run_with_scope_decision<F, Fut, T>(ctx: &ScopeContext<'_>, scope: &str, f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let decision = with_scope_decision(ctx, scope);
    ACTIVE_SCOPE_DECISION.scope(decision, f()).await
}

/// The scope decision currently active on this task, if any
#[must_use]
pub fn active_scope_decision() -> Option<ScopeDecision> {
    ACTIVE_SCOPE_DECISION.try_with(|d| *d).ok()
}

/// Build the `project_id == target.project_id` predicate
/// requires injecting into batch updates/deletes on project-owned
/// resources
#[must_use]
pub fn project_scope_predicate(target_project_id: &str) -> (&'static str, String) {
    ("project_id", target_project_id.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner_user() -> UserContext {
        UserContext {
            is_owner: true,
            ..Default::default()
        }
    }

    #[test]
    fn system_principal_always_allowed() {
        let ctx = ScopeContext {
            principal: &Principal::System,
            user: None,
            api_key: None,
            target_project_id: None,
        };
        assert!(has_scope(&ctx, "write_channels"));
    }

    #[test]
    fn owning_user_always_allowed() {
        let user = owner_user();
        let ctx = ScopeContext {
            principal: &Principal::User { user_id: "u1".to_owned() },
            user: Some(&user),
            api_key: None,
            target_project_id: None,
        };
        assert!(has_scope(&ctx, "write_api_keys"));
    }

    #[test]
    fn membership_scope_expands_through_implies() {
        let mut scopes = HashSet::new();
        scopes.insert("write_channels");
        let user = UserContext {
            memberships: vec![ProjectMembership {
                project_id: "proj1".to_owned(),
                is_owner: false,
                scopes,
            }],
            ..Default::default()
        };
        let ctx = ScopeContext {
            principal: &Principal::User { user_id: "u1".to_owned() },
            user: Some(&user),
            api_key: None,
            target_project_id: Some("proj1"),
        };
        assert!(has_scope(&ctx, "read_channels"), "write_channels implies read_channels");
        assert!(!has_scope(&ctx, "write_api_keys"));
    }

    #[test]
    fn scope_monotonicity_holds_for_api_key() {
        let mut scopes = HashSet::new();
        scopes.insert("write_usage");
        let api_key = ApiKeyContext { scopes };
        let principal = Principal::ApiKey {
            api_key_id: "key1".to_owned(),
            project_id: None,
        };
        let ctx = ScopeContext {
            principal: &principal,
            user: None,
            api_key: Some(&api_key),
            target_project_id: None,
        };
        assert!(has_scope(&ctx, "write_usage"));
        assert!(has_scope(&ctx, "read_usage"), "write_usage implies read_usage");
    }

    #[test]
    fn api_key_denied_across_mismatched_project() {
        let mut scopes = HashSet::new();
        scopes.insert("read_channels");
        let api_key = ApiKeyContext { scopes };
        let principal = Principal::ApiKey {
            api_key_id: "key1".to_owned(),
            project_id: Some("proj-a".to_owned()),
        };
        let ctx = ScopeContext {
            principal: &principal,
            user: None,
            api_key: Some(&api_key),
            target_project_id: Some("proj-b"),
        };
        assert!(!has_scope(&ctx, "read_channels"));
    }

    #[test]
    fn unknown_principal_is_denied() {
        let ctx = ScopeContext {
            principal: &Principal::Unknown,
            user: None,
            api_key: None,
            target_project_id: None,
        };
        assert!(!has_scope(&ctx, "read_channels"));
        assert!(matches!(require_scope(&ctx, "read_channels"), Err(KernelError::InsufficientScope { .. })));
    }
}
