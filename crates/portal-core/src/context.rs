use std::sync::{Arc, OnceLock};

use secrecy::SecretString;

use crate::principal::Principal;

/// Per-request context threaded through the pipeline
///
/// Cloning a `RequestContext` is cheap and shares the same principal cell:
/// every clone observes the same set-once binding, which is what lets the
/// context be passed by value through middleware and transformer calls
/// while still enforcing "exactly one principal per request".
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// HTTP request parts (method, URI, headers, extensions)
    pub parts: http::request::Parts,
    /// User-provided API key that overrides the configured channel key
    pub api_key: Option<SecretString>,
    /// Client identity for rate limiting and access control
    pub client_identity: Option<ClientIdentity>,
    /// Set-once principal binding, shared across clones of this context
    pub(crate) principal: Arc<OnceLock<Principal>>,
}

impl RequestContext {
    /// Create a minimal context for embedded (non-HTTP) use
    ///
    /// Contains empty headers, no API key, no client identity, and no
    /// bound principal.
    #[must_use]
    pub fn empty() -> Self {
        let (parts, _) = http::Request::builder()
            .method(http::Method::GET)
            .uri("/")
            .body(())
            .expect("valid minimal request")
            .into_parts();

        Self {
            parts,
            api_key: None,
            client_identity: None,
            principal: Arc::new(OnceLock::new()),
        }
    }

    /// Build a context from inbound HTTP request parts
    #[must_use]
    pub fn from_parts(parts: http::request::Parts) -> Self {
        Self {
            parts,
            api_key: None,
            client_identity: None,
            principal: Arc::new(OnceLock::new()),
        }
    }

    /// Access request headers
    #[must_use]
    pub fn headers(&self) -> &http::HeaderMap {
        &self.parts.headers
    }
}

/// Identified client and their group membership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Client identifier (e.g. user ID, API key ID)
    pub client_id: String,
    /// Group the client belongs to (e.g. "free", "pro", "enterprise")
    pub group: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_context_has_no_auth() {
        let ctx = RequestContext::empty();
        assert!(ctx.api_key.is_none());
        assert!(ctx.client_identity.is_none());
        assert!(ctx.headers().is_empty());
    }

    #[test]
    fn clones_share_the_principal_cell() {
        let ctx = RequestContext::empty();
        let clone = ctx.clone();
        crate::principal::with_principal(&ctx, Principal::System).unwrap();
        assert_eq!(crate::principal::get_principal(&clone).0, Principal::System);
    }
}
