//! Credential providers: how an outbound resolves the API key it sends
//! upstream, abstracted behind a trait so the pipeline and transformers
//! never depend on a specific key-selection strategy
//!
//! Two reference implementations are provided: [`StaticCredentialProvider`]
//! always returns the same key, [`RandomCredentialProvider`] picks uniformly
//! from a configured pool on every call (key rotation across a set of
//! equivalent upstream accounts).

use secrecy::SecretString;

use crate::context::RequestContext;

/// Resolves the API key an outbound attaches to an upstream request
///
/// Implementations must be safe to call concurrently from many in-flight
/// requests; `get` takes the request context so a future implementation
/// could vary the key by tenant, but neither reference implementation
/// does.
pub trait CredentialProvider: Send + Sync {
    /// Resolve the key to use for this call
    fn get(&self, ctx: &RequestContext) -> SecretString;
}

/// Always returns the same configured key
pub struct StaticCredentialProvider {
    key: SecretString,
}

impl StaticCredentialProvider {
    /// Build a provider that always returns `key`
    #[must_use]
    pub fn new(key: SecretString) -> Self {
        Self { key }
    }
}

impl CredentialProvider for StaticCredentialProvider {
    fn get(&self, _ctx: &RequestContext) -> SecretString {
        self.key.clone()
    }
}

/// Picks uniformly at random from a fixed pool of keys on every call
///
/// Useful for spreading load across several upstream accounts that share
/// rate limits; the selection carries no session affinity.
pub struct RandomCredentialProvider {
    keys: Vec<SecretString>,
}

impl RandomCredentialProvider {
    /// Build a provider over a non-empty pool of keys
    ///
    /// # Panics
    /// Panics if `keys` is empty — a random provider with nothing to pick
    /// from is a construction error, not a runtime one.
    #[must_use]
    pub fn new(keys: Vec<SecretString>) -> Self {
        assert!(!keys.is_empty(), "RandomCredentialProvider requires at least one key");
        Self { keys }
    }
}

impl CredentialProvider for RandomCredentialProvider {
    fn get(&self, _ctx: &RequestContext) -> SecretString {
        use rand::seq::IndexedRandom;
        self.keys.choose(&mut rand::rng()).expect("non-empty by construction").clone()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn static_provider_always_returns_same_key() {
        let provider = StaticCredentialProvider::new(SecretString::from("sk-abc".to_owned()));
        let ctx = RequestContext::empty();
        assert_eq!(provider.get(&ctx).expose_secret(), "sk-abc");
        assert_eq!(provider.get(&ctx).expose_secret(), "sk-abc");
    }

    #[test]
    fn random_provider_only_returns_pool_members() {
        let pool = vec![
            SecretString::from("sk-a".to_owned()),
            SecretString::from("sk-b".to_owned()),
            SecretString::from("sk-c".to_owned()),
        ];
        let provider = RandomCredentialProvider::new(pool);
        let ctx = RequestContext::empty();
        for _ in 0..20 {
            let key = provider.get(&ctx);
            assert!(["sk-a", "sk-b", "sk-c"].contains(&key.expose_secret()));
        }
    }

    #[test]
    #[should_panic(expected = "at least one key")]
    fn random_provider_rejects_empty_pool() {
        RandomCredentialProvider::new(vec![]);
    }
}
