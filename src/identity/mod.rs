//! Identity provider integration
//!
//! ```text
//!   handlers ──► IdentityProviderClient ──► dyn IdentityProvider
//!                  │ deadline                 ├─ KeycloakProvider (OIDC over HTTP)
//!                  │ token cache              └─ LocalProvider    (in-memory)
//! ```
//!
//! Provider calls run inside the request future. When a client disconnects,
//! axum drops that future and the in-flight provider request with it.

pub mod cache;
pub mod claims;
pub mod keycloak;
pub mod local;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::debug;

use crate::config::{Config, ProviderConfig};
use crate::models::{Principal, Token};

pub use cache::TokenCache;
pub use keycloak::KeycloakProvider;
pub use local::LocalProvider;

/// Login or code exchange failed
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),

    #[error("identity provider error: {0}")]
    Provider(String),
}

/// Bearer token could not be turned into a principal
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TokenError {
    #[error("missing bearer token")]
    Missing,

    #[error("token has expired")]
    Expired,

    #[error("malformed token")]
    Malformed,

    #[error("token revoked or unknown")]
    RevokedOrUnknown,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Capability every identity provider adapter implements
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    async fn login(&self, username: &str, password: &str) -> Result<Token, AuthError>;

    async fn exchange_authorization_code(&self, session_state: &str, code: &str) -> Result<Token, AuthError>;

    async fn resolve_principal(&self, bearer_token: &str) -> Result<Principal, TokenError>;
}

/// Provider handle used by routes and the authorization gate
#[derive(Clone)]
pub struct IdentityProviderClient {
    provider: Arc<dyn IdentityProvider>,
    timeout: Duration,
    cache: Option<Arc<TokenCache>>,
}

impl IdentityProviderClient {
    pub fn new(provider: Arc<dyn IdentityProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: TokenCache) -> Self {
        self.cache = Some(Arc::new(cache));
        self
    }

    /// Build the configured adapter
    pub fn from_config(config: &Config) -> Result<Self, AuthError> {
        let provider: Arc<dyn IdentityProvider> = match &config.provider {
            ProviderConfig::Keycloak(kc) => Arc::new(KeycloakProvider::new(kc.clone(), config.provider_timeout)?),
            ProviderConfig::Local(local) => Arc::new(LocalProvider::from_config(local)),
        };

        let client = Self::new(provider, config.provider_timeout);
        Ok(if config.token_cache.enabled() {
            client.with_cache(TokenCache::new(config.token_cache.capacity, config.token_cache.ttl))
        } else {
            client
        })
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Token, AuthError> {
        tokio::time::timeout(self.timeout, self.provider.login(username, password))
            .await
            .map_err(|_| AuthError::Unavailable(self.timeout_message()))?
    }

    pub async fn exchange_authorization_code(&self, session_state: &str, code: &str) -> Result<Token, AuthError> {
        tokio::time::timeout(
            self.timeout,
            self.provider.exchange_authorization_code(session_state, code),
        )
        .await
        .map_err(|_| AuthError::Unavailable(self.timeout_message()))?
    }

    pub async fn resolve_principal(&self, bearer_token: &str) -> Result<Principal, TokenError> {
        if let Some(principal) = self.cache.as_ref().and_then(|c| c.get(bearer_token)) {
            debug!("Token cache hit for {}", principal.display_name());
            return Ok(principal);
        }

        let principal = tokio::time::timeout(self.timeout, self.provider.resolve_principal(bearer_token))
            .await
            .map_err(|_| TokenError::Unavailable(self.timeout_message()))??;

        if principal.is_expired_at(Utc::now()) {
            debug!("Rejecting expired token for {}", principal.display_name());
            return Err(TokenError::Expired);
        }

        if let Some(cache) = &self.cache {
            cache.insert(bearer_token, principal.clone());
        }
        Ok(principal)
    }

    fn timeout_message(&self) -> String {
        format!("no response within {} ms", self.timeout.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration as ChronoDuration, Utc};

    /// Provider that counts calls and can be told to stall
    struct CountingProvider {
        calls: AtomicUsize,
        stall: Option<Duration>,
    }

    #[async_trait]
    impl IdentityProvider for CountingProvider {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn login(&self, _: &str, _: &str) -> Result<Token, AuthError> {
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            Ok(Token::bearer("t".into(), None, 60))
        }

        async fn exchange_authorization_code(&self, _: &str, _: &str) -> Result<Token, AuthError> {
            Err(AuthError::InvalidCredentials)
        }

        async fn resolve_principal(&self, token: &str) -> Result<Principal, TokenError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            let lifetime = if token.starts_with("stale") {
                ChronoDuration::hours(-1)
            } else {
                ChronoDuration::minutes(5)
            };
            Ok(Principal {
                sub: token.to_string(),
                username: None,
                roles: BTreeSet::from(["user".to_string()]),
                expires_at: Utc::now() + lifetime,
            })
        }
    }

    fn client(stall: Option<Duration>) -> (Arc<CountingProvider>, IdentityProviderClient) {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            stall,
        });
        let client = IdentityProviderClient::new(provider.clone(), Duration::from_millis(50));
        (provider, client)
    }

    #[tokio::test]
    async fn slow_resolution_becomes_unavailable() {
        let (_, client) = client(Some(Duration::from_secs(5)));
        let err = client.resolve_principal("abc").await.unwrap_err();
        assert!(matches!(err, TokenError::Unavailable(_)));
    }

    #[tokio::test]
    async fn slow_login_becomes_unavailable() {
        let (_, client) = client(Some(Duration::from_secs(5)));
        let err = client.login("alice", "pw").await.unwrap_err();
        assert!(matches!(err, AuthError::Unavailable(_)));
    }

    #[tokio::test]
    async fn cache_skips_repeat_resolution() {
        let (provider, client) = client(None);
        let client = client.with_cache(TokenCache::new(16, Duration::from_secs(60)));

        let first = client.resolve_principal("abc").await.unwrap();
        let second = client.resolve_principal("abc").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        client.resolve_principal("other").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_principals_are_rejected_and_not_cached() {
        let (_, client) = client(None);
        let client = client.with_cache(TokenCache::new(16, Duration::from_secs(60)));

        assert_eq!(client.resolve_principal("stale-1").await.unwrap_err(), TokenError::Expired);
        assert!(client.cache.as_ref().unwrap().is_empty());
    }

    #[tokio::test]
    async fn without_cache_every_call_reaches_provider() {
        let (provider, client) = client(None);
        client.resolve_principal("abc").await.unwrap();
        client.resolve_principal("abc").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
