//! Keycloak (OpenID Connect) adapter
//!
//! Talks to a single realm:
//! - `POST {realm}/protocol/openid-connect/token` for password and
//!   authorization-code grants
//! - `GET  {realm}/protocol/openid-connect/certs` for signing keys
//! - `POST {realm}/protocol/openid-connect/token/introspect` when tokens are
//!   validated remotely
//!
//! Transport failures (connect errors, timeouts) get one retry after a short
//! backoff. Each attempt gets under half of the caller's deadline so the retry
//! still fits inside it. Provider responses, including 4xx and 5xx, are never
//! retried.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{JwkSet, PublicKeyUse};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use parking_lot::RwLock;
use tokio::sync::Mutex;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::claims::{classify_jwt_error, AccessClaims};
use super::{AuthError, IdentityProvider, TokenError};
use crate::config::{KeycloakConfig, TokenValidation};
use crate::models::{Principal, Token};

const RETRY_BACKOFF: Duration = Duration::from_millis(200);
const KEY_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// OAuth2 error body
#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// RFC 7662 introspection response
#[derive(Debug, Deserialize)]
struct Introspection {
    active: bool,
    #[serde(flatten)]
    claims: Option<AccessClaims>,
}

#[derive(Default)]
struct KeyCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl KeyCache {
    fn may_refresh(&self) -> bool {
        self.fetched_at
            .map_or(true, |at| at.elapsed() >= KEY_REFRESH_INTERVAL)
    }
}

pub struct KeycloakProvider {
    config: KeycloakConfig,
    http: reqwest::Client,
    keys: RwLock<KeyCache>,
    // held while the key set is fetched, so concurrent misses share one fetch
    refresh: Mutex<()>,
}

impl KeycloakProvider {
    pub fn new(config: KeycloakConfig, timeout: Duration) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(attempt_timeout(timeout))
            .build()
            .map_err(|e| AuthError::Provider(format!("failed to create HTTP client: {e}")))?;

        info!("Keycloak provider for realm '{}' at {}", config.realm, config.server_url);

        Ok(Self {
            config,
            http,
            keys: RwLock::new(KeyCache::default()),
            refresh: Mutex::new(()),
        })
    }

    fn token_url(&self) -> String {
        format!("{}/token", self.config.oidc_base())
    }

    fn certs_url(&self) -> String {
        format!("{}/certs", self.config.oidc_base())
    }

    fn introspection_url(&self) -> String {
        format!("{}/token/introspect", self.config.oidc_base())
    }

    fn client_form<'a>(&'a self, mut form: Vec<(&'a str, &'a str)>) -> Vec<(&'a str, &'a str)> {
        form.push(("client_id", self.config.client_id.as_str()));
        if !self.config.client_secret.is_empty() {
            form.push(("client_secret", self.config.client_secret.as_str()));
        }
        form
    }

    /// Send, retrying once if the request never reached the provider
    async fn send_with_retry<F>(&self, build: F) -> Result<Response, reqwest::Error>
    where
        F: Fn() -> RequestBuilder,
    {
        match build().send().await {
            Err(err) if is_transient(&err) => {
                debug!("Identity provider transport error, retrying once: {}", err);
                tokio::time::sleep(RETRY_BACKOFF).await;
                build().send().await
            }
            other => other,
        }
    }

    async fn request_token(&self, form: Vec<(&str, &str)>) -> Result<Token, AuthError> {
        let form = self.client_form(form);
        let url = self.token_url();

        let response = self
            .send_with_retry(|| self.http.post(&url).form(&form))
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Token>()
                .await
                .map_err(|e| AuthError::Provider(format!("unreadable token response: {e}")));
        }

        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<OAuthError>(&body) {
            Ok(err) if err.error == "invalid_grant" => {
                warn!(
                    "Token request rejected: {}",
                    err.error_description.as_deref().unwrap_or("invalid_grant")
                );
                Err(AuthError::InvalidCredentials)
            }
            Ok(err) => Err(AuthError::Provider(format!(
                "{} ({}): {}",
                err.error,
                status.as_u16(),
                err.error_description.unwrap_or_default()
            ))),
            Err(_) if status == StatusCode::UNAUTHORIZED => Err(AuthError::InvalidCredentials),
            Err(_) => Err(AuthError::Provider(format!("token endpoint returned {}", status.as_u16()))),
        }
    }

    async fn fetch_keys(&self) -> Result<(), TokenError> {
        let url = self.certs_url();
        let response = self
            .send_with_retry(|| self.http.get(&url))
            .await
            .map_err(|e| TokenError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenError::Unavailable(format!(
                "key set endpoint returned {}",
                response.status().as_u16()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| TokenError::Unavailable(format!("unreadable key set: {e}")))?;

        let keys: HashMap<String, DecodingKey> = set
            .keys
            .iter()
            .filter(|jwk| jwk.common.public_key_use != Some(PublicKeyUse::Encryption))
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                DecodingKey::from_jwk(jwk).ok().map(|key| (kid, key))
            })
            .collect();

        debug!("Loaded {} signing key(s) for realm '{}'", keys.len(), self.config.realm);

        let mut cache = self.keys.write();
        cache.keys = keys;
        cache.fetched_at = Some(Instant::now());
        Ok(())
    }

    fn cached_key(&self, kid: &str) -> Result<Option<DecodingKey>, TokenError> {
        let cache = self.keys.read();
        match cache.keys.get(kid) {
            Some(key) => Ok(Some(key.clone())),
            None if cache.may_refresh() => Ok(None),
            None => Err(TokenError::RevokedOrUnknown),
        }
    }

    async fn decoding_key(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        if let Some(key) = self.cached_key(kid)? {
            return Ok(key);
        }

        let _refresh = self.refresh.lock().await;
        // A request that held the lock before us may already have refreshed
        if let Some(key) = self.cached_key(kid)? {
            return Ok(key);
        }

        self.fetch_keys().await?;
        self.keys
            .read()
            .keys
            .get(kid)
            .cloned()
            .ok_or(TokenError::RevokedOrUnknown)
    }

    async fn verify_locally(&self, bearer_token: &str) -> Result<Principal, TokenError> {
        let header = decode_header(bearer_token).map_err(|_| TokenError::Malformed)?;
        let kid = header.kid.ok_or(TokenError::Malformed)?;
        let key = self.decoding_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[self.config.issuer()]);
        validation.validate_aud = false;
        validation.leeway = 0;

        decode::<AccessClaims>(bearer_token, &key, &validation)
            .map_err(|e| classify_jwt_error(&e))?
            .claims
            .into_principal()
    }

    async fn introspect(&self, bearer_token: &str) -> Result<Principal, TokenError> {
        let form = self.client_form(vec![("token", bearer_token)]);
        let url = self.introspection_url();

        let response = self
            .send_with_retry(|| self.http.post(&url).form(&form))
            .await
            .map_err(|e| TokenError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(TokenError::Unavailable(format!(
                "introspection endpoint returned {}",
                response.status().as_u16()
            )));
        }

        let result: Introspection = response
            .json()
            .await
            .map_err(|e| TokenError::Unavailable(format!("unreadable introspection response: {e}")))?;

        if !result.active {
            return Err(TokenError::RevokedOrUnknown);
        }

        let principal = result.claims.ok_or(TokenError::Malformed)?.into_principal()?;
        if principal.is_expired_at(chrono::Utc::now()) {
            return Err(TokenError::Expired);
        }
        Ok(principal)
    }
}

#[async_trait]
impl IdentityProvider for KeycloakProvider {
    fn name(&self) -> &'static str {
        "keycloak"
    }

    async fn login(&self, username: &str, password: &str) -> Result<Token, AuthError> {
        self.request_token(vec![
            ("grant_type", "password"),
            ("scope", "openid"),
            ("username", username),
            ("password", password),
        ])
        .await
    }

    async fn exchange_authorization_code(&self, session_state: &str, code: &str) -> Result<Token, AuthError> {
        self.request_token(vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("session_state", session_state),
            ("redirect_uri", self.config.callback_uri.as_str()),
        ])
        .await
    }

    async fn resolve_principal(&self, bearer_token: &str) -> Result<Principal, TokenError> {
        match self.config.validation {
            TokenValidation::Jwks => self.verify_locally(bearer_token).await,
            TokenValidation::Introspection => self.introspect(bearer_token).await,
        }
    }
}

/// Budget for one HTTP attempt: two attempts plus the backoff fit in `deadline`
fn attempt_timeout(deadline: Duration) -> Duration {
    let per_attempt = deadline.saturating_sub(RETRY_BACKOFF) / 2;
    if per_attempt.is_zero() {
        deadline
    } else {
        per_attempt
    }
}

fn is_transient(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout()
}
