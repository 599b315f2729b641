//! In-memory identity provider for development and tests
//!
//! Issues HS256 access tokens in the Keycloak claim layout, so routes and the
//! gate behave the same against either adapter.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use super::claims::{classify_jwt_error, AccessClaims, RealmAccess};
use super::{AuthError, IdentityProvider, TokenError};
use crate::config::LocalConfig;
use crate::models::{Principal, Token};

const CODE_LIFETIME_SECS: i64 = 60;

struct Account {
    id: Uuid,
    password_hash: String,
    roles: Vec<String>,
}

struct PendingCode {
    username: String,
    session_state: String,
    expires_at: DateTime<Utc>,
}

pub struct LocalProvider {
    accounts: HashMap<String, Account>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    token_ttl: chrono::Duration,
    codes: Mutex<HashMap<String, PendingCode>>,
    revoked: RwLock<HashSet<String>>,
}

impl LocalProvider {
    pub fn new(secret: &str, issuer: &str, token_ttl: Duration) -> Self {
        Self {
            accounts: HashMap::new(),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
            token_ttl: chrono::Duration::from_std(token_ttl).unwrap_or_else(|_| chrono::Duration::minutes(5)),
            codes: Mutex::new(HashMap::new()),
            revoked: RwLock::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &LocalConfig) -> Self {
        let mut provider = Self::new(&config.jwt_secret, &config.issuer, config.token_ttl);
        for user in &config.users {
            provider.add_account(&user.username, user.password_hash.clone(), user.roles.clone());
        }
        info!("Local identity provider loaded {} user(s)", provider.accounts.len());
        provider
    }

    /// Register a user from a plaintext password
    pub fn with_user(mut self, username: &str, password: &str, roles: &[&str]) -> Result<Self, AuthError> {
        let hash = hash_password(password)?;
        self.add_account(username, hash, roles.iter().map(|r| r.to_string()).collect());
        Ok(self)
    }

    fn add_account(&mut self, username: &str, password_hash: String, roles: Vec<String>) {
        self.accounts.insert(
            username.to_string(),
            Account {
                id: Uuid::new_v4(),
                password_hash,
                roles,
            },
        );
    }

    /// Start an authorization-code flow for `username`; the code is single use
    pub fn issue_authorization_code(&self, username: &str, session_state: &str) -> Result<String, AuthError> {
        if !self.accounts.contains_key(username) {
            return Err(AuthError::InvalidCredentials);
        }

        let code = Uuid::new_v4().to_string();
        let now = Utc::now();
        let mut codes = self.codes.lock();
        codes.retain(|_, pending| pending.expires_at > now);
        codes.insert(
            code.clone(),
            PendingCode {
                username: username.to_string(),
                session_state: session_state.to_string(),
                expires_at: now + chrono::Duration::seconds(CODE_LIFETIME_SECS),
            },
        );
        Ok(code)
    }

    /// Revoke an access token issued by this provider
    pub fn revoke(&self, access_token: &str) -> Result<(), TokenError> {
        let mut validation = self.validation();
        validation.validate_exp = false;
        let claims = decode::<AccessClaims>(access_token, &self.decoding, &validation)
            .map_err(|e| classify_jwt_error(&e))?
            .claims;
        let jti = claims.jti.ok_or(TokenError::Malformed)?;
        self.revoked.write().insert(jti);
        Ok(())
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.leeway = 0;
        validation
    }

    fn issue_token(&self, username: &str, account: &Account) -> Result<Token, AuthError> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: account.id.to_string(),
            exp: (now + self.token_ttl).timestamp(),
            iat: now.timestamp(),
            iss: Some(self.issuer.clone()),
            jti: Some(Uuid::new_v4().to_string()),
            preferred_username: Some(username.to_string()),
            realm_access: RealmAccess {
                roles: account.roles.clone(),
            },
        };

        let access_token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        Ok(Token::bearer(
            access_token,
            Some(Uuid::new_v4().to_string()),
            self.token_ttl.num_seconds(),
        ))
    }
}

#[async_trait]
impl IdentityProvider for LocalProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn login(&self, username: &str, password: &str) -> Result<Token, AuthError> {
        let account = self.accounts.get(username).ok_or(AuthError::InvalidCredentials)?;

        check_password(account.password_hash.clone(), password.to_string()).await?;

        self.issue_token(username, account)
    }

    async fn exchange_authorization_code(&self, session_state: &str, code: &str) -> Result<Token, AuthError> {
        let pending = self.codes.lock().remove(code).ok_or(AuthError::InvalidCredentials)?;

        if pending.expires_at <= Utc::now() || pending.session_state != session_state {
            warn!("Rejected authorization code for {}", pending.username);
            return Err(AuthError::InvalidCredentials);
        }

        let account = self
            .accounts
            .get(&pending.username)
            .ok_or(AuthError::InvalidCredentials)?;
        self.issue_token(&pending.username, account)
    }

    async fn resolve_principal(&self, bearer_token: &str) -> Result<Principal, TokenError> {
        let claims = decode::<AccessClaims>(bearer_token, &self.decoding, &self.validation())
            .map_err(|e| classify_jwt_error(&e))?
            .claims;

        if let Some(jti) = &claims.jti {
            if self.revoked.read().contains(jti) {
                return Err(TokenError::RevokedOrUnknown);
            }
        }

        claims.into_principal()
    }
}

/// Argon2 verification on the blocking pool, so the caller's deadline can
/// fire while it runs
async fn check_password(password_hash: String, password: String) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || {
        let parsed_hash = PasswordHash::new(&password_hash)
            .map_err(|_| AuthError::Provider("stored password hash is invalid".to_string()))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    })
    .await
    .map_err(|e| AuthError::Provider(format!("password verification task failed: {e}")))?
}

/// Argon2id PHC string for `password`. Runs at account setup only.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Provider(e.to_string()))
}
