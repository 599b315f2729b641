//! Configuration module

use std::env;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_LOCAL_SECRET: &str = "iris-gateway-local-secret-change-in-production";

/// Configuration errors surfaced at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {reason}")]
    Invalid { key: &'static str, reason: String },

    #[error("{0} must be set")]
    Missing(&'static str),
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Identity provider adapter and its settings
    pub provider: ProviderConfig,

    /// Deadline applied to every identity provider call
    pub provider_timeout: Duration,

    /// Validated-token cache settings
    pub token_cache: TokenCacheConfig,

    /// Held-out accuracy the trained model must reach before serving
    pub model_min_accuracy: f64,
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    Keycloak(KeycloakConfig),
    Local(LocalConfig),
}

#[derive(Debug, Clone)]
pub struct KeycloakConfig {
    pub server_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    pub callback_uri: String,
    pub validation: TokenValidation,
}

impl KeycloakConfig {
    /// Issuer claim expected on realm tokens
    pub fn issuer(&self) -> String {
        format!("{}/realms/{}", self.server_url.trim_end_matches('/'), self.realm)
    }

    /// Base URL of the realm's OpenID Connect endpoints
    pub fn oidc_base(&self) -> String {
        format!("{}/protocol/openid-connect", self.issuer())
    }
}

/// How bearer tokens are checked against Keycloak
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidation {
    /// Verify signatures locally with the realm's published keys
    Jwks,
    /// Ask the provider on every (uncached) request
    Introspection,
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub token_ttl: Duration,
    pub users: Vec<LocalUser>,
}

/// A user known to the in-memory provider
#[derive(Debug, Clone, Deserialize)]
pub struct LocalUser {
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct TokenCacheConfig {
    pub ttl: Duration,
    pub capacity: usize,
}

impl TokenCacheConfig {
    pub fn enabled(&self) -> bool {
        !self.ttl.is_zero() && self.capacity > 0
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let default_provider = if is_production_env(&environment) { "keycloak" } else { "local" };
        let provider = match lookup("IDENTITY_PROVIDER")
            .unwrap_or_else(|| default_provider.to_string())
            .as_str()
        {
            "keycloak" => ProviderConfig::Keycloak(keycloak_from_lookup(&lookup)?),
            "local" => ProviderConfig::Local(local_from_lookup(&lookup)?),
            other => {
                return Err(ConfigError::Invalid {
                    key: "IDENTITY_PROVIDER",
                    reason: format!("unknown provider '{other}'"),
                })
            }
        };

        let config = Self {
            port: parse_or(&lookup, "PORT", 8080)?,
            environment,
            provider,
            provider_timeout: Duration::from_millis(parse_or(&lookup, "PROVIDER_TIMEOUT_MS", 5000)?),
            token_cache: TokenCacheConfig {
                ttl: Duration::from_secs(parse_or(&lookup, "TOKEN_CACHE_TTL_SECS", 60)?),
                capacity: parse_or(&lookup, "TOKEN_CACHE_CAPACITY", 1024)?,
            },
            model_min_accuracy: parse_or(&lookup, "MODEL_MIN_ACCURACY", 0.85)?,
        };

        // The built-in signing secret is for development only
        if let ProviderConfig::Local(local) = &config.provider {
            if config.is_production() && local.jwt_secret == DEFAULT_LOCAL_SECRET {
                return Err(ConfigError::Missing("LOCAL_JWT_SECRET"));
            }
        }

        Ok(config)
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        is_production_env(&self.environment)
    }
}

fn is_production_env(environment: &str) -> bool {
    environment == "production"
}

fn keycloak_from_lookup<F>(lookup: &F) -> Result<KeycloakConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let validation = match lookup("TOKEN_VALIDATION").as_deref() {
        None | Some("jwks") => TokenValidation::Jwks,
        Some("introspection") => TokenValidation::Introspection,
        Some(other) => {
            return Err(ConfigError::Invalid {
                key: "TOKEN_VALIDATION",
                reason: format!("expected 'jwks' or 'introspection', got '{other}'"),
            })
        }
    };

    Ok(KeycloakConfig {
        server_url: lookup("KEYCLOAK_SERVER_URL").ok_or(ConfigError::Missing("KEYCLOAK_SERVER_URL"))?,
        realm: lookup("KEYCLOAK_REALM").ok_or(ConfigError::Missing("KEYCLOAK_REALM"))?,
        client_id: lookup("KEYCLOAK_CLIENT_ID").ok_or(ConfigError::Missing("KEYCLOAK_CLIENT_ID"))?,
        client_secret: lookup("KEYCLOAK_CLIENT_SECRET").unwrap_or_default(),
        callback_uri: lookup("KEYCLOAK_CALLBACK_URI")
            .unwrap_or_else(|| "http://localhost:8080/callback".to_string()),
        validation,
    })
}

fn local_from_lookup<F>(lookup: &F) -> Result<LocalConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let users = match lookup("LOCAL_USERS") {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::Invalid {
            key: "LOCAL_USERS",
            reason: e.to_string(),
        })?,
        None => Vec::new(),
    };

    Ok(LocalConfig {
        jwt_secret: lookup("LOCAL_JWT_SECRET").unwrap_or_else(|| DEFAULT_LOCAL_SECRET.to_string()),
        issuer: lookup("LOCAL_ISSUER").unwrap_or_else(|| "iris-gateway-local".to_string()),
        token_ttl: Duration::from_secs(parse_or(lookup, "LOCAL_TOKEN_TTL_SECS", 300)?),
        users,
    })
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_to_local_provider_in_development() {
        let config = load(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider_timeout, Duration::from_secs(5));
        assert!(config.token_cache.enabled());
        assert!(matches!(config.provider, ProviderConfig::Local(_)));
    }

    #[test]
    fn keycloak_requires_realm_settings() {
        let err = load(&[("IDENTITY_PROVIDER", "keycloak")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("KEYCLOAK_SERVER_URL")));

        let config = load(&[
            ("IDENTITY_PROVIDER", "keycloak"),
            ("KEYCLOAK_SERVER_URL", "http://idp:8080/"),
            ("KEYCLOAK_REALM", "iris"),
            ("KEYCLOAK_CLIENT_ID", "gateway"),
            ("TOKEN_VALIDATION", "introspection"),
        ])
        .unwrap();
        let ProviderConfig::Keycloak(kc) = config.provider else {
            panic!("expected keycloak provider");
        };
        assert_eq!(kc.issuer(), "http://idp:8080/realms/iris");
        assert_eq!(kc.validation, TokenValidation::Introspection);
    }

    #[test]
    fn production_rejects_default_local_secret() {
        let err = load(&[("ENVIRONMENT", "production"), ("IDENTITY_PROVIDER", "local")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("LOCAL_JWT_SECRET")));

        let config = load(&[
            ("ENVIRONMENT", "production"),
            ("IDENTITY_PROVIDER", "local"),
            ("LOCAL_JWT_SECRET", "rotated"),
        ])
        .unwrap();
        assert!(config.is_production());
        assert!(!load(&[]).unwrap().is_production());
    }

    #[test]
    fn invalid_numbers_are_reported_with_their_key() {
        let err = load(&[("PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "PORT", .. }));
    }

    #[test]
    fn local_users_parse_from_json() {
        let config = load(&[(
            "LOCAL_USERS",
            r#"[{"username":"alice","password_hash":"$argon2id$x","roles":["user"]}]"#,
        )])
        .unwrap();
        let ProviderConfig::Local(local) = config.provider else {
            panic!("expected local provider");
        };
        assert_eq!(local.users.len(), 1);
        assert_eq!(local.users[0].roles, vec!["user".to_string()]);
    }

    #[test]
    fn zero_ttl_disables_cache() {
        let config = load(&[("TOKEN_CACHE_TTL_SECS", "0")]).unwrap();
        assert!(!config.token_cache.enabled());
    }
}
