//! Token models for the login and authorization-code flows

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

/// Token set issued by the identity provider.
///
/// Fields the gateway does not interpret are kept in `extra` so the callback
/// route can hand the provider's response back unchanged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<i64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Token {
    pub fn bearer(access_token: String, refresh_token: Option<String>, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: Some("Bearer".to_string()),
            expires_in: Some(expires_in),
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "username must not be empty"))]
    pub username: String,
    #[validate(length(min = 1, message = "password must not be empty"))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
}

impl From<Token> for LoginResponse {
    fn from(token: Token) -> Self {
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token.unwrap_or_default(),
            token_type: "Bearer",
        }
    }
}

/// Query string the provider appends when redirecting back to `/callback`
#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub session_state: String,
    pub code: String,
}
