//! Access-token claims shared by the JWT-based adapters
//!
//! Both adapters read the Keycloak claim layout: subject in `sub`, realm
//! roles in `realm_access.roles`.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use serde::{Deserialize, Serialize};

use super::TokenError;
use crate::models::Principal;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub realm_access: RealmAccess,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RealmAccess {
    #[serde(default)]
    pub roles: Vec<String>,
}

impl AccessClaims {
    pub fn expires_at(&self) -> Result<DateTime<Utc>, TokenError> {
        Utc.timestamp_opt(self.exp, 0).single().ok_or(TokenError::Malformed)
    }

    pub fn into_principal(self) -> Result<Principal, TokenError> {
        let expires_at = self.expires_at()?;
        Ok(Principal {
            sub: self.sub,
            username: self.preferred_username,
            roles: self.realm_access.roles.into_iter().collect(),
            expires_at,
        })
    }
}

/// Map a JWT decoding failure onto the token error taxonomy
pub fn classify_jwt_error(err: &JwtError) -> TokenError {
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::ImmatureSignature
        | ErrorKind::InvalidAlgorithm => TokenError::RevokedOrUnknown,
        _ => TokenError::Malformed,
    }
}
