//! Authorization gate: principal resolution plus role checks

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::warn;

use crate::identity::{IdentityProviderClient, TokenError};
use crate::models::Principal;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GateError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(TokenError),

    #[error("insufficient role")]
    Forbidden,

    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

impl From<TokenError> for GateError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Unavailable(reason) => GateError::Unavailable(reason),
            other => GateError::Unauthenticated(other),
        }
    }
}

/// Role requirement attached to a route group
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolePolicy {
    /// Any authenticated principal
    Authenticated,
    /// At least one of the listed roles
    AnyOf(BTreeSet<String>),
}

impl RolePolicy {
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roles: BTreeSet<String> = roles.into_iter().map(Into::into).collect();
        if roles.is_empty() {
            RolePolicy::Authenticated
        } else {
            RolePolicy::AnyOf(roles)
        }
    }

    /// Pure set-intersection check
    pub fn permits(&self, principal: &Principal) -> bool {
        match self {
            RolePolicy::Authenticated => true,
            RolePolicy::AnyOf(required) => !required.is_disjoint(&principal.roles),
        }
    }
}

#[derive(Clone)]
pub struct AuthorizationGate {
    identity: IdentityProviderClient,
}

impl AuthorizationGate {
    pub fn new(identity: IdentityProviderClient) -> Self {
        Self { identity }
    }

    pub async fn authorize(&self, bearer_token: &str, policy: &RolePolicy) -> Result<Principal, GateError> {
        let principal = self.identity.resolve_principal(bearer_token).await?;

        if !policy.permits(&principal) {
            warn!(
                "Access denied for {}: roles {:?} do not satisfy {:?}",
                principal.display_name(),
                principal.roles,
                policy
            );
            return Err(GateError::Forbidden);
        }

        Ok(principal)
    }
}

/// In-handler check that the principal holds at least one of `roles`
pub fn require_any_role(principal: &Principal, roles: &[&str]) -> Result<(), GateError> {
    if principal.has_any_role(roles.iter().copied()) {
        Ok(())
    } else {
        warn!(
            "User {} holds none of the roles {:?}",
            principal.display_name(),
            roles
        );
        Err(GateError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;

    use crate::identity::{AuthError, IdentityProvider};
    use crate::models::{roles, Token};

    /// Resolves "role1,role2" tokens to principals holding those roles
    struct RolesFromToken;

    #[async_trait]
    impl IdentityProvider for RolesFromToken {
        fn name(&self) -> &'static str {
            "roles-from-token"
        }

        async fn login(&self, _: &str, _: &str) -> Result<Token, AuthError> {
            Err(AuthError::InvalidCredentials)
        }

        async fn exchange_authorization_code(&self, _: &str, _: &str) -> Result<Token, AuthError> {
            Err(AuthError::InvalidCredentials)
        }

        async fn resolve_principal(&self, token: &str) -> Result<Principal, TokenError> {
            match token {
                "expired" => Err(TokenError::Expired),
                "down" => Err(TokenError::Unavailable("offline".into())),
                _ => Ok(Principal {
                    sub: token.to_string(),
                    username: None,
                    roles: token.split(',').filter(|r| !r.is_empty()).map(String::from).collect(),
                    expires_at: Utc::now() + chrono::Duration::minutes(5),
                }),
            }
        }
    }

    fn gate() -> AuthorizationGate {
        AuthorizationGate::new(IdentityProviderClient::new(
            Arc::new(RolesFromToken),
            Duration::from_secs(1),
        ))
    }

    #[test]
    fn policy_is_set_intersection() {
        let admin = RolePolicy::any_of([roles::ADMIN]);
        let principal = |r: &[&str]| Principal {
            sub: "s".into(),
            username: None,
            roles: r.iter().map(|s| s.to_string()).collect(),
            expires_at: Utc::now(),
        };
        assert!(admin.permits(&principal(&["admin", "user"])));
        assert!(!admin.permits(&principal(&["user"])));
        assert!(RolePolicy::Authenticated.permits(&principal(&[])));
        assert_eq!(RolePolicy::any_of(Vec::<String>::new()), RolePolicy::Authenticated);
    }

    #[tokio::test]
    async fn authorize_matrix() {
        let gate = gate();
        let admin = RolePolicy::any_of([roles::ADMIN]);
        let user = RolePolicy::any_of([roles::USER]);

        assert!(gate.authorize("admin", &admin).await.is_ok());
        assert_eq!(gate.authorize("user", &admin).await.unwrap_err(), GateError::Forbidden);
        assert_eq!(gate.authorize("admin", &user).await.unwrap_err(), GateError::Forbidden);
        assert!(gate.authorize("user", &user).await.is_ok());
        assert!(gate.authorize("", &RolePolicy::Authenticated).await.is_ok());
    }

    #[tokio::test]
    async fn resolution_failures_map_to_gate_errors() {
        let gate = gate();
        assert_eq!(
            gate.authorize("expired", &RolePolicy::Authenticated).await.unwrap_err(),
            GateError::Unauthenticated(TokenError::Expired)
        );
        assert!(matches!(
            gate.authorize("down", &RolePolicy::Authenticated).await.unwrap_err(),
            GateError::Unavailable(_)
        ));
    }

    #[test]
    fn recognized_role_check() {
        let p = Principal {
            sub: "s".into(),
            username: None,
            roles: ["auditor".to_string()].into_iter().collect(),
            expires_at: Utc::now(),
        };
        assert_eq!(require_any_role(&p, &roles::RECOGNIZED), Err(GateError::Forbidden));
    }
}
