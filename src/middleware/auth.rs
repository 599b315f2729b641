//! Authentication middleware

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::gate::{AuthorizationGate, RolePolicy};
use crate::identity::TokenError;
use crate::models::Principal;
use crate::AppError;

/// Gate plus the role requirement of one route group
#[derive(Clone)]
pub struct RouteGuard {
    gate: AuthorizationGate,
    policy: RolePolicy,
}

impl RouteGuard {
    pub fn new(gate: AuthorizationGate, policy: RolePolicy) -> Self {
        Self { gate, policy }
    }
}

/// Middleware: resolve the bearer token and enforce the group's role policy.
/// Runs before any body extractor, so authorization failures win over
/// validation failures.
pub async fn require_roles(
    State(guard): State<RouteGuard>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)?;

    let principal = guard.gate.authorize(&token, &guard.policy).await?;

    // Insert into request extensions
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthenticated(TokenError::Missing))?
        .to_str()
        .map_err(|_| AppError::Unauthenticated(TokenError::Malformed))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .or_else(|| auth_header.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or(AppError::Unauthenticated(TokenError::Missing))?;

    if token.is_empty() {
        return Err(AppError::Unauthenticated(TokenError::Missing));
    }
    Ok(token.to_string())
}

// Implement FromRequestParts for Principal
#[axum::async_trait]
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AppError::Unauthenticated(TokenError::Missing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request(header: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/admin");
        if let Some(value) = header {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn extracts_bearer_tokens() {
        assert_eq!(extract_bearer_token(&request(Some("Bearer abc.def"))).unwrap(), "abc.def");
        assert_eq!(extract_bearer_token(&request(Some("bearer  xyz "))).unwrap(), "xyz");
    }

    #[test]
    fn rejects_missing_or_foreign_schemes() {
        for header in [None, Some("Basic dXNlcjpwdw=="), Some("Bearer "), Some("Bearer")] {
            let err = extract_bearer_token(&request(header)).unwrap_err();
            assert!(
                matches!(err, AppError::Unauthenticated(TokenError::Missing)),
                "{header:?}"
            );
        }
    }
}
