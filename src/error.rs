//! Error handling
//!
//! Domain errors convert into [`AppError`]; this is the only place HTTP
//! status codes are chosen.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::gate::GateError;
use crate::identity::{AuthError, TokenError};
use crate::validation::{FieldViolation, ValidationError};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub enum AppError {
    // Auth errors
    Login(AuthError),
    Unauthenticated(TokenError),
    Forbidden,

    // Validation errors
    Validation(Vec<FieldViolation>),
    BadRequest(String),

    // External service errors
    ProviderUnavailable(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::Login(AuthError::InvalidCredentials) => {
                (StatusCode::BAD_REQUEST, "Login failed: invalid username or password".to_string())
            }
            AppError::Login(err) => {
                tracing::warn!("Login failed: {}", err);
                (StatusCode::BAD_REQUEST, format!("Login failed: {err}"))
            }
            AppError::Unauthenticated(TokenError::Missing) => {
                (StatusCode::UNAUTHORIZED, "Authentication required".to_string())
            }
            AppError::Unauthenticated(TokenError::Expired) => {
                (StatusCode::UNAUTHORIZED, "Token has expired".to_string())
            }
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "Invalid token".to_string()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access denied".to_string()),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "Validation failed".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::ProviderUnavailable(msg) => {
                tracing::error!("Identity provider unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Identity provider unavailable".to_string())
            }
        };

        let body = match &self {
            AppError::Validation(violations) => json!({
                "error": error_message,
                "status": status.as_u16(),
                "detail": violations,
            }),
            _ => json!({
                "error": error_message,
                "status": status.as_u16()
            }),
        };

        if status == StatusCode::UNAUTHORIZED {
            return (status, [(header::WWW_AUTHENTICATE, "Bearer")], Json(body)).into_response();
        }
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Login(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Unavailable(reason) => AppError::ProviderUnavailable(reason),
            other => AppError::Unauthenticated(other),
        }
    }
}

impl From<GateError> for AppError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Unauthenticated(token_err) => token_err.into(),
            GateError::Forbidden => AppError::Forbidden,
            GateError::Unavailable(reason) => AppError::ProviderUnavailable(reason),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err.violations)
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (AuthError::InvalidCredentials.into(), StatusCode::BAD_REQUEST),
            (AuthError::Unavailable("down".into()).into(), StatusCode::BAD_REQUEST),
            (TokenError::Missing.into(), StatusCode::UNAUTHORIZED),
            (TokenError::Malformed.into(), StatusCode::UNAUTHORIZED),
            (TokenError::RevokedOrUnknown.into(), StatusCode::UNAUTHORIZED),
            (GateError::Unauthenticated(TokenError::Expired).into(), StatusCode::UNAUTHORIZED),
            (GateError::Forbidden.into(), StatusCode::FORBIDDEN),
            (GateError::Unavailable("timeout".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (ValidationError::invalid_json().into(), StatusCode::UNPROCESSABLE_ENTITY),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn unauthorized_advertises_bearer_scheme() {
        let response = AppError::Unauthenticated(TokenError::Missing).into_response();
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
