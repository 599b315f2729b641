//! Authentication handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::Json;
use validator::Validate;

use crate::models::{CallbackQuery, LoginRequest, LoginResponse, Token};
use crate::{AppError, AppResult, AppState};

/// Password-grant login against the identity provider
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AppResult<Json<LoginResponse>> {
    let Json(req) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    req.validate()?;

    let token = state.identity.login(&req.username, &req.password).await?;

    tracing::info!("User {} logged in via {}", req.username, state.identity.provider_name());

    Ok(Json(token.into()))
}

/// Completes the authorization-code flow after the provider redirects back.
/// The provider's token response is returned as received.
pub async fn callback(
    State(state): State<AppState>,
    query: Result<Query<CallbackQuery>, QueryRejection>,
) -> AppResult<Json<Token>> {
    let Query(query) = query.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let token = state
        .identity
        .exchange_authorization_code(&query.session_state, &query.code)
        .await?;

    tracing::info!("Authorization code exchanged via {}", state.identity.provider_name());

    Ok(Json(token))
}
