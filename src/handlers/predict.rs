//! Prediction handlers

use axum::body::Bytes;
use axum::extract::{FromRequest, Request, State};
use axum::Json;
use serde_json::Value;
use tracing::debug;

use crate::models::{FeatureVector, PredictionResult, Principal, ProbabilityResult};
use crate::validation::{self, ValidationError};
use crate::{AppError, AppState};

/// Request body parsed and range-checked into a [`FeatureVector`]
pub struct ValidatedFeatures(pub FeatureVector);

#[axum::async_trait]
impl<S> FromRequest<S> for ValidatedFeatures
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?;

        let raw: Value = serde_json::from_slice(&body).map_err(|_| ValidationError::invalid_json())?;

        Ok(Self(validation::validate(&raw)?))
    }
}

/// Iris prediction
pub async fn predict(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedFeatures(features): ValidatedFeatures,
) -> Json<PredictionResult> {
    let result = state.inference.classify(&features);
    debug!(
        "Prediction for {}: {} ({})",
        principal.display_name(),
        result.class_name,
        result.class_id
    );
    Json(result)
}

/// Iris prediction with class probabilities
pub async fn predict_proba(
    State(state): State<AppState>,
    principal: Principal,
    ValidatedFeatures(features): ValidatedFeatures,
) -> Json<ProbabilityResult> {
    let result = state.inference.classify_with_probabilities(&features);
    debug!(
        "Probabilities for {}: {:?}",
        principal.display_name(),
        result.probabilities
    );
    Json(result)
}
