//! Health check handler

use axum::{extract::State, Json};
use serde::Serialize;

use crate::inference::TrainingReport;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
    environment: String,
    identity_provider: &'static str,
    model: TrainingReport,
}

pub async fn check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
        environment: state.config.environment.clone(),
        identity_provider: state.identity.provider_name(),
        model: state.inference.model_info().clone(),
    })
}
