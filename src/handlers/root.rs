//! Public routes that need no identity

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

pub async fn welcome() -> Json<Value> {
    Json(json!({ "message": "Welcome to the Iris classification service" }))
}

/// Browsers ask for this on every page load; answer without a body
pub async fn favicon() -> StatusCode {
    StatusCode::NO_CONTENT
}
