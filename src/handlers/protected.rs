//! Role-gated informational routes

use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use crate::gate::require_any_role;
use crate::models::{roles, Principal};
use crate::AppResult;

#[derive(Serialize)]
pub struct AdminResponse {
    message: &'static str,
    user: Principal,
}

/// Reached only through the `admin` route guard
pub async fn admin(principal: Principal) -> Json<AdminResponse> {
    Json(AdminResponse {
        message: "Admin access granted",
        user: principal,
    })
}

/// The route guard only demands authentication; the handler additionally
/// requires one of the recognized roles.
pub async fn flexible(principal: Principal) -> AppResult<Json<Value>> {
    require_any_role(&principal, &roles::RECOGNIZED)?;
    Ok(Json(json!({ "message": "Access granted" })))
}
