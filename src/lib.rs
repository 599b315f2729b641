//! Iris Gateway
//!
//! Iris species classification served over HTTP, with every prediction
//! gated behind an OIDC identity provider and realm roles.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      IRIS GATEWAY                        │
//! ├──────────────────────────────────────────────────────────┤
//! │  ┌───────────┐   ┌──────────────┐   ┌─────────────────┐  │
//! │  │  Router   │──▶│ Authorization│──▶│   Inference     │  │
//! │  │  (Axum)   │   │     Gate     │   │   Service       │  │
//! │  └───────────┘   └──────┬───────┘   └─────────────────┘  │
//! │                         ▼                                │
//! │               ┌───────────────────┐                      │
//! │               │ Identity Provider │ Keycloak / local     │
//! │               └───────────────────┘                      │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod identity;
pub mod inference;
pub mod middleware;
pub mod models;
pub mod validation;


use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{AppError, AppResult};

use gate::{AuthorizationGate, RolePolicy};
use identity::IdentityProviderClient;
use inference::InferenceService;
use middleware::auth::RouteGuard;
use models::roles;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub identity: IdentityProviderClient,
    pub gate: AuthorizationGate,
    pub inference: Arc<InferenceService>,
}

impl AppState {
    pub fn new(config: config::Config, identity: IdentityProviderClient, inference: InferenceService) -> Self {
        Self {
            gate: AuthorizationGate::new(identity.clone()),
            config,
            identity,
            inference: Arc::new(inference),
        }
    }

    fn guard(&self, policy: RolePolicy) -> RouteGuard {
        RouteGuard::new(self.gate.clone(), policy)
    }
}

/// Create the main router with all routes
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/", get(handlers::root::welcome))
        .route("/favicon.ico", get(handlers::root::favicon))
        .route("/health", get(handlers::health::check))
        .route("/login", post(handlers::auth::login))
        .route("/callback", get(handlers::auth::callback));

    // Admin only
    let admin_routes = Router::new()
        .route("/admin", get(handlers::protected::admin))
        .layer(axum_middleware::from_fn_with_state(
            state.guard(RolePolicy::any_of([roles::ADMIN])),
            middleware::auth::require_roles,
        ));

    // Any valid token; the handler checks the role set itself
    let authenticated_routes = Router::new()
        .route("/flexible", get(handlers::protected::flexible))
        .layer(axum_middleware::from_fn_with_state(
            state.guard(RolePolicy::Authenticated),
            middleware::auth::require_roles,
        ));

    // Predictions (user role)
    let prediction_routes = Router::new()
        .route("/predict", post(handlers::predict::predict))
        .route("/predict/proba", post(handlers::predict::predict_proba))
        .layer(axum_middleware::from_fn_with_state(
            state.guard(RolePolicy::any_of([roles::USER])),
            middleware::auth::require_roles,
        ));

    // Combine all routes
    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(authenticated_routes)
        .merge(prediction_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
