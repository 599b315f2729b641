//! Iris Gateway server binary

use std::net::SocketAddr;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iris_gateway::config::Config;
use iris_gateway::identity::IdentityProviderClient;
use iris_gateway::inference::{InferenceService, TrainingSettings};
use iris_gateway::{create_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "iris_gateway=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f == "json") {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let config = Config::from_env().context("Invalid configuration")?;

    tracing::info!("Iris Gateway starting ({})...", config.environment);

    // Train the classifier before accepting any traffic
    let settings = TrainingSettings {
        min_accuracy: config.model_min_accuracy,
        ..TrainingSettings::default()
    };
    let inference = InferenceService::initialize(&settings).context("Failed to initialize classifier")?;

    let identity = IdentityProviderClient::from_config(&config).context("Failed to set up identity provider")?;
    tracing::info!("Identity provider: {}", identity.provider_name());

    // Build application state
    let port = config.port;
    let state = AppState::new(config, identity, inference);

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
