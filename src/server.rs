//! Server setup and initialization
//!
//! Wires the execution engine and the trigger scheduler into the HTTP routes
//! and runs the Axum server.

use crate::{
    api::{
        triggers::{create_trigger_routes, TriggerState},
        workflows::{create_workflow_routes, AppState},
    },
    config::Config,
    runtime::{engine::ExecutionEngine, triggers::TriggerService},
};
use anyhow::Result;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the main Axum application with all routes
///
/// Builds the shared HTTP client, the built-in handler registry and the
/// execution engine from `config`, then starts the trigger scheduler.
pub async fn create_app(config: &Config) -> Result<Router> {
    tracing::info!("🚀 Initializing execution engine");
    let engine = ExecutionEngine::from_config(config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize execution engine: {}", e))?;
    let engine = Arc::new(engine);

    let triggers = TriggerService::new(Arc::clone(&engine))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create trigger scheduler: {}", e))?;
    triggers
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start trigger scheduler: {}", e))?;

    let app = router(engine, Arc::new(triggers));
    tracing::info!("✅ Application initialized successfully");
    Ok(app)
}

/// Router over an existing engine and trigger service
pub fn router(engine: Arc<ExecutionEngine>, triggers: Arc<TriggerService>) -> Router {
    tracing::info!("📡 Creating HTTP router with all endpoints");
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        // Workflow execution API
        .merge(create_workflow_routes().with_state(AppState { engine }))
        // Scheduled triggers API
        .merge(create_trigger_routes().with_state(TriggerState { triggers }))
}

/// Start the HTTP server with the given configuration
pub async fn start_server(config: Config) -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting flowrun server...");
    tracing::debug!("🔧 Configuration: {:?}", config);

    let app = create_app(&config).await?;

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "ok"
}
