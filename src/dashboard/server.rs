use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Json, Router, http::HeaderValue, http::StatusCode};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::api::{self, AppState, SharedState};
use super::notify::Notifier;
use crate::automation;
use crate::config::GhostConfig;
use crate::orchestrator::DeployOrchestrator;
use crate::store::{DbHandle, JobDb};

/// Configuration for the dashboard server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub allowed_origins: Option<String>,
}

impl ServerConfig {
    pub fn from_config(config: &GhostConfig) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: config.toml.dashboard.port,
            db_path: config.db_path(),
            allowed_origins: config.toml.proxy.allowed_origins.clone(),
        }
    }
}

/// Build the full application router: API, status webhook and WebSocket.
pub fn build_router(state: SharedState) -> Router {
    api::api_router()
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"error": "Not found"})),
            )
        })
        .with_state(state)
}

/// Browser access for the dashboard front-end. No allow-list means any origin.
fn cors_layer(allowed_origins: Option<&str>) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty() && *o != "*")
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    if origins.is_empty() {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Start the dashboard server.
pub async fn start_server(config: &GhostConfig, server: ServerConfig) -> Result<()> {
    let db = JobDb::new(&server.db_path).context("Failed to initialize job database")?;
    let store = DbHandle::new(db);
    let notifier = Notifier::new();
    let client = automation::from_config(&config.toml)?;

    let state = Arc::new(AppState {
        orchestrator: DeployOrchestrator::new(store.clone(), client, notifier.clone()),
        store,
        notifier,
        webhook_secret: config
            .toml
            .dashboard
            .webhook_secret
            .as_deref()
            .map(Arc::from),
    });
    if state.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET_KEY is not set; deployment-status callbacks will be rejected");
    }

    let app = build_router(state).layer(cors_layer(server.allowed_origins.as_deref()));

    let addr = format!("{}:{}", server.host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, db = %server.db_path.display(), "Dashboard server listening");
    println!("Ghost Hunter dashboard running at http://{}", local_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    println!("Server shut down gracefully.");
    Ok(())
}

pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C; shutting down");
    }
    println!("\nShutting down...");
}
