//! dockyard API server

use anyhow::Context;
use dockyard_api::{AppState, routes};
use dockyard_config::load_app_config;
use dockyard_store::InMemoryParameterStore;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("DOCKYARD_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("dockyard.kdl"));
    let config = load_app_config(&config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    info!(namespace = %config.namespace, config = %config_path.display(), "Loaded configuration");

    let state = AppState::provision(config, Arc::new(InMemoryParameterStore::new()))
        .await
        .context("failed to provision units")?;

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr: SocketAddr = std::env::var("DOCKYARD_BIND")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()
        .context("DOCKYARD_BIND must be a socket address")?;
    info!("Starting server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
