mod backend;
mod config;
mod error;
mod routes;
mod state;
mod upload;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::ServerConfig;
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("roomdrop-server starting");

    let config = ServerConfig::from_env()?;
    let backend_name = config.backend.name();
    let storage = backend::from_config(&config.backend);
    info!(backend = backend_name, keyspace = ?storage.keyspace(), "Storage backend selected");

    let state = Arc::new(AppState::new(storage, backend_name));
    let app = routes::build_router(state, config.max_upload_bytes).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(port = config.port, "Listening on http://0.0.0.0:{}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = signal::ctrl_c().await;
            info!("Received shutdown signal");
        })
        .await?;

    info!("roomdrop-server stopped");
    Ok(())
}
