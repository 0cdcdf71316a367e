mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use circle_api::storage::Storage;
use circle_api::{AppState, AppStateInner};
use circle_gateway::{Dispatcher, PresenceTracker};

use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circle=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;

    // Init database
    let db = Arc::new(circle_db::Database::open(&config.db_path)?);

    // Shared state
    let dispatcher = Dispatcher::new();
    let presence = PresenceTracker::with_ttl(db.clone(), dispatcher.clone(), config.presence_ttl);
    let storage = Storage::new(config.storage_dir.clone(), &config.storage_base_url()).await?;

    let state: AppState = Arc::new(AppStateInner {
        db,
        dispatcher,
        presence,
        storage,
        jwt_secret: config.jwt_secret.clone(),
    });

    let app = circle_api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Circle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Circle server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
