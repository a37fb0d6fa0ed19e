//! `WaRelay` Server - Main Entry Point

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use wr_server::store::{
    FileSessionStore, PgRecordStore, PgSessionStore, Repository, SessionStore,
};
use wr_server::tasks::BackgroundTasks;
use wr_server::webhooks::WebhookDispatcher;
use wr_server::whatsapp::{BridgeConnector, MonitorDeps, WaMonitor};
use wr_server::{api, config, db};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wr_server=debug,tower_http=debug".into()),
        )
        .json()
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting WaRelay Server"
    );

    // Record store and session store
    let file_sessions = || -> Arc<dyn SessionStore> {
        Arc::new(FileSessionStore::new(
            config.instance_dir.clone(),
            &config.store_dir,
        ))
    };
    let (repository, sessions) = if config.database.enabled {
        let url = config
            .database
            .url
            .as_deref()
            .context("DATABASE_URL is required when DATABASE_ENABLED=true")?;
        let pool = db::create_pool(url).await?;
        db::run_migrations(&pool).await?;

        let save = config.database.save;
        let sessions: Arc<dyn SessionStore> = if save.instance {
            Arc::new(PgSessionStore::new(pool.clone()))
        } else {
            file_sessions()
        };
        (
            Repository::new(Arc::new(PgRecordStore::new(pool)), save),
            sessions,
        )
    } else {
        info!("Database disabled, records will not be persisted");
        (Repository::disabled(), file_sessions())
    };

    let tasks = BackgroundTasks::new();
    let monitor = WaMonitor::start(
        MonitorDeps {
            connector: Arc::new(BridgeConnector::new(config.session.bridge_url.clone())),
            sessions,
            repository,
            webhooks: WebhookDispatcher::new(&config.webhook),
            tasks,
        },
        &config,
    );

    // Reconnect every instance with stored credentials
    if let Err(e) = monitor.load_instances().await {
        warn!(error = %e, "Failed to restore instances");
    }

    // Build router
    let state = api::AppState::new(monitor.clone(), config.clone());
    let app = api::create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");

    // Graceful shutdown handler
    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Received shutdown signal, cleaning up...");
    };

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await?;

    monitor.shutdown().await;
    info!("Server shutdown complete");

    Ok(())
}
