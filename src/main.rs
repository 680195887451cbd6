use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use air_monitor_service::{
    api::{self, AppState},
    backend::BackendClient,
    config::Config,
    history::{HistoryService, LastQueryStore},
    live_buffer::LiveBuffer,
    snapshots::SnapshotService,
    telemetry::{StatusHandle, TelemetryClient},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Live telemetry window plus the shared connection status readers poll
    let buffer = LiveBuffer::new(config.live_buffer_capacity);
    let status = StatusHandle::new();

    // Start the broker subscription; failures show up as status changes,
    // never as startup errors.
    let telemetry = TelemetryClient::new(&config, buffer.clone(), status.clone());
    telemetry.connect().await;

    // Durable store client shared by the history and snapshot services
    let backend = BackendClient::new(&config.backend_base_url)?;
    let last_query = LastQueryStore::new();
    let history = HistoryService::new(backend.clone(), &config.mqtt_topic, last_query.clone());
    let snapshots = SnapshotService::new(backend);

    let state = AppState {
        buffer,
        status,
        history,
        snapshots,
        last_query,
    };

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The session task must be gone before the process exits so no
    // callback outlives the rest of the program.
    telemetry.disconnect().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
