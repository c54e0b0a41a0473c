//! keeper server
//!
//! Serves the item API on `host` from `server_settings.yml` and runs the
//! mutation worker. On Ctrl-C the listener stops, the queue drains, and the
//! store is flushed.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use keeper::auth::TokenService;
use keeper::config::{ServerConfig, SERVER_SETTINGS_FILE};
use keeper::queue::MutationWorker;
use keeper::rest::create_router;
use keeper::service::Keeper;
use keeper::storage::{ServerStore, SledStorage};
use keeper::telemetry;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::load(SERVER_SETTINGS_FILE)?;
    let _guard = telemetry::init(config.log_json, telemetry::DEFAULT_FILTER);

    let storage = SledStorage::open(&config.db_location)?;
    let store: Arc<dyn ServerStore> = Arc::new(storage.clone());
    let (queue, worker) = MutationWorker::spawn(store.clone(), config.queue_capacity);
    let tokens = TokenService::new(&config.jwt_secret, config.token_ttl_minutes)?;
    let app = create_router(Keeper::new(store, tokens, queue));

    let listener = TcpListener::bind(&config.host).await?;
    info!(
        addr = %listener.local_addr()?,
        db = %config.db_location,
        queue_capacity = config.queue_capacity,
        "keeper server listening"
    );
    info!("OpenAPI UI at /api/v1/swagger");

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;
    if let Err(e) = &served {
        error!("server error: {}", e);
    }

    info!("draining mutation queue");
    let report = worker.shutdown().await;
    info!(applied = report.applied, failed = report.failed, "mutation worker stopped");
    storage.flush().await?;

    served?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
