//! order-server: order lifecycle service
//!
//! Long-running service that:
//! - Accepts listing, bidding, shipping and return commands (JWT authenticated)
//! - Notifies the settlement chain and applies its callbacks
//! - Expires listings and settles auctions on schedule

use order_server::api;
use order_server::config::Config;
use order_server::logger;
use order_server::orders::ExpiryScheduler;
use order_server::state::AppState;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    let _log_guard = logger::init_logger(config.log_json, config.log_dir.as_deref());

    tracing::info!(
        "Starting order-server (env: {}, store: {:?}, test_mode: {})",
        config.environment,
        config.store_backend,
        config.test_mode
    );

    let shutdown = CancellationToken::new();

    // Initialize application state
    let state = AppState::new(&config, &shutdown).await?;

    // Expire listings and settle auctions
    let scheduler = ExpiryScheduler::new(
        state.coordinator.clone(),
        config.expiry_scan_interval,
        shutdown.clone(),
    );
    let scheduler_handle = tokio::spawn(scheduler.run());

    let app = api::create_router(state);
    let http_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("order-server HTTP listening on {http_addr}");

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {e}");
            }
            tracing::info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    scheduler_handle.await?;
    tracing::info!("order-server stopped");
    Ok(())
}
