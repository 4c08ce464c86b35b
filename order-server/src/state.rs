//! Application state for order-server

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogClient, HttpCatalogClient};
use crate::chain::{HttpChainNotifier, LoopbackNotifier, SettlementNotifier, spawn_settler};
use crate::config::{Config, StoreBackend};
use crate::db::{MemoryOrderStore, OrderStore, PgOrderStore};
use crate::orders::OrderCoordinator;
use crate::pictures::{HttpPictureUploader, PictureUploader};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<OrderCoordinator>,
    /// JWT secret for user authentication
    pub jwt_secret: String,
    /// Expected `X-Chain-Secret`; `None` leaves chain routes open
    pub chain_secret: Option<String>,
    pub request_timeout: Duration,
}

impl AppState {
    /// Wire the store, outbound clients and coordinator from configuration
    ///
    /// In test mode the loopback settler is spawned here and stops when
    /// `shutdown` is cancelled.
    pub async fn new(config: &Config, shutdown: &CancellationToken) -> Result<Self, BoxError> {
        let store: Arc<dyn OrderStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let url = config
                    .database_url
                    .as_deref()
                    .ok_or("DATABASE_URL must be set")?;
                let pool = PgPoolOptions::new()
                    .max_connections(config.db_max_connections)
                    .acquire_timeout(Duration::from_secs(5))
                    .connect(url)
                    .await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("Database connected and migrations applied");
                Arc::new(PgOrderStore::new(pool))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory order store; data is lost on restart");
                Arc::new(MemoryOrderStore::new())
            }
        };

        let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalogClient::new(
            &config.catalog_endpoint,
            config.notify_timeout,
        )?);
        let pictures: Arc<dyn PictureUploader> = Arc::new(HttpPictureUploader::new(
            &config.picture_endpoint,
            config.notify_timeout,
        )?);

        let coordinator = if config.test_mode {
            tracing::warn!("TEST_MODE enabled: settlement is answered locally");
            let (notifier, rx) = LoopbackNotifier::channel();
            let coordinator = Arc::new(OrderCoordinator::new(
                store,
                Arc::new(notifier),
                catalog,
                pictures,
                config.max_duration_secs,
            ));
            spawn_settler(rx, coordinator.clone(), shutdown.clone());
            coordinator
        } else {
            let notifier: Arc<dyn SettlementNotifier> = Arc::new(HttpChainNotifier::new(
                &config.chain_endpoint,
                config.notify_timeout,
                config.notify_max_attempts,
                config.notify_retry_base,
            )?);
            Arc::new(OrderCoordinator::new(
                store,
                notifier,
                catalog,
                pictures,
                config.max_duration_secs,
            ))
        };

        Ok(Self::from_parts(coordinator, config))
    }

    pub fn from_parts(coordinator: Arc<OrderCoordinator>, config: &Config) -> Self {
        Self {
            coordinator,
            jwt_secret: config.jwt_secret.clone(),
            chain_secret: config.chain_callback_secret.clone(),
            request_timeout: config.request_timeout,
        }
    }
}
