//! Listing expiry scheduler
//!
//! Periodically scans live orders and issues `Timeout` for listings whose
//! duration has elapsed.

use shared::order::{Order, OrderStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::{OrderCoordinator, OrderError};

/// Whether the scheduler should time `order` out at `now`
pub fn due_for_timeout(order: &Order, now: i64) -> bool {
    if !order.is_expired(now) {
        return false;
    }
    match order.status {
        OrderStatus::None => true,
        OrderStatus::InAuction => order.settle_requested_at.is_none(),
        _ => false,
    }
}

pub struct ExpiryScheduler {
    coordinator: Arc<OrderCoordinator>,
    interval: Duration,
    shutdown: CancellationToken,
}

impl ExpiryScheduler {
    pub fn new(
        coordinator: Arc<OrderCoordinator>,
        interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            interval,
            shutdown,
        }
    }

    /// Run until the shutdown token is cancelled
    pub async fn run(self) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Expiry scheduler started"
        );
        let mut tick = tokio::time::interval(self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    tracing::info!("Expiry scheduler shutting down");
                    break;
                }
                _ = tick.tick() => {
                    let expired = self.scan_once().await;
                    if expired > 0 {
                        tracing::debug!(expired, "Expiry scan finished");
                    }
                }
            }
        }
    }

    /// One pass over the live orders; returns how many timeouts committed
    pub async fn scan_once(&self) -> usize {
        let orders = match self.coordinator.get_orders_in_transaction().await {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!("Expiry scan could not list live orders: {e}");
                return 0;
            }
        };

        let now = self.coordinator.now();
        let mut expired = 0;
        for order in orders.iter().filter(|o| due_for_timeout(o, now)) {
            match self.coordinator.timeout(&order.id).await {
                Ok(_) => expired += 1,
                // a buyer or another scan got there first
                Err(
                    OrderError::StateMismatch { .. }
                    | OrderError::AlreadyClosed { .. }
                    | OrderError::NotFound(_),
                ) => {
                    tracing::debug!(order_id = %order.id, "Order changed before timeout")
                }
                // the transition stands, only the chain call failed
                Err(e @ OrderError::Notify { .. }) => {
                    expired += 1;
                    tracing::error!(order_id = %order.id, "Timeout committed, notify failed: {e}")
                }
                Err(e) => tracing::error!(order_id = %order.id, "Timeout failed: {e}"),
            }
        }
        expired
    }
}
