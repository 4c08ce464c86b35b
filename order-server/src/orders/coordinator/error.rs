use shared::error::{AppError, ErrorCode};
use shared::order::{ChainResult, OrderStatus};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::chain::NotifyError;
use crate::db::StoreError;

/// Coordinator errors
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("No order for chain id {0}")]
    ChainIdNotFound(String),

    #[error("No live order for product {0}")]
    ProductNotListed(i64),

    #[error("Order {order_id} is {observed}")]
    StateMismatch {
        order_id: String,
        observed: OrderStatus,
    },

    #[error("Order {order_id} is already closed as {status}")]
    AlreadyClosed {
        order_id: String,
        status: OrderStatus,
    },

    #[error("{0}")]
    Validation(String),

    #[error("Bid must exceed {current}")]
    BidTooLow { current: f64 },

    #[error("Listing {0} has expired")]
    ListingExpired(String),

    #[error("Auction {0} is settling")]
    AuctionClosed(String),

    #[error("Product {0} already has a live order")]
    ProductAlreadyListed(i64),

    #[error("Chain id {0} is already in use")]
    ChainIdInUse(String),

    #[error("Chain reported {reported} for order {order_id}, already closed as {status}")]
    ChainConflict {
        order_id: String,
        status: OrderStatus,
        reported: ChainResult,
    },

    #[error("Only the seller may {0}")]
    SellerRequired(&'static str),

    #[error("Only the buyer may {0}")]
    BuyerRequired(&'static str),

    #[error("Sellers cannot buy their own listing")]
    OwnListing,

    #[error("Product {0} is not owned by the caller")]
    NotProductOwner(i64),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Product {0} is display only")]
    ProductNotSellable(i64),

    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The transition committed, the chain was not told
    #[error("Chain notify failed for order {order_id} (committed {committed}): {source}")]
    Notify {
        order_id: String,
        committed: String,
        #[source]
        source: NotifyError,
    },

    #[error("Store error: {0}")]
    Store(StoreError),
}

pub type OrderResult<T> = Result<T, OrderError>;

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::OrderNotFound(id) => OrderError::NotFound(id),
            StoreError::Stale {
                order_id, observed, ..
            } => OrderError::StateMismatch { order_id, observed },
            StoreError::Outbid { current, .. } => OrderError::BidTooLow { current },
            StoreError::Settling(order_id) => OrderError::AuctionClosed(order_id),
            StoreError::Duplicate {
                field: "chain_id",
                value,
            } => OrderError::ChainIdInUse(value),
            StoreError::Duplicate {
                field: "product_id",
                value,
            } => match value.parse() {
                Ok(product_id) => OrderError::ProductAlreadyListed(product_id),
                Err(_) => OrderError::Store(StoreError::Duplicate {
                    field: "product_id",
                    value,
                }),
            },
            other => OrderError::Store(other),
        }
    }
}

impl From<CatalogError> for OrderError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(product_id) => OrderError::ProductNotFound(product_id),
            CatalogError::Unavailable(msg) => OrderError::Catalog(msg),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::NotFound(_)
            | OrderError::ChainIdNotFound(_)
            | OrderError::ProductNotListed(_) => {
                AppError::with_message(ErrorCode::OrderNotFound, message)
            }
            OrderError::StateMismatch { observed, .. } => {
                AppError::with_message(ErrorCode::OrderStateMismatch, message)
                    .with_detail("observed_status", observed.as_str())
            }
            OrderError::AlreadyClosed { status, .. } => {
                AppError::with_message(ErrorCode::OrderAlreadyClosed, message)
                    .with_detail("observed_status", status.as_str())
            }
            OrderError::Validation(_) => AppError::validation(message),
            OrderError::BidTooLow { current } => {
                AppError::with_message(ErrorCode::BidTooLow, message)
                    .with_detail("current_price", current)
            }
            OrderError::ListingExpired(_) => {
                AppError::with_message(ErrorCode::ListingExpired, message)
            }
            OrderError::AuctionClosed(_) => AppError::with_message(ErrorCode::AuctionClosed, message),
            OrderError::ProductAlreadyListed(_) => {
                AppError::with_message(ErrorCode::ProductAlreadyListed, message)
            }
            OrderError::ChainIdInUse(_) => AppError::with_message(ErrorCode::ChainIdInUse, message),
            OrderError::ChainConflict { status, .. } => {
                AppError::with_message(ErrorCode::ChainResultConflict, message)
                    .with_detail("closed_status", status.as_str())
            }
            OrderError::SellerRequired(_) => {
                AppError::with_message(ErrorCode::SellerRequired, message)
            }
            OrderError::BuyerRequired(_) => {
                AppError::with_message(ErrorCode::BuyerRequired, message)
            }
            OrderError::OwnListing | OrderError::NotProductOwner(_) => {
                AppError::permission_denied(message)
            }
            OrderError::ProductNotFound(_) => {
                AppError::with_message(ErrorCode::ProductNotFound, message)
            }
            OrderError::ProductNotSellable(_) => {
                AppError::with_message(ErrorCode::ProductNotSellable, message)
            }
            OrderError::Catalog(cause) => {
                tracing::error!("Catalog dependency failure: {cause}");
                AppError::with_message(ErrorCode::CatalogUnavailable, "Catalog unavailable")
            }
            OrderError::Notify {
                order_id,
                committed,
                source,
            } => {
                tracing::error!(
                    order_id = %order_id,
                    committed = %committed,
                    "Chain notify failed after commit: {source}"
                );
                AppError::with_message(ErrorCode::ChainUnavailable, "Settlement chain unavailable")
                    .with_detail("order_id", order_id)
                    .with_detail("committed_status", committed)
            }
            OrderError::Store(e) if e.is_unavailable() => {
                tracing::error!("Store unavailable: {e}");
                AppError::new(ErrorCode::StoreUnavailable)
            }
            OrderError::Store(e) => {
                tracing::error!("Store error: {e}");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn test_stale_store_write_becomes_state_mismatch() {
        let err: OrderError = StoreError::Stale {
            order_id: "o-1".into(),
            expected: OrderStatus::None,
            observed: OrderStatus::InFix,
        }
        .into();
        let app: AppError = err.into();
        assert_eq!(app.http_status(), StatusCode::CONFLICT);
        assert_eq!(app.code, ErrorCode::OrderStateMismatch);
        let details = app.details.unwrap();
        assert_eq!(details["observed_status"], "IN_FIX");
    }

    #[test]
    fn test_closed_order_keeps_its_own_code() {
        let app: AppError = OrderError::AlreadyClosed {
            order_id: "o-1".into(),
            status: OrderStatus::Completed,
        }
        .into();
        assert_eq!(app.http_status(), StatusCode::CONFLICT);
        assert_eq!(app.code, ErrorCode::OrderAlreadyClosed);
        assert_eq!(app.details.unwrap()["observed_status"], "COMPLETED");
    }

    #[test]
    fn test_duplicate_keys_map_to_conflicts() {
        let chain: OrderError = StoreError::Duplicate {
            field: "chain_id",
            value: "c-1".into(),
        }
        .into();
        assert!(matches!(chain, OrderError::ChainIdInUse(ref id) if id == "c-1"));

        let product: OrderError = StoreError::Duplicate {
            field: "product_id",
            value: "42".into(),
        }
        .into();
        assert!(matches!(product, OrderError::ProductAlreadyListed(42)));
        assert_eq!(AppError::from(product).http_status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_notify_failure_reports_committed_status() {
        let app: AppError = OrderError::Notify {
            order_id: "o-1".into(),
            committed: "IN_FIX".into(),
            source: NotifyError::Timeout,
        }
        .into();
        assert_eq!(app.http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(app.details.unwrap()["committed_status"], "IN_FIX");
    }

    #[test]
    fn test_actor_errors_are_forbidden() {
        for err in [
            OrderError::SellerRequired("ship"),
            OrderError::BuyerRequired("confirm"),
            OrderError::OwnListing,
        ] {
            assert_eq!(AppError::from(err).http_status(), StatusCode::FORBIDDEN);
        }
    }
}
