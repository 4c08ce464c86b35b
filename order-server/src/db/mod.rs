//! Order store
//!
//! [`OrderStore`] is the serialisation point of the order core. Every
//! mutating primitive is one atomic unit: it re-reads the order under a
//! lock, checks the status the caller expects, writes order + express +
//! return rows together and commits. Two implementations:
//!
//! - [`PgOrderStore`]: PostgreSQL (`orders`, `closed_orders`, `returns`,
//!   `express`), row locks via `SELECT … FOR UPDATE`
//! - [`MemoryOrderStore`]: one mutex over hash maps, for tests and local runs

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PgOrderStore;

use async_trait::async_trait;
use shared::order::{
    BuyInfo, Express, ExpressDraft, Order, OrderStatus, ReturnRequest, ReturnStatus,
};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    #[error("Order {order_id} is {observed}, expected {expected}")]
    Stale {
        order_id: String,
        expected: OrderStatus,
        observed: OrderStatus,
    },

    #[error("Transition {from} -> {to} is not allowed")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Bid {offered} does not beat {current} on order {order_id}")]
    Outbid {
        order_id: String,
        offered: f64,
        current: f64,
    },

    #[error("Auction {0} is already settling")]
    Settling(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether the failure is transient (pool exhausted, connection lost)
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Database(
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            )
        )
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Which shipment a new express record belongs to
#[derive(Debug, Clone, PartialEq)]
pub enum Shipment {
    /// Seller → buyer
    Order(ExpressDraft),
    /// Buyer → seller (return)
    Return(ExpressDraft),
}

/// Return-request write performed together with an order transition
#[derive(Debug, Clone, PartialEq)]
pub enum ReturnChange {
    Open(ReturnRequest),
    /// Move the return to `status`, stamping the matching time field
    Advance { status: ReturnStatus, at: i64 },
}

/// A validated status transition with its embedded updates
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub to: OrderStatus,
    /// New top bid / purchase: rewrites buyer, buy_info and price_value
    pub bid: Option<BuyInfo>,
    /// The bid must beat the stored price of an auction that is not settling
    pub must_outbid: bool,
    pub shipment: Option<Shipment>,
    pub return_change: Option<ReturnChange>,
    pub settle_requested_at: Option<i64>,
    /// Server time of the command (millis)
    pub at: i64,
}

impl StatusChange {
    pub fn to(status: OrderStatus, at: i64) -> Self {
        Self {
            to: status,
            bid: None,
            must_outbid: false,
            shipment: None,
            return_change: None,
            settle_requested_at: None,
            at,
        }
    }

    pub fn with_bid(mut self, bid: BuyInfo) -> Self {
        self.bid = Some(bid);
        self
    }

    /// Auction bid: re-checked against the locked row, not the planned copy
    pub fn with_outbid(mut self, bid: BuyInfo) -> Self {
        self.bid = Some(bid);
        self.must_outbid = true;
        self
    }

    pub fn with_shipment(mut self, shipment: Shipment) -> Self {
        self.shipment = Some(shipment);
        self
    }

    pub fn with_return(mut self, change: ReturnChange) -> Self {
        self.return_change = Some(change);
        self
    }

    pub fn with_settle_request(mut self) -> Self {
        self.settle_requested_at = Some(self.at);
        self
    }
}

/// Terminal move into the closed-order archive
#[derive(Debug, Clone, PartialEq)]
pub struct Closing {
    pub status: OrderStatus,
    pub return_change: Option<ReturnChange>,
    pub complete_time: i64,
}

/// Durable storage of live orders, closed orders, returns and shipments
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>>;

    /// Live order bound to `chain_id` (unique among live orders)
    async fn find_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>>;

    async fn find_by_product_id(&self, product_id: i64) -> StoreResult<Option<Order>>;

    async fn find_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>>;

    async fn find_by_seller(&self, seller: &str) -> StoreResult<Vec<Order>>;

    /// All live orders, newest first
    async fn list_live(&self) -> StoreResult<Vec<Order>>;

    async fn find_closed_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>>;

    async fn find_closed_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>>;

    async fn find_closed_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>>;

    /// Insert a new live order
    ///
    /// Fails with [`StoreError::Duplicate`] on a duplicate id, a product that
    /// already has a live order, or a chain id used by any live or closed order.
    async fn insert(&self, order: &Order) -> StoreResult<()>;

    /// Apply `change` if the order is still in `expected`
    async fn update_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order>;

    /// Delete a listing; the order must be in `None`
    async fn delete(&self, order_id: &str) -> StoreResult<Order>;

    /// Move the order to `closed_orders` with a terminal status
    async fn close(&self, order_id: &str, expected: OrderStatus, closing: Closing)
    -> StoreResult<Order>;

    /// Record a chain failure without changing the status
    async fn record_chain_error(
        &self,
        order_id: &str,
        expected: OrderStatus,
        message: &str,
    ) -> StoreResult<Order>;

    async fn find_return(&self, order_id: &str) -> StoreResult<Option<ReturnRequest>>;

    async fn find_express(&self, express_id: i64) -> StoreResult<Option<Express>>;
}

/// Re-check an order under lock before writing
///
/// The coordinator has already validated the transition; this guards
/// against concurrent writers and against regressions.
pub(crate) fn guard_transition(
    current: &Order,
    expected: OrderStatus,
    to: OrderStatus,
) -> StoreResult<()> {
    if current.status != expected {
        return Err(StoreError::Stale {
            order_id: current.id.clone(),
            expected,
            observed: current.status,
        });
    }
    if !expected.can_advance_to(to) {
        return Err(StoreError::InvalidTransition { from: expected, to });
    }
    Ok(())
}

/// [`guard_transition`] plus the auction checks a bid or settle request
/// needs against the row as it is now
pub(crate) fn guard_change(
    current: &Order,
    expected: OrderStatus,
    change: &StatusChange,
) -> StoreResult<()> {
    guard_transition(current, expected, change.to)?;

    let settling = current.settle_requested_at.is_some();
    if settling && (change.must_outbid || change.settle_requested_at.is_some()) {
        return Err(StoreError::Settling(current.id.clone()));
    }
    if change.must_outbid
        && let Some(bid) = &change.bid
        && bid.value <= current.price_value
    {
        return Err(StoreError::Outbid {
            order_id: current.id.clone(),
            offered: bid.value,
            current: current.price_value,
        });
    }
    Ok(())
}

pub(crate) fn guard_status(current: &Order, expected: OrderStatus) -> StoreResult<()> {
    if current.status != expected {
        return Err(StoreError::Stale {
            order_id: current.id.clone(),
            expected,
            observed: current.status,
        });
    }
    Ok(())
}

/// Apply the order-row part of a change in memory
pub(crate) fn apply_change(order: &mut Order, change: &StatusChange, express_id: Option<i64>) {
    order.status = change.to;
    if let Some(bid) = &change.bid {
        order.buyer = bid.buyer.clone();
        order.price_value = bid.value;
        order.buy_info = Some(bid.clone());
    }
    if let Some(Shipment::Order(_)) = change.shipment {
        order.express_id = express_id;
    }
    if change.settle_requested_at.is_some() {
        order.settle_requested_at = change.settle_requested_at;
    }
}

/// Advance a return in memory, stamping the matching time field
pub(crate) fn apply_return_status(rr: &mut ReturnRequest, status: ReturnStatus, at: i64) {
    rr.status = status;
    match status {
        ReturnStatus::Agreed => rr.agree_time = Some(at),
        ReturnStatus::Confirmed => rr.confirm_time = Some(at),
        _ => {}
    }
}
