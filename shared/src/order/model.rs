//! Order, return and shipment records

use super::types::{OrderStatus, PriceType, ProductType, ReturnStatus};
use serde::{Deserialize, Serialize};

/// Last accepted buy or bid
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuyInfo {
    pub buyer: String,
    /// Amount paid or bid
    pub value: f64,
    /// Server time the buy/bid was accepted (millis)
    pub server_time: i64,
}

/// A live listing and its transaction record
///
/// Closed orders (terminal status) share this shape; they live in the
/// closed-order archive with `complete_time` set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub product_id: i64,
    pub seller: String,
    /// Empty until a buy/bid lands
    pub buyer: String,
    pub price_type: PriceType,
    /// Frozen at sell time
    pub product_type: ProductType,
    pub status: OrderStatus,
    /// Asking price, or winning bid for auctions
    pub price_value: f64,
    pub chain_id: String,
    pub duration_seconds: i64,
    /// Millis
    pub server_start_time: i64,
    /// Millis, set when the order is closed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complete_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_info: Option<BuyInfo>,
    /// Seller's shipment record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub express_id: Option<i64>,
    /// Set when an auction timeout asked the chain to settle
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settle_requested_at: Option<i64>,
    /// Last error reported by the chain for a cancel
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_error: Option<String>,
}

impl Order {
    /// Millis at which the listing stops accepting buyers
    pub fn deadline(&self) -> i64 {
        self.server_start_time + self.duration_seconds * 1000
    }

    pub fn is_expired(&self, now: i64) -> bool {
        now > self.deadline()
    }
}

/// Shipment record (carrier + tracking number)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Express {
    pub id: i64,
    pub company: String,
    pub number: String,
    /// Millis
    pub started_at: i64,
}

/// Shipment details supplied by the shipper
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpressDraft {
    pub company: String,
    pub number: String,
}

/// Buyer's request to return a delivered item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnRequest {
    pub id: String,
    pub order_id: String,
    pub status: ReturnStatus,
    pub description: String,
    /// Uploaded picture URLs; an empty string marks a failed upload
    pub images: Vec<String>,
    pub ask_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agree_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirm_time: Option<i64>,
    /// Return shipment record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub express_id: Option<i64>,
}

/// Order plus its shipment and return records, resolved by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order: Order,
    /// Whether the order has left the live set
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub express: Option<Express>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_request: Option<ReturnRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_express: Option<Express>,
}
