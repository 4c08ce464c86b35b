//! Request / response bodies of the order API

use super::types::{ChainResult, OrderStatus, PriceType};
use super::Order;
use serde::{Deserialize, Serialize};

/// POST /api/orders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellRequest {
    pub product_id: i64,
    pub price_type: PriceType,
    /// Asking price (Fix) or starting price (Auction)
    pub price: f64,
    /// Listing validity in seconds; clamped to the platform maximum
    pub duration_seconds: Option<i64>,
    pub chain_id: String,
}

/// POST /api/orders/{id}/buy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyRequest {
    /// Bid amount; ignored for fixed-price orders
    #[serde(default)]
    pub value: Option<f64>,
}

/// POST /api/orders/{id}/ship and /return/ship
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipRequest {
    pub company: String,
    pub number: String,
}

/// POST /api/orders/{id}/return
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskReturnRequest {
    pub description: String,
    /// Base64-encoded pictures
    #[serde(default)]
    pub images: Vec<String>,
}

/// POST /api/chain/chainconfirm/{chain_id} and /chaincancel/{chain_id}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainCallbackRequest {
    pub result: ChainResult,
}

/// Response of a chain callback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainCallbackResponse {
    pub order_id: String,
    pub status: OrderStatus,
    /// True when the order had already been closed by an earlier callback
    pub already_closed: bool,
}

/// Response of a stop-selling command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopSellingResponse {
    pub order_id: String,
    pub deleted: bool,
}

/// Response of GET /api/orders/bought
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoughtOrders {
    pub live: Vec<Order>,
    pub closed: Vec<Order>,
}
