//! Settlement notifier
//!
//! Outbound requests to the settlement authority ("the chain"). The chain
//! answers confirm/cancel requests asynchronously through the callback
//! routes in [`crate::api::chain`].

pub mod http;
pub mod loopback;

pub use self::http::HttpChainNotifier;
pub use loopback::{LoopbackNotifier, spawn_settler};

use async_trait::async_trait;
use serde::Serialize;
use shared::order::ProductType;
use thiserror::Error;

/// A request sent to the chain, keyed by the order's chain id
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChainRequest {
    StartToSell {
        chain_id: String,
        price: f64,
        product_type: ProductType,
    },
    StopSelling {
        chain_id: String,
    },
    UpdateBid {
        chain_id: String,
        buyer: String,
        price: f64,
    },
    ConfirmOrder {
        chain_id: String,
    },
    CancelOrder {
        chain_id: String,
    },
}

impl ChainRequest {
    /// Path segment of the chain endpoint
    pub fn action(&self) -> &'static str {
        match self {
            ChainRequest::StartToSell { .. } => "start_to_sell",
            ChainRequest::StopSelling { .. } => "stop_selling",
            ChainRequest::UpdateBid { .. } => "update_bid",
            ChainRequest::ConfirmOrder { .. } => "confirm_order",
            ChainRequest::CancelOrder { .. } => "cancel_order",
        }
    }

    pub fn chain_id(&self) -> &str {
        match self {
            ChainRequest::StartToSell { chain_id, .. }
            | ChainRequest::StopSelling { chain_id }
            | ChainRequest::UpdateBid { chain_id, .. }
            | ChainRequest::ConfirmOrder { chain_id }
            | ChainRequest::CancelOrder { chain_id } => chain_id,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("chain transport error: {0}")]
    Transport(String),

    #[error("chain rejected {action}: HTTP {status}")]
    Rejected { action: &'static str, status: u16 },

    #[error("chain did not answer in time")]
    Timeout,

    #[error("settlement channel closed")]
    ChannelClosed,
}

impl NotifyError {
    /// Client errors are final; everything else may succeed on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(self, NotifyError::Rejected { status, .. } if (400..500).contains(status))
    }
}

/// Outbound port to the settlement authority
#[async_trait]
pub trait SettlementNotifier: Send + Sync {
    async fn notify(&self, request: ChainRequest) -> Result<(), NotifyError>;
}
