//! Unified error codes for the marketplace order core
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Authentication errors
//! - 2xxx: Permission errors
//! - 4xxx: Order errors
//! - 5xxx: Settlement (chain) errors
//! - 6xxx: Product errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Validation failed
    ValidationFailed = 2,

    // ==================== 1xxx: Auth ====================
    /// User is not authenticated
    NotAuthenticated = 1001,
    /// Token has expired
    TokenExpired = 1003,
    /// Token is invalid
    TokenInvalid = 1004,

    // ==================== 2xxx: Permission ====================
    /// Permission denied
    PermissionDenied = 2001,
    /// Only the seller of the order may do this
    SellerRequired = 2002,
    /// Only the buyer of the order may do this
    BuyerRequired = 2003,

    // ==================== 4xxx: Order ====================
    /// Order not found
    OrderNotFound = 4001,
    /// Order status forbids the requested transition
    OrderStateMismatch = 4002,
    /// Order has already been closed
    OrderAlreadyClosed = 4003,
    /// Bid does not exceed the current price
    BidTooLow = 4004,
    /// Listing duration has elapsed
    ListingExpired = 4005,
    /// Another live order already exists for the product
    ProductAlreadyListed = 4006,
    /// Chain id is already bound to another order
    ChainIdInUse = 4007,
    /// Auction is waiting for settlement and takes no more bids
    AuctionClosed = 4008,

    // ==================== 5xxx: Settlement ====================
    /// Settlement chain unreachable or rejected the request
    ChainUnavailable = 5001,
    /// Chain callback disagrees with the order's final status
    ChainResultConflict = 5002,

    // ==================== 6xxx: Product ====================
    /// Product not found in the catalog
    ProductNotFound = 6001,
    /// Product type may not be sold (show-only)
    ProductNotSellable = 6002,
    /// Catalog unreachable
    CatalogUnavailable = 6003,

    // ==================== 9xxx: System ====================
    /// Database error
    DatabaseError = 9002,
    /// Store unavailable (pool exhausted, connection lost)
    StoreUnavailable = 9404,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Default English message for this code
    pub const fn message(&self) -> &'static str {
        match self {
            // General
            ErrorCode::ValidationFailed => "Validation failed",

            // Auth
            ErrorCode::NotAuthenticated => "Authentication required",
            ErrorCode::TokenExpired => "Token has expired",
            ErrorCode::TokenInvalid => "Token is invalid",

            // Permission
            ErrorCode::PermissionDenied => "Permission denied",
            ErrorCode::SellerRequired => "Only the seller can do this",
            ErrorCode::BuyerRequired => "Only the buyer can do this",

            // Order
            ErrorCode::OrderNotFound => "No such order",
            ErrorCode::OrderStateMismatch => "Order is not in a state that allows this",
            ErrorCode::OrderAlreadyClosed => "Order is already closed",
            ErrorCode::BidTooLow => "Bid must be higher than the current price",
            ErrorCode::ListingExpired => "Listing has expired",
            ErrorCode::ProductAlreadyListed => "Product is already on sale",
            ErrorCode::ChainIdInUse => "Chain id is already in use",
            ErrorCode::AuctionClosed => "Auction has ended",

            // Settlement
            ErrorCode::ChainUnavailable => "Settlement chain unavailable",
            ErrorCode::ChainResultConflict => "Chain result conflicts with the closed order",

            // Product
            ErrorCode::ProductNotFound => "Product not found",
            ErrorCode::ProductNotSellable => "Show-only products cannot be sold",
            ErrorCode::CatalogUnavailable => "Product catalog unavailable",

            // System
            ErrorCode::DatabaseError => "Database error",
            ErrorCode::StoreUnavailable => "Storage unavailable, please retry later",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Error when converting from an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            // General
            2 => Ok(ErrorCode::ValidationFailed),

            // Auth
            1001 => Ok(ErrorCode::NotAuthenticated),
            1003 => Ok(ErrorCode::TokenExpired),
            1004 => Ok(ErrorCode::TokenInvalid),

            // Permission
            2001 => Ok(ErrorCode::PermissionDenied),
            2002 => Ok(ErrorCode::SellerRequired),
            2003 => Ok(ErrorCode::BuyerRequired),

            // Order
            4001 => Ok(ErrorCode::OrderNotFound),
            4002 => Ok(ErrorCode::OrderStateMismatch),
            4003 => Ok(ErrorCode::OrderAlreadyClosed),
            4004 => Ok(ErrorCode::BidTooLow),
            4005 => Ok(ErrorCode::ListingExpired),
            4006 => Ok(ErrorCode::ProductAlreadyListed),
            4007 => Ok(ErrorCode::ChainIdInUse),
            4008 => Ok(ErrorCode::AuctionClosed),

            // Settlement
            5001 => Ok(ErrorCode::ChainUnavailable),
            5002 => Ok(ErrorCode::ChainResultConflict),

            // Product
            6001 => Ok(ErrorCode::ProductNotFound),
            6002 => Ok(ErrorCode::ProductNotSellable),
            6003 => Ok(ErrorCode::CatalogUnavailable),

            // System
            9002 => Ok(ErrorCode::DatabaseError),
            9404 => Ok(ErrorCode::StoreUnavailable),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}
