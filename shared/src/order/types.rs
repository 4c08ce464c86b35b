//! Enumerations of the order lifecycle
//!
//! Every enum serialises as SCREAMING_SNAKE_CASE, both on the wire and in
//! the TEXT columns of the order tables (see [`as_str`](OrderStatus::as_str)).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a stored or transmitted enum value is unknown
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! text_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            /// Stable text form (wire and storage)
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(ParseEnumError {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

// ============================================================================
// Price / Product Types
// ============================================================================

/// 定价方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriceType {
    /// Fixed asking price, first buyer wins
    Fix,
    /// Auction, last valid bid wins
    Auction,
}

text_enum!(PriceType, "price type", { Fix => "FIX", Auction => "AUCTION" });

/// Product type as recorded in the catalog
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    /// Digital artwork, settles purely on chain
    Digit,
    /// Physical artwork, needs shipment and receipt confirmation
    Entity,
    /// Display only, can never be listed
    OnlyShow,
}

text_enum!(ProductType, "product type", {
    Digit => "DIGIT",
    Entity => "ENTITY",
    OnlyShow => "ONLY_SHOW",
});

impl ProductType {
    pub fn is_sellable(&self) -> bool {
        !matches!(self, Self::OnlyShow)
    }
}

// ============================================================================
// Order Status
// ============================================================================

/// Order lifecycle status
///
/// ```text
/// None ─┬─ Buy(Fix,Digit) ──► InFix ───────────────────────────┐
///       ├─ Buy(Fix,Entity) ─► Unshipped ─► Dispatched ─┬─► DispatchConfirmed ─┤
///       └─ Buy(Auction) ───► InAuction ─┬► Unshipped   │                      ├─► Completed | Failed
///                            (rebid ↺)  └──────────────┼──────────────────────┘
///                                                      └─► ReturnInAgree ─► ReturnAgreed
///                                                          ─► ReturnDispatched ─► ReturnConfirmed ─► ReturnCompleted
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    None,
    InFix,
    InAuction,
    Unshipped,
    Dispatched,
    DispatchConfirmed,
    Completed,
    Failed,
    ReturnInAgree,
    ReturnAgreed,
    ReturnDispatched,
    ReturnConfirmed,
    ReturnCompleted,
}

text_enum!(OrderStatus, "order status", {
    None => "NONE",
    InFix => "IN_FIX",
    InAuction => "IN_AUCTION",
    Unshipped => "UNSHIPPED",
    Dispatched => "DISPATCHED",
    DispatchConfirmed => "DISPATCH_CONFIRMED",
    Completed => "COMPLETED",
    Failed => "FAILED",
    ReturnInAgree => "RETURN_IN_AGREE",
    ReturnAgreed => "RETURN_AGREED",
    ReturnDispatched => "RETURN_DISPATCHED",
    ReturnConfirmed => "RETURN_CONFIRMED",
    ReturnCompleted => "RETURN_COMPLETED",
});

impl OrderStatus {
    /// Terminal statuses live only in the closed-order archive
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::ReturnCompleted)
    }

    /// Statuses directly reachable from this one
    pub const fn successors(&self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            None => &[InFix, InAuction, Unshipped],
            InFix => &[Completed, Failed],
            InAuction => &[InAuction, Unshipped, Completed, Failed],
            Unshipped => &[Dispatched],
            Dispatched => &[DispatchConfirmed, ReturnInAgree],
            DispatchConfirmed => &[Completed, Failed],
            ReturnInAgree => &[ReturnAgreed],
            ReturnAgreed => &[ReturnDispatched],
            ReturnDispatched => &[ReturnConfirmed],
            ReturnConfirmed => &[ReturnCompleted],
            Completed | Failed | ReturnCompleted => &[],
        }
    }

    /// Whether `self → next` is an edge of the lifecycle DAG
    pub fn can_advance_to(&self, next: OrderStatus) -> bool {
        self.successors().contains(&next)
    }
}

// ============================================================================
// Return Status
// ============================================================================

/// Return request status, progressed in lockstep with the order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnStatus {
    AgreeRequested,
    Agreed,
    Dispatched,
    Confirmed,
    Completed,
}

text_enum!(ReturnStatus, "return status", {
    AgreeRequested => "AGREE_REQUESTED",
    Agreed => "AGREED",
    Dispatched => "DISPATCHED",
    Confirmed => "CONFIRMED",
    Completed => "COMPLETED",
});

// ============================================================================
// Chain Result
// ============================================================================

/// Outcome reported by the settlement chain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChainResult {
    Success,
    Fail,
}

text_enum!(ChainResult, "chain result", { Success => "success", Fail => "fail" });

impl ChainResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_round_trip() {
        for status in [
            OrderStatus::None,
            OrderStatus::DispatchConfirmed,
            OrderStatus::ReturnCompleted,
        ] {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("SHIPPED".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serde_matches_text_form() {
        let json = serde_json::to_string(&OrderStatus::ReturnInAgree).unwrap();
        assert_eq!(json, "\"RETURN_IN_AGREE\"");
        let json = serde_json::to_string(&ProductType::OnlyShow).unwrap();
        assert_eq!(json, format!("\"{}\"", ProductType::OnlyShow.as_str()));
        let result: ChainResult = serde_json::from_str("\"fail\"").unwrap();
        assert_eq!(result, ChainResult::Fail);
        assert_eq!(ChainResult::Fail.to_string(), "fail");
        assert_eq!("success".parse::<ChainResult>().unwrap(), ChainResult::Success);
    }

    #[test]
    fn test_terminal_statuses_have_no_successors() {
        for status in [
            OrderStatus::Completed,
            OrderStatus::Failed,
            OrderStatus::ReturnCompleted,
        ] {
            assert!(status.is_terminal());
            assert!(status.successors().is_empty());
        }
        assert!(!OrderStatus::ReturnConfirmed.is_terminal());
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(OrderStatus::None.can_advance_to(OrderStatus::InFix));
        assert!(OrderStatus::InAuction.can_advance_to(OrderStatus::InAuction));
        assert!(!OrderStatus::Dispatched.can_advance_to(OrderStatus::Unshipped));
        assert!(!OrderStatus::Unshipped.can_advance_to(OrderStatus::Unshipped));
        assert!(!OrderStatus::ReturnAgreed.can_advance_to(OrderStatus::ReturnInAgree));
    }

    #[test]
    fn test_only_show_is_not_sellable() {
        assert!(!ProductType::OnlyShow.is_sellable());
        assert!(ProductType::Digit.is_sellable());
    }
}
