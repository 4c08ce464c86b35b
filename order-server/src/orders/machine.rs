//! Order transition planner
//!
//! Pure function of `(price_type, product_type, status, action)`: decides
//! what a command does to an order without touching storage or the network.
//! The coordinator executes the returned [`Plan`].

use shared::order::{
    ChainResult, Order, OrderStatus, PriceType, ProductType, ReturnStatus,
};

use crate::chain::ChainRequest;

/// A command against an existing order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Buy (fixed price) or bid (auction); `value` is the bid amount
    Buy { value: f64 },
    Timeout,
    StopSelling,
    ShipProduct,
    ConfirmOrder,
    AskForReturn,
    AgreeReturn,
    ShipReturn,
    ConfirmReturn,
    ChainConfirm(ChainResult),
    ChainCancel(ChainResult),
}

/// Who may issue an action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Seller,
    Buyer,
    /// Anyone except the seller
    NotSeller,
    /// Scheduler or chain callback
    System,
}

impl Action {
    pub fn actor(&self) -> Actor {
        match self {
            Action::StopSelling
            | Action::ShipProduct
            | Action::AgreeReturn
            | Action::ConfirmReturn => Actor::Seller,
            Action::ConfirmOrder | Action::AskForReturn | Action::ShipReturn => Actor::Buyer,
            Action::Buy { .. } => Actor::NotSeller,
            Action::Timeout | Action::ChainConfirm(_) | Action::ChainCancel(_) => Actor::System,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Action::Buy { .. } => "buy",
            Action::Timeout => "timeout",
            Action::StopSelling => "stop_selling",
            Action::ShipProduct => "ship_product",
            Action::ConfirmOrder => "confirm_order",
            Action::AskForReturn => "ask_for_return",
            Action::AgreeReturn => "agree_return",
            Action::ShipReturn => "ship_return",
            Action::ConfirmReturn => "confirm_return",
            Action::ChainConfirm(_) => "chain_confirm",
            Action::ChainCancel(_) => "chain_cancel",
        }
    }
}

/// Storage effect of a plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    /// Stay live and move to `to`
    Transition {
        to: OrderStatus,
        /// Record the new top bid / purchase
        record_bid: bool,
        /// Stamp `settle_requested_at`
        request_settle: bool,
    },
    /// Remove the listing
    Delete,
    /// Move to the closed-order archive with a terminal status
    Close { to: OrderStatus },
    /// Keep the status, store the chain's failure
    RecordChainError,
}

/// Chain request to send after commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    StopSelling,
    UpdateBid,
    ConfirmOrder,
    CancelOrder,
}

impl Notify {
    /// Build the request from the order as committed
    pub fn request(self, order: &Order) -> ChainRequest {
        let chain_id = order.chain_id.clone();
        match self {
            Notify::StopSelling => ChainRequest::StopSelling { chain_id },
            Notify::UpdateBid => ChainRequest::UpdateBid {
                chain_id,
                buyer: order.buyer.clone(),
                price: order.price_value,
            },
            Notify::ConfirmOrder => ChainRequest::ConfirmOrder { chain_id },
            Notify::CancelOrder => ChainRequest::CancelOrder { chain_id },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plan {
    pub effect: Effect,
    /// Status the order's return request moves to alongside
    pub return_status: Option<ReturnStatus>,
    pub notify: Option<Notify>,
    /// Hand the product to the buyer in the catalog after commit
    pub transfer_ownership: bool,
}

impl Plan {
    fn transition(to: OrderStatus) -> Self {
        Self::with_effect(Effect::Transition {
            to,
            record_bid: false,
            request_settle: false,
        })
    }

    fn purchase(to: OrderStatus) -> Self {
        Self::with_effect(Effect::Transition {
            to,
            record_bid: true,
            request_settle: false,
        })
    }

    fn with_effect(effect: Effect) -> Self {
        Self {
            effect,
            return_status: None,
            notify: None,
            transfer_ownership: false,
        }
    }

    fn notify(mut self, notify: Notify) -> Self {
        self.notify = Some(notify);
        self
    }

    fn returning(mut self, status: ReturnStatus) -> Self {
        self.return_status = Some(status);
        self
    }

    /// Status the order holds after the plan commits (`None` if deleted)
    pub fn resulting_status(&self, current: OrderStatus) -> Option<OrderStatus> {
        match self.effect {
            Effect::Transition { to, .. } | Effect::Close { to } => Some(to),
            Effect::Delete => None,
            Effect::RecordChainError => Some(current),
        }
    }
}

/// Why a command cannot apply to an order
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    StateMismatch { observed: OrderStatus },
    /// Auction already asked the chain to settle
    AuctionClosed,
    BidTooLow { current: f64 },
}

/// Plan `action` against `order`
pub fn plan(order: &Order, action: Action) -> Result<Plan, Rejection> {
    use OrderStatus as S;

    let settling = order.settle_requested_at.is_some();

    let plan = match (action, order.price_type, order.product_type, order.status) {
        (Action::StopSelling, _, _, S::None) => Plan::with_effect(Effect::Delete)
            .notify(Notify::StopSelling),

        (Action::Buy { .. }, PriceType::Fix, ProductType::Digit, S::None) => {
            Plan::purchase(S::InFix).notify(Notify::ConfirmOrder)
        }
        (Action::Buy { .. }, PriceType::Fix, ProductType::Entity, S::None) => {
            Plan::purchase(S::Unshipped)
        }
        (Action::Buy { value }, PriceType::Auction, _, S::None | S::InAuction) => {
            if settling {
                return Err(Rejection::AuctionClosed);
            }
            if value <= order.price_value {
                return Err(Rejection::BidTooLow {
                    current: order.price_value,
                });
            }
            Plan::purchase(S::InAuction).notify(Notify::UpdateBid)
        }

        (Action::Timeout, PriceType::Auction, ProductType::Digit, S::InAuction) if !settling => {
            Plan::with_effect(Effect::Transition {
                to: S::InAuction,
                record_bid: false,
                request_settle: true,
            })
            .notify(Notify::ConfirmOrder)
        }
        (Action::Timeout, PriceType::Auction, ProductType::Entity, S::InAuction) => {
            Plan::transition(S::Unshipped)
        }
        (Action::Timeout, _, _, S::None) => {
            Plan::with_effect(Effect::Delete).notify(Notify::StopSelling)
        }

        (Action::ShipProduct, _, _, S::Unshipped) => Plan::transition(S::Dispatched),
        (Action::ConfirmOrder, _, _, S::Dispatched) => {
            Plan::transition(S::DispatchConfirmed).notify(Notify::ConfirmOrder)
        }

        (Action::AskForReturn, _, _, S::Dispatched) => {
            Plan::transition(S::ReturnInAgree).returning(ReturnStatus::AgreeRequested)
        }
        (Action::AgreeReturn, _, _, S::ReturnInAgree) => {
            Plan::transition(S::ReturnAgreed).returning(ReturnStatus::Agreed)
        }
        (Action::ShipReturn, _, _, S::ReturnAgreed) => {
            Plan::transition(S::ReturnDispatched).returning(ReturnStatus::Dispatched)
        }
        (Action::ConfirmReturn, _, _, S::ReturnDispatched) => Plan::transition(S::ReturnConfirmed)
            .returning(ReturnStatus::Confirmed)
            .notify(Notify::CancelOrder),

        (Action::ChainConfirm(result), _, _, S::InFix | S::DispatchConfirmed)
        | (Action::ChainConfirm(result), _, ProductType::Digit, S::InAuction) => {
            if result.is_success() {
                Plan {
                    transfer_ownership: true,
                    ..Plan::with_effect(Effect::Close { to: S::Completed })
                }
            } else {
                Plan::with_effect(Effect::Close { to: S::Failed })
            }
        }

        (Action::ChainCancel(ChainResult::Success), _, _, S::ReturnConfirmed) => {
            Plan::with_effect(Effect::Close {
                to: S::ReturnCompleted,
            })
            .returning(ReturnStatus::Completed)
        }
        (Action::ChainCancel(ChainResult::Fail), _, _, S::ReturnConfirmed) => {
            Plan::with_effect(Effect::RecordChainError)
        }

        _ => {
            return Err(Rejection::StateMismatch {
                observed: order.status,
            });
        }
    };

    Ok(plan)
}

/// Chain request implied by an order's current status, for operator replay
pub fn pending_request(order: &Order) -> Option<ChainRequest> {
    let chain_id = order.chain_id.clone();
    match order.status {
        OrderStatus::None => Some(ChainRequest::StartToSell {
            chain_id,
            price: order.price_value,
            product_type: order.product_type,
        }),
        OrderStatus::InAuction if order.settle_requested_at.is_some() => {
            Some(ChainRequest::ConfirmOrder { chain_id })
        }
        OrderStatus::InAuction => Some(Notify::UpdateBid.request(order)),
        OrderStatus::InFix | OrderStatus::DispatchConfirmed => {
            Some(ChainRequest::ConfirmOrder { chain_id })
        }
        OrderStatus::ReturnConfirmed => Some(ChainRequest::CancelOrder { chain_id }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus as S;

    fn order(price_type: PriceType, product_type: ProductType, status: OrderStatus) -> Order {
        Order {
            id: "o-1".into(),
            product_id: 1,
            seller: "alice".into(),
            buyer: String::new(),
            price_type,
            product_type,
            status,
            price_value: 100.0,
            chain_id: "c-1".into(),
            duration_seconds: 30,
            server_start_time: 0,
            complete_time: None,
            buy_info: None,
            express_id: None,
            settle_requested_at: None,
            chain_error: None,
        }
    }

    #[test]
    fn test_fix_buy_depends_on_product_type() {
        let digit = plan(
            &order(PriceType::Fix, ProductType::Digit, S::None),
            Action::Buy { value: 0.0 },
        )
        .unwrap();
        assert_eq!(digit.resulting_status(S::None), Some(S::InFix));
        assert_eq!(digit.notify, Some(Notify::ConfirmOrder));

        let entity = plan(
            &order(PriceType::Fix, ProductType::Entity, S::None),
            Action::Buy { value: 0.0 },
        )
        .unwrap();
        assert_eq!(entity.resulting_status(S::None), Some(S::Unshipped));
        assert_eq!(entity.notify, None);
    }

    #[test]
    fn test_auction_bid_must_exceed_current_price() {
        let o = order(PriceType::Auction, ProductType::Digit, S::InAuction);
        assert_eq!(
            plan(&o, Action::Buy { value: 100.0 }),
            Err(Rejection::BidTooLow { current: 100.0 })
        );
        let ok = plan(&o, Action::Buy { value: 100.01 }).unwrap();
        assert_eq!(ok.notify, Some(Notify::UpdateBid));
    }

    #[test]
    fn test_bid_refused_once_settle_requested() {
        let mut o = order(PriceType::Auction, ProductType::Digit, S::InAuction);
        o.settle_requested_at = Some(5);
        assert_eq!(
            plan(&o, Action::Buy { value: 500.0 }),
            Err(Rejection::AuctionClosed)
        );
        // a second timeout is not a second settle request
        assert!(matches!(
            plan(&o, Action::Timeout),
            Err(Rejection::StateMismatch { .. })
        ));
    }

    #[test]
    fn test_timeout_by_price_and_product_type() {
        let digit = plan(
            &order(PriceType::Auction, ProductType::Digit, S::InAuction),
            Action::Timeout,
        )
        .unwrap();
        assert!(matches!(
            digit.effect,
            Effect::Transition {
                to: S::InAuction,
                request_settle: true,
                ..
            }
        ));

        let entity = plan(
            &order(PriceType::Auction, ProductType::Entity, S::InAuction),
            Action::Timeout,
        )
        .unwrap();
        assert_eq!(entity.resulting_status(S::InAuction), Some(S::Unshipped));

        for price_type in [PriceType::Fix, PriceType::Auction] {
            let idle = plan(&order(price_type, ProductType::Digit, S::None), Action::Timeout)
                .unwrap();
            assert_eq!(idle.effect, Effect::Delete);
            assert_eq!(idle.notify, Some(Notify::StopSelling));
        }
    }

    #[test]
    fn test_chain_confirm_closes_and_transfers_only_on_success() {
        let o = order(PriceType::Fix, ProductType::Digit, S::InFix);
        let ok = plan(&o, Action::ChainConfirm(ChainResult::Success)).unwrap();
        assert_eq!(ok.effect, Effect::Close { to: S::Completed });
        assert!(ok.transfer_ownership);

        let failed = plan(&o, Action::ChainConfirm(ChainResult::Fail)).unwrap();
        assert_eq!(failed.effect, Effect::Close { to: S::Failed });
        assert!(!failed.transfer_ownership);
    }

    #[test]
    fn test_chain_confirm_rejected_for_entity_auction() {
        let o = order(PriceType::Auction, ProductType::Entity, S::InAuction);
        assert_eq!(
            plan(&o, Action::ChainConfirm(ChainResult::Success)),
            Err(Rejection::StateMismatch {
                observed: S::InAuction
            })
        );
    }

    #[test]
    fn test_chain_cancel_failure_keeps_status() {
        let o = order(PriceType::Fix, ProductType::Entity, S::ReturnConfirmed);
        let p = plan(&o, Action::ChainCancel(ChainResult::Fail)).unwrap();
        assert_eq!(p.effect, Effect::RecordChainError);
        assert_eq!(p.resulting_status(S::ReturnConfirmed), Some(S::ReturnConfirmed));
    }

    #[test]
    fn test_every_planned_transition_is_a_dag_edge() {
        let actions = [
            Action::Buy { value: 1_000.0 },
            Action::Timeout,
            Action::StopSelling,
            Action::ShipProduct,
            Action::ConfirmOrder,
            Action::AskForReturn,
            Action::AgreeReturn,
            Action::ShipReturn,
            Action::ConfirmReturn,
            Action::ChainConfirm(ChainResult::Success),
            Action::ChainConfirm(ChainResult::Fail),
            Action::ChainCancel(ChainResult::Success),
            Action::ChainCancel(ChainResult::Fail),
        ];
        let statuses = [
            S::None,
            S::InFix,
            S::InAuction,
            S::Unshipped,
            S::Dispatched,
            S::DispatchConfirmed,
            S::Completed,
            S::Failed,
            S::ReturnInAgree,
            S::ReturnAgreed,
            S::ReturnDispatched,
            S::ReturnConfirmed,
            S::ReturnCompleted,
        ];
        for price_type in [PriceType::Fix, PriceType::Auction] {
            for product_type in [ProductType::Digit, ProductType::Entity] {
                for status in statuses {
                    for action in actions {
                        let o = order(price_type, product_type, status);
                        let Ok(p) = plan(&o, action) else { continue };
                        assert!(!status.is_terminal(), "{status} accepted {action:?}");
                        match p.effect {
                            Effect::Transition { to, .. } | Effect::Close { to } => {
                                assert!(status.can_advance_to(to), "{status} -> {to}")
                            }
                            Effect::Delete => assert_eq!(status, S::None),
                            Effect::RecordChainError => {}
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_pending_request_per_status() {
        let mut o = order(PriceType::Auction, ProductType::Digit, S::InAuction);
        o.buyer = "bob".into();
        o.price_value = 150.0;
        assert_eq!(
            pending_request(&o),
            Some(ChainRequest::UpdateBid {
                chain_id: "c-1".into(),
                buyer: "bob".into(),
                price: 150.0
            })
        );
        o.settle_requested_at = Some(1);
        assert_eq!(
            pending_request(&o),
            Some(ChainRequest::ConfirmOrder {
                chain_id: "c-1".into()
            })
        );
        assert_eq!(
            pending_request(&order(PriceType::Fix, ProductType::Entity, S::Unshipped)),
            None
        );
    }
}
