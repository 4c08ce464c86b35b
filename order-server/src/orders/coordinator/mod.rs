//! Order coordinator
//!
//! Executes commands against the order lifecycle. Every command follows the
//! same path:
//!
//! ```text
//! load order ──▶ check actor ──▶ machine::plan ──▶ store (atomic, CAS on status)
//!                                                      │
//!                                      after commit ───┴──▶ notifier / catalog
//! ```
//!
//! The store re-checks the expected status under its lock, so two commands
//! racing on one order cannot both commit. Side effects run only after the
//! write has committed; a failed chain notification leaves the transition in
//! place and is reported with the committed status so an operator can replay.

mod error;

#[cfg(test)]
mod tests;

pub use error::{OrderError, OrderResult};

use shared::order::{
    AskReturnRequest, BoughtOrders, BuyInfo, ChainCallbackResponse, ChainResult, ExpressDraft,
    Order, OrderDetail, OrderStatus, PriceType, ReturnRequest, ReturnStatus, SellRequest,
    ShipRequest, StopSellingResponse,
};
use std::sync::Arc;

use super::machine::{self, Action, Actor, Effect, Rejection};
use crate::catalog::CatalogClient;
use crate::chain::{ChainRequest, SettlementNotifier};
use crate::db::{Closing, OrderStore, ReturnChange, Shipment, StatusChange};
use crate::pictures::{self, PictureUploader};

/// Source of server time (unix millis)
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Default upper bound for a listing's duration
pub const DEFAULT_MAX_DURATION_SECS: i64 = 30;

const CHAIN_CANCEL_FAILED: &str = "chain reported cancel failure";

/// What a committed plan left behind
#[derive(Debug)]
enum Outcome {
    Live(Order),
    Deleted(Order),
    Closed(Order),
}

impl Outcome {
    fn order(&self) -> &Order {
        match self {
            Outcome::Live(o) | Outcome::Deleted(o) | Outcome::Closed(o) => o,
        }
    }

    fn into_order(self) -> Order {
        match self {
            Outcome::Live(o) | Outcome::Deleted(o) | Outcome::Closed(o) => o,
        }
    }

    fn committed(&self) -> &'static str {
        match self {
            Outcome::Deleted(_) => "DELETED",
            Outcome::Live(o) | Outcome::Closed(o) => o.status.as_str(),
        }
    }
}

/// Command data the plan itself does not carry
#[derive(Debug, Default)]
struct CommandInput {
    express: Option<ExpressDraft>,
    new_return: Option<ReturnRequest>,
}

fn authorize(order: &Order, action: Action, caller: &str) -> OrderResult<()> {
    match action.actor() {
        Actor::Seller if order.seller != caller => Err(OrderError::SellerRequired(action.name())),
        Actor::Buyer if order.buyer != caller => Err(OrderError::BuyerRequired(action.name())),
        Actor::NotSeller if order.seller == caller => Err(OrderError::OwnListing),
        _ => Ok(()),
    }
}

fn rejection(order: &Order, rejection: Rejection) -> OrderError {
    match rejection {
        Rejection::StateMismatch { observed } => OrderError::StateMismatch {
            order_id: order.id.clone(),
            observed,
        },
        Rejection::AuctionClosed => OrderError::AuctionClosed(order.id.clone()),
        Rejection::BidTooLow { current } => OrderError::BidTooLow { current },
    }
}

fn validate_sell(req: &SellRequest) -> OrderResult<i64> {
    if !req.price.is_finite() || req.price <= 0.0 {
        return Err(OrderError::Validation("price must be greater than 0".into()));
    }
    if req.chain_id.trim().is_empty() {
        return Err(OrderError::Validation("chain_id must not be empty".into()));
    }
    match req.duration_seconds {
        Some(d) if d > 0 => Ok(d),
        Some(_) => Err(OrderError::Validation(
            "duration_seconds must be positive".into(),
        )),
        None => Err(OrderError::Validation("duration_seconds is required".into())),
    }
}

fn validate_express(req: ShipRequest) -> OrderResult<ExpressDraft> {
    let company = req.company.trim();
    let number = req.number.trim();
    if company.is_empty() || number.is_empty() {
        return Err(OrderError::Validation(
            "express company and number are required".into(),
        ));
    }
    Ok(ExpressDraft {
        company: company.to_string(),
        number: number.to_string(),
    })
}

/// Whether a closed order's final status matches a repeated callback
fn agrees_with_closed(action: Action, status: OrderStatus) -> bool {
    matches!(
        (action, status),
        (Action::ChainConfirm(ChainResult::Success), OrderStatus::Completed)
            | (Action::ChainConfirm(ChainResult::Fail), OrderStatus::Failed)
            | (Action::ChainCancel(ChainResult::Success), OrderStatus::ReturnCompleted)
    )
}

pub struct OrderCoordinator {
    store: Arc<dyn OrderStore>,
    notifier: Arc<dyn SettlementNotifier>,
    catalog: Arc<dyn CatalogClient>,
    pictures: Arc<dyn PictureUploader>,
    max_duration_secs: i64,
    clock: Clock,
}

impl std::fmt::Debug for OrderCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderCoordinator")
            .field("max_duration_secs", &self.max_duration_secs)
            .finish_non_exhaustive()
    }
}

impl OrderCoordinator {
    pub fn new(
        store: Arc<dyn OrderStore>,
        notifier: Arc<dyn SettlementNotifier>,
        catalog: Arc<dyn CatalogClient>,
        pictures: Arc<dyn PictureUploader>,
        max_duration_secs: i64,
    ) -> Self {
        Self {
            store,
            notifier,
            catalog,
            pictures,
            max_duration_secs,
            clock: Arc::new(shared::util::now_millis),
        }
    }

    /// Replace the server clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> i64 {
        (self.clock)()
    }

    // ========== Queries ==========

    /// All live orders, newest first
    pub async fn get_orders_in_transaction(&self) -> OrderResult<Vec<Order>> {
        Ok(self.store.list_live().await?)
    }

    /// Live and closed orders bought by `buyer`
    pub async fn get_orders(&self, buyer: &str) -> OrderResult<BoughtOrders> {
        Ok(BoughtOrders {
            live: self.store.find_by_buyer(buyer).await?,
            closed: self.store.find_closed_by_buyer(buyer).await?,
        })
    }

    /// Live orders sold by `seller`
    pub async fn get_sellings(&self, seller: &str) -> OrderResult<Vec<Order>> {
        Ok(self.store.find_by_seller(seller).await?)
    }

    pub async fn get_order_by_product_id(&self, product_id: i64) -> OrderResult<Order> {
        self.store
            .find_by_product_id(product_id)
            .await?
            .ok_or(OrderError::ProductNotListed(product_id))
    }

    /// Order with its shipment and return records; visible to its parties
    pub async fn get_order_detail(&self, caller: &str, order_id: &str) -> OrderResult<OrderDetail> {
        let (order, closed) = match self.store.find_by_order_id(order_id).await? {
            Some(order) => (order, false),
            None => (
                self.store
                    .find_closed_by_order_id(order_id)
                    .await?
                    .ok_or_else(|| OrderError::NotFound(order_id.to_string()))?,
                true,
            ),
        };
        if order.seller != caller && order.buyer != caller {
            // not a party: indistinguishable from a missing order
            return Err(OrderError::NotFound(order_id.to_string()));
        }

        let express = match order.express_id {
            Some(id) => self.store.find_express(id).await?,
            None => None,
        };
        let return_request = self.store.find_return(&order.id).await?;
        let return_express = match return_request.as_ref().and_then(|rr| rr.express_id) {
            Some(id) => self.store.find_express(id).await?,
            None => None,
        };

        Ok(OrderDetail {
            order,
            closed,
            express,
            return_request,
            return_express,
        })
    }

    // ========== Seller / buyer commands ==========

    /// List a product
    pub async fn sell(&self, seller: &str, req: SellRequest) -> OrderResult<Order> {
        let requested = validate_sell(&req)?;
        let duration_seconds = requested.min(self.max_duration_secs);

        if self.store.find_by_product_id(req.product_id).await?.is_some() {
            return Err(OrderError::ProductAlreadyListed(req.product_id));
        }

        let product = self.catalog.get_product(req.product_id).await?;
        if product.owner != seller {
            return Err(OrderError::NotProductOwner(req.product_id));
        }
        if !product.product_type.is_sellable() {
            return Err(OrderError::ProductNotSellable(req.product_id));
        }

        let order = Order {
            id: shared::util::new_id(),
            product_id: req.product_id,
            seller: seller.to_string(),
            buyer: String::new(),
            price_type: req.price_type,
            product_type: product.product_type,
            status: OrderStatus::None,
            price_value: req.price,
            chain_id: req.chain_id.trim().to_string(),
            duration_seconds,
            server_start_time: self.now(),
            complete_time: None,
            buy_info: None,
            express_id: None,
            settle_requested_at: None,
            chain_error: None,
        };
        self.store.insert(&order).await?;

        tracing::info!(
            order_id = %order.id,
            chain_id = %order.chain_id,
            product_id = order.product_id,
            price_type = %order.price_type,
            duration_seconds,
            "Order listed"
        );

        self.notifier
            .notify(ChainRequest::StartToSell {
                chain_id: order.chain_id.clone(),
                price: order.price_value,
                product_type: order.product_type,
            })
            .await
            .map_err(|source| OrderError::Notify {
                order_id: order.id.clone(),
                committed: OrderStatus::None.as_str().to_string(),
                source,
            })?;

        Ok(order)
    }

    pub async fn stop_selling(
        &self,
        caller: &str,
        order_id: &str,
    ) -> OrderResult<StopSellingResponse> {
        let order = self.load(order_id).await?;
        authorize(&order, Action::StopSelling, caller)?;
        self.execute(order, Action::StopSelling, caller, CommandInput::default())
            .await?;
        Ok(StopSellingResponse {
            order_id: order_id.to_string(),
            deleted: true,
        })
    }

    /// Buy a fixed-price listing or bid on an auction
    pub async fn buy(&self, caller: &str, order_id: &str, value: Option<f64>) -> OrderResult<Order> {
        let order = self.load(order_id).await?;
        let probe = Action::Buy { value: 0.0 };
        authorize(&order, probe, caller)?;

        let value = match order.price_type {
            PriceType::Fix => order.price_value,
            PriceType::Auction => match value {
                Some(v) if v.is_finite() && v > 0.0 => v,
                Some(_) => return Err(OrderError::Validation("bid must be positive".into())),
                None => return Err(OrderError::Validation("bid value is required".into())),
            },
        };

        if matches!(order.status, OrderStatus::None | OrderStatus::InAuction)
            && order.is_expired(self.now())
        {
            return Err(OrderError::ListingExpired(order.id));
        }

        self.execute(order, Action::Buy { value }, caller, CommandInput::default())
            .await
            .map(Outcome::into_order)
    }

    pub async fn ship_product(
        &self,
        caller: &str,
        order_id: &str,
        express: ShipRequest,
    ) -> OrderResult<Order> {
        let express = validate_express(express)?;
        self.command(
            caller,
            order_id,
            Action::ShipProduct,
            CommandInput {
                express: Some(express),
                ..Default::default()
            },
        )
        .await
    }

    /// Buyer confirms receipt
    pub async fn confirm_order(&self, caller: &str, order_id: &str) -> OrderResult<Order> {
        self.command(caller, order_id, Action::ConfirmOrder, CommandInput::default())
            .await
    }

    pub async fn ask_for_return(
        &self,
        caller: &str,
        order_id: &str,
        req: AskReturnRequest,
    ) -> OrderResult<Order> {
        let description = req.description.trim();
        if description.is_empty() {
            return Err(OrderError::Validation(
                "return description is required".into(),
            ));
        }

        let order = self.load(order_id).await?;
        authorize(&order, Action::AskForReturn, caller)?;
        // reject before uploading anything
        machine::plan(&order, Action::AskForReturn).map_err(|r| rejection(&order, r))?;

        let images = pictures::upload_all(self.pictures.as_ref(), &req.images).await;
        let new_return = ReturnRequest {
            id: shared::util::new_id(),
            order_id: order.id.clone(),
            status: ReturnStatus::AgreeRequested,
            description: description.to_string(),
            images,
            ask_time: self.now(),
            agree_time: None,
            confirm_time: None,
            express_id: None,
        };

        self.execute(
            order,
            Action::AskForReturn,
            caller,
            CommandInput {
                new_return: Some(new_return),
                ..Default::default()
            },
        )
        .await
        .map(Outcome::into_order)
    }

    pub async fn agree_return(&self, caller: &str, order_id: &str) -> OrderResult<Order> {
        self.command(caller, order_id, Action::AgreeReturn, CommandInput::default())
            .await
    }

    pub async fn ship_return(
        &self,
        caller: &str,
        order_id: &str,
        express: ShipRequest,
    ) -> OrderResult<Order> {
        let express = validate_express(express)?;
        self.command(
            caller,
            order_id,
            Action::ShipReturn,
            CommandInput {
                express: Some(express),
                ..Default::default()
            },
        )
        .await
    }

    pub async fn confirm_return(&self, caller: &str, order_id: &str) -> OrderResult<Order> {
        self.command(caller, order_id, Action::ConfirmReturn, CommandInput::default())
            .await
    }

    // ========== System commands ==========

    /// Listing duration elapsed; returns `None` when the listing was removed
    pub async fn timeout(&self, order_id: &str) -> OrderResult<Option<Order>> {
        let order = self.load(order_id).await?;
        match self
            .execute(order, Action::Timeout, "", CommandInput::default())
            .await?
        {
            Outcome::Deleted(_) => Ok(None),
            outcome => Ok(Some(outcome.into_order())),
        }
    }

    /// Chain answered a `ConfirmOrder`
    pub async fn apply_confirm_from_chain(
        &self,
        chain_id: &str,
        result: ChainResult,
    ) -> OrderResult<ChainCallbackResponse> {
        self.apply_chain_callback(chain_id, Action::ChainConfirm(result))
            .await
    }

    /// Chain answered a `CancelOrder`
    pub async fn apply_cancel_from_chain(
        &self,
        chain_id: &str,
        result: ChainResult,
    ) -> OrderResult<ChainCallbackResponse> {
        self.apply_chain_callback(chain_id, Action::ChainCancel(result))
            .await
    }

    /// Re-send the chain request implied by the order's current status
    pub async fn replay_settlement(&self, order_id: &str) -> OrderResult<ChainRequest> {
        let order = self.load(order_id).await?;
        let request = machine::pending_request(&order).ok_or_else(|| OrderError::StateMismatch {
            order_id: order.id.clone(),
            observed: order.status,
        })?;

        tracing::info!(
            order_id = %order.id,
            chain_id = %order.chain_id,
            action = request.action(),
            "Replaying settlement request"
        );
        self.notifier
            .notify(request.clone())
            .await
            .map_err(|source| OrderError::Notify {
                order_id: order.id.clone(),
                committed: order.status.as_str().to_string(),
                source,
            })?;
        Ok(request)
    }

    // ========== Internals ==========

    /// Load a live order; a closed one reports its terminal status
    async fn load(&self, order_id: &str) -> OrderResult<Order> {
        if let Some(order) = self.store.find_by_order_id(order_id).await? {
            return Ok(order);
        }
        match self.store.find_closed_by_order_id(order_id).await? {
            Some(closed) => Err(OrderError::AlreadyClosed {
                order_id: closed.id,
                status: closed.status,
            }),
            None => Err(OrderError::NotFound(order_id.to_string())),
        }
    }

    /// Load, authorize and execute a command that leaves the order live
    async fn command(
        &self,
        caller: &str,
        order_id: &str,
        action: Action,
        input: CommandInput,
    ) -> OrderResult<Order> {
        let order = self.load(order_id).await?;
        authorize(&order, action, caller)?;
        self.execute(order, action, caller, input)
            .await
            .map(Outcome::into_order)
    }

    async fn execute(
        &self,
        order: Order,
        action: Action,
        caller: &str,
        input: CommandInput,
    ) -> OrderResult<Outcome> {
        let plan = machine::plan(&order, action).map_err(|r| rejection(&order, r))?;
        let now = self.now();
        let from = order.status;

        let outcome = match plan.effect {
            Effect::Transition {
                to,
                record_bid,
                request_settle,
            } => {
                let mut change = StatusChange::to(to, now);
                if record_bid && let Action::Buy { value } = action {
                    let bid = BuyInfo {
                        buyer: caller.to_string(),
                        value,
                        server_time: now,
                    };
                    change = match order.price_type {
                        PriceType::Auction => change.with_outbid(bid),
                        PriceType::Fix => change.with_bid(bid),
                    };
                }
                if request_settle {
                    change = change.with_settle_request();
                }
                if let Some(draft) = input.express {
                    change = change.with_shipment(match action {
                        Action::ShipReturn => Shipment::Return(draft),
                        _ => Shipment::Order(draft),
                    });
                }
                if let Some(rr) = input.new_return {
                    change = change.with_return(ReturnChange::Open(rr));
                } else if let Some(status) = plan.return_status {
                    change = change.with_return(ReturnChange::Advance { status, at: now });
                }
                Outcome::Live(self.store.update_status(&order.id, from, change).await?)
            }
            Effect::Delete => Outcome::Deleted(self.store.delete(&order.id).await?),
            Effect::Close { to } => {
                let closing = Closing {
                    status: to,
                    return_change: plan
                        .return_status
                        .map(|status| ReturnChange::Advance { status, at: now }),
                    complete_time: now,
                };
                Outcome::Closed(self.store.close(&order.id, from, closing).await?)
            }
            Effect::RecordChainError => {
                tracing::warn!(
                    order_id = %order.id,
                    chain_id = %order.chain_id,
                    "Chain reported cancel failure"
                );
                Outcome::Live(
                    self.store
                        .record_chain_error(&order.id, from, CHAIN_CANCEL_FAILED)
                        .await?,
                )
            }
        };

        tracing::info!(
            order_id = %order.id,
            chain_id = %order.chain_id,
            action = action.name(),
            from = %from,
            to = outcome.committed(),
            "Order transition committed"
        );

        if let Some(notify) = plan.notify {
            self.notifier
                .notify(notify.request(outcome.order()))
                .await
                .map_err(|source| OrderError::Notify {
                    order_id: order.id.clone(),
                    committed: outcome.committed().to_string(),
                    source,
                })?;
        }

        if plan.transfer_ownership {
            self.transfer_ownership(outcome.order()).await;
        }

        Ok(outcome)
    }

    async fn transfer_ownership(&self, order: &Order) {
        match self
            .catalog
            .transfer_ownership(order.product_id, &order.buyer, order.price_value)
            .await
        {
            Ok(()) => tracing::info!(
                order_id = %order.id,
                product_id = order.product_id,
                new_owner = %order.buyer,
                "Product ownership transferred"
            ),
            Err(e) => tracing::error!(
                order_id = %order.id,
                product_id = order.product_id,
                new_owner = %order.buyer,
                "Ownership transfer failed after completed sale: {e}"
            ),
        }
    }

    async fn apply_chain_callback(
        &self,
        chain_id: &str,
        action: Action,
    ) -> OrderResult<ChainCallbackResponse> {
        let attempt = match self.store.find_by_chain_id(chain_id).await? {
            Some(order) => {
                self.execute(order, action, "", CommandInput::default())
                    .await
            }
            None => Err(OrderError::ChainIdNotFound(chain_id.to_string())),
        };

        match attempt {
            Ok(outcome) => {
                let order = outcome.into_order();
                Ok(ChainCallbackResponse {
                    order_id: order.id,
                    status: order.status,
                    already_closed: false,
                })
            }
            // a concurrent callback may have closed the order meanwhile
            Err(
                err @ (OrderError::ChainIdNotFound(_)
                | OrderError::NotFound(_)
                | OrderError::StateMismatch { .. }),
            ) => match self.resolve_closed(chain_id, action).await? {
                Some(resp) => Ok(resp),
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Answer a callback for an order that has already left the live set
    async fn resolve_closed(
        &self,
        chain_id: &str,
        action: Action,
    ) -> OrderResult<Option<ChainCallbackResponse>> {
        let Some(closed) = self.store.find_closed_by_chain_id(chain_id).await? else {
            return Ok(None);
        };

        if agrees_with_closed(action, closed.status) {
            tracing::info!(
                order_id = %closed.id,
                chain_id,
                status = %closed.status,
                "Duplicate chain callback ignored"
            );
            return Ok(Some(ChainCallbackResponse {
                order_id: closed.id,
                status: closed.status,
                already_closed: true,
            }));
        }

        let reported = match action {
            Action::ChainConfirm(r) | Action::ChainCancel(r) => r,
            _ => ChainResult::Fail,
        };
        Err(OrderError::ChainConflict {
            order_id: closed.id,
            status: closed.status,
            reported,
        })
    }
}
