//! In-memory order store
//!
//! All four tables sit behind one `parking_lot::Mutex`; every primitive
//! runs start to finish under the lock, so it is atomic exactly like a
//! committed transaction. The lock is never held across an `.await`.

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::order::{Express, ExpressDraft, Order, OrderStatus, ReturnRequest};
use std::collections::HashMap;

use super::{
    Closing, OrderStore, ReturnChange, Shipment, StatusChange, StoreError, StoreResult,
    apply_change, apply_return_status, guard_change, guard_status, guard_transition,
};

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<String, Order>,
    closed_orders: HashMap<String, Order>,
    /// Keyed by order id (one return per order)
    returns: HashMap<String, ReturnRequest>,
    express: HashMap<i64, Express>,
    next_express_id: i64,
}

impl Tables {
    fn insert_express(&mut self, draft: &ExpressDraft, started_at: i64) -> i64 {
        self.next_express_id += 1;
        let id = self.next_express_id;
        self.express.insert(
            id,
            Express {
                id,
                company: draft.company.clone(),
                number: draft.number.clone(),
                started_at,
            },
        );
        id
    }

    /// Fails before anything is written when an advanced return is missing
    fn check_return(&self, order_id: &str, change: &ReturnChange) -> StoreResult<()> {
        match change {
            ReturnChange::Advance { .. } if !self.returns.contains_key(order_id) => Err(
                StoreError::Corrupt(format!("return request missing for order {order_id}")),
            ),
            _ => Ok(()),
        }
    }

    fn apply_return(
        &mut self,
        order_id: &str,
        change: &ReturnChange,
        express_id: Option<i64>,
    ) -> StoreResult<()> {
        match change {
            ReturnChange::Open(rr) => {
                self.returns.insert(order_id.to_string(), rr.clone());
            }
            ReturnChange::Advance { status, at } => {
                let rr = self.returns.get_mut(order_id).ok_or_else(|| {
                    StoreError::Corrupt(format!("return request missing for order {order_id}"))
                })?;
                apply_return_status(rr, *status, *at);
                if express_id.is_some() {
                    rr.express_id = express_id;
                }
            }
        }
        Ok(())
    }

    fn live(&self, order_id: &str) -> StoreResult<&Order> {
        self.orders
            .get(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))
    }
}

/// Order store kept in process memory
#[derive(Debug, Default)]
pub struct MemoryOrderStore {
    tables: Mutex<Tables>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.server_start_time.cmp(&a.server_start_time));
    orders
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.tables.lock().orders.get(order_id).cloned())
    }

    async fn find_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>> {
        let tables = self.tables.lock();
        Ok(tables
            .orders
            .values()
            .find(|o| o.chain_id == chain_id)
            .cloned())
    }

    async fn find_by_product_id(&self, product_id: i64) -> StoreResult<Option<Order>> {
        let tables = self.tables.lock();
        Ok(tables
            .orders
            .values()
            .find(|o| o.product_id == product_id)
            .cloned())
    }

    async fn find_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock();
        Ok(newest_first(
            tables
                .orders
                .values()
                .filter(|o| o.buyer == buyer)
                .cloned()
                .collect(),
        ))
    }

    async fn find_by_seller(&self, seller: &str) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock();
        Ok(newest_first(
            tables
                .orders
                .values()
                .filter(|o| o.seller == seller)
                .cloned()
                .collect(),
        ))
    }

    async fn list_live(&self) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock();
        Ok(newest_first(tables.orders.values().cloned().collect()))
    }

    async fn find_closed_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.tables.lock().closed_orders.get(order_id).cloned())
    }

    async fn find_closed_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>> {
        let tables = self.tables.lock();
        Ok(tables
            .closed_orders
            .values()
            .find(|o| o.chain_id == chain_id)
            .cloned())
    }

    async fn find_closed_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>> {
        let tables = self.tables.lock();
        Ok(newest_first(
            tables
                .closed_orders
                .values()
                .filter(|o| o.buyer == buyer)
                .cloned()
                .collect(),
        ))
    }

    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.tables.lock();
        if tables.orders.contains_key(&order.id) || tables.closed_orders.contains_key(&order.id) {
            return Err(StoreError::Duplicate {
                field: "id",
                value: order.id.clone(),
            });
        }
        if tables
            .orders
            .values()
            .any(|o| o.product_id == order.product_id)
        {
            return Err(StoreError::Duplicate {
                field: "product_id",
                value: order.product_id.to_string(),
            });
        }
        if tables
            .orders
            .values()
            .chain(tables.closed_orders.values())
            .any(|o| o.chain_id == order.chain_id)
        {
            return Err(StoreError::Duplicate {
                field: "chain_id",
                value: order.chain_id.clone(),
            });
        }
        tables.orders.insert(order.id.clone(), order.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order> {
        let mut tables = self.tables.lock();
        guard_change(tables.live(order_id)?, expected, &change)?;
        if let Some(rc) = &change.return_change {
            tables.check_return(order_id, rc)?;
        }

        let express_id = change
            .shipment
            .as_ref()
            .map(|s| match s {
                Shipment::Order(draft) | Shipment::Return(draft) => draft,
            })
            .map(|draft| tables.insert_express(draft, change.at));

        if let Some(rc) = &change.return_change {
            let return_express = match change.shipment {
                Some(Shipment::Return(_)) => express_id,
                _ => None,
            };
            tables.apply_return(order_id, rc, return_express)?;
        }

        let order = tables
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
        apply_change(order, &change, express_id);
        Ok(order.clone())
    }

    async fn delete(&self, order_id: &str) -> StoreResult<Order> {
        let mut tables = self.tables.lock();
        guard_status(tables.live(order_id)?, OrderStatus::None)?;
        tables
            .orders
            .remove(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))
    }

    async fn close(
        &self,
        order_id: &str,
        expected: OrderStatus,
        closing: Closing,
    ) -> StoreResult<Order> {
        let mut tables = self.tables.lock();
        guard_transition(tables.live(order_id)?, expected, closing.status)?;
        if let Some(rc) = &closing.return_change {
            tables.check_return(order_id, rc)?;
        }

        if let Some(rc) = &closing.return_change {
            tables.apply_return(order_id, rc, None)?;
        }

        let mut order = tables
            .orders
            .remove(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
        order.status = closing.status;
        order.complete_time = Some(closing.complete_time);
        tables
            .closed_orders
            .insert(order.id.clone(), order.clone());
        Ok(order)
    }

    async fn record_chain_error(
        &self,
        order_id: &str,
        expected: OrderStatus,
        message: &str,
    ) -> StoreResult<Order> {
        let mut tables = self.tables.lock();
        guard_status(tables.live(order_id)?, expected)?;
        let order = tables
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
        order.chain_error = Some(message.to_string());
        Ok(order.clone())
    }

    async fn find_return(&self, order_id: &str) -> StoreResult<Option<ReturnRequest>> {
        Ok(self.tables.lock().returns.get(order_id).cloned())
    }

    async fn find_express(&self, express_id: i64) -> StoreResult<Option<Express>> {
        Ok(self.tables.lock().express.get(&express_id).cloned())
    }
}
