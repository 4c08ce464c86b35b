//! PostgreSQL order store
//!
//! Each mutating primitive is one transaction: the order row is locked with
//! `SELECT … FOR UPDATE`, the expected status is re-checked, then the order,
//! express and return rows are written and committed together. Inserts and
//! closes also take a transaction-scoped advisory lock on the chain id, so a
//! chain id cannot be re-listed while its order is moving to `closed_orders`.

use async_trait::async_trait;
use shared::order::{BuyInfo, Express, ExpressDraft, Order, OrderStatus, ReturnRequest};
use sqlx::{PgConnection, PgPool};

use super::{
    Closing, OrderStore, ReturnChange, Shipment, StatusChange, StoreError, StoreResult,
    apply_change, apply_return_status, guard_change, guard_status, guard_transition,
};

const LIVE_COLUMNS: &str = "id, product_id, seller, buyer, price_type, product_type, status, \
     price_value, chain_id, duration_seconds, server_start_time, NULL::BIGINT AS complete_time, \
     buy_value, buy_time, express_id, settle_requested_at, chain_error";

const CLOSED_COLUMNS: &str = "id, product_id, seller, buyer, price_type, product_type, status, \
     price_value, chain_id, duration_seconds, server_start_time, complete_time, \
     buy_value, buy_time, express_id, settle_requested_at, chain_error";

const RETURN_COLUMNS: &str =
    "id, order_id, status, description, images, ask_time, agree_time, confirm_time, express_id";

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: String,
    product_id: i64,
    seller: String,
    buyer: String,
    price_type: String,
    product_type: String,
    status: String,
    price_value: f64,
    chain_id: String,
    duration_seconds: i64,
    server_start_time: i64,
    complete_time: Option<i64>,
    buy_value: Option<f64>,
    buy_time: Option<i64>,
    express_id: Option<i64>,
    settle_requested_at: Option<i64>,
    chain_error: Option<String>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let corrupt = |e: shared::order::ParseEnumError| {
            StoreError::Corrupt(format!("order {}: {e}", row.id))
        };
        let price_type = row.price_type.parse().map_err(corrupt)?;
        let product_type = row.product_type.parse().map_err(corrupt)?;
        let status = row.status.parse().map_err(corrupt)?;
        let buy_info = match (row.buy_value, row.buy_time) {
            (Some(value), Some(server_time)) => Some(BuyInfo {
                buyer: row.buyer.clone(),
                value,
                server_time,
            }),
            _ => None,
        };

        Ok(Order {
            id: row.id,
            product_id: row.product_id,
            seller: row.seller,
            buyer: row.buyer,
            price_type,
            product_type,
            status,
            price_value: row.price_value,
            chain_id: row.chain_id,
            duration_seconds: row.duration_seconds,
            server_start_time: row.server_start_time,
            complete_time: row.complete_time,
            buy_info,
            express_id: row.express_id,
            settle_requested_at: row.settle_requested_at,
            chain_error: row.chain_error,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReturnRow {
    id: String,
    order_id: String,
    status: String,
    description: String,
    images: Vec<String>,
    ask_time: i64,
    agree_time: Option<i64>,
    confirm_time: Option<i64>,
    express_id: Option<i64>,
}

impl TryFrom<ReturnRow> for ReturnRequest {
    type Error = StoreError;

    fn try_from(row: ReturnRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("return {}: {e}", row.id)))?;
        Ok(ReturnRequest {
            id: row.id,
            order_id: row.order_id,
            status,
            description: row.description,
            images: row.images,
            ask_time: row.ask_time,
            agree_time: row.agree_time,
            confirm_time: row.confirm_time,
            express_id: row.express_id,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ExpressRow {
    id: i64,
    company: String,
    number: String,
    started_at: i64,
}

fn rows_to_orders(rows: Vec<OrderRow>) -> StoreResult<Vec<Order>> {
    rows.into_iter().map(Order::try_from).collect()
}

/// Translate unique-constraint violations into [`StoreError::Duplicate`]
fn map_insert_error(err: sqlx::Error, order: &Order) -> StoreError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return match db.constraint() {
            Some("orders_product_id_key") => StoreError::Duplicate {
                field: "product_id",
                value: order.product_id.to_string(),
            },
            Some("orders_chain_id_key") => StoreError::Duplicate {
                field: "chain_id",
                value: order.chain_id.clone(),
            },
            _ => StoreError::Duplicate {
                field: "id",
                value: order.id.clone(),
            },
        };
    }
    StoreError::Database(err)
}

async fn lock_live(conn: &mut PgConnection, order_id: &str) -> StoreResult<Order> {
    let sql = format!("SELECT {LIVE_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?
        .try_into()
}

/// Serialise inserts and closes that touch the same chain id
async fn lock_chain_id(conn: &mut PgConnection, chain_id: &str) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(chain_id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_express(
    conn: &mut PgConnection,
    draft: &ExpressDraft,
    started_at: i64,
) -> StoreResult<i64> {
    let row: (i64,) = sqlx::query_as(
        r#"
        INSERT INTO express (company, number, started_at)
        VALUES ($1, $2, $3)
        RETURNING id
        "#,
    )
    .bind(&draft.company)
    .bind(&draft.number)
    .bind(started_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row.0)
}

async fn insert_return(conn: &mut PgConnection, rr: &ReturnRequest) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO returns (id, order_id, status, description, images, ask_time)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&rr.id)
    .bind(&rr.order_id)
    .bind(rr.status.as_str())
    .bind(&rr.description)
    .bind(&rr.images)
    .bind(rr.ask_time)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn apply_return(
    conn: &mut PgConnection,
    order_id: &str,
    change: &ReturnChange,
    express_id: Option<i64>,
) -> StoreResult<()> {
    let (status, at) = match change {
        ReturnChange::Open(rr) => return insert_return(conn, rr).await,
        ReturnChange::Advance { status, at } => (*status, *at),
    };

    let sql = format!("SELECT {RETURN_COLUMNS} FROM returns WHERE order_id = $1 FOR UPDATE");
    let row: Option<ReturnRow> = sqlx::query_as(&sql)
        .bind(order_id)
        .fetch_optional(&mut *conn)
        .await?;
    let mut rr: ReturnRequest = row
        .ok_or_else(|| {
            StoreError::Corrupt(format!("return request missing for order {order_id}"))
        })?
        .try_into()?;
    apply_return_status(&mut rr, status, at);
    if express_id.is_some() {
        rr.express_id = express_id;
    }

    sqlx::query(
        r#"
        UPDATE returns
        SET status = $1, agree_time = $2, confirm_time = $3, express_id = $4
        WHERE id = $5
        "#,
    )
    .bind(rr.status.as_str())
    .bind(rr.agree_time)
    .bind(rr.confirm_time)
    .bind(rr.express_id)
    .bind(&rr.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Order store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_live(&self, filter: &str, value: &str) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {LIVE_COLUMNS} FROM orders WHERE {filter} = $1 ORDER BY server_start_time DESC"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows_to_orders(rows)
    }

    async fn fetch_one_closed(&self, filter: &str, value: &str) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {CLOSED_COLUMNS} FROM closed_orders WHERE {filter} = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.fetch_live("id", order_id).await?.into_iter().next())
    }

    async fn find_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>> {
        Ok(self.fetch_live("chain_id", chain_id).await?.into_iter().next())
    }

    async fn find_by_product_id(&self, product_id: i64) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {LIVE_COLUMNS} FROM orders WHERE product_id = $1");
        let row: Option<OrderRow> = sqlx::query_as(&sql)
            .bind(product_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Order::try_from).transpose()
    }

    async fn find_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>> {
        self.fetch_live("buyer", buyer).await
    }

    async fn find_by_seller(&self, seller: &str) -> StoreResult<Vec<Order>> {
        self.fetch_live("seller", seller).await
    }

    async fn list_live(&self) -> StoreResult<Vec<Order>> {
        let sql = format!("SELECT {LIVE_COLUMNS} FROM orders ORDER BY server_start_time DESC");
        let rows: Vec<OrderRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        rows_to_orders(rows)
    }

    async fn find_closed_by_order_id(&self, order_id: &str) -> StoreResult<Option<Order>> {
        self.fetch_one_closed("id", order_id).await
    }

    async fn find_closed_by_chain_id(&self, chain_id: &str) -> StoreResult<Option<Order>> {
        self.fetch_one_closed("chain_id", chain_id).await
    }

    async fn find_closed_by_buyer(&self, buyer: &str) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {CLOSED_COLUMNS} FROM closed_orders WHERE buyer = $1 \
             ORDER BY server_start_time DESC"
        );
        let rows: Vec<OrderRow> = sqlx::query_as(&sql)
            .bind(buyer)
            .fetch_all(&self.pool)
            .await?;
        rows_to_orders(rows)
    }

    async fn insert(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_chain_id(&mut tx, &order.chain_id).await?;

        let reused: Option<(String,)> =
            sqlx::query_as("SELECT id FROM closed_orders WHERE chain_id = $1 OR id = $2")
                .bind(&order.chain_id)
                .bind(&order.id)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((closed_id,)) = reused {
            let (field, value) = if closed_id == order.id {
                ("id", order.id.clone())
            } else {
                ("chain_id", order.chain_id.clone())
            };
            return Err(StoreError::Duplicate { field, value });
        }

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, product_id, seller, buyer, price_type, product_type, status,
                price_value, chain_id, duration_seconds, server_start_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(&order.id)
        .bind(order.product_id)
        .bind(&order.seller)
        .bind(&order.buyer)
        .bind(order.price_type.as_str())
        .bind(order.product_type.as_str())
        .bind(order.status.as_str())
        .bind(order.price_value)
        .bind(&order.chain_id)
        .bind(order.duration_seconds)
        .bind(order.server_start_time)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, order))?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_status(
        &self,
        order_id: &str,
        expected: OrderStatus,
        change: StatusChange,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = lock_live(&mut tx, order_id).await?;
        guard_change(&order, expected, &change)?;

        let express_id = match &change.shipment {
            Some(Shipment::Order(draft) | Shipment::Return(draft)) => {
                Some(insert_express(&mut tx, draft, change.at).await?)
            }
            None => None,
        };

        if let Some(rc) = &change.return_change {
            let return_express = match change.shipment {
                Some(Shipment::Return(_)) => express_id,
                _ => None,
            };
            apply_return(&mut tx, order_id, rc, return_express).await?;
        }

        apply_change(&mut order, &change, express_id);
        let (buy_value, buy_time) = match &order.buy_info {
            Some(bi) => (Some(bi.value), Some(bi.server_time)),
            None => (None, None),
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, buyer = $2, price_value = $3, buy_value = $4, buy_time = $5,
                express_id = $6, settle_requested_at = $7
            WHERE id = $8
            "#,
        )
        .bind(order.status.as_str())
        .bind(&order.buyer)
        .bind(order.price_value)
        .bind(buy_value)
        .bind(buy_time)
        .bind(order.express_id)
        .bind(order.settle_requested_at)
        .bind(order_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn delete(&self, order_id: &str) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let order = lock_live(&mut tx, order_id).await?;
        guard_status(&order, OrderStatus::None)?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn close(
        &self,
        order_id: &str,
        expected: OrderStatus,
        closing: Closing,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = lock_live(&mut tx, order_id).await?;
        guard_transition(&order, expected, closing.status)?;
        lock_chain_id(&mut tx, &order.chain_id).await?;

        if let Some(rc) = &closing.return_change {
            apply_return(&mut tx, order_id, rc, None).await?;
        }

        order.status = closing.status;
        order.complete_time = Some(closing.complete_time);
        let (buy_value, buy_time) = match &order.buy_info {
            Some(bi) => (Some(bi.value), Some(bi.server_time)),
            None => (None, None),
        };

        sqlx::query(
            r#"
            INSERT INTO closed_orders (
                id, product_id, seller, buyer, price_type, product_type, status,
                price_value, chain_id, duration_seconds, server_start_time, complete_time,
                buy_value, buy_time, express_id, settle_requested_at, chain_error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(&order.id)
        .bind(order.product_id)
        .bind(&order.seller)
        .bind(&order.buyer)
        .bind(order.price_type.as_str())
        .bind(order.product_type.as_str())
        .bind(order.status.as_str())
        .bind(order.price_value)
        .bind(&order.chain_id)
        .bind(order.duration_seconds)
        .bind(order.server_start_time)
        .bind(closing.complete_time)
        .bind(buy_value)
        .bind(buy_time)
        .bind(order.express_id)
        .bind(order.settle_requested_at)
        .bind(&order.chain_error)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn record_chain_error(
        &self,
        order_id: &str,
        expected: OrderStatus,
        message: &str,
    ) -> StoreResult<Order> {
        let mut tx = self.pool.begin().await?;
        let mut order = lock_live(&mut tx, order_id).await?;
        guard_status(&order, expected)?;

        sqlx::query("UPDATE orders SET chain_error = $1 WHERE id = $2")
            .bind(message)
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        order.chain_error = Some(message.to_string());
        Ok(order)
    }

    async fn find_return(&self, order_id: &str) -> StoreResult<Option<ReturnRequest>> {
        let sql = format!("SELECT {RETURN_COLUMNS} FROM returns WHERE order_id = $1");
        let row: Option<ReturnRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ReturnRequest::try_from).transpose()
    }

    async fn find_express(&self, express_id: i64) -> StoreResult<Option<Express>> {
        let row: Option<ExpressRow> =
            sqlx::query_as("SELECT id, company, number, started_at FROM express WHERE id = $1")
                .bind(express_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|r| Express {
            id: r.id,
            company: r.company,
            number: r.number,
            started_at: r.started_at,
        }))
    }
}
