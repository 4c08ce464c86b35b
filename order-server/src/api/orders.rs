//! Order endpoints (user authenticated)

use axum::{
    Extension, Json,
    extract::{Path, State},
};
use shared::order::{
    AskReturnRequest, BoughtOrders, BuyRequest, Order, OrderDetail, SellRequest, ShipRequest,
    StopSellingResponse,
};

use crate::auth::UserIdentity;
use crate::state::AppState;

use super::ApiResult;

/// GET /api/orders/transactions
pub async fn list_in_transaction(State(state): State<AppState>) -> ApiResult<Vec<Order>> {
    Ok(Json(state.coordinator.get_orders_in_transaction().await?))
}

/// GET /api/orders/bought
pub async fn list_bought(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<BoughtOrders> {
    Ok(Json(state.coordinator.get_orders(&identity.user_id).await?))
}

/// GET /api/orders/selling
pub async fn list_selling(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
) -> ApiResult<Vec<Order>> {
    Ok(Json(state.coordinator.get_sellings(&identity.user_id).await?))
}

/// GET /api/orders/product/{product_id}
pub async fn get_by_product(
    State(state): State<AppState>,
    Path(product_id): Path<i64>,
) -> ApiResult<Order> {
    Ok(Json(
        state.coordinator.get_order_by_product_id(product_id).await?,
    ))
}

/// GET /api/orders/{order_id}
pub async fn get_detail(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<OrderDetail> {
    let detail = state
        .coordinator
        .get_order_detail(&identity.user_id, &order_id)
        .await?;
    Ok(Json(detail))
}

/// POST /api/orders
pub async fn sell(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Json(req): Json<SellRequest>,
) -> ApiResult<Order> {
    Ok(Json(state.coordinator.sell(&identity.user_id, req).await?))
}

/// POST /api/orders/{order_id}/stop
pub async fn stop_selling(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<StopSellingResponse> {
    let resp = state
        .coordinator
        .stop_selling(&identity.user_id, &order_id)
        .await?;
    Ok(Json(resp))
}

/// POST /api/orders/{order_id}/buy
pub async fn buy(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
    Json(req): Json<BuyRequest>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .buy(&identity.user_id, &order_id, req.value)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{order_id}/ship
pub async fn ship_product(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
    Json(req): Json<ShipRequest>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .ship_product(&identity.user_id, &order_id, req)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{order_id}/confirm
pub async fn confirm_order(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .confirm_order(&identity.user_id, &order_id)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{order_id}/return
pub async fn ask_for_return(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
    Json(req): Json<AskReturnRequest>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .ask_for_return(&identity.user_id, &order_id, req)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{order_id}/return/agree
pub async fn agree_return(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .agree_return(&identity.user_id, &order_id)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{order_id}/return/ship
pub async fn ship_return(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
    Json(req): Json<ShipRequest>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .ship_return(&identity.user_id, &order_id, req)
        .await?;
    Ok(Json(order))
}

/// POST /api/orders/{order_id}/return/confirm
pub async fn confirm_return(
    State(state): State<AppState>,
    Extension(identity): Extension<UserIdentity>,
    Path(order_id): Path<String>,
) -> ApiResult<Order> {
    let order = state
        .coordinator
        .confirm_return(&identity.user_id, &order_id)
        .await?;
    Ok(Json(order))
}
