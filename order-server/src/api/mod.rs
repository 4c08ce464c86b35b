//! API routes for order-server

pub mod chain;
pub mod health;
pub mod orders;

#[cfg(test)]
mod tests;

use crate::auth::{chain_auth_middleware, user_auth_middleware};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Router, middleware};
use shared::error::AppError;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    // Return requests carry base64 pictures
    let returns = Router::new()
        .route("/api/orders/{order_id}/return", post(orders::ask_for_return))
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024)); // 10MB

    // Marketplace users (JWT authenticated)
    let user = Router::new()
        .route("/api/orders", post(orders::sell))
        .route("/api/orders/transactions", get(orders::list_in_transaction))
        .route("/api/orders/bought", get(orders::list_bought))
        .route("/api/orders/selling", get(orders::list_selling))
        .route("/api/orders/product/{product_id}", get(orders::get_by_product))
        .route("/api/orders/{order_id}", get(orders::get_detail))
        .route("/api/orders/{order_id}/stop", post(orders::stop_selling))
        .route("/api/orders/{order_id}/buy", post(orders::buy))
        .route("/api/orders/{order_id}/ship", post(orders::ship_product))
        .route("/api/orders/{order_id}/confirm", post(orders::confirm_order))
        .route("/api/orders/{order_id}/return/agree", post(orders::agree_return))
        .route("/api/orders/{order_id}/return/ship", post(orders::ship_return))
        .route(
            "/api/orders/{order_id}/return/confirm",
            post(orders::confirm_return),
        )
        .merge(returns)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            user_auth_middleware,
        ));

    // Settlement chain callbacks and operator tools (shared secret)
    let chain = Router::new()
        .route(
            "/api/chain/chainconfirm/{chain_id}",
            post(chain::chain_confirm),
        )
        .route("/api/chain/chaincancel/{chain_id}", post(chain::chain_cancel))
        .route(
            "/api/ops/orders/{order_id}/replay",
            post(chain::replay_settlement),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            chain_auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health_check))
        .merge(user)
        .merge(chain)
        .layer(TimeoutLayer::with_status_code(
            http::StatusCode::REQUEST_TIMEOUT,
            state.request_timeout,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
