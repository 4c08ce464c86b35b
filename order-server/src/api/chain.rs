//! Settlement chain callbacks and operator replay

use axum::{
    Json,
    extract::{Path, State},
};
use shared::order::{ChainCallbackRequest, ChainCallbackResponse};

use crate::chain::ChainRequest;
use crate::state::AppState;

use super::ApiResult;

/// POST /api/chain/chainconfirm/{chain_id}
pub async fn chain_confirm(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Json(req): Json<ChainCallbackRequest>,
) -> ApiResult<ChainCallbackResponse> {
    tracing::info!(chain_id = %chain_id, result = ?req.result, "Chain confirm callback");
    let resp = state
        .coordinator
        .apply_confirm_from_chain(&chain_id, req.result)
        .await?;
    Ok(Json(resp))
}

/// POST /api/chain/chaincancel/{chain_id}
pub async fn chain_cancel(
    State(state): State<AppState>,
    Path(chain_id): Path<String>,
    Json(req): Json<ChainCallbackRequest>,
) -> ApiResult<ChainCallbackResponse> {
    tracing::info!(chain_id = %chain_id, result = ?req.result, "Chain cancel callback");
    let resp = state
        .coordinator
        .apply_cancel_from_chain(&chain_id, req.result)
        .await?;
    Ok(Json(resp))
}

/// POST /api/ops/orders/{order_id}/replay
///
/// Re-sends the settlement request an order is waiting on and returns it.
pub async fn replay_settlement(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> ApiResult<ChainRequest> {
    tracing::info!(order_id = %order_id, "Operator replay requested");
    let request = state.coordinator.replay_settlement(&order_id).await?;
    Ok(Json(request))
}
