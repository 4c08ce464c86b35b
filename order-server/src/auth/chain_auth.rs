//! Shared-secret check for chain callbacks and operator routes

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;

pub const CHAIN_SECRET_HEADER: &str = "x-chain-secret";

/// Compare without short-circuiting on the first differing byte
fn secrets_match(expected: &[u8], given: &[u8]) -> bool {
    if expected.len() != given.len() {
        return false;
    }
    expected
        .iter()
        .zip(given)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// Require `X-Chain-Secret` when a callback secret is configured
pub async fn chain_auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    if let Some(expected) = state.chain_secret.as_deref() {
        let given = request
            .headers()
            .get(CHAIN_SECRET_HEADER)
            .map(|v| v.as_bytes())
            .unwrap_or_default();
        if !secrets_match(expected.as_bytes(), given) {
            tracing::warn!(path = %request.uri().path(), "Rejected chain request: bad secret");
            return Err(
                AppError::with_message(ErrorCode::NotAuthenticated, "Invalid chain secret")
                    .into_response(),
            );
        }
    }
    Ok(next.run(request).await)
}
