//! Request authentication
//!
//! - [`user_auth`]: bearer JWT for `/api/orders/*`
//! - [`chain_auth`]: shared secret for `/api/chain/*` and `/api/ops/*`

pub mod chain_auth;
pub mod user_auth;

pub use chain_auth::chain_auth_middleware;
pub use user_auth::{UserIdentity, user_auth_middleware};
#[cfg(test)]
pub use user_auth::create_token;
