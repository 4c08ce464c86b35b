//! Shared types for the marketplace order core
//!
//! Common types used by the order server and its clients: error codes,
//! the error response body, and the order domain model.

pub mod error;
pub mod order;
pub mod util;

// Re-exports
pub use axum::Json;
pub use http;
pub use serde::{Deserialize, Serialize};
