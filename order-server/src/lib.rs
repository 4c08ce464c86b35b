//! order-server: order lifecycle core of the style-transfer art marketplace
//!
//! - [`orders`]: coordinator state machine and expiry scheduler
//! - [`db`]: order store (PostgreSQL, in-memory)
//! - [`chain`]: settlement notifier (HTTP, loopback for test mode)
//! - [`catalog`] / [`pictures`]: outbound product and picture services
//! - [`api`] / [`auth`]: axum ingress

pub mod api;
pub mod auth;
pub mod catalog;
pub mod chain;
pub mod config;
pub mod db;
pub mod logger;
pub mod orders;
pub mod pictures;
pub mod state;
