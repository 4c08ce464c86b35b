//! Order lifecycle
//!
//! - [`machine`]: pure transition planner
//! - [`coordinator`]: executes plans against the store and the chain
//! - [`expiry`]: background timeout of elapsed listings

pub mod coordinator;
pub mod expiry;
pub mod machine;

pub use coordinator::{Clock, OrderCoordinator, OrderError, OrderResult};
pub use expiry::ExpiryScheduler;
