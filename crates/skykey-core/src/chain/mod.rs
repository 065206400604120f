//! Role chains: configuration, validation, retry policy and execution.

pub mod config;
pub mod executor;
pub mod retry;
pub mod validation;

pub use config::{RetryBackoff, RoleChainConfig};
pub use executor::{RoleChainExecutor, VALIDATION_DURATION_SECS};
pub use retry::retry_delay;
pub use validation::{validate_chain, validate_step};
