//! Role chain configuration.

use serde::{Deserialize, Serialize};
use skykey_traits::{CredentialError, Result};
use std::time::Duration;

pub const DEFAULT_MAX_STEPS: usize = 5;
pub const DEFAULT_DURATION_SECS: u32 = 3600;
pub const DEFAULT_REFRESH_BEFORE_EXPIRY_SECS: u64 = 300;
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CHAIN_TIMEOUT_SECS: u64 = 300;

/// STS caps a single assumed-role session at 12 hours.
const MAX_DURATION_SECS: u32 = 43_200;
const MIN_DURATION_SECS: u32 = 900;

/// How the delay between retry attempts grows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryBackoff {
    /// Same delay before every retry
    Fixed,
    /// `retry_delay * attempt`
    #[default]
    Linear,
    /// `retry_delay * 2^(attempt - 1)`
    Exponential,
}

/// Configuration for executing and refreshing a role chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleChainConfig {
    /// Maximum number of hops in one chain
    pub max_steps: usize,
    /// Session duration for steps that do not set their own
    pub default_duration_secs: u32,
    /// Refresh once the final credentials are this close to expiry
    pub refresh_before_expiry_secs: u64,
    pub enable_auto_refresh: bool,
    /// Total attempts per step, including the first
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub retry_backoff: RetryBackoff,
    /// Bound on a single assume-role call
    pub call_timeout_secs: u64,
    /// Bound on executing the whole chain
    pub chain_timeout_secs: u64,
}

impl Default for RoleChainConfig {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            default_duration_secs: DEFAULT_DURATION_SECS,
            refresh_before_expiry_secs: DEFAULT_REFRESH_BEFORE_EXPIRY_SECS,
            enable_auto_refresh: true,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            retry_backoff: RetryBackoff::default(),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            chain_timeout_secs: DEFAULT_CHAIN_TIMEOUT_SECS,
        }
    }
}

impl RoleChainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_steps == 0 {
            return Err(CredentialError::Validation(
                "max_steps must be at least 1".to_string(),
            ));
        }
        if !(MIN_DURATION_SECS..=MAX_DURATION_SECS).contains(&self.default_duration_secs) {
            return Err(CredentialError::Validation(format!(
                "default_duration_secs must be between {} and {}, got {}",
                MIN_DURATION_SECS, MAX_DURATION_SECS, self.default_duration_secs
            )));
        }
        if self.refresh_before_expiry_secs == 0 {
            return Err(CredentialError::Validation(
                "refresh_before_expiry_secs must be greater than 0".to_string(),
            ));
        }
        if self.retry_attempts == 0 {
            return Err(CredentialError::Validation(
                "retry_attempts must be at least 1".to_string(),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(CredentialError::Validation(
                "call_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.chain_timeout_secs < self.call_timeout_secs {
            return Err(CredentialError::Validation(format!(
                "chain_timeout_secs ({}) must not be shorter than call_timeout_secs ({})",
                self.chain_timeout_secs, self.call_timeout_secs
            )));
        }
        Ok(())
    }

    pub fn refresh_before_expiry(&self) -> Duration {
        Duration::from_secs(self.refresh_before_expiry_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn chain_timeout(&self) -> Duration {
        Duration::from_secs(self.chain_timeout_secs)
    }
}
