//! Collaborator traits: provider capabilities, environment access, time and
//! observation.
//!
//! Implementations are provided by downstream crates (e.g., skykey-core) or by
//! the embedding application.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::chain::AssumeRoleRequest;
use crate::credentials::{Credentials, Provider};
use crate::error::{AssumeRoleFailure, CredentialError};

/// Capability set every cloud provider exposes to the resolver and executor.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Which provider this capability set serves
    fn provider(&self) -> Provider;

    /// Credentials from provider-specific environment variables, if present.
    fn resolve_env(&self) -> Option<Credentials>;

    /// Credentials from the provider CLI's own configuration, if available.
    async fn resolve_cli(&self) -> Option<Credentials> {
        None
    }

    /// Assume `request.role_arn` using `caller` as the calling identity.
    async fn assume_role(
        &self,
        caller: &Credentials,
        request: &AssumeRoleRequest,
    ) -> Result<Credentials, AssumeRoleFailure>;
}

/// Read-only view of environment variables.
pub trait EnvLookup: Send + Sync {
    /// Non-empty value of `name`, if set.
    fn var(&self, name: &str) -> Option<String>;
}

/// The real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|value| !value.is_empty()).cloned()
    }
}

/// Time source for expiry comparisons
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Sink for background outcomes nobody is waiting on synchronously.
pub trait ChainObserver: Send + Sync {
    fn session_refreshed(&self, _session_id: &str) {}

    fn refresh_failed(&self, session_id: &str, error: &CredentialError);

    fn validation_failed(&self, _error: &CredentialError) {}
}
