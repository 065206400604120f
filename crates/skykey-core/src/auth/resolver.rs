//! Credential resolver - finds the live credentials for a provider.

use async_trait::async_trait;
use skykey_storage::CredentialStore;
use skykey_traits::{Credentials, DEFAULT_PROFILE, EnvLookup, ProcessEnv, Provider, Result};
use std::sync::Arc;
use tracing::debug;

use super::cache::{CredentialCache, cache_key};
use super::discoverer::credentials_from_env;
use super::providers::ProviderSet;

/// Supplies the seed credentials a role chain starts from.
#[async_trait]
pub trait SeedResolver: Send + Sync {
    async fn resolve_seed(&self, provider: Provider) -> Result<Credentials>;
}

/// Where resolved credentials came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialOrigin {
    Environment,
    Cli,
    Cache,
    Store,
}

/// Resolves credentials by precedence: environment, provider CLI, then the
/// store's default profile (through the cache).
///
/// Providers without a registered [`CloudProvider`](skykey_traits::CloudProvider)
/// still get the well-known environment variables.
pub struct CredentialResolver {
    providers: ProviderSet,
    store: Arc<CredentialStore>,
    cache: Arc<CredentialCache>,
    env: Arc<dyn EnvLookup>,
}

impl CredentialResolver {
    pub fn new(
        providers: ProviderSet,
        store: Arc<CredentialStore>,
        cache: Arc<CredentialCache>,
    ) -> Self {
        Self {
            providers,
            store,
            cache,
            env: Arc::new(ProcessEnv),
        }
    }

    /// Environment consulted for providers with no registered adapter.
    pub fn with_env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    /// Resolve the active credentials for `provider`.
    pub async fn get_active_credentials(&self, provider: Provider) -> Result<Credentials> {
        self.resolve(provider).await.map(|(creds, _)| creds)
    }

    /// Resolve credentials and report which source supplied them.
    pub async fn resolve(&self, provider: Provider) -> Result<(Credentials, CredentialOrigin)> {
        match self.providers.find(provider) {
            Some(cloud) => {
                if let Some(creds) = cloud.resolve_env() {
                    return Ok((creds, CredentialOrigin::Environment));
                }
                if let Some(creds) = cloud.resolve_cli().await {
                    return Ok((creds, CredentialOrigin::Cli));
                }
            }
            None => {
                if let Some(creds) = credentials_from_env(provider, self.env.as_ref()) {
                    debug!(provider = %provider, "Discovered credentials from environment");
                    return Ok((creds, CredentialOrigin::Environment));
                }
            }
        }

        let key = cache_key(provider, DEFAULT_PROFILE);
        if let Some(creds) = self.cache.get(&key) {
            debug!(provider = %provider, "Credential cache hit");
            return Ok((creds, CredentialOrigin::Cache));
        }

        let creds = self.store.retrieve(provider, DEFAULT_PROFILE)?;
        debug!(provider = %provider, key = %creds.masked(), "Loaded credentials from store");
        self.cache.set(key, creds.clone());
        Ok((creds, CredentialOrigin::Store))
    }
}

#[async_trait]
impl SeedResolver for CredentialResolver {
    async fn resolve_seed(&self, provider: Provider) -> Result<Credentials> {
        self.get_active_credentials(provider).await
    }
}
