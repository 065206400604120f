//! Provider dispatch.

use skykey_traits::{CloudProvider, CredentialError, Provider, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Cloud provider capabilities keyed by [`Provider`]
#[derive(Clone, Default)]
pub struct ProviderSet {
    providers: HashMap<Provider, Arc<dyn CloudProvider>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider, replacing any previous one for the same cloud.
    pub fn register(&mut self, provider: Arc<dyn CloudProvider>) {
        self.providers.insert(provider.provider(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn find(&self, provider: Provider) -> Option<&Arc<dyn CloudProvider>> {
        self.providers.get(&provider)
    }

    pub fn get(&self, provider: Provider) -> Result<Arc<dyn CloudProvider>> {
        self.find(provider).cloned().ok_or_else(|| {
            CredentialError::Validation(format!("no cloud provider registered for {}", provider))
        })
    }

    pub fn registered(&self) -> Vec<Provider> {
        Provider::ALL
            .into_iter()
            .filter(|provider| self.providers.contains_key(provider))
            .collect()
    }
}
