//! Credential discovery from the environment and provider CLIs.
//!
//! [`ProviderAdapter`] assembles a [`CloudProvider`] from three pluggable parts:
//! an environment view, an optional CLI configuration source and an optional
//! role assumer.

use async_trait::async_trait;
use skykey_traits::{
    AssumeRoleFailure, AssumeRoleRequest, AuthMethod, CloudProvider, Credentials, EnvLookup,
    ProcessEnv, Provider,
};
use std::sync::Arc;
use tracing::debug;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const AWS_SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";
pub const AWS_REGION: &str = "AWS_REGION";
pub const AWS_DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const AZURE_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const AZURE_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const AZURE_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const AZURE_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const GOOGLE_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const GOOGLE_CLOUD_PROJECT: &str = "GOOGLE_CLOUD_PROJECT";

/// Build credentials from a provider's well-known environment variables.
pub fn credentials_from_env(provider: Provider, env: &dyn EnvLookup) -> Option<Credentials> {
    match provider {
        Provider::Aws => {
            let access_key = env.var(AWS_ACCESS_KEY_ID)?;
            let secret_key = env.var(AWS_SECRET_ACCESS_KEY)?;
            let mut creds = Credentials::access_key(provider, access_key, secret_key);
            if let Some(token) = env.var(AWS_SESSION_TOKEN) {
                creds = creds.with_token(token);
            }
            if let Some(region) = env.var(AWS_REGION).or_else(|| env.var(AWS_DEFAULT_REGION)) {
                creds = creds.with_region(region);
            }
            Some(creds)
        }
        Provider::Azure => {
            let client_id = env.var(AZURE_CLIENT_ID)?;
            let client_secret = env.var(AZURE_CLIENT_SECRET)?;
            let mut creds = Credentials::access_key(provider, client_id, client_secret);
            if let Some(tenant) = env.var(AZURE_TENANT_ID) {
                creds = creds.with_property("tenant_id", tenant);
            }
            if let Some(subscription) = env.var(AZURE_SUBSCRIPTION_ID) {
                creds = creds
                    .with_account(subscription.clone())
                    .with_property("subscription_id", subscription);
            }
            Some(creds)
        }
        Provider::Gcp => {
            let key_file = env.var(GOOGLE_APPLICATION_CREDENTIALS)?;
            let mut creds =
                Credentials::new(provider, AuthMethod::Sdk).with_property("key_file", key_file);
            if let Some(project) = env.var(GOOGLE_CLOUD_PROJECT) {
                creds = creds
                    .with_account(project.clone())
                    .with_property("project", project);
            }
            Some(creds)
        }
    }
}

/// Reads credentials the provider's own CLI has configured.
#[async_trait]
pub trait CliCredentialSource: Send + Sync {
    async fn load(&self, provider: Provider) -> Option<Credentials>;
}

/// Performs the actual assume-role call against a cloud endpoint.
#[async_trait]
pub trait RoleAssumer: Send + Sync {
    async fn assume_role(
        &self,
        caller: &Credentials,
        request: &AssumeRoleRequest,
    ) -> Result<Credentials, AssumeRoleFailure>;
}

/// A [`CloudProvider`] assembled from pluggable parts
pub struct ProviderAdapter {
    provider: Provider,
    env: Arc<dyn EnvLookup>,
    cli: Option<Arc<dyn CliCredentialSource>>,
    assumer: Option<Arc<dyn RoleAssumer>>,
}

impl ProviderAdapter {
    /// Adapter reading the real process environment, with no CLI source or assumer.
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            env: Arc::new(ProcessEnv),
            cli: None,
            assumer: None,
        }
    }

    pub fn with_env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = env;
        self
    }

    pub fn with_cli(mut self, cli: Arc<dyn CliCredentialSource>) -> Self {
        self.cli = Some(cli);
        self
    }

    pub fn with_assumer(mut self, assumer: Arc<dyn RoleAssumer>) -> Self {
        self.assumer = Some(assumer);
        self
    }
}

#[async_trait]
impl CloudProvider for ProviderAdapter {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn resolve_env(&self) -> Option<Credentials> {
        let creds = credentials_from_env(self.provider, self.env.as_ref());
        if creds.is_some() {
            debug!(provider = %self.provider, "Discovered credentials from environment");
        }
        creds
    }

    async fn resolve_cli(&self) -> Option<Credentials> {
        let cli = self.cli.as_ref()?;
        let creds = cli.load(self.provider).await;
        if creds.is_some() {
            debug!(provider = %self.provider, "Discovered credentials from CLI configuration");
        }
        creds
    }

    async fn assume_role(
        &self,
        caller: &Credentials,
        request: &AssumeRoleRequest,
    ) -> Result<Credentials, AssumeRoleFailure> {
        match &self.assumer {
            Some(assumer) => assumer.assume_role(caller, request).await,
            None => Err(AssumeRoleFailure::Unsupported(format!(
                "assume role is not configured for provider {}",
                self.provider
            ))),
        }
    }
}
