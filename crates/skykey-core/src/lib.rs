//! Skykey Core - credential resolution and cross-account role chains
//!
//! # Architecture
//!
//! - `auth` - provider discovery, the TTL cache and the credential resolver
//! - `chain` - role chain config, validation, retry policy and the executor
//! - `session` - the session registry and the background refresher
//! - `service` - [`CredentialService`], the entry point embedding applications use
//!
//! Encrypted persistence lives in `skykey-storage`; shared types and
//! collaborator traits in `skykey-traits`.

pub mod auth;
pub mod chain;
pub mod config;
pub mod observer;
pub mod service;
pub mod session;
pub mod telemetry;
#[cfg(any(test, feature = "test-utils"))]
pub mod testkit;

pub use auth::{
    CliCredentialSource, CredentialCache, CredentialOrigin, CredentialResolver, ProviderAdapter,
    ProviderSet, RoleAssumer, SeedResolver,
};
pub use chain::{RetryBackoff, RoleChainConfig, RoleChainExecutor};
pub use config::{ResolverConfig, SkykeyConfig};
pub use observer::TracingObserver;
pub use service::{CredentialService, CredentialServiceBuilder};
pub use session::{
    ChainedSession, RefreshOutcome, RefreshState, RegistrySummary, SessionCredentials,
    SessionInfo, SessionRefresher, SessionRegistry, StepCredentials,
};

// Re-export the shared vocabulary so most callers need only this crate.
pub use skykey_storage::{CredentialStore, StoreConfig};
pub use skykey_traits::{
    AssumeRoleFailure, AssumeRoleOptions, AssumeRoleRequest, AuthMethod, ChainObserver, Clock,
    CloudProvider, CredentialError, Credentials, EnvLookup, Provider, Result, RoleChainStep,
};
