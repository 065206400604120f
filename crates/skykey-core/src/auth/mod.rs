//! Credential resolution
//!
//! This module finds the live credentials for a provider with:
//! - Discovery from provider environment variables and CLI configuration
//! - Fallback to the encrypted credential store
//! - A short-TTL cache in front of the store

pub mod cache;
pub mod discoverer;
pub mod providers;
pub mod resolver;

pub use cache::{CredentialCache, cache_key};
pub use discoverer::{CliCredentialSource, ProviderAdapter, RoleAssumer, credentials_from_env};
pub use providers::ProviderSet;
pub use resolver::{CredentialOrigin, CredentialResolver, SeedResolver};
