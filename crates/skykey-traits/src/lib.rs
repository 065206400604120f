//! Skykey Traits - Shared types and collaborator interfaces.
//!
//! This crate provides the vocabulary used across the Skykey workspace:
//! - `Credentials`, `Provider`, `AuthMethod`
//! - Role chain step definitions and assume-role requests
//! - The `CredentialError` taxonomy
//! - Collaborator traits (`CloudProvider`, `EnvLookup`, `Clock`, `ChainObserver`)

pub mod chain;
pub mod credentials;
pub mod error;
pub mod provider;

pub use chain::{AssumeRoleOptions, AssumeRoleRequest, RoleChainStep, extract_account_from_arn};
pub use credentials::{AuthMethod, Credentials, DEFAULT_PROFILE, Provider};
pub use error::{AssumeRoleFailure, CredentialError, Result};
pub use provider::{ChainObserver, Clock, CloudProvider, EnvLookup, ProcessEnv, SystemClock};
