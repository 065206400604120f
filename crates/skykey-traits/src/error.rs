//! Error taxonomy shared by the store, resolver, executor and registry.

use std::time::Duration;

use thiserror::Error;

use crate::credentials::Provider;

/// Why a single assume-role call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AssumeRoleFailure {
    #[error("trust policy rejected the caller: {0}")]
    TrustPolicyRejected(String),

    #[error("external id mismatch: {0}")]
    ExternalIdMismatch(String),

    #[error("request throttled: {0}")]
    Throttled(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The provider cannot assume roles at all (e.g. nothing configured).
    #[error("assume role unsupported: {0}")]
    Unsupported(String),

    /// Unclassified failure
    #[error("{0}")]
    Other(String),
}

impl AssumeRoleFailure {
    /// Everything except a definite refusal is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AssumeRoleFailure::TrustPolicyRejected(_)
                | AssumeRoleFailure::ExternalIdMismatch(_)
                | AssumeRoleFailure::Unsupported(_)
        )
    }
}

/// Credential subsystem error types
#[derive(Error, Debug)]
pub enum CredentialError {
    /// Malformed record, chain or config. Never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Decryption or authentication-tag failure. Never treated as "not found".
    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Credentials not found for {provider}/{profile}")]
    NotFound { provider: Provider, profile: String },

    #[error("Credentials expired for {provider}/{profile}")]
    Expired { provider: Provider, profile: String },

    #[error("Step {step} ({role_arn}) failed after {attempts} attempt(s): {cause}")]
    StepAssumption {
        step: usize,
        role_arn: String,
        attempts: u32,
        #[source]
        cause: AssumeRoleFailure,
    },

    #[error("Storage error: {context}")]
    Storage {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Role chain exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Session not found: {0}")]
    SessionNotFound(String),
}

impl CredentialError {
    /// Wrap an I/O error with a short description of what was attempted.
    pub fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        CredentialError::Storage {
            context: context.into(),
            source,
        }
    }

    /// Whether falling through to another credential source is reasonable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            CredentialError::NotFound { .. } | CredentialError::Expired { .. }
        )
    }
}

/// Result type alias for credential operations
pub type Result<T> = std::result::Result<T, CredentialError>;
