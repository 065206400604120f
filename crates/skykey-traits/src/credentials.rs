//! Core credential types
//!
//! Defines cloud providers, authentication methods and the credential record
//! shared by the store, the resolver and the role chain executor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

use crate::error::CredentialError;

/// Profile name used when none is given.
pub const DEFAULT_PROFILE: &str = "default";

/// Cloud provider a credential belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
    /// Google Cloud Platform
    Gcp,
}

impl Provider {
    /// All supported providers, in resolution order for multi-provider scans.
    pub const ALL: [Provider; 3] = [Provider::Aws, Provider::Azure, Provider::Gcp];

    /// Stable lowercase identifier, also used in record file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Aws => "aws",
            Provider::Azure => "azure",
            Provider::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CredentialError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aws" => Ok(Provider::Aws),
            "azure" => Ok(Provider::Azure),
            "gcp" => Ok(Provider::Gcp),
            other => Err(CredentialError::Validation(format!(
                "unknown provider: {}",
                other
            ))),
        }
    }
}

/// How a credential authenticates against its provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// Static access key + secret key pair
    AccessKey,
    /// Service key / token
    ServiceKey,
    /// Resolved live by the provider CLI
    Cli,
    /// Resolved live by the provider SDK default chain
    Sdk,
    /// Temporary credentials obtained by assuming a role
    IamRole,
}

impl AuthMethod {
    /// Whether records using this method carry secret material of their own.
    pub fn carries_secret(&self) -> bool {
        matches!(self, AuthMethod::AccessKey | AuthMethod::ServiceKey)
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::AccessKey => write!(f, "access-key"),
            AuthMethod::ServiceKey => write!(f, "service-key"),
            AuthMethod::Cli => write!(f, "cli"),
            AuthMethod::Sdk => write!(f, "sdk"),
            AuthMethod::IamRole => write!(f, "iam-role"),
        }
    }
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

/// A cloud credential record.
///
/// Secret fields are wiped from memory when the value is dropped, and `Debug`
/// output never contains them. Construct with [`Credentials::new`] or one of the
/// shorthand constructors and refine with the `with_*` builders.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub provider: Provider,
    pub auth_method: AuthMethod,
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_key: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_key: String,
    /// Session token or service key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Provider-specific extras (tenant id, key file, assumed role arn, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl Credentials {
    /// Create an empty record for the given provider and method.
    pub fn new(provider: Provider, auth_method: AuthMethod) -> Self {
        Self {
            provider,
            auth_method,
            profile: default_profile(),
            access_key: String::new(),
            secret_key: String::new(),
            token: None,
            account: None,
            region: None,
            expiry: None,
            properties: HashMap::new(),
        }
    }

    /// Static access key credentials.
    pub fn access_key(
        provider: Provider,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        let mut creds = Self::new(provider, AuthMethod::AccessKey);
        creds.access_key = access_key.into();
        creds.secret_key = secret_key.into();
        creds
    }

    /// Service key credentials.
    pub fn service_key(provider: Provider, token: impl Into<String>) -> Self {
        Self::new(provider, AuthMethod::ServiceKey).with_token(token)
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Profile name, falling back to the default profile when blank.
    pub fn profile_name(&self) -> &str {
        if self.profile.trim().is_empty() {
            DEFAULT_PROFILE
        } else {
            &self.profile
        }
    }

    /// Check the secret-material rules for the record's auth method.
    pub fn validate(&self) -> Result<(), CredentialError> {
        match self.auth_method {
            AuthMethod::AccessKey => {
                if self.access_key.is_empty() || self.secret_key.is_empty() {
                    return Err(CredentialError::Validation(
                        "access key and secret key are required for access key auth".to_string(),
                    ));
                }
            }
            AuthMethod::ServiceKey => {
                if self.token.as_deref().is_none_or(str::is_empty) {
                    return Err(CredentialError::Validation(
                        "service key is required for service key auth".to_string(),
                    ));
                }
            }
            AuthMethod::Cli | AuthMethod::Sdk | AuthMethod::IamRole => {}
        }
        Ok(())
    }

    /// Check whether the record has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|expiry| expiry <= now)
    }

    /// Check whether the record has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Display-safe version of the primary identifier
    pub fn masked(&self) -> String {
        let value = if self.access_key.is_empty() {
            self.token.as_deref().unwrap_or_default()
        } else {
            self.access_key.as_str()
        };
        let chars = value.chars().count();
        if chars <= 8 {
            return "*".repeat(chars);
        }
        let head: String = value.chars().take(4).collect();
        let tail: String = value.chars().skip(chars - 4).collect();
        format!("{}...{}", head, tail)
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        self.access_key.zeroize();
        self.secret_key.zeroize();
        self.token.zeroize();
    }
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        self.provider == other.provider
            && self.auth_method == other.auth_method
            && self.profile == other.profile
            && self.access_key == other.access_key
            && self.secret_key == other.secret_key
            && self.token == other.token
            && self.account == other.account
            && self.region == other.region
            && self.expiry == other.expiry
            && self.properties == other.properties
    }
}

impl Eq for Credentials {}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("provider", &self.provider)
            .field("auth_method", &self.auth_method)
            .field("profile", &self.profile)
            .field("access_key", &self.masked())
            .field("secret_key", &"[REDACTED]")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("account", &self.account)
            .field("region", &self.region)
            .field("expiry", &self.expiry)
            .field("properties", &self.properties)
            .finish()
    }
}
