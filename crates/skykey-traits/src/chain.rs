//! Role chain step definitions and the assume-role request handed to providers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-hop options for an assume-role call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssumeRoleOptions {
    /// Session duration; the chain default applies when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    /// Session tags
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
    /// Inline scoped-down policy document (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Managed policies that further restrict the session
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policy_arns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// MFA device serial or ARN; required by roles whose trust policy demands MFA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mfa_serial_number: Option<String>,
    /// Current code from the MFA device. Never persisted.
    #[serde(skip)]
    pub mfa_token_code: Option<String>,
}

impl AssumeRoleOptions {
    pub fn with_mfa(
        mut self,
        serial_number: impl Into<String>,
        token_code: impl Into<String>,
    ) -> Self {
        self.mfa_serial_number = Some(serial_number.into());
        self.mfa_token_code = Some(token_code.into());
        self
    }
}

/// One hop in a role chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChainStep {
    pub role_arn: String,
    /// Passed through to this hop only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub session_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<AssumeRoleOptions>,
}

impl RoleChainStep {
    pub fn new(role_arn: impl Into<String>, session_name: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            external_id: None,
            session_name: session_name.into(),
            options: None,
        }
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub fn with_options(mut self, options: AssumeRoleOptions) -> Self {
        self.options = Some(options);
        self
    }
}

/// Fully resolved request for a single assume-role call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssumeRoleRequest {
    pub role_arn: String,
    pub external_id: Option<String>,
    pub session_name: String,
    pub duration_secs: u32,
    pub tags: HashMap<String, String>,
    pub policy: Option<String>,
    pub policy_arns: Vec<String>,
    pub region: Option<String>,
    pub mfa_serial_number: Option<String>,
    pub mfa_token_code: Option<String>,
}

impl AssumeRoleRequest {
    /// Build the request for `step`, filling the duration from `default_duration_secs`.
    pub fn from_step(step: &RoleChainStep, default_duration_secs: u32) -> Self {
        let options = step.options.clone().unwrap_or_default();
        Self {
            role_arn: step.role_arn.clone(),
            external_id: step.external_id.clone(),
            session_name: step.session_name.clone(),
            duration_secs: options.duration_secs.unwrap_or(default_duration_secs),
            tags: options.tags,
            policy: options.policy,
            policy_arns: options.policy_arns,
            region: options.region,
            mfa_serial_number: options.mfa_serial_number,
            mfa_token_code: options.mfa_token_code,
        }
    }
}

/// Extract the account id from an ARN (`arn:partition:service:region:account:resource`).
pub fn extract_account_from_arn(arn: &str) -> Option<&str> {
    arn.split(':').nth(4).filter(|account| !account.is_empty())
}
