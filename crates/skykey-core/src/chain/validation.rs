//! Structural checks run before any assume-role call is made.

use skykey_traits::{CredentialError, Result, RoleChainStep};
use std::collections::HashSet;

use super::config::RoleChainConfig;

/// Validate a chain definition against its config.
pub fn validate_chain(steps: &[RoleChainStep], config: &RoleChainConfig) -> Result<()> {
    config.validate()?;

    if steps.is_empty() {
        return Err(CredentialError::Validation(
            "role chain must contain at least one step".to_string(),
        ));
    }
    if steps.len() > config.max_steps {
        return Err(CredentialError::Validation(format!(
            "role chain has {} steps, maximum is {}",
            steps.len(),
            config.max_steps
        )));
    }

    let mut seen = HashSet::with_capacity(steps.len());
    for (index, step) in steps.iter().enumerate() {
        validate_step(index, step)?;
        let role_arn = step.role_arn.trim();
        if !seen.insert(role_arn) {
            return Err(CredentialError::Validation(format!(
                "step {}: role {} already appears earlier in the chain",
                index, role_arn
            )));
        }
    }

    Ok(())
}

/// Checks that apply to a single hop regardless of its chain.
pub fn validate_step(index: usize, step: &RoleChainStep) -> Result<()> {
    if step.role_arn.trim().is_empty() {
        return Err(CredentialError::Validation(format!(
            "step {}: role_arn is required",
            index
        )));
    }
    if step.session_name.trim().is_empty() {
        return Err(CredentialError::Validation(format!(
            "step {}: session_name is required",
            index
        )));
    }
    if let Some(options) = &step.options
        && options.mfa_serial_number.is_some() != options.mfa_token_code.is_some()
    {
        return Err(CredentialError::Validation(format!(
            "step {}: mfa_serial_number and mfa_token_code must be set together",
            index
        )));
    }
    Ok(())
}
