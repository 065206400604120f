//! Role chain executor.
//!
//! Assumes each role in order, handing the previous hop's credentials to the
//! next call. Intermediate credentials live only in this task; a failed or
//! cancelled run drops them before returning.

use skykey_traits::{
    AssumeRoleFailure, AssumeRoleRequest, Clock, CloudProvider, CredentialError, Credentials,
    Result, RoleChainStep, extract_account_from_arn,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::RoleChainConfig;
use super::retry::retry_delay;
use super::validation::{validate_chain, validate_step};
use crate::auth::ProviderSet;
use crate::session::{SessionCredentials, StepCredentials};

/// Session length requested when dry-running a single hop
pub const VALIDATION_DURATION_SECS: u32 = 900;

/// Executes role chains against the registered cloud providers
pub struct RoleChainExecutor {
    providers: ProviderSet,
    clock: Arc<dyn Clock>,
}

impl RoleChainExecutor {
    pub fn new(providers: ProviderSet, clock: Arc<dyn Clock>) -> Self {
        Self { providers, clock }
    }

    /// Run `steps` starting from `seed`.
    ///
    /// Returns credentials for every hop, or the first unrecoverable error.
    /// Bounded by `config.chain_timeout_secs` and by `cancel`.
    pub async fn execute(
        &self,
        seed: &Credentials,
        steps: &[RoleChainStep],
        config: &RoleChainConfig,
        cancel: &CancellationToken,
    ) -> Result<SessionCredentials> {
        validate_chain(steps, config)?;
        let provider = self.providers.get(seed.provider)?;

        let deadline = config.chain_timeout();
        let run = self.run_steps(provider.as_ref(), seed, steps, config);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(provider = %seed.provider, steps = steps.len(), "Role chain cancelled");
                Err(CredentialError::Cancelled)
            }
            result = tokio::time::timeout(deadline, run) => match result {
                Ok(result) => result,
                Err(_) => {
                    warn!(provider = %seed.provider, ?deadline, "Role chain exceeded its deadline");
                    Err(CredentialError::DeadlineExceeded(deadline))
                }
            },
        }
    }

    /// Dry-run one hop: assume `step` from `caller` with a short session and
    /// discard the result. Makes a single attempt.
    pub async fn validate_step(
        &self,
        caller: &Credentials,
        step: &RoleChainStep,
        config: &RoleChainConfig,
        cancel: &CancellationToken,
    ) -> Result<()> {
        config.validate()?;
        validate_step(0, step)?;
        let provider = self.providers.get(caller.provider)?;

        let mut request = AssumeRoleRequest::from_step(step, VALIDATION_DURATION_SECS);
        request.duration_secs = VALIDATION_DURATION_SECS;
        let call_timeout = config.call_timeout();

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            outcome = tokio::time::timeout(call_timeout, provider.assume_role(caller, &request)) => {
                match outcome {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AssumeRoleFailure::Timeout(call_timeout)),
                }
            }
        };

        match outcome {
            Ok(_) => {
                debug!(role_arn = %step.role_arn, "Role can be assumed");
                Ok(())
            }
            Err(cause) => {
                debug!(role_arn = %step.role_arn, error = %cause, "Role validation failed");
                Err(CredentialError::StepAssumption {
                    step: 0,
                    role_arn: step.role_arn.clone(),
                    attempts: 1,
                    cause,
                })
            }
        }
    }

    async fn run_steps(
        &self,
        provider: &dyn CloudProvider,
        seed: &Credentials,
        steps: &[RoleChainStep],
        config: &RoleChainConfig,
    ) -> Result<SessionCredentials> {
        let mut completed: Vec<StepCredentials> = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let caller = completed.last().map_or(seed, |prev| &prev.credentials);
            let request = AssumeRoleRequest::from_step(step, config.default_duration_secs);

            let creds = self
                .assume_with_retry(provider, caller, &request, index, config)
                .await?;
            let creds = annotate(creds, step);

            debug!(
                step = index,
                role_arn = %step.role_arn,
                key = %creds.masked(),
                expiry = ?creds.expiry,
                "Assumed role"
            );

            completed.push(StepCredentials {
                index,
                role_arn: step.role_arn.clone(),
                expiry: creds.expiry,
                credentials: creds,
                assumed_at: self.clock.now(),
            });
        }

        info!(
            provider = %seed.provider,
            steps = completed.len(),
            "Role chain established"
        );
        SessionCredentials::new(completed)
    }

    async fn assume_with_retry(
        &self,
        provider: &dyn CloudProvider,
        caller: &Credentials,
        request: &AssumeRoleRequest,
        index: usize,
        config: &RoleChainConfig,
    ) -> Result<Credentials> {
        let call_timeout = config.call_timeout();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);

            let outcome =
                match tokio::time::timeout(call_timeout, provider.assume_role(caller, request))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AssumeRoleFailure::Timeout(call_timeout)),
                };

            match outcome {
                Ok(creds) => return Ok(creds),
                Err(failure) if failure.is_retryable() && attempt < config.retry_attempts => {
                    let delay = retry_delay(config, attempt);
                    warn!(
                        step = index,
                        role_arn = %request.role_arn,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure,
                        "Assume-role failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(cause) => {
                    warn!(
                        step = index,
                        role_arn = %request.role_arn,
                        attempts = attempt,
                        error = %cause,
                        "Assume-role failed"
                    );
                    return Err(CredentialError::StepAssumption {
                        step: index,
                        role_arn: request.role_arn.clone(),
                        attempts: attempt,
                        cause,
                    });
                }
            }
        }
    }
}

/// Record which role the credentials belong to.
fn annotate(creds: Credentials, step: &RoleChainStep) -> Credentials {
    let mut creds = creds
        .with_property("role_arn", step.role_arn.clone())
        .with_property("session_name", step.session_name.clone());
    if creds.account.is_none()
        && let Some(account) = extract_account_from_arn(&step.role_arn)
    {
        creds = creds.with_account(account);
    }
    creds
}
