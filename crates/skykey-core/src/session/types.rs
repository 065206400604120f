//! Chained session types.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use skykey_traits::{CredentialError, Credentials, Provider, Result, RoleChainStep};
use std::fmt;
use std::sync::Arc;

use crate::chain::RoleChainConfig;

/// Refresh lifecycle of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshState {
    #[default]
    Idle,
    Refreshing,
    /// Last refresh failed; credentials are the last known good set
    Degraded,
}

impl fmt::Display for RefreshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefreshState::Idle => write!(f, "idle"),
            RefreshState::Refreshing => write!(f, "refreshing"),
            RefreshState::Degraded => write!(f, "degraded"),
        }
    }
}

/// Credentials obtained for one hop of a chain
#[derive(Debug, Clone)]
pub struct StepCredentials {
    pub index: usize,
    pub role_arn: String,
    pub credentials: Credentials,
    pub assumed_at: DateTime<Utc>,
    pub expiry: Option<DateTime<Utc>>,
}

/// The full credential set produced by one successful chain execution.
///
/// Always holds at least one step; the final credentials are the last step's.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    steps: Vec<StepCredentials>,
}

impl SessionCredentials {
    pub(crate) fn new(steps: Vec<StepCredentials>) -> Result<Self> {
        if steps.is_empty() {
            return Err(CredentialError::Validation(
                "a session needs credentials for at least one step".to_string(),
            ));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[StepCredentials] {
        &self.steps
    }

    pub fn final_step(&self) -> &StepCredentials {
        &self.steps[self.steps.len() - 1]
    }

    pub fn final_creds(&self) -> &Credentials {
        &self.final_step().credentials
    }

    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.final_step().expiry
    }
}

#[derive(Debug, Clone)]
struct SessionStatus {
    refresh_state: RefreshState,
    last_used_at: DateTime<Utc>,
    last_refreshed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

/// A fully established role chain, kept alive by the session registry.
pub struct ChainedSession {
    id: String,
    steps: Vec<RoleChainStep>,
    config: RoleChainConfig,
    seed_provider: Provider,
    created_at: DateTime<Utc>,
    credentials: RwLock<Arc<SessionCredentials>>,
    status: Mutex<SessionStatus>,
}

impl ChainedSession {
    pub(crate) fn new(
        seed_provider: Provider,
        steps: Vec<RoleChainStep>,
        config: RoleChainConfig,
        credentials: SessionCredentials,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            steps,
            config,
            seed_provider,
            created_at: now,
            credentials: RwLock::new(Arc::new(credentials)),
            status: Mutex::new(SessionStatus {
                refresh_state: RefreshState::Idle,
                last_used_at: now,
                last_refreshed_at: None,
                last_error: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn steps(&self) -> &[RoleChainStep] {
        &self.steps
    }

    pub fn config(&self) -> &RoleChainConfig {
        &self.config
    }

    pub fn seed_provider(&self) -> Provider {
        self.seed_provider
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Consistent view of all step credentials at one point in time.
    pub fn snapshot(&self) -> Arc<SessionCredentials> {
        self.credentials.read().clone()
    }

    /// The last hop's credentials, even if past expiry.
    pub fn final_creds(&self) -> Credentials {
        self.snapshot().final_creds().clone()
    }

    /// The last hop's credentials, or `Expired` once they are past their expiry.
    pub fn current_credentials(&self, now: DateTime<Utc>) -> Result<Credentials> {
        let snapshot = self.snapshot();
        let creds = snapshot.final_creds();
        if creds.is_expired_at(now) {
            return Err(CredentialError::Expired {
                provider: creds.provider,
                profile: format!("session/{}", self.id),
            });
        }
        Ok(creds.clone())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.credentials.read().expiry()
    }

    /// Whether the final credentials are inside the refresh window at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        let Some(expiry) = self.expires_at() else {
            return false;
        };
        let window = chrono::Duration::seconds(
            i64::try_from(self.config.refresh_before_expiry_secs).unwrap_or(i64::MAX),
        );
        expiry - now < window
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.status.lock().refresh_state
    }

    pub fn last_used_at(&self) -> DateTime<Utc> {
        self.status.lock().last_used_at
    }

    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.status.lock().last_refreshed_at
    }

    /// Message of the most recent refresh failure, cleared on success.
    pub fn last_error(&self) -> Option<String> {
        self.status.lock().last_error.clone()
    }

    pub fn info(&self) -> SessionInfo {
        let snapshot = self.snapshot();
        let status = self.status.lock().clone();
        SessionInfo {
            id: self.id.clone(),
            seed_provider: self.seed_provider,
            step_count: self.steps.len(),
            final_role_arn: snapshot.final_step().role_arn.clone(),
            created_at: self.created_at,
            last_used_at: status.last_used_at,
            last_refreshed_at: status.last_refreshed_at,
            expires_at: snapshot.expiry(),
            refresh_state: status.refresh_state,
        }
    }

    pub(crate) fn touch(&self, now: DateTime<Utc>) {
        self.status.lock().last_used_at = now;
    }

    /// Move to `Refreshing`, returning the state to restore if the attempt is
    /// abandoned. `None` when a refresh is already running.
    pub(crate) fn begin_refresh(&self) -> Option<RefreshState> {
        let mut status = self.status.lock();
        if status.refresh_state == RefreshState::Refreshing {
            return None;
        }
        let previous = status.refresh_state;
        status.refresh_state = RefreshState::Refreshing;
        Some(previous)
    }

    pub(crate) fn complete_refresh(&self, credentials: SessionCredentials, now: DateTime<Utc>) {
        *self.credentials.write() = Arc::new(credentials);
        let mut status = self.status.lock();
        status.refresh_state = RefreshState::Idle;
        status.last_refreshed_at = Some(now);
        status.last_error = None;
    }

    pub(crate) fn fail_refresh(&self, error: &CredentialError) {
        let mut status = self.status.lock();
        status.refresh_state = RefreshState::Degraded;
        status.last_error = Some(error.to_string());
    }

    pub(crate) fn abandon_refresh(&self, previous: RefreshState) {
        self.status.lock().refresh_state = previous;
    }
}

impl fmt::Debug for ChainedSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedSession")
            .field("id", &self.id)
            .field("seed_provider", &self.seed_provider)
            .field("steps", &self.steps.len())
            .field("refresh_state", &self.refresh_state())
            .field("expires_at", &self.expires_at())
            .finish()
    }
}

/// Serializable summary of a session (no secrets)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: String,
    pub seed_provider: Provider,
    pub step_count: usize,
    pub final_role_arn: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub refresh_state: RefreshState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn step_creds(index: usize, token: &str, expiry: Option<DateTime<Utc>>) -> StepCredentials {
        let mut credentials =
            Credentials::access_key(Provider::Aws, format!("ASIA{index}"), "secret")
                .with_token(token);
        credentials.expiry = expiry;
        StepCredentials {
            index,
            role_arn: format!("arn:aws:iam::000000000000:role/r{index}"),
            credentials,
            assumed_at: Utc::now(),
            expiry,
        }
    }

    fn session(expiry: Option<DateTime<Utc>>) -> ChainedSession {
        let creds = SessionCredentials::new(vec![
            step_creds(0, "first", expiry),
            step_creds(1, "second", expiry),
        ])
        .unwrap();
        ChainedSession::new(
            Provider::Aws,
            vec![
                RoleChainStep::new("arn:aws:iam::000000000000:role/r0", "s0"),
                RoleChainStep::new("arn:aws:iam::000000000000:role/r1", "s1"),
            ],
            RoleChainConfig::default(),
            creds,
            Utc::now(),
        )
    }

    #[test]
    fn test_empty_credentials_rejected() {
        assert!(SessionCredentials::new(Vec::new()).is_err());
    }

    #[test]
    fn test_final_creds_are_last_step() {
        let session = session(None);
        assert_eq!(session.final_creds().token.as_deref(), Some("second"));
        assert_eq!(session.snapshot().steps().len(), 2);
        assert_eq!(session.info().final_role_arn, "arn:aws:iam::000000000000:role/r1");
    }

    #[test]
    fn test_refresh_window() {
        let now = Utc::now();
        assert!(!session(None).needs_refresh(now));
        assert!(!session(Some(now + Duration::minutes(30))).needs_refresh(now));
        assert!(session(Some(now + Duration::minutes(4))).needs_refresh(now));
        assert!(session(Some(now - Duration::minutes(1))).needs_refresh(now));
    }

    #[test]
    fn test_current_credentials_respects_expiry() {
        let now = Utc::now();
        let session = session(Some(now + Duration::minutes(10)));
        assert!(session.current_credentials(now).is_ok());
        assert!(matches!(
            session.current_credentials(now + Duration::minutes(11)),
            Err(CredentialError::Expired { .. })
        ));
    }

    #[test]
    fn test_refresh_state_transitions() {
        let session = session(None);
        let previous = session.begin_refresh().unwrap();
        assert_eq!(previous, RefreshState::Idle);
        assert!(session.begin_refresh().is_none());

        session.fail_refresh(&CredentialError::Cancelled);
        assert_eq!(session.refresh_state(), RefreshState::Degraded);
        assert!(session.last_error().is_some());
        assert_eq!(session.final_creds().token.as_deref(), Some("second"));

        let previous = session.begin_refresh().unwrap();
        session.abandon_refresh(previous);
        assert_eq!(session.refresh_state(), RefreshState::Degraded);

        session.begin_refresh().unwrap();
        let replacement = SessionCredentials::new(vec![step_creds(0, "fresh", None)]).unwrap();
        session.complete_refresh(replacement, Utc::now());
        assert_eq!(session.refresh_state(), RefreshState::Idle);
        assert_eq!(session.final_creds().token.as_deref(), Some("fresh"));
        assert!(session.last_error().is_none());
        assert!(session.last_refreshed_at().is_some());
    }

    #[test]
    fn test_snapshot_survives_swap() {
        let session = session(None);
        let before = session.snapshot();
        session.begin_refresh().unwrap();
        session.complete_refresh(
            SessionCredentials::new(vec![step_creds(0, "fresh", None)]).unwrap(),
            Utc::now(),
        );
        assert_eq!(before.final_creds().token.as_deref(), Some("second"));
        assert_eq!(session.snapshot().final_creds().token.as_deref(), Some("fresh"));
    }
}
