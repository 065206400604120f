//! Test utilities: a scripted cloud provider, a manual clock, a recording
//! observer and throwaway credential stores.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use skykey_storage::{CredentialStore, MachineIdentity};
use skykey_traits::{
    AssumeRoleFailure, AssumeRoleRequest, ChainObserver, Clock, CloudProvider, CredentialError,
    Credentials, Provider, Result, SystemClock,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::SeedResolver;

/// Creates a credential store in a fresh temporary directory.
pub fn test_store() -> (Arc<CredentialStore>, tempfile::TempDir) {
    let temp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let identity = MachineIdentity {
        hostname: "testkit-host".to_string(),
        username: "testkit".to_string(),
        machine_id: "testkit-machine".to_string(),
        platform: std::env::consts::OS.to_string(),
    };
    let store = CredentialStore::with_identity(temp_dir.path().join("credentials"), &identity)
        .expect("failed to open test store");
    (Arc::new(store), temp_dir)
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: ChronoDuration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// One recorded assume-role call
#[derive(Debug, Clone)]
pub struct AssumeRoleCall {
    pub role_arn: String,
    pub session_name: String,
    pub external_id: Option<String>,
    pub duration_secs: u32,
    pub mfa_serial_number: Option<String>,
    pub mfa_token_code: Option<String>,
    /// Access key of the identity that made the call
    pub caller_access_key: String,
    pub caller_token: Option<String>,
}

pub type ScriptedResponse = std::result::Result<Credentials, AssumeRoleFailure>;

/// Deterministic cloud provider for chain tests.
///
/// Responses queued with [`MockProvider::respond`] are consumed per role in
/// order; once a role's queue is empty, calls succeed with freshly issued
/// credentials expiring `duration_secs` after the provider clock's now.
pub struct MockProvider {
    provider: Provider,
    clock: Arc<dyn Clock>,
    env: Option<Credentials>,
    cli: Option<Credentials>,
    delay: Mutex<Option<Duration>>,
    scripts: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    calls: Mutex<Vec<AssumeRoleCall>>,
}

impl MockProvider {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
            env: None,
            cli: None,
            delay: Mutex::new(None),
            scripts: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_env_credentials(mut self, creds: Credentials) -> Self {
        self.env = Some(creds);
        self
    }

    pub fn with_cli_credentials(mut self, creds: Credentials) -> Self {
        self.cli = Some(creds);
        self
    }

    /// Every assume-role call sleeps this long before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        self.set_delay(delay);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Queue the next response for `role_arn`.
    pub fn respond(&self, role_arn: &str, response: ScriptedResponse) {
        self.scripts
            .lock()
            .entry(role_arn.to_string())
            .or_default()
            .push_back(response);
    }

    /// Session credentials as an STS-like service would issue them.
    pub fn issued(access_key: &str, token: &str) -> Credentials {
        Credentials::access_key(Provider::Aws, access_key, format!("{access_key}-secret"))
            .with_token(token)
    }

    pub fn calls(&self) -> Vec<AssumeRoleCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, role_arn: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| call.role_arn == role_arn)
            .count()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn resolve_env(&self) -> Option<Credentials> {
        self.env.clone()
    }

    async fn resolve_cli(&self) -> Option<Credentials> {
        self.cli.clone()
    }

    async fn assume_role(
        &self,
        caller: &Credentials,
        request: &AssumeRoleRequest,
    ) -> std::result::Result<Credentials, AssumeRoleFailure> {
        let call_index = {
            let mut calls = self.calls.lock();
            calls.push(AssumeRoleCall {
                role_arn: request.role_arn.clone(),
                session_name: request.session_name.clone(),
                external_id: request.external_id.clone(),
                duration_secs: request.duration_secs,
                mfa_serial_number: request.mfa_serial_number.clone(),
                mfa_token_code: request.mfa_token_code.clone(),
                caller_access_key: caller.access_key.clone(),
                caller_token: caller.token.clone(),
            });
            calls.len()
        };

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .get_mut(&request.role_arn)
            .and_then(VecDeque::pop_front);
        if let Some(response) = scripted {
            return response;
        }

        let expiry =
            self.clock.now() + ChronoDuration::seconds(i64::from(request.duration_secs));
        Ok(Credentials::access_key(
            self.provider,
            format!("ASIAMOCK{call_index:08}"),
            format!("mock-secret-{call_index}"),
        )
        .with_token(format!("{}-token-{}", request.session_name, call_index))
        .with_expiry(expiry))
    }
}

/// Seed resolver returning a fixed record, or `NotFound` once cleared.
pub struct StaticSeedResolver {
    seed: Mutex<Option<Credentials>>,
}

impl StaticSeedResolver {
    pub fn new(seed: Credentials) -> Self {
        Self {
            seed: Mutex::new(Some(seed)),
        }
    }

    pub fn set(&self, seed: Credentials) {
        *self.seed.lock() = Some(seed);
    }

    pub fn clear(&self) {
        *self.seed.lock() = None;
    }
}

#[async_trait]
impl SeedResolver for StaticSeedResolver {
    async fn resolve_seed(&self, provider: Provider) -> Result<Credentials> {
        self.seed
            .lock()
            .clone()
            .ok_or_else(|| CredentialError::NotFound {
                provider,
                profile: skykey_traits::DEFAULT_PROFILE.to_string(),
            })
    }
}

/// Observer that remembers everything it is told
#[derive(Default)]
pub struct RecordingObserver {
    refreshed: Mutex<Vec<String>>,
    failures: Mutex<Vec<(String, String)>>,
    validation_errors: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn refreshed(&self) -> Vec<String> {
        self.refreshed.lock().clone()
    }

    /// `(session_id, error message)` pairs
    pub fn failures(&self) -> Vec<(String, String)> {
        self.failures.lock().clone()
    }

    pub fn validation_errors(&self) -> Vec<String> {
        self.validation_errors.lock().clone()
    }
}

impl ChainObserver for RecordingObserver {
    fn session_refreshed(&self, session_id: &str) {
        self.refreshed.lock().push(session_id.to_string());
    }

    fn refresh_failed(&self, session_id: &str, error: &CredentialError) {
        self.failures
            .lock()
            .push((session_id.to_string(), error.to_string()));
    }

    fn validation_failed(&self, error: &CredentialError) {
        self.validation_errors.lock().push(error.to_string());
    }
}
