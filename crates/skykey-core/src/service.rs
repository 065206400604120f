//! Credential service - the public entry point tying store, resolver,
//! executor and session management together.

use skykey_storage::CredentialStore;
use skykey_traits::{
    ChainObserver, Clock, CloudProvider, CredentialError, Credentials, DEFAULT_PROFILE, EnvLookup,
    Provider, Result, RoleChainStep,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::auth::{CredentialCache, CredentialResolver, ProviderSet, SeedResolver, cache_key};
use crate::chain::{RoleChainConfig, RoleChainExecutor, validate_chain};
use crate::config::SkykeyConfig;
use crate::observer::TracingObserver;
use crate::session::{
    ChainedSession, RefreshOutcome, RegistrySummary, SessionInfo, SessionRefresher,
    SessionRegistry, tick_interval,
};

/// Builder for [`CredentialService`]
pub struct CredentialServiceBuilder {
    store: Arc<CredentialStore>,
    providers: ProviderSet,
    config: SkykeyConfig,
    clock: Option<Arc<dyn Clock>>,
    env: Option<Arc<dyn EnvLookup>>,
    observer: Arc<dyn ChainObserver>,
}

impl CredentialServiceBuilder {
    pub fn provider(mut self, provider: Arc<dyn CloudProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    pub fn config(mut self, config: SkykeyConfig) -> Self {
        self.config = config;
        self
    }

    /// Time source for every expiry decision, the store's included.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Environment read for providers without a registered adapter.
    pub fn env(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = Some(env);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn ChainObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn build(self) -> Result<CredentialService> {
        self.config.validate()?;

        let clock = match self.clock {
            Some(clock) => {
                self.store.set_clock(clock.clone());
                clock
            }
            None => self.store.clock(),
        };
        let cache = Arc::new(CredentialCache::new(
            self.config.resolver.cache_ttl(),
            clock.clone(),
        ));
        let mut resolver =
            CredentialResolver::new(self.providers.clone(), self.store.clone(), cache.clone());
        if let Some(env) = self.env {
            resolver = resolver.with_env(env);
        }
        let resolver = Arc::new(resolver);
        let executor = Arc::new(RoleChainExecutor::new(self.providers, clock.clone()));
        let registry = Arc::new(SessionRegistry::new(clock.clone()));
        let refresher = Arc::new(SessionRefresher::new(
            registry.clone(),
            executor.clone(),
            resolver.clone() as Arc<dyn SeedResolver>,
            self.observer.clone(),
            clock.clone(),
        ));

        Ok(CredentialService {
            store: self.store,
            cache,
            resolver,
            executor,
            registry,
            refresher,
            observer: self.observer,
            clock,
            config: self.config,
        })
    }
}

/// Credential storage, resolution and role chain sessions behind one API
pub struct CredentialService {
    store: Arc<CredentialStore>,
    cache: Arc<CredentialCache>,
    resolver: Arc<CredentialResolver>,
    executor: Arc<RoleChainExecutor>,
    registry: Arc<SessionRegistry>,
    refresher: Arc<SessionRefresher>,
    observer: Arc<dyn ChainObserver>,
    clock: Arc<dyn Clock>,
    config: SkykeyConfig,
}

impl CredentialService {
    pub fn builder(store: Arc<CredentialStore>) -> CredentialServiceBuilder {
        CredentialServiceBuilder {
            store,
            providers: ProviderSet::new(),
            config: SkykeyConfig::default(),
            clock: None,
            env: None,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Open the store described by `config` and build a service over it.
    pub fn open(config: SkykeyConfig, providers: ProviderSet) -> anyhow::Result<Self> {
        let store = Arc::new(CredentialStore::open(&config.store)?);
        let mut builder = Self::builder(store).config(config);
        builder.providers = providers;
        Ok(builder.build()?)
    }

    /// Start background session refresh. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let tick = tick_interval(self.config.chain.refresh_before_expiry());
        self.refresher.start(tick);
    }

    pub fn config(&self) -> &SkykeyConfig {
        &self.config
    }

    /// Live credentials for `provider`: environment, CLI, then stored default.
    pub async fn get_active_credentials(&self, provider: Provider) -> Result<Credentials> {
        self.resolver.get_active_credentials(provider).await
    }

    /// Execute a role chain from `seed` and register the resulting session.
    pub async fn assume_role_chain(
        &self,
        seed: &Credentials,
        steps: Vec<RoleChainStep>,
        config: RoleChainConfig,
    ) -> Result<Arc<ChainedSession>> {
        let cancel = self.refresher.cancellation_token();
        if cancel.is_cancelled() {
            return Err(CredentialError::Cancelled);
        }
        if let Err(error) = validate_chain(&steps, &config) {
            self.observer.validation_failed(&error);
            return Err(error);
        }

        let credentials = self
            .executor
            .execute(seed, &steps, &config, &cancel.child_token())
            .await?;

        if cancel.is_cancelled() {
            return Err(CredentialError::Cancelled);
        }
        let session =
            ChainedSession::new(seed.provider, steps, config, credentials, self.clock.now());
        let session = self.registry.register(session);
        self.refresher.reschedule();
        Ok(session)
    }

    /// Resolve the active credentials for `provider` and chain from them.
    pub async fn assume_role_chain_from(
        &self,
        provider: Provider,
        steps: Vec<RoleChainStep>,
        config: RoleChainConfig,
    ) -> Result<Arc<ChainedSession>> {
        let seed = self.resolver.get_active_credentials(provider).await?;
        self.assume_role_chain(&seed, steps, config).await
    }

    /// Check that `step` can be assumed, without creating a session.
    ///
    /// Uses `caller` when given, otherwise the active credentials for
    /// `provider`. The assumed credentials are discarded.
    pub async fn validate_step(
        &self,
        provider: Provider,
        step: &RoleChainStep,
        caller: Option<&Credentials>,
    ) -> Result<()> {
        let resolved;
        let caller = match caller {
            Some(caller) => caller,
            None => {
                resolved = self.resolver.get_active_credentials(provider).await?;
                &resolved
            }
        };

        let cancel = self.refresher.cancellation_token().child_token();
        let result = self
            .executor
            .validate_step(caller, step, &self.config.chain, &cancel)
            .await;
        if let Err(error @ CredentialError::Validation(_)) = &result {
            self.observer.validation_failed(error);
        }
        result
    }

    pub fn store(&self, creds: &Credentials) -> Result<()> {
        self.store.store(creds)?;
        self.invalidate_cached(creds.provider, creds.profile_name());
        info!(provider = %creds.provider, profile = creds.profile_name(), "Stored credentials");
        Ok(())
    }

    pub fn retrieve(&self, provider: Provider, profile: &str) -> Result<Credentials> {
        self.store.retrieve(provider, profile)
    }

    pub fn delete(&self, provider: Provider, profile: &str) -> Result<()> {
        self.store.delete(provider, profile)?;
        self.invalidate_cached(provider, profile);
        info!(provider = %provider, profile, "Deleted credentials");
        Ok(())
    }

    pub fn list(&self, provider: Provider) -> Result<Vec<Credentials>> {
        self.store.list(provider)
    }

    pub fn profiles(&self, provider: Provider) -> Result<Vec<String>> {
        self.store.profiles(provider)
    }

    pub fn session(&self, id: &str) -> Result<Arc<ChainedSession>> {
        self.registry.get(id)
    }

    pub fn close_session(&self, id: &str) -> Result<()> {
        self.registry.close(id)
    }

    pub async fn refresh_session(&self, id: &str) -> Result<RefreshOutcome> {
        self.refresher.refresh_session(id).await
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.registry.list()
    }

    pub fn session_summary(&self) -> RegistrySummary {
        self.registry.summary()
    }

    /// Drop every cached credential.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Stop refreshing, cancel in-flight chains and release every session.
    pub async fn shutdown(&self) {
        self.refresher.shutdown().await;
        self.cache.clear();
        debug!("Credential service shut down");
    }

    fn invalidate_cached(&self, provider: Provider, profile: &str) {
        if profile == DEFAULT_PROFILE {
            self.cache.invalidate(&cache_key(provider, profile));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::RefreshState;
    use crate::testkit::{ManualClock, MockProvider, RecordingObserver, test_store};
    use crate::auth::discoverer::{AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY};
    use crate::chain::executor::VALIDATION_DURATION_SECS;
    use chrono::Utc;
    use skykey_traits::{AssumeRoleFailure, AuthMethod};
    use std::collections::HashMap;
    use std::time::Duration;

    const ROLE_A: &str = "arn:aws:iam::111111111111:role/audit";
    const ROLE_B: &str = "arn:aws:iam::222222222222:role/deploy";

    struct Fixture {
        service: CredentialService,
        provider: Arc<MockProvider>,
        observer: Arc<RecordingObserver>,
        clock: Arc<ManualClock>,
        _temp_dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let (store, temp_dir) = test_store();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let provider = Arc::new(MockProvider::new(Provider::Aws).with_clock(clock.clone()));
        let observer = Arc::new(RecordingObserver::default());
        let service = CredentialService::builder(store)
            .provider(provider.clone())
            .clock(clock.clone())
            .env(Arc::new(HashMap::<String, String>::new()))
            .observer(observer.clone())
            .build()
            .unwrap();
        Fixture {
            service,
            provider,
            observer,
            clock,
            _temp_dir: temp_dir,
        }
    }

    fn seed() -> Credentials {
        Credentials::access_key(Provider::Aws, "AKIASEED0000001", "seed-secret")
    }

    fn config() -> RoleChainConfig {
        RoleChainConfig {
            retry_delay_ms: 1,
            ..RoleChainConfig::default()
        }
    }

    fn steps() -> Vec<RoleChainStep> {
        vec![
            RoleChainStep::new(ROLE_A, "audit"),
            RoleChainStep::new(ROLE_B, "deploy"),
        ]
    }

    #[tokio::test]
    async fn test_chain_registers_session() {
        let f = fixture();
        f.provider.respond(ROLE_B, Ok(MockProvider::issued("ASIAFINAL000001", "final")));

        let session = f
            .service
            .assume_role_chain(&seed(), steps(), config())
            .await
            .unwrap();

        assert_eq!(session.steps().len(), 2);
        assert_eq!(session.final_creds().token.as_deref(), Some("final"));
        let found = f.service.session(session.id()).unwrap();
        assert!(Arc::ptr_eq(&session, &found));
        assert_eq!(f.service.session_summary().total, 1);
    }

    #[tokio::test]
    async fn test_failed_chain_registers_nothing() {
        let f = fixture();
        f.provider.respond(
            ROLE_B,
            Err(AssumeRoleFailure::ExternalIdMismatch("wrong id".into())),
        );

        let err = f
            .service
            .assume_role_chain(&seed(), steps(), config())
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialError::StepAssumption { step: 1, .. }));
        assert!(f.service.sessions().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_chain_is_reported_to_observer() {
        let f = fixture();
        let err = f
            .service
            .assume_role_chain(&seed(), Vec::new(), config())
            .await
            .unwrap_err();

        assert!(matches!(err, CredentialError::Validation(_)));
        assert_eq!(f.observer.validation_errors().len(), 1);
        assert_eq!(f.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_chain_from_stored_default() {
        let f = fixture();
        f.service.store(&seed()).unwrap();

        let session = f
            .service
            .assume_role_chain_from(Provider::Aws, steps(), config())
            .await
            .unwrap();

        assert_eq!(session.seed_provider(), Provider::Aws);
        assert_eq!(f.provider.calls()[0].caller_access_key, "AKIASEED0000001");
    }

    #[tokio::test]
    async fn test_store_invalidates_cached_default() {
        let f = fixture();
        f.service.store(&seed()).unwrap();
        let first = f.service.get_active_credentials(Provider::Aws).await.unwrap();
        assert_eq!(first.access_key, "AKIASEED0000001");

        let rotated = Credentials::access_key(Provider::Aws, "AKIAROTATED0001", "new-secret");
        f.service.store(&rotated).unwrap();
        let second = f.service.get_active_credentials(Provider::Aws).await.unwrap();
        assert_eq!(second.access_key, "AKIAROTATED0001");

        f.service.delete(Provider::Aws, DEFAULT_PROFILE).unwrap();
        assert!(matches!(
            f.service.get_active_credentials(Provider::Aws).await,
            Err(CredentialError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_store_operations() {
        let f = fixture();
        let cli = Credentials::new(Provider::Gcp, AuthMethod::Cli).with_profile("ops");
        f.service.store(&cli).unwrap();

        assert_eq!(f.service.retrieve(Provider::Gcp, "ops").unwrap(), cli);
        assert_eq!(f.service.profiles(Provider::Gcp).unwrap(), vec!["ops"]);
        assert_eq!(f.service.list(Provider::Gcp).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_close_session_stops_refresh() {
        let f = fixture();
        let session = f
            .service
            .assume_role_chain(&seed(), steps(), config())
            .await
            .unwrap();
        let id = session.id().to_string();

        f.service.close_session(&id).unwrap();
        assert!(matches!(
            f.service.session(&id),
            Err(CredentialError::SessionNotFound(_))
        ));
        assert!(matches!(
            f.service.refresh_session(&id).await,
            Err(CredentialError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_background_refresh_end_to_end() {
        let f = fixture();
        f.service.store(&seed()).unwrap();
        let config = RoleChainConfig {
            refresh_before_expiry_secs: 2,
            ..config()
        };
        let session = f
            .service
            .assume_role_chain_from(Provider::Aws, steps(), config)
            .await
            .unwrap();
        let initial_expiry = session.expires_at().unwrap();

        f.clock.advance(chrono::Duration::seconds(3599));
        f.service.refresher.start(Duration::from_millis(10));

        let mut refreshed = false;
        for _ in 0..100 {
            if !f.observer.refreshed().is_empty() {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(refreshed, "session was not refreshed in time");
        assert!(session.expires_at().unwrap() > initial_expiry);
        assert_eq!(session.refresh_state(), RefreshState::Idle);
        assert_eq!(f.observer.refreshed(), vec![session.id().to_string()]);

        f.service.shutdown().await;
        assert!(f.service.sessions().is_empty());
        assert!(matches!(
            f.service
                .assume_role_chain(&seed(), steps(), RoleChainConfig::default())
                .await,
            Err(CredentialError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_injected_clock_drives_store_expiry() {
        let f = fixture();
        let expiry = f.clock.now() + chrono::Duration::hours(1);
        f.service.store(&seed().with_expiry(expiry)).unwrap();
        assert!(f.service.get_active_credentials(Provider::Aws).await.is_ok());

        f.clock.advance(chrono::Duration::hours(2));
        assert!(matches!(
            f.service.get_active_credentials(Provider::Aws).await,
            Err(CredentialError::Expired { .. })
        ));
        assert!(matches!(
            f.service.retrieve(Provider::Aws, DEFAULT_PROFILE),
            Err(CredentialError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn test_session_window_shorter_than_service_default() {
        let f = fixture();
        f.service.start();

        let config = RoleChainConfig {
            refresh_before_expiry_secs: 2,
            ..config()
        };
        let session = f
            .service
            .assume_role_chain(&seed(), steps(), config)
            .await
            .unwrap();
        f.clock.advance(chrono::Duration::seconds(3599));

        let mut refreshed = false;
        for _ in 0..40 {
            if !f.observer.refreshed().is_empty() {
                refreshed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(refreshed, "session was not refreshed within its own window");
        assert_eq!(f.observer.refreshed(), vec![session.id().to_string()]);

        f.service.shutdown().await;
    }

    #[tokio::test]
    async fn test_environment_used_without_registered_provider() {
        let (store, _temp_dir) = test_store();
        let env: HashMap<String, String> = [
            (AWS_ACCESS_KEY_ID.to_string(), "AKIAENV0000003".to_string()),
            (AWS_SECRET_ACCESS_KEY.to_string(), "env-secret".to_string()),
        ]
        .into();
        let service = CredentialService::builder(store)
            .env(Arc::new(env))
            .build()
            .unwrap();

        let creds = service.get_active_credentials(Provider::Aws).await.unwrap();
        assert_eq!(creds.access_key, "AKIAENV0000003");
    }

    #[tokio::test]
    async fn test_validate_step_dry_run() {
        let f = fixture();
        f.service.store(&seed()).unwrap();

        f.service
            .validate_step(Provider::Aws, &RoleChainStep::new(ROLE_A, "check"), None)
            .await
            .unwrap();
        let calls = f.provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].caller_access_key, "AKIASEED0000001");
        assert_eq!(calls[0].duration_secs, VALIDATION_DURATION_SECS);
        assert!(f.service.sessions().is_empty());

        let hop = MockProvider::issued("ASIAHOP00000001", "hop-token");
        f.provider.respond(
            ROLE_B,
            Err(AssumeRoleFailure::TrustPolicyRejected("not trusted".into())),
        );
        let err = f
            .service
            .validate_step(Provider::Aws, &RoleChainStep::new(ROLE_B, "check"), Some(&hop))
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::StepAssumption { .. }));
        assert_eq!(f.provider.calls()[1].caller_access_key, "ASIAHOP00000001");

        let err = f
            .service
            .validate_step(Provider::Aws, &RoleChainStep::new(ROLE_B, " "), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::Validation(_)));
        assert_eq!(f.observer.validation_errors().len(), 1);
        assert_eq!(f.provider.call_count(), 2);
    }
}
