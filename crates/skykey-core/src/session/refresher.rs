//! Background session refresher.
//!
//! One task scans on a tick, finds sessions whose final credentials are
//! inside their refresh window and re-runs their chains concurrently. The
//! tick shrinks to half of the smallest window among registered sessions.

use futures::future::join_all;
use parking_lot::Mutex;
use skykey_traits::{ChainObserver, Clock, CredentialError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::registry::SessionRegistry;
use super::types::{ChainedSession, SessionCredentials};
use crate::auth::SeedResolver;
use crate::chain::RoleChainExecutor;

const MIN_TICK: Duration = Duration::from_secs(1);
const MAX_TICK: Duration = Duration::from_secs(300);
/// Floor for ticks handed to [`SessionRefresher::start`]
const MIN_LOOP_TICK: Duration = Duration::from_millis(1);

/// Scan interval for a given refresh window: half the window, within [1s, 300s].
pub fn tick_interval(refresh_before_expiry: Duration) -> Duration {
    (refresh_before_expiry / 2).clamp(MIN_TICK, MAX_TICK)
}

/// Result of one refresh attempt on one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another refresh of the same session was already running
    Skipped,
}

/// Counts from one scan of the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub due: usize,
    pub refreshed: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct SessionRefresher {
    registry: Arc<SessionRegistry>,
    executor: Arc<RoleChainExecutor>,
    seeds: Arc<dyn SeedResolver>,
    observer: Arc<dyn ChainObserver>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    /// Signalled when the set of sessions changes
    wake: Notify,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionRefresher {
    pub fn new(
        registry: Arc<SessionRegistry>,
        executor: Arc<RoleChainExecutor>,
        seeds: Arc<dyn SeedResolver>,
        observer: Arc<dyn ChainObserver>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            executor,
            seeds,
            observer,
            clock,
            cancel: CancellationToken::new(),
            wake: Notify::new(),
            task: Mutex::new(None),
        }
    }

    /// Token cancelled on shutdown; chain executions should use a child of it.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the background loop. Does nothing if it is already running or
    /// the refresher has been shut down.
    ///
    /// `tick` is the longest the loop waits between scans; sessions with a
    /// smaller refresh window shorten it.
    pub fn start(self: &Arc<Self>, tick: Duration) {
        let mut task = self.task.lock();
        if task.is_some() || self.cancel.is_cancelled() {
            return;
        }

        let tick = tick.max(MIN_LOOP_TICK);
        let refresher = self.clone();
        *task = Some(tokio::spawn(async move {
            refresher.run_loop(tick).await;
        }));
    }

    /// Re-evaluate the scan interval, e.g. after a session was registered.
    pub fn reschedule(&self) {
        self.wake.notify_one();
    }

    /// Interval between scans: `base`, or half the smallest refresh window
    /// of any auto-refreshing session if that is shorter.
    pub fn scan_interval(&self, base: Duration) -> Duration {
        self.registry
            .snapshot()
            .iter()
            .filter(|session| session.config().enable_auto_refresh)
            .map(|session| tick_interval(session.config().refresh_before_expiry()))
            .fold(base, Duration::min)
    }

    async fn run_loop(self: Arc<Self>, base_tick: Duration) {
        info!(tick_ms = base_tick.as_millis() as u64, "Session refresher started");
        let mut last_scan = Instant::now();

        loop {
            let next_scan = last_scan + self.scan_interval(base_tick);
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.wake.notified() => continue,
                _ = sleep_until(next_scan) => {
                    last_scan = Instant::now();
                    let report = self.refresh_due().await;
                    if report.due > 0 {
                        debug!(
                            due = report.due,
                            refreshed = report.refreshed,
                            skipped = report.skipped,
                            failed = report.failed,
                            "Refresh scan complete"
                        );
                    }
                }
            }
        }

        info!("Session refresher stopped");
    }

    /// Refresh every auto-refreshing session inside its refresh window.
    pub async fn refresh_due(&self) -> RefreshReport {
        let now = self.clock.now();
        let due: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|session| session.config().enable_auto_refresh && session.needs_refresh(now))
            .collect();

        let mut report = RefreshReport {
            due: due.len(),
            ..RefreshReport::default()
        };
        let results = join_all(due.iter().map(|session| self.refresh(session))).await;
        for result in results {
            match result {
                Ok(RefreshOutcome::Refreshed) => report.refreshed += 1,
                Ok(RefreshOutcome::Skipped) => report.skipped += 1,
                Err(_) => report.failed += 1,
            }
        }
        report
    }

    /// Refresh one session now, whether or not it is due.
    pub async fn refresh_session(&self, id: &str) -> Result<RefreshOutcome> {
        let session = self.registry.get(id)?;
        self.refresh(&session).await
    }

    async fn refresh(&self, session: &Arc<ChainedSession>) -> Result<RefreshOutcome> {
        let Some(previous) = session.begin_refresh() else {
            debug!(session_id = %session.id(), "Refresh already in progress, skipping");
            return Ok(RefreshOutcome::Skipped);
        };

        match self.rerun_chain(session).await {
            Ok(credentials) => {
                if !self.registry.contains(session.id()) {
                    session.abandon_refresh(previous);
                    debug!(session_id = %session.id(), "Session closed during refresh");
                    return Err(CredentialError::SessionNotFound(session.id().to_string()));
                }
                session.complete_refresh(credentials, self.clock.now());
                info!(
                    session_id = %session.id(),
                    expires_at = ?session.expires_at(),
                    "Refreshed chained session"
                );
                self.observer.session_refreshed(session.id());
                Ok(RefreshOutcome::Refreshed)
            }
            Err(CredentialError::Cancelled) => {
                session.abandon_refresh(previous);
                Err(CredentialError::Cancelled)
            }
            Err(error) => {
                session.fail_refresh(&error);
                warn!(
                    session_id = %session.id(),
                    %error,
                    "Session refresh failed, keeping last known good credentials"
                );
                self.observer.refresh_failed(session.id(), &error);
                Err(error)
            }
        }
    }

    async fn rerun_chain(&self, session: &ChainedSession) -> Result<SessionCredentials> {
        let cancel = self.cancel.child_token();
        let seed = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CredentialError::Cancelled),
            seed = self.seeds.resolve_seed(session.seed_provider()) => seed?,
        };
        self.executor
            .execute(&seed, session.steps(), session.config(), &cancel)
            .await
    }

    /// Stop the loop, cancel in-flight refreshes and release all sessions.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handle = self.task.lock().take();
        if let Some(handle) = handle
            && let Err(error) = handle.await
        {
            warn!(%error, "Session refresher task ended abnormally");
        }

        let released = self.registry.clear();
        if released > 0 {
            info!(released, "Released sessions on shutdown");
        }
    }
}
