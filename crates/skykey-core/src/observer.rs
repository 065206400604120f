//! Default chain observer.

use skykey_traits::{ChainObserver, CredentialError};
use tracing::{info, warn};

/// Reports refresh outcomes through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ChainObserver for TracingObserver {
    fn session_refreshed(&self, session_id: &str) {
        info!(session_id, "Chained session refreshed");
    }

    fn refresh_failed(&self, session_id: &str, error: &CredentialError) {
        warn!(session_id, %error, "Chained session refresh failed");
    }

    fn validation_failed(&self, error: &CredentialError) {
        warn!(%error, "Role chain rejected");
    }
}
