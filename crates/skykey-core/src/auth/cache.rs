//! Short-lived in-memory cache in front of the credential store.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use skykey_traits::{Clock, Credentials, Provider};
use std::collections::HashMap;
use std::sync::Arc;

/// Cache key for a provider/profile pair
pub fn cache_key(provider: Provider, profile: &str) -> String {
    format!("{}/{}", provider, profile)
}

struct CacheEntry {
    creds: Credentials,
    cached_until: DateTime<Utc>,
}

impl CacheEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.cached_until && !self.creds.is_expired_at(now)
    }
}

/// TTL cache of resolved credentials.
///
/// An entry is served until its TTL lapses or the record itself expires,
/// whichever comes first.
pub struct CredentialCache {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl CredentialCache {
    pub fn new(ttl: std::time::Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
            clock,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<Credentials> {
        let now = self.clock.now();
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => return Some(entry.creds.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Stale: drop it so the secret does not linger in memory.
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        None
    }

    pub fn set(&self, key: impl Into<String>, creds: Credentials) {
        let cached_until = self
            .clock
            .now()
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries
            .write()
            .insert(key.into(), CacheEntry { creds, cached_until });
    }

    pub fn invalidate(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Empty the cache (logout, key rotation)
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ManualClock;

    fn setup(ttl_secs: u64) -> (CredentialCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let cache = CredentialCache::new(std::time::Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    fn creds() -> Credentials {
        Credentials::access_key(Provider::Aws, "AKIA0001", "secret")
    }

    #[test]
    fn test_hit_within_ttl() {
        let (cache, clock) = setup(60);
        cache.set(cache_key(Provider::Aws, "default"), creds());

        clock.advance(Duration::seconds(59));
        assert_eq!(cache.get("aws/default"), Some(creds()));
    }

    #[test]
    fn test_miss_after_ttl() {
        let (cache, clock) = setup(60);
        cache.set("aws/default", creds());

        clock.advance(Duration::seconds(60));
        assert!(cache.get("aws/default").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_never_serves_past_record_expiry() {
        let (cache, clock) = setup(3600);
        let expiry = clock.now() + Duration::seconds(30);
        cache.set("aws/default", creds().with_expiry(expiry));

        assert!(cache.get("aws/default").is_some());
        clock.advance(Duration::seconds(30));
        assert!(cache.get("aws/default").is_none());
    }

    #[test]
    fn test_invalidate_and_clear() {
        let (cache, _clock) = setup(60);
        cache.set("aws/default", creds());
        cache.set("gcp/default", creds());

        cache.invalidate("aws/default");
        assert!(cache.get("aws/default").is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.get("gcp/default").is_none());
    }
}
