//! Credential store - encrypted, host-bound storage for cloud credentials.
//!
//! Each `(provider, profile)` pair is one file `<provider>-<profile>.cred`
//! holding `nonce || AES-256-GCM(JSON record)`. Files are owner-only.

use parking_lot::RwLock;
use skykey_traits::{Clock, CredentialError, Credentials, Provider, Result, SystemClock};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::StoreConfig;
use crate::encryption::RecordCipher;
use crate::key::{self, MachineIdentity};

const RECORD_SUFFIX: &str = ".cred";

/// Encrypted credential storage
pub struct CredentialStore {
    dir: PathBuf,
    cipher: RecordCipher,
    /// Time source for expiry checks; replaceable after the store is shared
    clock: RwLock<Arc<dyn Clock>>,
    /// Serializes writers against readers of the record directory
    lock: RwLock<()>,
}

impl CredentialStore {
    /// Open the store described by `config`, keyed to the current host.
    pub fn open(config: &StoreConfig) -> anyhow::Result<Self> {
        let dir = config.resolve_dir()?;
        Ok(Self::with_key(dir, key::host_key())?)
    }

    /// Open a store whose key is derived from an explicit machine identity.
    pub fn with_identity(dir: impl Into<PathBuf>, identity: &MachineIdentity) -> Result<Self> {
        let key = identity.derive_key();
        Self::with_key(dir, &key[..])
    }

    fn with_key(dir: impl Into<PathBuf>, key: &[u8]) -> Result<Self> {
        let dir = dir.into();
        create_private_dir(&dir)?;

        Ok(Self {
            dir,
            cipher: RecordCipher::new(key)?,
            clock: RwLock::new(Arc::new(SystemClock)),
            lock: RwLock::new(()),
        })
    }

    /// Replace the time source used for expiry checks.
    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.set_clock(clock);
        self
    }

    /// Swap the time source on a store that is already shared.
    pub fn set_clock(&self, clock: Arc<dyn Clock>) {
        *self.clock.write() = clock;
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.read().clone()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store credentials, replacing any record for the same provider/profile.
    pub fn store(&self, creds: &Credentials) -> Result<()> {
        creds.validate()?;
        let profile = creds.profile_name();
        validate_profile(profile)?;

        let plaintext = Zeroizing::new(serde_json::to_vec(creds)?);
        let encrypted = self.cipher.encrypt(&plaintext)?;
        let path = self.record_path(creds.provider, profile);

        let _guard = self.lock.write();
        write_private_file(&path, &encrypted)?;

        debug!(provider = %creds.provider, profile, "Stored credentials");
        Ok(())
    }

    /// Retrieve credentials for a provider/profile.
    ///
    /// Expired records are reported as `Expired` and left in place.
    pub fn retrieve(&self, provider: Provider, profile: &str) -> Result<Credentials> {
        validate_profile(profile)?;
        let _guard = self.lock.read();
        self.read_record(provider, profile)
    }

    /// Delete credentials (absent records are not an error)
    pub fn delete(&self, provider: Provider, profile: &str) -> Result<()> {
        validate_profile(profile)?;
        let path = self.record_path(provider, profile);

        let _guard = self.lock.write();
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(provider = %provider, profile, "Deleted credentials");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(CredentialError::storage(
                format!("failed to delete {}", path.display()),
                err,
            )),
        }
    }

    /// List usable credentials for a provider.
    ///
    /// Records that fail to decrypt or have expired are skipped.
    pub fn list(&self, provider: Provider) -> Result<Vec<Credentials>> {
        let _guard = self.lock.read();
        let mut credentials = Vec::new();

        for profile in self.scan_profiles(provider)? {
            match self.read_record(provider, &profile) {
                Ok(creds) => credentials.push(creds),
                Err(err) => {
                    debug!(provider = %provider, profile, error = %err, "Skipping unusable record");
                }
            }
        }

        Ok(credentials)
    }

    /// Profile names with a record on disk, usable or not.
    pub fn profiles(&self, provider: Provider) -> Result<Vec<String>> {
        let _guard = self.lock.read();
        self.scan_profiles(provider)
    }

    /// Check if a record exists
    pub fn contains(&self, provider: Provider, profile: &str) -> bool {
        validate_profile(profile).is_ok() && self.record_path(provider, profile).exists()
    }

    fn read_record(&self, provider: Provider, profile: &str) -> Result<Credentials> {
        let path = self.record_path(provider, profile);
        let encrypted = match fs::read(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CredentialError::NotFound {
                    provider,
                    profile: profile.to_string(),
                });
            }
            Err(err) => {
                return Err(CredentialError::storage(
                    format!("failed to read {}", path.display()),
                    err,
                ));
            }
        };

        let decrypted = Zeroizing::new(self.cipher.decrypt(&encrypted)?);
        let creds: Credentials = serde_json::from_slice(&decrypted)?;

        if creds.is_expired_at(self.clock.read().now()) {
            return Err(CredentialError::Expired {
                provider,
                profile: profile.to_string(),
            });
        }

        Ok(creds)
    }

    fn scan_profiles(&self, provider: Provider) -> Result<Vec<String>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(CredentialError::storage(
                    format!("failed to list {}", self.dir.display()),
                    err,
                ));
            }
        };

        let prefix = format!("{}-", provider);
        let mut profiles: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                name.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(RECORD_SUFFIX))
                    .filter(|profile| validate_profile(profile).is_ok())
                    .map(str::to_string)
            })
            .collect();
        profiles.sort();
        Ok(profiles)
    }

    fn record_path(&self, provider: Provider, profile: &str) -> PathBuf {
        self.dir
            .join(format!("{}-{}{}", provider, profile, RECORD_SUFFIX))
    }
}

/// Profile names become part of a file name, so only a safe subset is allowed.
pub fn validate_profile(profile: &str) -> Result<()> {
    if profile.is_empty() {
        return Err(CredentialError::Validation(
            "profile name cannot be empty".to_string(),
        ));
    }
    if profile.contains("..") || profile.starts_with('.') {
        return Err(CredentialError::Validation(format!(
            "invalid profile name: {}",
            profile
        )));
    }
    if let Some(c) = profile
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '-' && *c != '_' && *c != '.')
    {
        return Err(CredentialError::Validation(format!(
            "invalid character '{}' in profile name",
            c
        )));
    }
    Ok(())
}

fn create_private_dir(dir: &Path) -> Result<()> {
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|err| CredentialError::storage(format!("failed to create {}", dir.display()), err))
}

fn write_private_file(path: &Path, data: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let write = || -> std::io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|err| {
        if let Err(cleanup) = fs::remove_file(&tmp_path)
            && cleanup.kind() != ErrorKind::NotFound
        {
            warn!(path = %tmp_path.display(), error = %cleanup, "Failed to remove temp record");
        }
        CredentialError::storage(format!("failed to write {}", path.display()), err)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use skykey_traits::AuthMethod;
    use tempfile::tempdir;

    fn identity(hostname: &str) -> MachineIdentity {
        MachineIdentity {
            hostname: hostname.to_string(),
            username: "tester".to_string(),
            machine_id: "machine-id".to_string(),
            platform: "linux".to_string(),
        }
    }

    fn setup() -> (CredentialStore, tempfile::TempDir) {
        let temp_dir = tempdir().unwrap();
        let store = CredentialStore::with_identity(temp_dir.path(), &identity("host-a")).unwrap();
        (store, temp_dir)
    }

    fn aws_creds(profile: &str) -> Credentials {
        Credentials::access_key(Provider::Aws, "AKIAEXAMPLE0001", "secret-value")
            .with_profile(profile)
            .with_region("eu-west-1")
    }

    #[test]
    fn test_store_and_retrieve() {
        let (store, _temp_dir) = setup();
        let creds = aws_creds("default").with_token("session").with_property("k", "v");

        store.store(&creds).unwrap();
        let loaded = store.retrieve(Provider::Aws, "default").unwrap();
        assert_eq!(loaded, creds);
    }

    #[test]
    fn test_record_is_not_plaintext() {
        let (store, temp_dir) = setup();
        store.store(&aws_creds("default")).unwrap();

        let raw = fs::read(temp_dir.path().join("aws-default.cred")).unwrap();
        let haystack = String::from_utf8_lossy(&raw);
        assert!(!haystack.contains("secret-value"));
        assert!(!haystack.contains("AKIAEXAMPLE0001"));
    }

    #[cfg(unix)]
    #[test]
    fn test_record_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (store, temp_dir) = setup();
        store.store(&aws_creds("default")).unwrap();

        let mode = fs::metadata(temp_dir.path().join("aws-default.cred"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_retrieve_missing() {
        let (store, _temp_dir) = setup();
        let err = store.retrieve(Provider::Azure, "default").unwrap_err();
        assert!(matches!(err, CredentialError::NotFound { .. }));
    }

    #[test]
    fn test_retrieve_with_other_host_key() {
        let (store, temp_dir) = setup();
        store.store(&aws_creds("default")).unwrap();

        let foreign = CredentialStore::with_identity(temp_dir.path(), &identity("host-b")).unwrap();
        let err = foreign.retrieve(Provider::Aws, "default").unwrap_err();
        assert!(matches!(err, CredentialError::Encryption(_)));
    }

    #[test]
    fn test_expired_record_is_rejected_but_kept() {
        let (store, _temp_dir) = setup();
        let creds = aws_creds("old").with_expiry(Utc::now() - Duration::minutes(5));
        store.store(&creds).unwrap();

        let err = store.retrieve(Provider::Aws, "old").unwrap_err();
        assert!(matches!(err, CredentialError::Expired { .. }));
        assert!(store.contains(Provider::Aws, "old"));
    }

    #[test]
    fn test_store_rejects_invalid_record() {
        let (store, _temp_dir) = setup();
        let creds = Credentials::new(Provider::Gcp, AuthMethod::ServiceKey);
        assert!(matches!(
            store.store(&creds),
            Err(CredentialError::Validation(_))
        ));
        assert!(store.profiles(Provider::Gcp).unwrap().is_empty());
    }

    #[test]
    fn test_store_overwrites() {
        let (store, _temp_dir) = setup();
        store.store(&aws_creds("default")).unwrap();
        store
            .store(&aws_creds("default").with_region("us-east-2"))
            .unwrap();

        let loaded = store.retrieve(Provider::Aws, "default").unwrap();
        assert_eq!(loaded.region.as_deref(), Some("us-east-2"));
        assert_eq!(store.profiles(Provider::Aws).unwrap(), vec!["default"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _temp_dir) = setup();
        store.store(&aws_creds("default")).unwrap();

        store.delete(Provider::Aws, "default").unwrap();
        store.delete(Provider::Aws, "default").unwrap();
        assert!(!store.contains(Provider::Aws, "default"));
    }

    #[test]
    fn test_list_skips_expired_and_foreign_records() {
        let (store, temp_dir) = setup();
        store.store(&aws_creds("prod")).unwrap();
        store.store(&aws_creds("staging")).unwrap();
        store
            .store(&aws_creds("stale").with_expiry(Utc::now() - Duration::hours(1)))
            .unwrap();
        store
            .store(&Credentials::access_key(Provider::Azure, "client", "secret"))
            .unwrap();

        let foreign = CredentialStore::with_identity(temp_dir.path(), &identity("host-b")).unwrap();
        foreign.store(&aws_creds("copied")).unwrap();

        let mut profiles: Vec<String> = store
            .list(Provider::Aws)
            .unwrap()
            .iter()
            .map(|c| c.profile.clone())
            .collect();
        profiles.sort();
        assert_eq!(profiles, vec!["prod", "staging"]);
        assert_eq!(
            store.profiles(Provider::Aws).unwrap(),
            vec!["copied", "prod", "stale", "staging"]
        );
    }

    #[test]
    fn test_profile_names_cannot_escape_directory() {
        let (store, _temp_dir) = setup();
        for bad in ["", "../etc", "a/b", ".hidden", "with space"] {
            assert!(
                matches!(
                    store.retrieve(Provider::Aws, bad),
                    Err(CredentialError::Validation(_))
                ),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_clock_drives_expiry() {
        struct FixedClock(chrono::DateTime<Utc>);
        impl Clock for FixedClock {
            fn now(&self) -> chrono::DateTime<Utc> {
                self.0
            }
        }

        let (store, _temp_dir) = setup();
        let expiry = Utc::now() + Duration::hours(1);
        store.store(&aws_creds("default").with_expiry(expiry)).unwrap();

        let store = Arc::new(store.with_clock(Arc::new(FixedClock(expiry - Duration::seconds(1)))));
        assert!(store.retrieve(Provider::Aws, "default").is_ok());

        store.set_clock(Arc::new(FixedClock(expiry + Duration::seconds(1))));
        assert!(matches!(
            store.retrieve(Provider::Aws, "default"),
            Err(CredentialError::Expired { .. })
        ));
        assert!(store.list(Provider::Aws).unwrap().is_empty());
    }
}
