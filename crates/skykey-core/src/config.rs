//! Skykey configuration file support
//!
//! Loads configuration from `<skykey dir>/config.toml`; every section and
//! field is optional.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use skykey_storage::{StoreConfig, paths};
use skykey_traits::CredentialError;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::chain::RoleChainConfig;

pub const CONFIG_FILE: &str = "config.toml";
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Credential resolver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// How long a record read from the store is served from memory
    pub cache_ttl_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
        }
    }
}

impl ResolverConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn validate(&self) -> std::result::Result<(), CredentialError> {
        if self.cache_ttl_secs == 0 {
            return Err(CredentialError::Validation(
                "cache_ttl_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SkykeyConfig {
    pub store: StoreConfig,
    pub resolver: ResolverConfig,
    /// Defaults for role chains; also sets the refresher's scan interval
    pub chain: RoleChainConfig,
}

impl SkykeyConfig {
    /// Load from the default location, falling back to defaults when absent.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_path()?)
    }

    /// Load from `path`. A missing file yields the defaults; a malformed or
    /// invalid one is an error.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(paths::resolve_skykey_dir()?.join(CONFIG_FILE))
    }

    pub fn validate(&self) -> std::result::Result<(), CredentialError> {
        self.resolver.validate()?;
        self.chain.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::RetryBackoff;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config = SkykeyConfig::load_from_path(&temp_dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SkykeyConfig::default());
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(
            &path,
            r#"
[store]
dir = "/var/lib/skykey/credentials"

[resolver]
cache_ttl_secs = 60

[chain]
max_steps = 3
retry_backoff = "fixed"
"#,
        )
        .unwrap();

        let config = SkykeyConfig::load_from_path(&path).unwrap();
        assert_eq!(
            config.store.dir,
            Some(PathBuf::from("/var/lib/skykey/credentials"))
        );
        assert_eq!(config.resolver.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.chain.max_steps, 3);
        assert_eq!(config.chain.retry_backoff, RetryBackoff::Fixed);
        assert_eq!(config.chain.default_duration_secs, 3600);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[chain]\nretry_attempts = 0\n").unwrap();

        let err = SkykeyConfig::load_from_path(&path).unwrap_err();
        assert!(format!("{err:#}").contains("retry_attempts"), "{err:#}");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[chain\nmax_steps = ").unwrap();
        assert!(SkykeyConfig::load_from_path(&path).is_err());
    }
}
