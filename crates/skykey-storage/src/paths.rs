//! Path utilities for Skykey directory resolution.

use anyhow::Result;
use std::path::PathBuf;

const SKYKEY_DIR: &str = ".skykey";
const CREDENTIALS_DIR: &str = "credentials";

/// Environment variable to override the Skykey directory.
pub const SKYKEY_DIR_ENV: &str = "SKYKEY_DIR";

/// Resolve the Skykey data directory.
/// Priority: SKYKEY_DIR env var > ~/.skykey/
pub fn resolve_skykey_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(SKYKEY_DIR_ENV)
        && !dir.trim().is_empty()
    {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|h| h.join(SKYKEY_DIR))
        .ok_or_else(|| anyhow::anyhow!("Failed to determine home directory"))
}

/// Get the credential store directory: ~/.skykey/credentials
pub fn credentials_dir() -> Result<PathBuf> {
    Ok(resolve_skykey_dir()?.join(CREDENTIALS_DIR))
}
