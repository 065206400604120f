//! Skykey Storage - Encrypted credential persistence
//!
//! Credentials are serialized to JSON and sealed with AES-256-GCM under a
//! key derived from the current host's identity. Each record lives in its
//! own owner-only file under the credentials directory.
//!
//! # Layout
//!
//! - `~/.skykey/credentials/<provider>-<profile>.cred` - one record per file
//! - `SKYKEY_DIR` overrides the `~/.skykey` root

pub mod config;
pub mod credential_store;
pub mod key;
pub mod paths;

mod encryption;

pub use config::StoreConfig;
pub use credential_store::{CredentialStore, validate_profile};
pub use encryption::RecordCipher;
pub use key::{KEY_LEN, MachineIdentity, host_key};
