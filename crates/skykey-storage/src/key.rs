//! Host-bound key derivation.
//!
//! The record key is PBKDF2-HMAC-SHA256 over identifying material of the
//! current machine, so a store copied to another host cannot be decrypted.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::sync::OnceLock;
use zeroize::Zeroizing;

pub const KEY_LEN: usize = 32;
pub const KEY_DERIVATION_SALT: &[u8] = b"skykey-cloud-credentials";
pub const KEY_DERIVATION_ITERATIONS: u32 = 10_000;

const MACHINE_ID_PATH: &str = "/etc/machine-id";

static HOST_KEY: OnceLock<Zeroizing<[u8; KEY_LEN]>> = OnceLock::new();

/// Identifying material the record key is derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub hostname: String,
    pub username: String,
    pub machine_id: String,
    pub platform: String,
}

impl MachineIdentity {
    /// Collect identity material from the running host.
    pub fn detect() -> Self {
        let hostname = sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string());
        let username = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "default".to_string());
        let machine_id = if cfg!(target_os = "linux") {
            std::fs::read_to_string(MACHINE_ID_PATH)
                .map(|id| id.trim().to_string())
                .unwrap_or_default()
        } else {
            String::new()
        };

        Self {
            hostname,
            username,
            machine_id,
            platform: std::env::consts::OS.to_string(),
        }
    }

    fn material(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "{}-{}-{}-{}",
            self.hostname, self.username, self.machine_id, self.platform
        ))
    }

    /// Derive the 256-bit record key for this identity.
    pub fn derive_key(&self) -> Zeroizing<[u8; KEY_LEN]> {
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        pbkdf2_hmac::<Sha256>(
            self.material().as_bytes(),
            KEY_DERIVATION_SALT,
            KEY_DERIVATION_ITERATIONS,
            &mut key[..],
        );
        key
    }
}

/// Record key for the current host, derived once per process.
pub fn host_key() -> &'static [u8; KEY_LEN] {
    HOST_KEY.get_or_init(|| {
        let identity = MachineIdentity::detect();
        tracing::debug!(
            hostname = %identity.hostname,
            platform = %identity.platform,
            has_machine_id = !identity.machine_id.is_empty(),
            "Derived host credential key"
        );
        identity.derive_key()
    })
}
