use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::Rng;
use skykey_traits::{CredentialError, Result};

use crate::key::KEY_LEN;

pub(crate) const NONCE_SIZE: usize = 12;

/// AES-256-GCM cipher for credential records.
///
/// Output layout is `nonce || ciphertext+tag`.
pub struct RecordCipher {
    cipher: Aes256Gcm,
}

impl RecordCipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_LEN {
            return Err(CredentialError::Encryption(format!(
                "Record key must be {} bytes, got {}",
                KEY_LEN,
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|err| CredentialError::Encryption(format!("Invalid key length: {:?}", err)))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let mut ciphertext = self.cipher.encrypt(nonce, plaintext).map_err(|err| {
            CredentialError::Encryption(format!("Failed to encrypt record: {:?}", err))
        })?;
        let mut output = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        output.extend_from_slice(&nonce_bytes);
        output.append(&mut ciphertext);
        Ok(output)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < NONCE_SIZE {
            return Err(CredentialError::Encryption(
                "Ciphertext is too short".to_string(),
            ));
        }

        let (nonce_bytes, payload) = ciphertext.split_at(NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        self.cipher.decrypt(nonce, payload).map_err(|_| {
            CredentialError::Encryption(
                "Failed to decrypt record: authentication failed (wrong key or tampered data)"
                    .to_string(),
            )
        })
    }
}
