//! Password-based AES-256-GCM for payloads that must not be tampered with.
//!
//! A sealed payload is self-contained:
//!
//! ```text
//! salt (16) || nonce (12) || ciphertext || tag (16)
//! ```
//!
//! Each seal draws a new salt and nonce, so the same plaintext never
//! produces the same bytes twice.

use crate::config::argon2_params::SALT_LENGTH;
use crate::crypto::kdf::{derive_key, random_salt};
use crate::error::{Error, Result};
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;

const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Seals and opens payloads under one password.
#[derive(Clone)]
pub struct PasswordCipher {
    password: String,
}

impl PasswordCipher {
    pub fn new(password: impl Into<String>) -> Self {
        Self {
            password: password.into(),
        }
    }

    fn cipher(&self, salt: &[u8]) -> Result<Aes256Gcm> {
        let key = derive_key(&self.password, salt)?;
        Aes256Gcm::new_from_slice(&key).map_err(|e| Error::KeyMaterial(e.to_string()))
    }

    /// Encrypt under a fresh salt and nonce.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let salt = random_salt();
        let mut nonce = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher(&salt)?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| Error::Encryption(e.to_string()))?;

        let mut sealed = Vec::with_capacity(SALT_LENGTH + NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    /// Decrypt and authenticate the output of [`seal`](Self::seal).
    ///
    /// # Errors
    /// - `Error::Decryption` for short input, a wrong password or modified bytes
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SALT_LENGTH + NONCE_SIZE + TAG_SIZE {
            return Err(Error::Decryption);
        }
        let (salt, rest) = sealed.split_at(SALT_LENGTH);
        let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

        self.cipher(salt)?
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Decryption)
    }
}

impl std::fmt::Debug for PasswordCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordCipher").finish_non_exhaustive()
    }
}
