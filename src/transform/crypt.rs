//! Encrypting transforms.

use super::Transform;
use crate::crypto::{AesCtr, PasswordCipher};
use crate::error::Result;

impl Transform for AesCtr {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        AesCtr::apply(self, data)
    }

    fn name(&self) -> &'static str {
        "aes-ctr"
    }
}

/// Seal with AES-256-GCM under a password.
#[derive(Debug, Clone)]
pub struct Seal(PasswordCipher);

impl Seal {
    pub fn new(password: impl Into<String>) -> Self {
        Self(PasswordCipher::new(password))
    }
}

impl Transform for Seal {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.0.seal(data)
    }

    fn name(&self) -> &'static str {
        "aes-gcm-seal"
    }
}

/// Open what [`Seal`] produced.
#[derive(Debug, Clone)]
pub struct Open(PasswordCipher);

impl Open {
    pub fn new(password: impl Into<String>) -> Self {
        Self(PasswordCipher::new(password))
    }
}

impl Transform for Open {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.0.open(data)
    }

    fn name(&self) -> &'static str {
        "aes-gcm-open"
    }
}
