//! Keyless payload codecs.

use super::Transform;
use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Standard, padded base64 encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Encode;

impl Transform for Base64Encode {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(STANDARD.encode(data).into_bytes())
    }

    fn name(&self) -> &'static str {
        "base64-encode"
    }
}

/// Standard base64 decoding.
///
/// Trailing NUL bytes and whitespace are dropped first: received data is
/// zero-padded to the slice size and line carriers add newlines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Base64Decode;

impl Transform for Base64Decode {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        let end = data
            .iter()
            .rposition(|b| *b != 0 && !b.is_ascii_whitespace())
            .map_or(0, |i| i + 1);
        Ok(STANDARD.decode(&data[..end])?)
    }

    fn name(&self) -> &'static str {
        "base64-decode"
    }
}

/// XOR every byte with a single-byte key. Its own inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Xor {
    key: u8,
}

impl Xor {
    pub fn new(key: u8) -> Self {
        Self { key }
    }
}

impl Transform for Xor {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.iter().map(|b| b ^ self.key).collect())
    }

    fn name(&self) -> &'static str {
        "xor"
    }
}
