//! Payload transforms applied around a carrier transmission.
//!
//! A [`Transform`] maps bytes to bytes. Senders run a list of them before
//! slicing, receivers run a list of them on the reassembled bytes. A
//! [`TransformSpec`] names a transform independently of direction and key
//! material, which is how the CLI describes pipelines.

mod codec;
mod crypt;

pub use codec::{Base64Decode, Base64Encode, Xor};
pub use crypt::{Open, Seal};

use crate::crypto::AesCtr;
use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// One byte-to-byte stage of a pipeline.
pub trait Transform {
    fn apply(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Which end of the channel a transform is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Send,
    Receive,
}

/// Key material the encrypting transforms draw from.
#[derive(Clone, Default)]
pub struct Secrets {
    pub aes_key: Option<Vec<u8>>,
    pub aes_nonce: Vec<u8>,
    pub aes_iv: Vec<u8>,
    pub password: Option<String>,
}

impl fmt::Debug for Secrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Secrets")
            .field("aes_key", &self.aes_key.as_ref().map(|_| "<set>"))
            .field("aes_nonce", &hex::encode(&self.aes_nonce))
            .field("aes_iv", &hex::encode(&self.aes_iv))
            .field("password", &self.password.as_ref().map(|_| "<set>"))
            .finish()
    }
}

/// A transform by name: `base64`, `xor:<key>`, `aes-ctr` or `aes-gcm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformSpec {
    Base64,
    Xor(u8),
    AesCtr,
    AesGcm,
}

impl TransformSpec {
    /// Whether building this transform needs a password.
    pub fn needs_password(&self) -> bool {
        matches!(self, TransformSpec::AesGcm)
    }

    /// Build the concrete transform for one end of the channel.
    ///
    /// # Errors
    /// - `Error::KeyMaterial` if the required key or password is missing
    ///   or has the wrong length
    pub fn build(&self, direction: Direction, secrets: &Secrets) -> Result<Box<dyn Transform>> {
        let transform: Box<dyn Transform> = match (self, direction) {
            (TransformSpec::Base64, Direction::Send) => Box::new(Base64Encode),
            (TransformSpec::Base64, Direction::Receive) => Box::new(Base64Decode),
            (TransformSpec::Xor(key), _) => Box::new(Xor::new(*key)),
            (TransformSpec::AesCtr, _) => {
                let key = secrets
                    .aes_key
                    .as_deref()
                    .ok_or_else(|| Error::KeyMaterial("aes-ctr needs a key".to_string()))?;
                Box::new(AesCtr::new(key, &secrets.aes_nonce, &secrets.aes_iv)?)
            }
            (TransformSpec::AesGcm, _) => {
                let password = secrets
                    .password
                    .clone()
                    .ok_or_else(|| Error::KeyMaterial("aes-gcm needs a password".to_string()))?;
                match direction {
                    Direction::Send => Box::new(Seal::new(password)),
                    Direction::Receive => Box::new(Open::new(password)),
                }
            }
        };
        Ok(transform)
    }
}

impl FromStr for TransformSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "base64" | "b64" => Ok(TransformSpec::Base64),
            "aes-ctr" => Ok(TransformSpec::AesCtr),
            "aes-gcm" => Ok(TransformSpec::AesGcm),
            other => {
                let key = other.strip_prefix("xor:").ok_or_else(|| {
                    Error::InvalidConfig(format!("unknown transform {s:?}"))
                })?;
                let parsed = match key.strip_prefix("0x") {
                    Some(hex_key) => u8::from_str_radix(hex_key, 16),
                    None => key.parse(),
                };
                parsed
                    .map(TransformSpec::Xor)
                    .map_err(|_| Error::InvalidConfig(format!("xor key {key:?} is not a byte")))
            }
        }
    }
}

impl fmt::Display for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransformSpec::Base64 => f.write_str("base64"),
            TransformSpec::Xor(key) => write!(f, "xor:{key:#04x}"),
            TransformSpec::AesCtr => f.write_str("aes-ctr"),
            TransformSpec::AesGcm => f.write_str("aes-gcm"),
        }
    }
}

/// Build one end's transform list from specs, in the order given.
pub fn build_all(
    specs: &[TransformSpec],
    direction: Direction,
    secrets: &Secrets,
) -> Result<Vec<Box<dyn Transform>>> {
    specs.iter().map(|s| s.build(direction, secrets)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_specs() {
        assert_eq!("base64".parse::<TransformSpec>().unwrap(), TransformSpec::Base64);
        assert_eq!("B64".parse::<TransformSpec>().unwrap(), TransformSpec::Base64);
        assert_eq!("xor:42".parse::<TransformSpec>().unwrap(), TransformSpec::Xor(42));
        assert_eq!("xor:0xff".parse::<TransformSpec>().unwrap(), TransformSpec::Xor(255));
        assert_eq!("aes-ctr".parse::<TransformSpec>().unwrap(), TransformSpec::AesCtr);
        assert_eq!("aes-gcm".parse::<TransformSpec>().unwrap(), TransformSpec::AesGcm);
        assert!("xor:256".parse::<TransformSpec>().is_err());
        assert!("rot13".parse::<TransformSpec>().is_err());
    }

    #[test]
    fn test_display_parses_back() {
        for spec in [
            TransformSpec::Base64,
            TransformSpec::Xor(7),
            TransformSpec::AesCtr,
            TransformSpec::AesGcm,
        ] {
            assert_eq!(spec.to_string().parse::<TransformSpec>().unwrap(), spec);
        }
    }

    #[test]
    fn test_build_picks_direction() {
        let secrets = Secrets::default();
        let send = TransformSpec::Base64.build(Direction::Send, &secrets).unwrap();
        let recv = TransformSpec::Base64.build(Direction::Receive, &secrets).unwrap();
        assert_eq!(send.name(), "base64-encode");
        assert_eq!(recv.name(), "base64-decode");
    }

    #[test]
    fn test_build_requires_secrets() {
        let secrets = Secrets::default();
        assert!(matches!(
            TransformSpec::AesCtr.build(Direction::Send, &secrets),
            Err(Error::KeyMaterial(_))
        ));
        assert!(matches!(
            TransformSpec::AesGcm.build(Direction::Receive, &secrets),
            Err(Error::KeyMaterial(_))
        ));
        assert!(TransformSpec::AesGcm.needs_password());
        assert!(!TransformSpec::AesCtr.needs_password());
    }

    #[test]
    fn test_build_all_keeps_order() {
        let secrets = Secrets {
            aes_key: Some(b"1234567890abcdef".to_vec()),
            aes_nonce: b"90abcdef".to_vec(),
            aes_iv: b"12345678".to_vec(),
            password: None,
        };
        let built = build_all(
            &[TransformSpec::AesCtr, TransformSpec::Base64],
            Direction::Send,
            &secrets,
        )
        .unwrap();
        let names: Vec<_> = built.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["aes-ctr", "base64-encode"]);
    }

    #[test]
    fn test_secrets_debug_redacts() {
        let secrets = Secrets {
            aes_key: Some(b"supersecretkey!!".to_vec()),
            password: Some("hunter2".to_string()),
            ..Secrets::default()
        };
        let shown = format!("{secrets:?}");
        assert!(!shown.contains("hunter2"));
        assert!(!shown.contains("supersecret"));
    }
}
