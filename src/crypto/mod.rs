//! Ciphers behind the encrypting payload transforms.
//!
//! This module provides:
//! - AES-CTR with an explicit counter block, for interoperable keystreams
//! - AES-256-GCM sealed under an Argon2id-derived password key

mod cipher;
mod kdf;
mod stream;

pub use cipher::PasswordCipher;
pub use kdf::{derive_key, random_salt};
pub use stream::AesCtr;
