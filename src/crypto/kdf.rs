//! Argon2id key derivation for password-sealed payloads.

use crate::config::{argon2_params, AES_256_KEY_LEN};
use crate::error::{Error, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::RngCore;

/// Fresh random salt for one sealed payload.
pub fn random_salt() -> [u8; argon2_params::SALT_LENGTH] {
    let mut salt = [0u8; argon2_params::SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}

/// Derive an AES-256 key from `password` and `salt`.
///
/// # Errors
/// - `Error::KeyDerivation` if the salt is too short for Argon2
pub fn derive_key(password: &str, salt: &[u8]) -> Result<[u8; AES_256_KEY_LEN]> {
    let params = Params::new(
        argon2_params::MEMORY_COST,
        argon2_params::TIME_COST,
        argon2_params::PARALLELISM,
        Some(AES_256_KEY_LEN),
    )
    .map_err(|e| Error::KeyDerivation(e.to_string()))?;

    let mut key = [0u8; AES_256_KEY_LEN];
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_inputs_same_key() {
        let salt = [7u8; argon2_params::SALT_LENGTH];
        assert_eq!(
            derive_key("hunter2", &salt).unwrap(),
            derive_key("hunter2", &salt).unwrap()
        );
    }

    #[test]
    fn test_password_and_salt_both_matter() {
        let salt = [7u8; argon2_params::SALT_LENGTH];
        let base = derive_key("hunter2", &salt).unwrap();
        assert_ne!(base, derive_key("hunter3", &salt).unwrap());
        assert_ne!(base, derive_key("hunter2", &[8u8; argon2_params::SALT_LENGTH]).unwrap());
    }

    #[test]
    fn test_short_salt_rejected() {
        assert!(matches!(
            derive_key("pw", b"abc"),
            Err(Error::KeyDerivation(_))
        ));
    }

    #[test]
    fn test_salts_are_random() {
        assert_ne!(random_salt(), random_salt());
    }
}
