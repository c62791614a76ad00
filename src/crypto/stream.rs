//! AES in counter mode with a caller-chosen counter block.
//!
//! The 16-byte initial counter block is `nonce || iv`; any split of the
//! sixteen bytes between the two is allowed. The key length picks
//! AES-128, AES-192 or AES-256.
//!
//! Every call starts from the initial counter block, so a sender and a
//! receiver built from the same key material agree on one transmission.

use crate::config::{AES_128_KEY_LEN, AES_192_KEY_LEN, AES_256_KEY_LEN, AES_BLOCK_LEN};
use crate::error::{Error, Result};
use ctr::cipher::{KeyIvInit, StreamCipher};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;
type Aes192Ctr = ctr::Ctr128BE<aes::Aes192>;
type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// AES-CTR keystream. Encryption and decryption are the same operation.
#[derive(Clone)]
pub struct AesCtr {
    key: Vec<u8>,
    counter: [u8; AES_BLOCK_LEN],
}

impl AesCtr {
    /// # Errors
    /// - `Error::KeyMaterial` if the key is not 16, 24 or 32 bytes, or
    ///   nonce and iv together are not 16 bytes
    pub fn new(key: &[u8], nonce: &[u8], iv: &[u8]) -> Result<Self> {
        if ![AES_128_KEY_LEN, AES_192_KEY_LEN, AES_256_KEY_LEN].contains(&key.len()) {
            return Err(Error::KeyMaterial(format!(
                "AES key must be 16, 24 or 32 bytes, got {}",
                key.len()
            )));
        }
        if nonce.len() + iv.len() != AES_BLOCK_LEN {
            return Err(Error::KeyMaterial(format!(
                "nonce and iv must add up to {AES_BLOCK_LEN} bytes, got {} + {}",
                nonce.len(),
                iv.len()
            )));
        }

        let mut counter = [0u8; AES_BLOCK_LEN];
        counter[..nonce.len()].copy_from_slice(nonce);
        counter[nonce.len()..].copy_from_slice(iv);
        Ok(Self {
            key: key.to_vec(),
            counter,
        })
    }

    /// XOR `data` with the keystream.
    pub fn apply(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self.key.len() {
            AES_128_KEY_LEN => keystream::<Aes128Ctr>(&self.key, &self.counter, data),
            AES_192_KEY_LEN => keystream::<Aes192Ctr>(&self.key, &self.counter, data),
            _ => keystream::<Aes256Ctr>(&self.key, &self.counter, data),
        }
    }
}

fn keystream<C: KeyIvInit + StreamCipher>(key: &[u8], iv: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut cipher =
        C::new_from_slices(key, iv).map_err(|e| Error::KeyMaterial(e.to_string()))?;
    let mut out = data.to_vec();
    cipher.apply_keystream(&mut out);
    Ok(out)
}

impl std::fmt::Debug for AesCtr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesCtr")
            .field("key_bits", &(self.key.len() * 8))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        let aes = AesCtr::new(b"1234567890abcdef", b"90abcdef", b"12345678").unwrap();
        let encrypted = aes.apply(b"123456789").unwrap();
        assert_eq!(hex::encode(&encrypted), "372c0e86d89aca39bb");
        assert_eq!(aes.apply(&encrypted).unwrap(), b"123456789".to_vec());
        assert!(aes.apply(b"").unwrap().is_empty());
    }

    #[test]
    fn test_all_key_sizes_round_trip() {
        let data: Vec<u8> = (0..100u8).collect();
        for len in [16, 24, 32] {
            let key = vec![0x42u8; len];
            let aes = AesCtr::new(&key, &[1u8; 12], &[0u8; 4]).unwrap();
            let encrypted = aes.apply(&data).unwrap();
            assert_ne!(encrypted, data);
            assert_eq!(aes.apply(&encrypted).unwrap(), data);
        }
    }

    #[test]
    fn test_counter_split_is_free() {
        let key = [9u8; 16];
        let a = AesCtr::new(&key, b"0123456789abcdef", b"").unwrap();
        let b = AesCtr::new(&key, b"01234567", b"89abcdef").unwrap();
        assert_eq!(a.apply(b"same").unwrap(), b.apply(b"same").unwrap());
    }

    #[test]
    fn test_bad_lengths() {
        assert!(matches!(
            AesCtr::new(&[0u8; 15], &[0u8; 8], &[0u8; 8]),
            Err(Error::KeyMaterial(_))
        ));
        assert!(matches!(
            AesCtr::new(&[0u8; 16], &[0u8; 8], &[0u8; 7]),
            Err(Error::KeyMaterial(_))
        ));
    }
}
