//! Whole-payload embedding: the chunk becomes the payload.

use crate::bits::BitSeq;
use crate::error::Result;

/// Replaces the entire payload with the chunk's bytes, and reads the entire
/// payload back as the chunk. Chunks must be byte aligned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WholePayload;

impl WholePayload {
    pub(super) fn embed_into(&self, _payload: &[u8], chunk: &BitSeq) -> Result<Option<Vec<u8>>> {
        chunk.to_bytes().map(Some)
    }

    pub(super) fn extract_from(&self, payload: &[u8]) -> Option<BitSeq> {
        Some(BitSeq::from_bytes(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_any_length() {
        let out = WholePayload
            .embed_into(b"a much longer original payload", &BitSeq::from_bytes(b"Hell"))
            .unwrap()
            .unwrap();
        assert_eq!(out, b"Hell".to_vec());
        assert_eq!(WholePayload.extract_from(&out).unwrap(), BitSeq::from_bytes(b"Hell"));
    }

    #[test]
    fn test_rejects_unaligned_chunk() {
        let chunk: BitSeq = "1010".parse().unwrap();
        assert!(WholePayload.embed_into(b"ab", &chunk).is_err());
    }
}
