//! Fixed-position embedding: overwrite a bit range at a known offset.

use crate::bits::BitSeq;
use crate::error::{Error, Result};
use crate::protocol::SliceUnit;
use tracing::warn;

/// Embeds exactly `slice_size` bits starting at bit `start_index` of the payload.
///
/// All other payload bits are left as they were.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPosition {
    start_index: usize,
    slice_size: usize,
}

impl FixedPosition {
    /// `start_index` and `slice_size` are both given in `unit`.
    ///
    /// The bit window `start_index..start_index + slice_size` must be
    /// addressable.
    pub fn new(start_index: usize, slice_size: usize, unit: SliceUnit) -> Result<Self> {
        let slice_size = unit.to_bits(slice_size)?;
        if slice_size == 0 {
            return Err(Error::InvalidConfig(
                "slice size must be greater than 0".to_string(),
            ));
        }
        let start_index = unit.to_bits(start_index)?;
        if start_index.checked_add(slice_size).is_none() {
            return Err(Error::InvalidConfig(format!(
                "start index {start_index} plus slice size {slice_size} overflows"
            )));
        }
        Ok(Self {
            start_index,
            slice_size,
        })
    }

    /// Offset in bits.
    pub fn start_index(&self) -> usize {
        self.start_index
    }

    /// Chunk length in bits.
    pub fn slice_size(&self) -> usize {
        self.slice_size
    }

    fn end(&self) -> usize {
        self.start_index + self.slice_size
    }

    pub(super) fn embed_into(&self, payload: &[u8], chunk: &BitSeq) -> Result<Option<Vec<u8>>> {
        if chunk.len() != self.slice_size {
            return Err(Error::ChunkLength {
                expected: self.slice_size,
                actual: chunk.len(),
            });
        }
        if payload.len() * 8 < self.end() {
            warn!(
                payload_bits = payload.len() * 8,
                needed = self.end(),
                "payload too short for fixed-position embedding"
            );
            return Ok(None);
        }

        let mut bits = BitSeq::from_bytes(payload);
        for (i, bit) in chunk.iter().enumerate() {
            bits.set(self.start_index + i, bit);
        }
        bits.to_bytes().map(Some)
    }

    pub(super) fn extract_from(&self, payload: &[u8]) -> Option<BitSeq> {
        BitSeq::from_bytes(payload).range(self.start_index, self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: &str) -> BitSeq {
        s.parse().unwrap()
    }

    #[test]
    fn test_replace_full_payload() {
        let fp = FixedPosition::new(0, 8, SliceUnit::Bytes).unwrap();
        let out = fp
            .embed_into(b"abcdefgh", &BitSeq::from_bytes(b"12345678"))
            .unwrap()
            .unwrap();
        assert_eq!(out, b"12345678".to_vec());
        assert_eq!(fp.extract_from(&out).unwrap().to_bytes().unwrap(), out);
    }

    #[test]
    fn test_known_data_bits() {
        let fp = FixedPosition::new(3, 7, SliceUnit::Bits).unwrap();
        let payload = bits("1001010100100110").to_bytes().unwrap();
        let cases = [
            ("0110100", "1000110100100110"),
            ("1110010", "1001110010100110"),
            ("0100101", "1000100101100110"),
        ];

        for (chunk, want) in cases {
            let out = fp.embed_into(&payload, &bits(chunk)).unwrap().unwrap();
            assert_eq!(BitSeq::from_bytes(&out), bits(want));
            assert_eq!(fp.extract_from(&out).unwrap(), bits(chunk));
        }
    }

    #[test]
    fn test_extract_known_bytes() {
        let fp = FixedPosition::new(3, 7, SliceUnit::Bytes).unwrap();
        let cases: [(&[u8], &[u8]); 3] = [
            (b"123abcdefg12", b"abcdefg"),
            (b"abcfkmcjyikl", b"fkmcjyi"),
            (b"qwe12j7xgeasdfghjkl", b"12j7xge"),
        ];
        for (payload, want) in cases {
            assert_eq!(fp.extract_from(payload).unwrap(), BitSeq::from_bytes(want));
        }
    }

    #[test]
    fn test_bits_outside_window_unchanged() {
        let fp = FixedPosition::new(5, 11, SliceUnit::Bits).unwrap();
        let payload = [0xA5u8, 0x5A, 0xFF, 0x00];
        let chunk = bits("10101010101");
        let out = fp.embed_into(&payload, &chunk).unwrap().unwrap();

        let before = BitSeq::from_bytes(&payload);
        let after = BitSeq::from_bytes(&out);
        for i in (0..5).chain(16..32) {
            assert_eq!(before.get(i), after.get(i), "bit {i}");
        }
        assert_eq!(fp.extract_from(&out).unwrap(), chunk);
    }

    #[test]
    fn test_payload_too_short() {
        let fp = FixedPosition::new(1, 2, SliceUnit::Bytes).unwrap();
        assert_eq!(fp.embed_into(b"ab", &BitSeq::zeros(16)).unwrap(), None);
        assert_eq!(fp.extract_from(b"ab"), None);
    }

    #[test]
    fn test_huge_offsets_rejected() {
        assert!(matches!(
            FixedPosition::new(usize::MAX, 1, SliceUnit::Bytes),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            FixedPosition::new(usize::MAX, 1, SliceUnit::Bits),
            Err(Error::InvalidConfig(_))
        ));
        assert!(FixedPosition::new(usize::MAX - 8, 8, SliceUnit::Bits).is_ok());
    }

    #[test]
    fn test_chunk_length_checked() {
        let fp = FixedPosition::new(0, 4, SliceUnit::Bits).unwrap();
        assert!(matches!(
            fp.embed_into(b"abc", &bits("101")),
            Err(Error::ChunkLength {
                expected: 4,
                actual: 3
            })
        ));
    }
}
