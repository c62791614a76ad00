//! Bit sequences and fixed-size slicing.
//!
//! Every framing and embedding operation works on [`BitSeq`], an immutable-by-convention
//! ordered sequence of bits that is independent of byte alignment. Bits are
//! stored MSB-first, so the first bit of a sequence built from bytes is the
//! most significant bit of the first byte.

mod slicer;

pub use slicer::{BitSlicer, SimpleBitSlicer};

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// An ordered sequence of bits.
///
/// # Invariants
/// - `bytes.len() == ceil(len / 8)`
/// - bits past `len` in the final byte are always zero, so derived
///   equality and hashing compare only the meaningful bits
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct BitSeq {
    /// Packed bits, MSB-first.
    bytes: Vec<u8>,
    /// Number of valid bits.
    len: usize,
}

impl BitSeq {
    /// Create an empty bit sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a sequence of `len` zero bits.
    pub fn zeros(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len.div_ceil(8)],
            len,
        }
    }

    /// Create a sequence holding every bit of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            len: bytes.len() * 8,
        }
    }

    /// Number of bits.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the sequence holds no bits.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the length is a whole number of bytes.
    pub fn is_byte_aligned(&self) -> bool {
        self.len % 8 == 0
    }

    /// Read the bit at `index`.
    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len {
            return None;
        }
        Some(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0)
    }

    /// Overwrite the bit at `index`.
    ///
    /// # Panics
    /// Panics if `index >= self.len()`.
    pub fn set(&mut self, index: usize, bit: bool) {
        assert!(
            index < self.len,
            "bit index {index} out of range for length {}",
            self.len
        );
        let mask = 0x80 >> (index % 8);
        if bit {
            self.bytes[index / 8] |= mask;
        } else {
            self.bytes[index / 8] &= !mask;
        }
    }

    /// Append one bit.
    pub fn push(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        self.len += 1;
        self.set(self.len - 1, bit);
    }

    /// Append all bits of `other`.
    pub fn extend_from(&mut self, other: &BitSeq) {
        if self.is_byte_aligned() {
            // Fast path: other's trailing bits are already zero.
            self.bytes.extend_from_slice(&other.bytes);
            self.len += other.len;
            return;
        }
        for bit in other.iter() {
            self.push(bit);
        }
    }

    /// Concatenate two sequences into a new one.
    pub fn concat(&self, other: &BitSeq) -> BitSeq {
        let mut joined = self.clone();
        joined.extend_from(other);
        joined
    }

    /// Copy the bits in `start..end`.
    ///
    /// Returns `None` if the range is inverted or reaches past the end.
    pub fn range(&self, start: usize, end: usize) -> Option<BitSeq> {
        if start > end || end > self.len {
            return None;
        }
        if start % 8 == 0 {
            let mut bytes = self.bytes[start / 8..(end).div_ceil(8)].to_vec();
            let len = end - start;
            if len % 8 != 0 {
                if let Some(last) = bytes.last_mut() {
                    *last &= 0xFF << (8 - len % 8);
                }
            }
            return Some(Self { bytes, len });
        }
        let mut out = BitSeq::new();
        for index in start..end {
            out.push(self.bytes[index / 8] & (0x80 >> (index % 8)) != 0);
        }
        Some(out)
    }

    /// Whether every bit is zero. An empty sequence counts as all zero.
    pub fn is_zero(&self) -> bool {
        self.bytes.iter().all(|b| *b == 0)
    }

    /// Iterate over the bits in order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.bytes[i / 8] & (0x80 >> (i % 8)) != 0)
    }

    /// Convert to bytes.
    ///
    /// # Errors
    /// Returns `Error::NotByteAligned` unless the length is a multiple of 8.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        if !self.is_byte_aligned() {
            return Err(Error::NotByteAligned(self.len));
        }
        Ok(self.bytes.clone())
    }

    /// Convert to bytes, filling a trailing partial byte with zero bits.
    pub fn into_padded_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl FromStr for BitSeq {
    type Err = Error;

    /// Parse a string of `0`/`1` characters, optionally prefixed with `0b`.
    /// Underscores are ignored as visual separators.
    fn from_str(s: &str) -> Result<Self> {
        let digits = s.strip_prefix("0b").unwrap_or(s);
        let mut bits = BitSeq::new();
        for c in digits.chars() {
            match c {
                '0' => bits.push(false),
                '1' => bits.push(true),
                '_' => {}
                other => {
                    return Err(Error::InvalidBits(format!(
                        "unexpected character {other:?} in {s:?}"
                    )))
                }
            }
        }
        Ok(bits)
    }
}

impl fmt::Display for BitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for bit in self.iter() {
            f.write_str(if bit { "1" } else { "0" })?;
        }
        Ok(())
    }
}

impl fmt::Debug for BitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BitSeq(0b{self})")
    }
}

impl From<&[u8]> for BitSeq {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl FromIterator<bool> for BitSeq {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut bits = BitSeq::new();
        for bit in iter {
            bits.push(bit);
        }
        bits
    }
}
