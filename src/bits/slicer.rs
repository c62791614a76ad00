//! Fixed-size bit slicing with deterministic padding.

use super::BitSeq;
use crate::error::{Error, Result};

/// Splits a bit sequence into chunks.
///
/// `SimpleBitSlicer` is the only implementation shipped, but framing code
/// depends on this trait so variable-length schemes can be swapped in.
pub trait BitSlicer {
    /// Cut `data` into ordered chunks.
    fn slice(&self, data: &BitSeq) -> Vec<BitSeq>;

    /// Length in bits of every produced chunk.
    fn slice_size(&self) -> usize;
}

/// Cuts bit sequences into chunks of exactly `slice_size` bits.
///
/// If the input is not a multiple of `slice_size`, the final `r` leftover
/// bits are followed by the first `slice_size - r` bits of `padding`.
///
/// Slicing `00110` with a size of 3 and padding `100` gives `001`, `101`.
#[derive(Debug, Clone)]
pub struct SimpleBitSlicer {
    slice_size: usize,
    padding: BitSeq,
}

impl SimpleBitSlicer {
    /// Create a slicer.
    ///
    /// # Errors
    /// - `slice_size` must be greater than zero
    /// - `padding` must hold at least `slice_size - 1` bits
    pub fn new(slice_size: usize, padding: BitSeq) -> Result<Self> {
        if slice_size == 0 {
            return Err(Error::InvalidConfig(
                "slice size must be greater than 0".to_string(),
            ));
        }
        if padding.len() < slice_size - 1 {
            return Err(Error::InvalidConfig(format!(
                "padding of {} bits is too short for slice size {} (need at least {})",
                padding.len(),
                slice_size,
                slice_size - 1
            )));
        }
        Ok(Self {
            slice_size,
            padding,
        })
    }

    /// The configured padding bits.
    pub fn padding(&self) -> &BitSeq {
        &self.padding
    }
}

impl BitSlicer for SimpleBitSlicer {
    fn slice(&self, data: &BitSeq) -> Vec<BitSeq> {
        let n = self.slice_size;
        let mut chunks = Vec::with_capacity(data.len().div_ceil(n));
        let mut start = 0;

        while start < data.len() {
            let end = (start + n).min(data.len());
            // Both ranges are in bounds: end <= len, and the padding holds >= n - 1 bits.
            let mut chunk = data.range(start, end).unwrap_or_default();
            if chunk.len() < n {
                let pad = self.padding.range(0, n - chunk.len()).unwrap_or_default();
                chunk.extend_from(&pad);
            }
            chunks.push(chunk);
            start = end;
        }

        chunks
    }

    fn slice_size(&self) -> usize {
        self.slice_size
    }
}
