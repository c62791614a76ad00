//! Micro-protocol: in-band framing of a transmission.
//!
//! The send side brackets the sliced payload with sentinel chunks, the
//! receive side runs a three-state machine over incoming chunks to find the
//! start and end of a transmission without any side channel.
//!
//! ```text
//! payload bits ──slice──▶ [0…0] c1 c2 … cn [0…0]
//! ```

mod minimal;

pub use minimal::{MinimalMicroProtocolReceive, MinimalMicroProtocolSend};

use crate::bits::BitSeq;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a receiver is within a transmission.
///
/// States only ever advance: waiting → active → finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransmissionState {
    /// No start marker seen yet.
    WaitingForTransmission,
    /// Start marker seen, collecting payload.
    ActiveTransmission,
    /// End marker seen. Absorbing.
    FinishedTransmission,
}

impl fmt::Display for TransmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::WaitingForTransmission => "waiting",
            Self::ActiveTransmission => "active",
            Self::FinishedTransmission => "finished",
        };
        f.write_str(name)
    }
}

/// Outcome of classifying one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicroProtocolResponse {
    /// State after the transition.
    pub state: TransmissionState,
    /// Payload carried by the chunk, if it was payload.
    pub payload: Option<BitSeq>,
}

/// Prepares outgoing data so a receiver can find its boundaries.
pub trait MicroProtocolSend {
    /// Turn a payload into the ordered chunk list to embed.
    fn frame(&self, data: &BitSeq) -> Vec<BitSeq>;

    /// Chunk length in bits.
    fn slice_size(&self) -> usize;
}

/// Interprets incoming chunks and tracks the transmission state.
pub trait MicroProtocolReceive {
    /// Classify one chunk, advancing the state machine.
    fn classify(&mut self, chunk: &BitSeq) -> Result<MicroProtocolResponse>;

    /// Current state.
    fn state(&self) -> TransmissionState;

    /// Chunk length in bits.
    fn slice_size(&self) -> usize;
}

/// Unit in which slice sizes and offsets are configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SliceUnit {
    Bits,
    #[default]
    Bytes,
}

impl SliceUnit {
    /// Convert a quantity in this unit to bits.
    ///
    /// # Errors
    /// `Error::InvalidConfig` if the bit count does not fit in `usize`.
    pub fn to_bits(self, amount: usize) -> Result<usize> {
        match self {
            SliceUnit::Bits => Ok(amount),
            SliceUnit::Bytes => amount.checked_mul(8).ok_or_else(|| {
                crate::error::Error::InvalidConfig(format!("{amount} bytes is too many bits"))
            }),
        }
    }
}

impl std::str::FromStr for SliceUnit {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bits" => Ok(SliceUnit::Bits),
            "bytes" => Ok(SliceUnit::Bytes),
            other => Err(crate::error::Error::InvalidConfig(format!(
                "unknown slice unit {other:?} (expected \"bits\" or \"bytes\")"
            ))),
        }
    }
}
