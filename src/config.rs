//! Configuration constants and types for covert channels.

use crate::bits::BitSeq;
use crate::embed::{FixedPosition, PatternMatch, Strategy, WholePayload};
use crate::error::{Error, Result};
use crate::protocol::{
    MicroProtocolReceive, MicroProtocolSend, MinimalMicroProtocolReceive,
    MinimalMicroProtocolSend, SliceUnit,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default slice size, in the configured unit.
pub const DEFAULT_SLICE_SIZE: usize = 4;

/// Classic pcap magic, microsecond timestamps.
pub const PCAP_MAGIC_MICROS: u32 = 0xa1b2_c3d4;

/// Classic pcap magic, nanosecond timestamps.
pub const PCAP_MAGIC_NANOS: u32 = 0xa1b2_3c4d;

/// Largest record accepted from, and snapshot length written to, capture files.
pub const PCAP_SNAPLEN: usize = 262_144;

/// pcap link-type codes.
pub mod link_types {
    /// Ethernet II.
    pub const ETHERNET: u32 = 1;

    /// Raw IP, no link header.
    pub const RAW: u32 = 101;

    /// Raw IPv4, no link header.
    pub const IPV4: u32 = 228;
}

/// AES block (and CTR counter block) size in bytes.
pub const AES_BLOCK_LEN: usize = 16;

pub const AES_128_KEY_LEN: usize = 16;
pub const AES_192_KEY_LEN: usize = 24;
pub const AES_256_KEY_LEN: usize = 32;

/// Argon2id parameters for password-sealed payloads.
///
/// Every sealed payload pays one derivation on each end, so these sit at
/// the OWASP minimum rather than at disk-encryption strength.
pub mod argon2_params {
    /// Memory cost in KiB (19 MiB).
    pub const MEMORY_COST: u32 = 19_456;

    /// Time cost (iterations).
    pub const TIME_COST: u32 = 2;

    /// Parallelism factor.
    pub const PARALLELISM: u32 = 1;

    /// Salt length in bytes.
    pub const SALT_LENGTH: usize = 16;
}

/// Which embedding strategy to build, and its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Chunk at a fixed offset, given in the channel's slice unit.
    FixedPosition { start_index: usize },

    /// Replace the first `pattern` match; read group 1 of `capture`.
    Pattern { pattern: String, capture: String },

    /// Chunk is the whole payload.
    WholePayload,
}

/// Everything both ends of a channel must agree on.
///
/// Loaded from JSON, for example:
///
/// ```json
/// {
///   "slice_size": 4,
///   "unit": "bytes",
///   "framing": true,
///   "strategy": { "kind": "fixed_position", "start_index": 0 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Chunk length, in `unit`.
    pub slice_size: usize,

    /// Unit of `slice_size` and fixed-position offsets.
    #[serde(default)]
    pub unit: SliceUnit,

    /// Bits used to fill the last chunk, as a `0`/`1` string.
    /// Zeros when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding: Option<String>,

    /// Bracket transmissions with sentinel chunks.
    #[serde(default = "default_framing")]
    pub framing: bool,

    pub strategy: StrategyConfig,
}

fn default_framing() -> bool {
    true
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            slice_size: DEFAULT_SLICE_SIZE,
            unit: SliceUnit::default(),
            padding: None,
            framing: true,
            strategy: StrategyConfig::FixedPosition { start_index: 0 },
        }
    }
}

impl ChannelConfig {
    /// Read and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path.as_ref(), serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// Builds every component once so that anything the constructors
    /// would reject is reported here.
    pub fn validate(&self) -> Result<()> {
        if self.slice_size == 0 {
            return Err(Error::InvalidConfig(
                "slice size must be greater than 0".to_string(),
            ));
        }
        let slice_bits = self.slice_bits()?;
        match &self.strategy {
            StrategyConfig::Pattern { .. } | StrategyConfig::WholePayload
                if slice_bits % 8 != 0 =>
            {
                return Err(Error::InvalidConfig(format!(
                    "{slice_bits} bit slices cannot be embedded as text or whole bytes"
                )));
            }
            _ => {}
        }
        self.build_strategy()?;
        self.build_send_protocol()?;
        self.build_receive_protocol()?;
        Ok(())
    }

    /// Chunk length in bits.
    pub fn slice_bits(&self) -> Result<usize> {
        self.unit.to_bits(self.slice_size)
    }

    /// Padding as bits, defaulting to one slice of zeros.
    pub fn padding_bits(&self) -> Result<BitSeq> {
        match &self.padding {
            Some(text) => text.parse(),
            None => Ok(BitSeq::zeros(self.slice_bits()?)),
        }
    }

    pub fn build_strategy(&self) -> Result<Strategy> {
        Ok(match &self.strategy {
            StrategyConfig::FixedPosition { start_index } => Strategy::FixedPosition(
                FixedPosition::new(*start_index, self.slice_size, self.unit)?,
            ),
            StrategyConfig::Pattern { pattern, capture } => {
                Strategy::Pattern(PatternMatch::new(pattern, capture)?)
            }
            StrategyConfig::WholePayload => Strategy::WholePayload(WholePayload),
        })
    }

    /// Sender framing, or `None` when framing is off.
    pub fn build_send_protocol(&self) -> Result<Option<Box<dyn MicroProtocolSend>>> {
        if !self.framing {
            return Ok(None);
        }
        let protocol =
            MinimalMicroProtocolSend::new(self.slice_size, self.unit, self.padding_bits()?)?;
        Ok(Some(Box::new(protocol)))
    }

    /// Receiver framing, or `None` when framing is off.
    pub fn build_receive_protocol(&self) -> Result<Option<Box<dyn MicroProtocolReceive>>> {
        if !self.framing {
            return Ok(None);
        }
        let protocol = MinimalMicroProtocolReceive::new(self.slice_size, self.unit)?;
        Ok(Some(Box::new(protocol)))
    }
}
