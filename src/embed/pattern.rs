//! Pattern-match embedding over text payloads.

use crate::bits::BitSeq;
use crate::error::Result;
use regex::{NoExpand, Regex};
use tracing::warn;

/// Embeds by replacing the first match of `pattern` with the chunk's text,
/// extracts by reading capture group 1 of `capture`.
///
/// Payloads must be valid UTF-8 and chunks a whole number of bytes that
/// decode as UTF-8. Units that do not match are left alone.
#[derive(Debug, Clone)]
pub struct PatternMatch {
    pattern: Regex,
    capture: Regex,
}

impl PatternMatch {
    /// Compile both expressions.
    ///
    /// `capture` needs at least one capturing group; group 1 is the chunk.
    pub fn new(pattern: &str, capture: &str) -> Result<Self> {
        let pattern = Regex::new(pattern)?;
        let capture = Regex::new(capture)?;
        if capture.captures_len() < 2 {
            return Err(crate::error::Error::InvalidConfig(format!(
                "capture pattern {capture} has no capturing group"
            )));
        }
        Ok(Self { pattern, capture })
    }

    pub(super) fn embed_into(&self, payload: &[u8], chunk: &BitSeq) -> Result<Option<Vec<u8>>> {
        let replacement = String::from_utf8(chunk.to_bytes()?)?;
        let Ok(text) = std::str::from_utf8(payload) else {
            warn!("payload is not UTF-8, skipping");
            return Ok(None);
        };
        if !self.pattern.is_match(text) {
            warn!(pattern = %self.pattern, "pattern not found in payload, skipping");
            return Ok(None);
        }
        let replaced = self.pattern.replacen(text, 1, NoExpand(&replacement));
        Ok(Some(replaced.into_owned().into_bytes()))
    }

    pub(super) fn extract_from(&self, payload: &[u8]) -> Option<BitSeq> {
        let text = std::str::from_utf8(payload).ok()?;
        let found = self.capture.captures(text)?.get(1)?;
        Some(BitSeq::from_bytes(found.as_str().as_bytes()))
    }
}
