//! Embedding contract: placing chunks into carrier units and reading them back.
//!
//! Handlers only ever see a unit's payload bytes through [`CarrierUnit`].
//! A unit that exposes no payload (wrong transport, non-IP frame, ...) is
//! skipped on send and yields no chunk on receive. It is never an error.

mod fixed;
mod pattern;
mod whole;

pub use fixed::FixedPosition;
pub use pattern::PatternMatch;
pub use whole::WholePayload;

use crate::bits::BitSeq;
use crate::error::{Error, Result};
use std::collections::VecDeque;
use tracing::debug;

/// Anything that can carry chunks: a packet, a line, a request body.
pub trait CarrierUnit {
    /// The payload region handlers may read and rewrite, or `None` if
    /// this unit is not of a kind handlers understand.
    fn payload(&self) -> Option<&[u8]>;

    /// Replace the payload region.
    ///
    /// Only called on units whose `payload()` returned `Some`.
    fn set_payload(&mut self, payload: Vec<u8>);

    /// Largest payload, in bytes, the unit can hold. `None` when unbounded.
    fn payload_capacity(&self) -> Option<usize> {
        None
    }

    /// Recompute metadata (lengths, checksums) invalidated by a payload change.
    fn revalidate(&mut self) {}
}

/// How chunks are placed inside a payload.
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Overwrite `slice_size` bits at a fixed bit offset.
    FixedPosition(FixedPosition),
    /// Substitute the first pattern match; read a capture group back.
    Pattern(PatternMatch),
    /// Replace the whole payload with the chunk.
    WholePayload(WholePayload),
}

impl Strategy {
    /// Produce the rewritten payload, or `None` if this payload cannot hold a chunk.
    pub fn embed_into(&self, payload: &[u8], chunk: &BitSeq) -> Result<Option<Vec<u8>>> {
        match self {
            Strategy::FixedPosition(s) => s.embed_into(payload, chunk),
            Strategy::Pattern(s) => s.embed_into(payload, chunk),
            Strategy::WholePayload(s) => s.embed_into(payload, chunk),
        }
    }

    /// Read the chunk a payload carries, if any.
    pub fn extract_from(&self, payload: &[u8]) -> Option<BitSeq> {
        match self {
            Strategy::FixedPosition(s) => s.extract_from(payload),
            Strategy::Pattern(s) => s.extract_from(payload),
            Strategy::WholePayload(s) => s.extract_from(payload),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::FixedPosition(_) => "fixed-position",
            Strategy::Pattern(_) => "pattern",
            Strategy::WholePayload(_) => "whole-payload",
        }
    }
}

/// Result of offering one unit to a [`SendHandler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Embedded {
    /// A chunk was consumed and written into the unit.
    Chunk,
    /// The unit was left untouched and nothing was consumed.
    Skipped,
}

/// Send side of the embedding contract: a FIFO of chunks waiting for units.
#[derive(Debug, Clone)]
pub struct SendHandler {
    strategy: Strategy,
    queue: VecDeque<BitSeq>,
}

impl SendHandler {
    /// Create a handler with an empty queue.
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            queue: VecDeque::new(),
        }
    }

    /// Replace the queue wholesale.
    pub fn load(&mut self, chunks: Vec<BitSeq>) {
        self.queue = chunks.into();
    }

    /// Chunks still waiting.
    pub fn remaining(&self) -> usize {
        self.queue.len()
    }

    /// Whether every queued chunk has been embedded.
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty()
    }

    /// The embedding strategy.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Embed the front chunk into `unit` if the unit can carry it.
    ///
    /// # Errors
    /// - `Error::SendQueueEmpty` if the unit is usable but nothing is queued
    /// - `Error::PayloadTooLarge` if the rewritten payload exceeds the unit's capacity
    /// - strategy errors for chunks of the wrong shape
    pub fn embed<U: CarrierUnit + ?Sized>(&mut self, unit: &mut U) -> Result<Embedded> {
        let Some(payload) = unit.payload() else {
            return Ok(Embedded::Skipped);
        };
        let chunk = self.queue.front().ok_or(Error::SendQueueEmpty)?;

        match self.strategy.embed_into(payload, chunk)? {
            Some(rewritten) => {
                if let Some(limit) = unit.payload_capacity() {
                    if rewritten.len() > limit {
                        return Err(Error::PayloadTooLarge {
                            size: rewritten.len(),
                            limit,
                        });
                    }
                }
                debug!(strategy = self.strategy.name(), chunk = %chunk, "embedded chunk");
                unit.set_payload(rewritten);
                self.queue.pop_front();
                Ok(Embedded::Chunk)
            }
            None => Ok(Embedded::Skipped),
        }
    }
}

/// Receive side of the embedding contract.
#[derive(Debug, Clone)]
pub struct ReceiveHandler {
    strategy: Strategy,
}

impl ReceiveHandler {
    pub fn new(strategy: Strategy) -> Self {
        Self { strategy }
    }

    /// The embedding strategy.
    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Read the chunk `unit` carries, if it carries one.
    pub fn extract<U: CarrierUnit + ?Sized>(&self, unit: &U) -> Option<BitSeq> {
        let chunk = self.strategy.extract_from(unit.payload()?)?;
        debug!(strategy = self.strategy.name(), chunk = %chunk, "extracted chunk");
        Some(chunk)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::protocol::SliceUnit;

    /// Minimal unit for exercising handlers without a real carrier.
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum TestUnit {
        Data(Vec<u8>),
        Control,
    }

    impl CarrierUnit for TestUnit {
        fn payload(&self) -> Option<&[u8]> {
            match self {
                TestUnit::Data(p) => Some(p),
                TestUnit::Control => None,
            }
        }

        fn set_payload(&mut self, payload: Vec<u8>) {
            *self = TestUnit::Data(payload);
        }
    }

    fn fixed(start: usize, size: usize) -> Strategy {
        Strategy::FixedPosition(FixedPosition::new(start, size, SliceUnit::Bytes).unwrap())
    }

    #[test]
    fn test_send_consumes_in_order() {
        let mut handler = SendHandler::new(fixed(3, 7));
        handler.load(vec![
            BitSeq::from_bytes(b"abcdefg"),
            BitSeq::from_bytes(b"fkmcjyi"),
            BitSeq::from_bytes(b"12j7xge"),
        ]);

        let payloads: [&[u8]; 3] = [b"123456789012", b"abcdefghijkl", b"qwertzuiopasdfghjkl"];
        let expected: [&[u8]; 3] = [b"123abcdefg12", b"abcfkmcjyikl", b"qwe12j7xgeasdfghjkl"];

        for (payload, want) in payloads.iter().zip(expected) {
            let mut unit = TestUnit::Data(payload.to_vec());
            assert_eq!(handler.embed(&mut unit).unwrap(), Embedded::Chunk);
            assert_eq!(unit, TestUnit::Data(want.to_vec()));
        }
        assert!(handler.is_drained());
    }

    #[test]
    fn test_unrecognized_unit_is_skipped() {
        let mut handler = SendHandler::new(fixed(0, 1));
        handler.load(vec![BitSeq::from_bytes(b"x")]);

        let mut unit = TestUnit::Control;
        assert_eq!(handler.embed(&mut unit).unwrap(), Embedded::Skipped);
        assert_eq!(unit, TestUnit::Control);
        assert_eq!(handler.remaining(), 1);

        let receiver = ReceiveHandler::new(fixed(0, 1));
        assert_eq!(receiver.extract(&TestUnit::Control), None);
    }

    #[test]
    fn test_short_payload_is_skipped() {
        let mut handler = SendHandler::new(fixed(2, 4));
        handler.load(vec![BitSeq::from_bytes(b"wxyz")]);

        let mut unit = TestUnit::Data(b"abc".to_vec());
        assert_eq!(handler.embed(&mut unit).unwrap(), Embedded::Skipped);
        assert_eq!(unit, TestUnit::Data(b"abc".to_vec()));
        assert_eq!(handler.remaining(), 1);
    }

    #[test]
    fn test_empty_queue_against_usable_unit() {
        let mut handler = SendHandler::new(fixed(0, 1));
        let mut unit = TestUnit::Data(b"abc".to_vec());
        assert!(matches!(handler.embed(&mut unit), Err(Error::SendQueueEmpty)));

        // An unusable unit never needs a chunk.
        let mut control = TestUnit::Control;
        assert_eq!(handler.embed(&mut control).unwrap(), Embedded::Skipped);
    }

    #[test]
    fn test_load_replaces_queue() {
        let mut handler = SendHandler::new(fixed(0, 1));
        handler.load(vec![BitSeq::from_bytes(b"a"), BitSeq::from_bytes(b"b")]);
        handler.load(vec![BitSeq::from_bytes(b"c")]);
        assert_eq!(handler.remaining(), 1);

        let mut unit = TestUnit::Data(b"z".to_vec());
        handler.embed(&mut unit).unwrap();
        assert_eq!(unit, TestUnit::Data(b"c".to_vec()));
    }

    /// A unit that holds at most four payload bytes.
    struct Capped(Vec<u8>);

    impl CarrierUnit for Capped {
        fn payload(&self) -> Option<&[u8]> {
            Some(&self.0)
        }

        fn set_payload(&mut self, payload: Vec<u8>) {
            self.0 = payload;
        }

        fn payload_capacity(&self) -> Option<usize> {
            Some(4)
        }
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut handler = SendHandler::new(Strategy::WholePayload(WholePayload));
        handler.load(vec![BitSeq::from_bytes(b"12345"), BitSeq::from_bytes(b"1234")]);

        let mut unit = Capped(b"ab".to_vec());
        assert!(matches!(
            handler.embed(&mut unit),
            Err(Error::PayloadTooLarge { size: 5, limit: 4 })
        ));
        assert_eq!(unit.0, b"ab".to_vec());
        assert_eq!(handler.remaining(), 2);
    }
}
