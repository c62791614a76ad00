//! Carrier adapters: the loops that move units between the outside world
//! and the embedding contract.
//!
//! A send adapter frames the outgoing bits, queues the chunks in a
//! [`SendHandler`] and then pulls units until the queue drains. A receive
//! adapter pulls units, extracts a chunk from each and feeds it to an
//! [`Accumulator`] until the micro-protocol reports the end of the
//! transmission or the carrier runs dry.
//!
//! Per-unit handlers return a [`Flow`] instead of unwinding to stop a loop.

mod lines;
pub mod packet;
pub mod pcap;

pub use lines::{LineReceiveAdapter, LineSendAdapter};
pub use packet::{LinkType, Packet, Rewrite, Transport};
pub use pcap::{
    CaptureSink, CaptureSource, CapturedPacket, PcapReceiveAdapter, PcapReader, PcapSendAdapter,
    PcapWriter,
};

use crate::bits::BitSeq;
use crate::embed::{CarrierUnit, Embedded, ReceiveHandler, SendHandler};
use crate::error::{Error, Result};
use crate::protocol::{MicroProtocolReceive, MicroProtocolSend, TransmissionState};
use tracing::{debug, info};

/// Whether a carrier loop should pull another unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Where carrier units come from.
pub trait UnitSource {
    type Unit;

    /// Next unit, or `None` once the carrier is exhausted. May block.
    fn next_unit(&mut self) -> Result<Option<Self::Unit>>;

    /// For sources that repeat: how many units make up one full cycle.
    fn period(&self) -> Option<usize> {
        None
    }
}

/// Where units go once they carry a chunk (or were passed over).
pub trait UnitSink {
    type Unit;

    /// Emit one unit to the outside world.
    fn emit(&mut self, unit: Self::Unit) -> Result<()>;
}

/// Sends a byte stream over some carrier.
pub trait SendAdapter {
    fn send(&mut self, data: &[u8]) -> Result<()>;
}

/// Receives a byte stream from some carrier.
pub trait ReceiveAdapter {
    fn receive(&mut self) -> Result<Vec<u8>>;
}

/// Turn outgoing bytes into the chunk list to embed.
///
/// Without a micro-protocol the whole input is a single chunk.
pub fn prepare_chunks(protocol: Option<&dyn MicroProtocolSend>, data: &[u8]) -> Vec<BitSeq> {
    let bits = BitSeq::from_bytes(data);
    match protocol {
        Some(protocol) => protocol.frame(&bits),
        None if bits.is_empty() => Vec::new(),
        None => vec![bits],
    }
}

/// Receive buffer plus the optional micro-protocol that gates it.
///
/// Owned by a single receive adapter; nothing here is shared.
pub struct Accumulator {
    buffer: BitSeq,
    protocol: Option<Box<dyn MicroProtocolReceive>>,
}

impl Accumulator {
    pub fn new(protocol: Option<Box<dyn MicroProtocolReceive>>) -> Self {
        Self {
            buffer: BitSeq::new(),
            protocol,
        }
    }

    /// Add one extracted chunk to the buffer.
    ///
    /// With a micro-protocol, only payload chunks are appended and `Stop` is
    /// returned once the transmission is finished. Without one, every chunk
    /// is appended and the loop always continues.
    pub fn accumulate(&mut self, chunk: &BitSeq) -> Result<Flow> {
        let Some(protocol) = self.protocol.as_mut() else {
            self.buffer.extend_from(chunk);
            return Ok(Flow::Continue);
        };

        let response = protocol.classify(chunk)?;
        if let Some(payload) = response.payload {
            self.buffer.extend_from(&payload);
        }
        match response.state {
            TransmissionState::FinishedTransmission => Ok(Flow::Stop),
            TransmissionState::WaitingForTransmission | TransmissionState::ActiveTransmission => {
                Ok(Flow::Continue)
            }
        }
    }

    /// Current micro-protocol state, if a micro-protocol is configured.
    pub fn state(&self) -> Option<TransmissionState> {
        self.protocol.as_ref().map(|p| p.state())
    }

    /// Bits collected so far.
    pub fn buffer(&self) -> &BitSeq {
        &self.buffer
    }

    /// Hand off the buffer, leaving an empty one behind.
    pub fn take(&mut self) -> BitSeq {
        std::mem::take(&mut self.buffer)
    }
}

/// Send adapter over any unit source/sink pair.
pub struct UnitSendAdapter<S, K> {
    source: S,
    sink: K,
    handler: SendHandler,
    protocol: Option<Box<dyn MicroProtocolSend>>,
}

impl<S, K, U> UnitSendAdapter<S, K>
where
    S: UnitSource<Unit = U>,
    K: UnitSink<Unit = U>,
    U: CarrierUnit,
{
    pub fn new(
        source: S,
        sink: K,
        handler: SendHandler,
        protocol: Option<Box<dyn MicroProtocolSend>>,
    ) -> Self {
        Self {
            source,
            sink,
            handler,
            protocol,
        }
    }

    /// Embed into one unit, revalidate it and emit it.
    pub fn handle_unit(&mut self, mut unit: U) -> Result<(Embedded, Flow)> {
        let embedded = self.handler.embed(&mut unit)?;
        unit.revalidate();
        self.sink.emit(unit)?;

        let flow = if self.handler.is_drained() {
            Flow::Stop
        } else {
            Flow::Continue
        };
        Ok((embedded, flow))
    }

    /// Give back the sink, e.g. to flush or inspect it.
    pub fn into_sink(self) -> K {
        self.sink
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }
}

impl<S, K, U> SendAdapter for UnitSendAdapter<S, K>
where
    S: UnitSource<Unit = U>,
    K: UnitSink<Unit = U>,
    U: CarrierUnit,
{
    fn send(&mut self, data: &[u8]) -> Result<()> {
        let chunks = prepare_chunks(self.protocol.as_deref(), data);
        info!(bytes = data.len(), chunks = chunks.len(), "sending");
        self.handler.load(chunks);

        let mut idle = 0usize;
        while !self.handler.is_drained() {
            let Some(unit) = self.source.next_unit()? else {
                return Err(Error::CarrierExhausted {
                    remaining: self.handler.remaining(),
                });
            };

            let (embedded, flow) = self.handle_unit(unit)?;
            match embedded {
                Embedded::Chunk => idle = 0,
                Embedded::Skipped => {
                    idle += 1;
                    if let Some(period) = self.source.period() {
                        if idle >= period {
                            return Err(Error::NoUsableUnits { scanned: idle });
                        }
                    }
                }
            }
            if flow == Flow::Stop {
                break;
            }
        }

        debug!("send queue drained");
        Ok(())
    }
}

/// Receive adapter over any unit source.
pub struct UnitReceiveAdapter<S> {
    source: S,
    handler: ReceiveHandler,
    accumulator: Accumulator,
}

impl<S, U> UnitReceiveAdapter<S>
where
    S: UnitSource<Unit = U>,
    U: CarrierUnit,
{
    pub fn new(
        source: S,
        handler: ReceiveHandler,
        protocol: Option<Box<dyn MicroProtocolReceive>>,
    ) -> Self {
        Self {
            source,
            handler,
            accumulator: Accumulator::new(protocol),
        }
    }

    /// Extract from one unit and accumulate what it carries.
    pub fn handle_unit(&mut self, unit: &U) -> Result<Flow> {
        match self.handler.extract(unit) {
            Some(chunk) => self.accumulator.accumulate(&chunk),
            None => Ok(Flow::Continue),
        }
    }

    pub fn state(&self) -> Option<TransmissionState> {
        self.accumulator.state()
    }
}

impl<S, U> ReceiveAdapter for UnitReceiveAdapter<S>
where
    S: UnitSource<Unit = U>,
    U: CarrierUnit,
{
    fn receive(&mut self) -> Result<Vec<u8>> {
        let mut units = 0usize;
        while let Some(unit) = self.source.next_unit()? {
            units += 1;
            if self.handle_unit(&unit)? == Flow::Stop {
                break;
            }
        }

        let received = self.accumulator.take();
        info!(units, bits = received.len(), "receive finished");
        Ok(received.into_padded_bytes())
    }
}

/// Source over any iterator of units, e.g. an in-memory list.
pub struct IterSource<I> {
    iter: I,
}

impl<I: Iterator> IterSource<I> {
    pub fn new<T: IntoIterator<IntoIter = I>>(units: T) -> Self {
        Self {
            iter: units.into_iter(),
        }
    }
}

impl<I: Iterator> UnitSource for IterSource<I> {
    type Unit = I::Item;

    fn next_unit(&mut self) -> Result<Option<Self::Unit>> {
        Ok(self.iter.next())
    }
}

/// Sink collecting emitted units in memory.
#[derive(Debug)]
pub struct VecSink<U> {
    units: Vec<U>,
}

impl<U> VecSink<U> {
    pub fn new() -> Self {
        Self { units: Vec::new() }
    }

    pub fn units(&self) -> &[U] {
        &self.units
    }

    pub fn into_units(self) -> Vec<U> {
        self.units
    }
}

impl<U> Default for VecSink<U> {
    fn default() -> Self {
        Self::new()
    }
}

impl<U> UnitSink for VecSink<U> {
    type Unit = U;

    fn emit(&mut self, unit: U) -> Result<()> {
        self.units.push(unit);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::tests::TestUnit;
    use crate::embed::{FixedPosition, Strategy};
    use crate::protocol::{MinimalMicroProtocolReceive, MinimalMicroProtocolSend, SliceUnit};

    fn strategy() -> Strategy {
        Strategy::FixedPosition(FixedPosition::new(1, 2, SliceUnit::Bytes).unwrap())
    }

    fn framing() -> (Box<dyn MicroProtocolSend>, Box<dyn MicroProtocolReceive>) {
        (
            Box::new(MinimalMicroProtocolSend::new(2, SliceUnit::Bytes, BitSeq::zeros(16)).unwrap()),
            Box::new(MinimalMicroProtocolReceive::new(2, SliceUnit::Bytes).unwrap()),
        )
    }

    fn cover(n: usize) -> Vec<TestUnit> {
        (0..n)
            .map(|i| {
                if i % 3 == 2 {
                    TestUnit::Control
                } else {
                    TestUnit::Data(format!("<{i:04}>").into_bytes())
                }
            })
            .collect()
    }

    #[test]
    fn test_prepare_chunks_without_protocol() {
        assert_eq!(prepare_chunks(None, b"abc"), vec![BitSeq::from_bytes(b"abc")]);
        assert!(prepare_chunks(None, b"").is_empty());
    }

    #[test]
    fn test_accumulate_without_protocol_appends_everything() {
        let mut acc = Accumulator::new(None);
        assert_eq!(acc.accumulate(&BitSeq::zeros(3)).unwrap(), Flow::Continue);
        assert_eq!(acc.accumulate(&BitSeq::from_bytes(b"A")).unwrap(), Flow::Continue);
        assert_eq!(acc.buffer().len(), 11);
        assert_eq!(acc.state(), None);
        assert_eq!(acc.take().len(), 11);
        assert!(acc.buffer().is_empty());
    }

    #[test]
    fn test_accumulate_with_protocol_stops_at_end() {
        let (_, recv) = framing();
        let mut acc = Accumulator::new(Some(recv));
        let noise = BitSeq::from_bytes(b"zz");
        let zero = BitSeq::zeros(16);
        let data = BitSeq::from_bytes(b"ok");

        assert_eq!(acc.accumulate(&noise).unwrap(), Flow::Continue);
        assert_eq!(acc.accumulate(&zero).unwrap(), Flow::Continue);
        assert_eq!(acc.accumulate(&data).unwrap(), Flow::Continue);
        assert_eq!(acc.accumulate(&zero).unwrap(), Flow::Stop);
        assert_eq!(acc.state(), Some(TransmissionState::FinishedTransmission));
        assert_eq!(acc.take(), data);
    }

    #[test]
    fn test_send_then_receive_over_units() {
        let (send_mp, recv_mp) = framing();
        let mut sender = UnitSendAdapter::new(
            IterSource::new(cover(64)),
            VecSink::new(),
            SendHandler::new(strategy()),
            Some(send_mp),
        );
        sender.send(b"Hello World").unwrap();
        let emitted = sender.into_sink().into_units();

        // 1 + ceil(88 / 16) + 1 chunks, every third unit skipped.
        let carrying = emitted
            .iter()
            .filter(|u| matches!(u, TestUnit::Data(_)))
            .count();
        assert_eq!(carrying, 8);
        assert_eq!(emitted.len(), 11);

        let mut receiver = UnitReceiveAdapter::new(
            IterSource::new(emitted),
            ReceiveHandler::new(strategy()),
            Some(recv_mp),
        );
        let received = receiver.receive().unwrap();
        assert_eq!(received, b"Hello World\0".to_vec());
        assert_eq!(
            receiver.state(),
            Some(TransmissionState::FinishedTransmission)
        );
    }

    #[test]
    fn test_send_fails_when_carrier_runs_dry() {
        let (send_mp, _) = framing();
        let mut sender = UnitSendAdapter::new(
            IterSource::new(cover(3)),
            VecSink::new(),
            SendHandler::new(strategy()),
            Some(send_mp),
        );
        assert!(matches!(
            sender.send(b"Hello World"),
            Err(Error::CarrierExhausted { remaining: 6 })
        ));
    }
}
