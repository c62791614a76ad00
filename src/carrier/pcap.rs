//! Classic pcap capture files as a carrier.
//!
//! The send side replays a cover capture in a loop, embedding into each
//! usable packet and writing the result to a new capture. The receive side
//! reads a capture once, front to back.
//!
//! Both byte orders and both timestamp precisions are read. Files are
//! always written little-endian with microsecond timestamps.

use super::packet::{LinkType, Packet, Rewrite};
use super::{UnitReceiveAdapter, UnitSendAdapter, UnitSink, UnitSource};
use crate::config::{PCAP_MAGIC_MICROS, PCAP_MAGIC_NANOS, PCAP_SNAPLEN};
use crate::embed::{CarrierUnit, ReceiveHandler, SendHandler};
use crate::error::{Error, Result};
use crate::protocol::{MicroProtocolReceive, MicroProtocolSend};
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use tracing::{debug, info};

const GLOBAL_HEADER_LEN: usize = 24;
const RECORD_HEADER_LEN: usize = 16;

/// One record of a capture file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    pub ts_sec: u32,
    /// Sub-second part of the timestamp, always in nanoseconds.
    pub ts_nsec: u32,
    pub packet: Packet,
}

impl CapturedPacket {
    /// Wrap a packet with a zero timestamp.
    pub fn new(packet: Packet) -> Self {
        Self {
            ts_sec: 0,
            ts_nsec: 0,
            packet,
        }
    }
}

impl CarrierUnit for CapturedPacket {
    fn payload(&self) -> Option<&[u8]> {
        self.packet.payload()
    }

    fn set_payload(&mut self, payload: Vec<u8>) {
        self.packet.set_payload(payload);
    }

    fn payload_capacity(&self) -> Option<usize> {
        self.packet.payload_capacity()
    }

    fn revalidate(&mut self) {
        self.packet.revalidate();
    }
}

/// Streaming reader for classic pcap files.
pub struct PcapReader<R> {
    reader: R,
    big_endian: bool,
    nanos: bool,
    link: LinkType,
}

impl PcapReader<BufReader<File>> {
    /// Open a capture file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: Read> PcapReader<R> {
    /// Read and check the global header.
    ///
    /// # Errors
    /// - `Error::MalformedCapture` for a short header or unknown magic
    /// - `Error::UnsupportedLinkType` for anything but Ethernet or raw IPv4
    pub fn from_reader(mut reader: R) -> Result<Self> {
        let mut header = [0u8; GLOBAL_HEADER_LEN];
        if read_full(&mut reader, &mut header)? != GLOBAL_HEADER_LEN {
            return Err(Error::MalformedCapture(
                "truncated global header".to_string(),
            ));
        }

        let magic = [header[0], header[1], header[2], header[3]];
        let (big_endian, nanos) = if magic == PCAP_MAGIC_MICROS.to_le_bytes() {
            (false, false)
        } else if magic == PCAP_MAGIC_NANOS.to_le_bytes() {
            (false, true)
        } else if magic == PCAP_MAGIC_MICROS.to_be_bytes() {
            (true, false)
        } else if magic == PCAP_MAGIC_NANOS.to_be_bytes() {
            (true, true)
        } else {
            return Err(Error::MalformedCapture(format!(
                "unknown magic {}",
                hex::encode(magic)
            )));
        };

        let mut this = Self {
            reader,
            big_endian,
            nanos,
            link: LinkType::Ethernet,
        };
        this.link = LinkType::from_pcap(this.u32_at(&header, 20))?;
        debug!(big_endian, nanos, link = ?this.link, "opened capture");
        Ok(this)
    }

    pub fn link_type(&self) -> LinkType {
        self.link
    }

    /// Whether timestamps in this file have nanosecond precision.
    pub fn is_nanosecond(&self) -> bool {
        self.nanos
    }

    /// Next record, or `None` at a clean end of file.
    pub fn next_record(&mut self) -> Result<Option<CapturedPacket>> {
        let mut header = [0u8; RECORD_HEADER_LEN];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            RECORD_HEADER_LEN => {}
            n => {
                return Err(Error::MalformedCapture(format!(
                    "truncated record header ({n} of {RECORD_HEADER_LEN} bytes)"
                )))
            }
        }

        let ts_sec = self.u32_at(&header, 0);
        let ts_frac = self.u32_at(&header, 4);
        let incl_len = self.u32_at(&header, 8) as usize;
        if incl_len > PCAP_SNAPLEN {
            return Err(Error::MalformedCapture(format!(
                "record of {incl_len} bytes exceeds {} byte limit",
                PCAP_SNAPLEN
            )));
        }

        let mut data = vec![0u8; incl_len];
        let got = read_full(&mut self.reader, &mut data)?;
        if got != incl_len {
            return Err(Error::MalformedCapture(format!(
                "truncated record ({got} of {incl_len} bytes)"
            )));
        }

        Ok(Some(CapturedPacket {
            ts_sec,
            ts_nsec: if self.nanos {
                ts_frac
            } else {
                ts_frac.saturating_mul(1000)
            },
            packet: Packet::parse(self.link, &data),
        }))
    }

    /// Read every remaining record.
    pub fn read_all(&mut self) -> Result<Vec<CapturedPacket>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }

    fn u32_at(&self, buf: &[u8], offset: usize) -> u32 {
        let bytes = [buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]];
        if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }
}

impl<R: Read> UnitSource for PcapReader<R> {
    type Unit = CapturedPacket;

    fn next_unit(&mut self) -> Result<Option<CapturedPacket>> {
        self.next_record()
    }
}

/// Fill `buf` as far as the reader allows. Returns the number of bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Writer for classic little-endian microsecond pcap files.
pub struct PcapWriter<W: Write> {
    writer: W,
    records: usize,
}

impl PcapWriter<BufWriter<File>> {
    /// Create (or truncate) a capture file.
    pub fn create(path: impl AsRef<Path>, link: LinkType) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        Self::new(BufWriter::new(file), link)
    }
}

impl<W: Write> PcapWriter<W> {
    /// Write the global header.
    pub fn new(mut writer: W, link: LinkType) -> Result<Self> {
        let mut header = Vec::with_capacity(GLOBAL_HEADER_LEN);
        header.extend_from_slice(&PCAP_MAGIC_MICROS.to_le_bytes());
        header.extend_from_slice(&2u16.to_le_bytes());
        header.extend_from_slice(&4u16.to_le_bytes());
        header.extend_from_slice(&0i32.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&(PCAP_SNAPLEN as u32).to_le_bytes());
        header.extend_from_slice(&link.pcap_code().to_le_bytes());
        writer.write_all(&header)?;
        Ok(Self { writer, records: 0 })
    }

    pub fn write_record(&mut self, record: &CapturedPacket) -> Result<()> {
        let data = record.packet.to_bytes();
        let len = data.len() as u32;
        let mut header = Vec::with_capacity(RECORD_HEADER_LEN);
        header.extend_from_slice(&record.ts_sec.to_le_bytes());
        header.extend_from_slice(&(record.ts_nsec / 1000).to_le_bytes());
        header.extend_from_slice(&len.to_le_bytes());
        header.extend_from_slice(&len.to_le_bytes());
        self.writer.write_all(&header)?;
        self.writer.write_all(&data)?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far.
    pub fn records(&self) -> usize {
        self.records
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// A cover capture held in memory and replayed in a loop.
#[derive(Debug, Clone)]
pub struct CaptureSource {
    packets: Vec<CapturedPacket>,
    position: usize,
}

impl CaptureSource {
    pub fn new(packets: Vec<CapturedPacket>) -> Self {
        Self {
            packets,
            position: 0,
        }
    }

    /// Load a whole capture file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let packets = PcapReader::open(path)?.read_all()?;
        info!(packets = packets.len(), "loaded cover capture");
        Ok(Self::new(packets))
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Link type of the cover traffic, if there is any.
    pub fn link_type(&self) -> Option<LinkType> {
        self.packets.first().map(|p| p.packet.link())
    }
}

impl UnitSource for CaptureSource {
    type Unit = CapturedPacket;

    /// Yields the capture over and over; an empty capture yields nothing.
    fn next_unit(&mut self) -> Result<Option<CapturedPacket>> {
        if self.packets.is_empty() {
            return Ok(None);
        }
        let unit = self.packets[self.position % self.packets.len()].clone();
        self.position += 1;
        Ok(Some(unit))
    }

    fn period(&self) -> Option<usize> {
        Some(self.packets.len())
    }
}

/// Writes emitted packets to a capture after applying address rewrites.
pub struct CaptureSink<W: Write> {
    writer: PcapWriter<W>,
    rewrite: Rewrite,
}

impl<W: Write> CaptureSink<W> {
    pub fn new(writer: PcapWriter<W>, rewrite: Rewrite) -> Self {
        Self { writer, rewrite }
    }

    pub fn records(&self) -> usize {
        self.writer.records()
    }

    /// Flush and hand back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.writer.finish()
    }
}

impl<W: Write> UnitSink for CaptureSink<W> {
    type Unit = CapturedPacket;

    fn emit(&mut self, mut unit: CapturedPacket) -> Result<()> {
        if !self.rewrite.is_empty() {
            self.rewrite.apply(&mut unit.packet);
            unit.packet.revalidate();
        }
        self.writer.write_record(&unit)
    }
}

/// Replays a cover capture into an output capture.
pub type PcapSendAdapter<W> = UnitSendAdapter<CaptureSource, CaptureSink<W>>;

/// Reads chunks out of a capture file.
pub type PcapReceiveAdapter<R> = UnitReceiveAdapter<PcapReader<R>>;

/// Build a send adapter from a cover capture file to an output file.
///
/// # Errors
/// - `Error::NoUsableUnits` if the cover capture holds no packets at all
/// - I/O and capture format errors
pub fn send_adapter(
    cover: impl AsRef<Path>,
    output: impl AsRef<Path>,
    rewrite: Rewrite,
    handler: SendHandler,
    protocol: Option<Box<dyn MicroProtocolSend>>,
) -> Result<PcapSendAdapter<BufWriter<File>>> {
    let source = CaptureSource::load(cover)?;
    let link = source
        .link_type()
        .ok_or(Error::NoUsableUnits { scanned: 0 })?;
    let writer = PcapWriter::create(output, link)?;
    Ok(UnitSendAdapter::new(
        source,
        CaptureSink::new(writer, rewrite),
        handler,
        protocol,
    ))
}

/// Build a receive adapter over a capture file.
pub fn receive_adapter(
    input: impl AsRef<Path>,
    handler: ReceiveHandler,
    protocol: Option<Box<dyn MicroProtocolReceive>>,
) -> Result<PcapReceiveAdapter<BufReader<File>>> {
    let reader = PcapReader::open(input)?;
    Ok(UnitReceiveAdapter::new(reader, handler, protocol))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bits::BitSeq;
    use crate::carrier::{ReceiveAdapter, SendAdapter};
    use crate::embed::{FixedPosition, Strategy};
    use crate::protocol::{MinimalMicroProtocolReceive, MinimalMicroProtocolSend, SliceUnit};
    use std::io::Cursor;
    use std::net::Ipv4Addr;

    fn udp(payload: &[u8]) -> CapturedPacket {
        CapturedPacket::new(Packet::udp(
            LinkType::Ethernet,
            (Ipv4Addr::new(192, 168, 1, 10), 40000),
            (Ipv4Addr::new(192, 168, 1, 1), 53),
            payload,
        ))
    }

    fn capture(records: &[CapturedPacket]) -> Vec<u8> {
        let mut writer = PcapWriter::new(Vec::new(), LinkType::Ethernet).unwrap();
        for record in records {
            writer.write_record(record).unwrap();
        }
        writer.finish().unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let mut first = udp(b"one");
        first.ts_sec = 1_700_000_000;
        first.ts_nsec = 123_456_000;
        let records = vec![first, udp(b"two")];

        let mut reader = PcapReader::from_reader(Cursor::new(capture(&records))).unwrap();
        assert_eq!(reader.link_type(), LinkType::Ethernet);
        assert!(!reader.is_nanosecond());
        assert_eq!(reader.read_all().unwrap(), records);
    }

    #[test]
    fn test_big_endian_nanosecond_header() {
        let payload = udp(b"be").packet.to_bytes();
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&PCAP_MAGIC_NANOS.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&4u16.to_be_bytes());
        bytes.extend_from_slice(&[0u8; 8]);
        bytes.extend_from_slice(&65535u32.to_be_bytes());
        bytes.extend_from_slice(&1u32.to_be_bytes());
        bytes.extend_from_slice(&7u32.to_be_bytes());
        bytes.extend_from_slice(&999u32.to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&payload);

        let mut reader = PcapReader::from_reader(Cursor::new(bytes)).unwrap();
        assert!(reader.is_nanosecond());
        let record = reader.next_record().unwrap().unwrap();
        assert_eq!(record.ts_sec, 7);
        assert_eq!(record.ts_nsec, 999);
        assert_eq!(record.payload(), Some(&b"be"[..]));
        assert!(reader.next_record().unwrap().is_none());
    }

    #[test]
    fn test_bad_magic() {
        let bytes = vec![0u8; GLOBAL_HEADER_LEN];
        assert!(matches!(
            PcapReader::from_reader(Cursor::new(bytes)),
            Err(Error::MalformedCapture(_))
        ));
    }

    #[test]
    fn test_unsupported_link_type() {
        let mut bytes = capture(&[]);
        bytes[20..24].copy_from_slice(&105u32.to_le_bytes());
        assert!(matches!(
            PcapReader::from_reader(Cursor::new(bytes)),
            Err(Error::UnsupportedLinkType(105))
        ));
    }

    #[test]
    fn test_truncated_record() {
        let mut bytes = capture(&[udp(b"cut short")]);
        bytes.truncate(bytes.len() - 3);
        let mut reader = PcapReader::from_reader(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(Error::MalformedCapture(_))
        ));
    }

    #[test]
    fn test_capture_source_cycles() {
        let mut source = CaptureSource::new(vec![udp(b"a"), udp(b"b")]);
        assert_eq!(source.period(), Some(2));
        let seen: Vec<_> = (0..5)
            .map(|_| source.next_unit().unwrap().unwrap().payload().unwrap().to_vec())
            .collect();
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"a".to_vec(), b"b".to_vec(), b"a".to_vec()]);

        let mut empty = CaptureSource::new(Vec::new());
        assert!(empty.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_sink_applies_rewrite() {
        let rewrite = Rewrite {
            dst_ip: Some(Ipv4Addr::new(10, 9, 8, 7)),
            src_port: Some(1234),
            ..Rewrite::default()
        };
        let mut sink = CaptureSink::new(
            PcapWriter::new(Vec::new(), LinkType::Ethernet).unwrap(),
            rewrite,
        );
        sink.emit(udp(b"payload")).unwrap();
        assert_eq!(sink.records(), 1);

        let bytes = sink.finish().unwrap();
        let record = PcapReader::from_reader(Cursor::new(bytes))
            .unwrap()
            .next_record()
            .unwrap()
            .unwrap();
        assert_eq!(record.packet.dst_ip(), Some(Ipv4Addr::new(10, 9, 8, 7)));
        assert_eq!(record.packet.src_port(), Some(1234));
        assert!(record.packet.checksums_valid());
    }

    #[test]
    fn test_hide_in_replayed_capture() {
        let strategy =
            || Strategy::FixedPosition(FixedPosition::new(0, 4, SliceUnit::Bytes).unwrap());
        let cover = vec![udp(b"lookup example.org"), udp(b"ok"), udp(b"lookup example.net")];

        let mut sender = UnitSendAdapter::new(
            CaptureSource::new(cover),
            CaptureSink::new(
                PcapWriter::new(Vec::new(), LinkType::Ethernet).unwrap(),
                Rewrite::default(),
            ),
            SendHandler::new(strategy()),
            Some(Box::new(
                MinimalMicroProtocolSend::new(4, SliceUnit::Bytes, BitSeq::zeros(32)).unwrap(),
            ) as Box<dyn MicroProtocolSend>),
        );
        sender.send(b"secret").unwrap();
        let bytes = sender.into_sink().finish().unwrap();

        let mut receiver = UnitReceiveAdapter::new(
            PcapReader::from_reader(Cursor::new(bytes)).unwrap(),
            ReceiveHandler::new(strategy()),
            Some(Box::new(MinimalMicroProtocolReceive::new(4, SliceUnit::Bytes).unwrap())
                as Box<dyn MicroProtocolReceive>),
        );
        assert_eq!(receiver.receive().unwrap(), b"secret\0\0".to_vec());
    }
}
