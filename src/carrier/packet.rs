//! Minimal packet model for capture and interception carriers.
//!
//! Only what embedding needs is parsed: an optional Ethernet II header,
//! IPv4, and the UDP or TCP header in front of the payload. Everything
//! else is kept as opaque bytes and written back unchanged.
//!
//! # Layout
//!
//! ```text
//! +------------------+
//! | Ethernet (14)    |  only for LinkType::Ethernet
//! +------------------+
//! | IPv4 header      |  IHL * 4 bytes, options kept verbatim
//! +------------------+
//! | UDP (8) / TCP    |  TCP: data offset * 4 bytes
//! +------------------+
//! | payload          |  exposed to embedding handlers
//! +------------------+
//! | trailer          |  link padding past the IPv4 total length
//! +------------------+
//! ```

use crate::config::link_types;
use crate::embed::CarrierUnit;
use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use tracing::warn;

const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_IPV4: u16 = 0x0800;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV4_MAX_TOTAL_LEN: usize = 65_535;
const UDP_HEADER_LEN: usize = 8;
const TCP_MIN_HEADER_LEN: usize = 20;
const PROTO_TCP: u8 = 6;
const PROTO_UDP: u8 = 17;

/// Framing of a captured packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// Ethernet II frames.
    Ethernet,
    /// Bare IPv4 packets, as delivered by kernel packet queues.
    RawIpv4,
}

impl LinkType {
    /// Map a pcap link-type code.
    pub fn from_pcap(code: u32) -> Result<Self> {
        match code {
            link_types::ETHERNET => Ok(LinkType::Ethernet),
            link_types::RAW | link_types::IPV4 => Ok(LinkType::RawIpv4),
            other => Err(Error::UnsupportedLinkType(other)),
        }
    }

    /// The pcap link-type code written for this framing.
    pub fn pcap_code(self) -> u32 {
        match self {
            LinkType::Ethernet => link_types::ETHERNET,
            LinkType::RawIpv4 => link_types::RAW,
        }
    }
}

/// Transport protocol of an IPv4 packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Udp,
    Tcp,
    /// Any other protocol, and every IPv4 fragment.
    Other(u8),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EthernetHeader {
    dst: [u8; 6],
    src: [u8; 6],
    ether_type: u16,
}

impl EthernetHeader {
    fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ETHERNET_HEADER_LEN {
            return None;
        }
        let mut dst = [0u8; 6];
        let mut src = [0u8; 6];
        dst.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);
        Some(Self {
            dst,
            src,
            ether_type: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.dst);
        out.extend_from_slice(&self.src);
        out.extend_from_slice(&self.ether_type.to_be_bytes());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Ipv4 {
    /// Full header including options.
    header: Vec<u8>,
    transport: Transport,
    /// UDP or TCP header; empty for `Transport::Other`.
    transport_header: Vec<u8>,
    payload: Vec<u8>,
}

impl Ipv4 {
    /// Parse an IPv4 packet, returning the packet and any trailing bytes.
    fn parse(data: &[u8]) -> Option<(Self, Vec<u8>)> {
        if data.len() < IPV4_MIN_HEADER_LEN || data[0] >> 4 != 4 {
            return None;
        }
        let header_len = usize::from(data[0] & 0x0F) * 4;
        let total_len = usize::from(u16::from_be_bytes([data[2], data[3]]));
        if header_len < IPV4_MIN_HEADER_LEN || total_len < header_len || total_len > data.len() {
            return None;
        }

        let header = data[..header_len].to_vec();
        let body = &data[header_len..total_len];
        let trailer = data[total_len..].to_vec();

        let flags_fragment = u16::from_be_bytes([data[6], data[7]]);
        let fragmented = flags_fragment & 0x2000 != 0 || flags_fragment & 0x1FFF != 0;
        let protocol = data[9];

        let (transport, split) = match protocol {
            _ if fragmented => (Transport::Other(protocol), 0),
            PROTO_UDP if body.len() >= UDP_HEADER_LEN => (Transport::Udp, UDP_HEADER_LEN),
            PROTO_TCP if body.len() >= TCP_MIN_HEADER_LEN => {
                let offset = usize::from(body[12] >> 4) * 4;
                if offset < TCP_MIN_HEADER_LEN || offset > body.len() {
                    (Transport::Other(protocol), 0)
                } else {
                    (Transport::Tcp, offset)
                }
            }
            _ => (Transport::Other(protocol), 0),
        };

        Some((
            Self {
                header,
                transport,
                transport_header: body[..split].to_vec(),
                payload: body[split..].to_vec(),
            },
            trailer,
        ))
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.header);
        out.extend_from_slice(&self.transport_header);
        out.extend_from_slice(&self.payload);
    }

    fn src(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[12], self.header[13], self.header[14], self.header[15])
    }

    fn dst(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.header[16], self.header[17], self.header[18], self.header[19])
    }

    /// Largest payload that keeps the IPv4 total length representable.
    fn payload_capacity(&self) -> usize {
        IPV4_MAX_TOTAL_LEN.saturating_sub(self.header.len() + self.transport_header.len())
    }

    fn revalidate(&mut self) {
        let segment_len = self.transport_header.len() + self.payload.len();
        let (Ok(total_len), Ok(segment_len)) = (
            u16::try_from(self.header.len() + segment_len),
            u16::try_from(segment_len),
        ) else {
            warn!(
                payload = self.payload.len(),
                limit = self.payload_capacity(),
                "IPv4 packet too large, lengths left unchanged"
            );
            return;
        };
        self.header[2..4].copy_from_slice(&total_len.to_be_bytes());
        self.header[10..12].copy_from_slice(&[0, 0]);
        let sum = checksum(&self.header);
        self.header[10..12].copy_from_slice(&sum.to_be_bytes());

        match self.transport {
            Transport::Udp => {
                self.transport_header[4..6].copy_from_slice(&segment_len.to_be_bytes());
                self.transport_header[6..8].copy_from_slice(&[0, 0]);
                let mut sum = self.segment_checksum(PROTO_UDP, segment_len);
                if sum == 0 {
                    sum = 0xFFFF;
                }
                self.transport_header[6..8].copy_from_slice(&sum.to_be_bytes());
            }
            Transport::Tcp => {
                self.transport_header[16..18].copy_from_slice(&[0, 0]);
                let sum = self.segment_checksum(PROTO_TCP, segment_len);
                self.transport_header[16..18].copy_from_slice(&sum.to_be_bytes());
            }
            Transport::Other(_) => {}
        }
    }

    fn segment_checksum(&self, protocol: u8, segment_len: u16) -> u16 {
        let mut data = Vec::with_capacity(12 + usize::from(segment_len));
        data.extend_from_slice(&self.header[12..20]);
        data.push(0);
        data.push(protocol);
        data.extend_from_slice(&segment_len.to_be_bytes());
        data.extend_from_slice(&self.transport_header);
        data.extend_from_slice(&self.payload);
        checksum(&data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Network {
    Ipv4(Ipv4),
    /// Non-IPv4 or unparseable bytes.
    Opaque(Vec<u8>),
}

/// A packet whose UDP/TCP payload can carry chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    link: LinkType,
    ethernet: Option<EthernetHeader>,
    network: Network,
    trailer: Vec<u8>,
}

impl Packet {
    /// Parse raw bytes. Never fails: anything not understood stays opaque.
    pub fn parse(link: LinkType, data: &[u8]) -> Self {
        let (ethernet, rest) = match link {
            LinkType::Ethernet => match EthernetHeader::parse(data) {
                Some(eth) => (Some(eth), &data[ETHERNET_HEADER_LEN..]),
                None => (None, data),
            },
            LinkType::RawIpv4 => (None, data),
        };

        let carries_ipv4 = match (&ethernet, link) {
            (Some(eth), _) => eth.ether_type == ETHERTYPE_IPV4,
            (None, LinkType::RawIpv4) => true,
            (None, LinkType::Ethernet) => false,
        };

        let parsed = if carries_ipv4 { Ipv4::parse(rest) } else { None };
        let (network, trailer) = match parsed {
            Some((ip, trailer)) => (Network::Ipv4(ip), trailer),
            None => (Network::Opaque(rest.to_vec()), Vec::new()),
        };

        Self {
            link,
            ethernet,
            network,
            trailer,
        }
    }

    /// Build a UDP packet with valid lengths and checksums.
    pub fn udp(
        link: LinkType,
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
        payload: &[u8],
    ) -> Self {
        let mut udp = vec![0u8; UDP_HEADER_LEN];
        udp[0..2].copy_from_slice(&src.1.to_be_bytes());
        udp[2..4].copy_from_slice(&dst.1.to_be_bytes());
        Self::build(link, PROTO_UDP, Transport::Udp, src.0, dst.0, udp, payload)
    }

    /// Build a TCP packet (PSH|ACK, no options) with valid lengths and checksums.
    pub fn tcp(
        link: LinkType,
        src: (Ipv4Addr, u16),
        dst: (Ipv4Addr, u16),
        payload: &[u8],
    ) -> Self {
        let mut tcp = vec![0u8; TCP_MIN_HEADER_LEN];
        tcp[0..2].copy_from_slice(&src.1.to_be_bytes());
        tcp[2..4].copy_from_slice(&dst.1.to_be_bytes());
        tcp[12] = 5 << 4;
        tcp[13] = 0x18;
        tcp[14..16].copy_from_slice(&0xFFFFu16.to_be_bytes());
        Self::build(link, PROTO_TCP, Transport::Tcp, src.0, dst.0, tcp, payload)
    }

    fn build(
        link: LinkType,
        protocol: u8,
        transport: Transport,
        src: Ipv4Addr,
        dst: Ipv4Addr,
        transport_header: Vec<u8>,
        payload: &[u8],
    ) -> Self {
        let mut header = vec![0u8; IPV4_MIN_HEADER_LEN];
        header[0] = 0x45;
        header[8] = 64;
        header[9] = protocol;
        header[12..16].copy_from_slice(&src.octets());
        header[16..20].copy_from_slice(&dst.octets());

        let ethernet = match link {
            LinkType::Ethernet => Some(EthernetHeader {
                dst: [0; 6],
                src: [0; 6],
                ether_type: ETHERTYPE_IPV4,
            }),
            LinkType::RawIpv4 => None,
        };

        let mut packet = Self {
            link,
            ethernet,
            network: Network::Ipv4(Ipv4 {
                header,
                transport,
                transport_header,
                payload: payload.to_vec(),
            }),
            trailer: Vec::new(),
        };
        packet.revalidate();
        packet
    }

    /// Serialize back to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        if let Some(eth) = &self.ethernet {
            eth.write(&mut out);
        }
        match &self.network {
            Network::Ipv4(ip) => ip.write(&mut out),
            Network::Opaque(bytes) => out.extend_from_slice(bytes),
        }
        out.extend_from_slice(&self.trailer);
        out
    }

    pub fn link(&self) -> LinkType {
        self.link
    }

    /// Transport protocol, if this is an IPv4 packet.
    pub fn transport(&self) -> Option<Transport> {
        match &self.network {
            Network::Ipv4(ip) => Some(ip.transport),
            Network::Opaque(_) => None,
        }
    }

    pub fn src_ip(&self) -> Option<Ipv4Addr> {
        self.ipv4().map(Ipv4::src)
    }

    pub fn dst_ip(&self) -> Option<Ipv4Addr> {
        self.ipv4().map(Ipv4::dst)
    }

    pub fn src_port(&self) -> Option<u16> {
        self.port_at(0)
    }

    pub fn dst_port(&self) -> Option<u16> {
        self.port_at(2)
    }

    pub fn src_mac(&self) -> Option<[u8; 6]> {
        self.ethernet.as_ref().map(|e| e.src)
    }

    pub fn dst_mac(&self) -> Option<[u8; 6]> {
        self.ethernet.as_ref().map(|e| e.dst)
    }

    /// Whether the stored IPv4, UDP and TCP checksums are correct.
    ///
    /// Non-IPv4 packets are trivially valid.
    pub fn checksums_valid(&self) -> bool {
        let Some(ip) = self.ipv4() else {
            return true;
        };
        if ip.payload.len() > ip.payload_capacity() {
            return false;
        }
        let mut fixed = ip.clone();
        fixed.revalidate();
        fixed == *ip
    }

    fn ipv4(&self) -> Option<&Ipv4> {
        match &self.network {
            Network::Ipv4(ip) => Some(ip),
            Network::Opaque(_) => None,
        }
    }

    fn port_at(&self, offset: usize) -> Option<u16> {
        let ip = self.ipv4()?;
        match ip.transport {
            Transport::Udp | Transport::Tcp => Some(u16::from_be_bytes([
                ip.transport_header[offset],
                ip.transport_header[offset + 1],
            ])),
            Transport::Other(_) => None,
        }
    }
}

impl CarrierUnit for Packet {
    /// UDP and TCP payloads only.
    fn payload(&self) -> Option<&[u8]> {
        match &self.network {
            Network::Ipv4(ip) if matches!(ip.transport, Transport::Udp | Transport::Tcp) => {
                Some(&ip.payload)
            }
            _ => None,
        }
    }

    fn set_payload(&mut self, payload: Vec<u8>) {
        if let Network::Ipv4(ip) = &mut self.network {
            ip.payload = payload;
        }
    }

    /// What still fits under the 65535-byte IPv4 total length.
    fn payload_capacity(&self) -> Option<usize> {
        match &self.network {
            Network::Ipv4(ip) => Some(ip.payload_capacity()),
            Network::Opaque(_) => None,
        }
    }

    /// Recompute IPv4 total length and header checksum, UDP length, and
    /// the UDP/TCP checksum.
    fn revalidate(&mut self) {
        if let Network::Ipv4(ip) = &mut self.network {
            ip.revalidate();
        }
    }
}

/// Address rewrites applied to replayed packets before they are emitted.
///
/// Replayed traffic keeps its original addresses unless told otherwise,
/// which anti-spoofing filters on the path will usually drop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Rewrite {
    pub src_mac: Option<[u8; 6]>,
    pub dst_mac: Option<[u8; 6]>,
    pub src_ip: Option<Ipv4Addr>,
    pub dst_ip: Option<Ipv4Addr>,
    pub src_port: Option<u16>,
    pub dst_port: Option<u16>,
}

impl Rewrite {
    /// Whether this rewrite changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Rewrite::default()
    }

    /// Apply the rewrite. Checksums are stale afterwards; call
    /// [`CarrierUnit::revalidate`].
    pub fn apply(&self, packet: &mut Packet) {
        if let Some(eth) = packet.ethernet.as_mut() {
            if let Some(mac) = self.src_mac {
                eth.src = mac;
            }
            if let Some(mac) = self.dst_mac {
                eth.dst = mac;
            }
        }

        let Network::Ipv4(ip) = &mut packet.network else {
            return;
        };
        if let Some(addr) = self.src_ip {
            ip.header[12..16].copy_from_slice(&addr.octets());
        }
        if let Some(addr) = self.dst_ip {
            ip.header[16..20].copy_from_slice(&addr.octets());
        }
        if matches!(ip.transport, Transport::Udp | Transport::Tcp) {
            if let Some(port) = self.src_port {
                ip.transport_header[0..2].copy_from_slice(&port.to_be_bytes());
            }
            if let Some(port) = self.dst_port {
                ip.transport_header[2..4].copy_from_slice(&port.to_be_bytes());
            }
        }
    }
}

/// Parse a MAC address written as `aa:bb:cc:dd:ee:ff`.
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let digits: String = s.split(':').collect();
    let bytes = hex::decode(&digits)
        .map_err(|e| Error::InvalidConfig(format!("invalid MAC address {s:?}: {e}")))?;
    if s.split(':').count() != 6 {
        return Err(Error::InvalidConfig(format!("invalid MAC address {s:?}")));
    }
    bytes
        .try_into()
        .map_err(|_| Error::InvalidConfig(format!("invalid MAC address {s:?}")))
}

/// Internet checksum (RFC 1071).
fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(u16::from_be_bytes([*hi, 0])),
            _ => 0,
        })
        .sum();
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}
