//! Wire-format header views
//!
//! Every parser takes the bytes that are actually present and refuses to
//! read past them. Length fields are only trusted after they have been
//! checked against the slice length.

use super::types::{Protocol, TcpFlags};
use crate::error::{Error, Result};
use std::net::Ipv4Addr;

/// Ethernet II header length
pub const ETHERNET_HEADER_LEN: usize = 14;
/// Minimum IPv4 header length (IHL = 5)
pub const IPV4_MIN_HEADER_LEN: usize = 20;
/// Maximum IPv4 header length (IHL = 15)
pub const IPV4_MAX_HEADER_LEN: usize = 60;
/// ICMP header length
pub const ICMP_HEADER_LEN: usize = 8;
/// Minimum TCP header length (data offset = 5)
pub const TCP_MIN_HEADER_LEN: usize = 20;
/// Maximum TCP header length (data offset = 15)
pub const TCP_MAX_HEADER_LEN: usize = 60;
/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;

fn be16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Ethernet II header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    /// Destination MAC address
    pub destination: [u8; 6],
    /// Source MAC address
    pub source: [u8; 6],
    /// Ethertype, host order
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Read the fixed 14-byte header, `None` if the frame is shorter
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ETHERNET_HEADER_LEN {
            return None;
        }

        let mut destination = [0u8; 6];
        let mut source = [0u8; 6];
        destination.copy_from_slice(&buf[0..6]);
        source.copy_from_slice(&buf[6..12]);

        Some(Self {
            destination,
            source,
            ethertype: be16(buf, 12),
        })
    }
}

/// Format a MAC address as `aa:bb:cc:dd:ee:ff`
pub fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// IP version nibble
    pub version: u8,
    /// Header length in bytes (IHL * 4)
    pub header_len: usize,
    /// Type of service
    pub tos: u8,
    /// Total datagram length
    pub total_length: u16,
    /// Identification
    pub identification: u16,
    /// Flags and fragment offset
    pub fragment_offset: u16,
    /// Time to live
    pub ttl: u8,
    /// IANA protocol number
    pub protocol: u8,
    /// Header checksum, host order
    pub checksum: u16,
    /// Source address
    pub source: Ipv4Addr,
    /// Destination address
    pub destination: Ipv4Addr,
}

impl Ipv4Header {
    /// Decode an IPv4 header from the start of `buf`
    ///
    /// Fails when fewer than 20 bytes are present, when the IHL nibble is
    /// below 5, or when the declared header length exceeds `buf.len()`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < IPV4_MIN_HEADER_LEN {
            return Err(Error::PacketTooShort {
                expected: IPV4_MIN_HEADER_LEN,
                actual: buf.len(),
            });
        }

        let header_len = usize::from(buf[0] & 0x0F) * 4;
        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(Error::PacketTooShort {
                expected: IPV4_MIN_HEADER_LEN,
                actual: header_len,
            });
        }
        if header_len > buf.len() {
            return Err(Error::PacketTooShort {
                expected: header_len,
                actual: buf.len(),
            });
        }

        Ok(Self {
            version: buf[0] >> 4,
            header_len,
            tos: buf[1],
            total_length: be16(buf, 2),
            identification: be16(buf, 4),
            fragment_offset: be16(buf, 6),
            ttl: buf[8],
            protocol: buf[9],
            checksum: be16(buf, 10),
            source: Ipv4Addr::new(buf[12], buf[13], buf[14], buf[15]),
            destination: Ipv4Addr::new(buf[16], buf[17], buf[18], buf[19]),
        })
    }

    /// Decoded protocol, `None` for anything but ICMP/TCP/UDP
    pub fn known_protocol(&self) -> Option<Protocol> {
        Protocol::from_number(self.protocol)
    }
}

/// ICMP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    /// Message type
    pub icmp_type: u8,
    /// Message code
    pub code: u8,
    /// Checksum, host order
    pub checksum: u16,
    /// Rest of header
    pub rest_of_header: u32,
}

impl IcmpHeader {
    /// Decode from the first 8 bytes of `buf`
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < ICMP_HEADER_LEN {
            return None;
        }
        Some(Self {
            icmp_type: buf[0],
            code: buf[1],
            checksum: be16(buf, 2),
            rest_of_header: be32(buf, 4),
        })
    }
}

/// TCP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    /// Source port
    pub source_port: u16,
    /// Destination port
    pub destination_port: u16,
    /// Sequence number
    pub sequence: u32,
    /// Acknowledgment number
    pub acknowledgment: u32,
    /// Header length in bytes (data offset * 4)
    pub header_len: usize,
    /// Control flags
    pub flags: TcpFlags,
    /// Window size
    pub window: u16,
    /// Checksum, host order
    pub checksum: u16,
    /// Urgent pointer
    pub urgent_pointer: u16,
}

impl TcpHeader {
    /// Decode a TCP header; `None` if the data offset is out of range or
    /// runs past the end of `buf`
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < TCP_MIN_HEADER_LEN {
            return None;
        }

        let header_len = usize::from(buf[12] >> 4) * 4;
        if header_len < TCP_MIN_HEADER_LEN || header_len > buf.len() {
            return None;
        }

        Some(Self {
            source_port: be16(buf, 0),
            destination_port: be16(buf, 2),
            sequence: be32(buf, 4),
            acknowledgment: be32(buf, 8),
            header_len,
            flags: TcpFlags::from_header_bytes(buf[12], buf[13]),
            window: be16(buf, 14),
            checksum: be16(buf, 16),
            urgent_pointer: be16(buf, 18),
        })
    }
}

/// UDP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// Source port
    pub source_port: u16,
    /// Destination port
    pub destination_port: u16,
    /// Datagram length
    pub length: u16,
    /// Checksum, host order
    pub checksum: u16,
}

impl UdpHeader {
    /// Decode from the first 8 bytes of `buf`
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < UDP_HEADER_LEN {
            return None;
        }
        Some(Self {
            source_port: be16(buf, 0),
            destination_port: be16(buf, 2),
            length: be16(buf, 4),
            checksum: be16(buf, 6),
        })
    }
}

/// Transport header following the IPv4 header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader {
    /// ICMP message
    Icmp(IcmpHeader),
    /// TCP segment
    Tcp(TcpHeader),
    /// UDP datagram
    Udp(UdpHeader),
    /// Unknown protocol or truncated header
    None,
}

impl TransportHeader {
    /// Decode the transport header of `ip_packet` (which starts at the IP
    /// header) by dispatching on `ip.protocol`
    pub fn parse(ip_packet: &[u8], ip: &Ipv4Header) -> Self {
        let Some(segment) = ip_packet.get(ip.header_len..) else {
            return Self::None;
        };

        let decoded = match ip.known_protocol() {
            Some(Protocol::Icmp) => IcmpHeader::parse(segment).map(Self::Icmp),
            Some(Protocol::Tcp) => TcpHeader::parse(segment).map(Self::Tcp),
            Some(Protocol::Udp) => UdpHeader::parse(segment).map(Self::Udp),
            _ => None,
        };
        decoded.unwrap_or(Self::None)
    }

    /// Header length in bytes (0 for `None`)
    pub fn header_len(&self) -> usize {
        match self {
            Self::Icmp(_) => ICMP_HEADER_LEN,
            Self::Tcp(tcp) => tcp.header_len,
            Self::Udp(_) => UDP_HEADER_LEN,
            Self::None => 0,
        }
    }

    /// `(source, destination)` ports in host order; zero when the protocol
    /// has no ports
    pub fn ports(&self) -> (u16, u16) {
        match self {
            Self::Tcp(tcp) => (tcp.source_port, tcp.destination_port),
            Self::Udp(udp) => (udp.source_port, udp.destination_port),
            Self::Icmp(_) | Self::None => (0, 0),
        }
    }
}

/// Offset of the payload relative to the start of the IP header
///
/// Clamped to `len`, so an inconsistent header yields an empty payload
/// rather than an out-of-range offset.
pub fn payload_offset(ip: &Ipv4Header, transport: &TransportHeader, len: usize) -> usize {
    let offset = ip.header_len + transport.header_len();
    offset.min(len)
}
