//! Packet decoding
//!
//! Header views for Ethernet/IPv4/ICMP/TCP/UDP over a captured frame.

pub mod checksum;
mod headers;
mod types;

pub use headers::*;
pub use types::*;

use crate::error::{Error, Result};
use std::net::Ipv4Addr;
use std::ops::Range;

/// Size of the capture buffer; no frame is larger
pub const MAX_FRAME_SIZE: usize = 65536;

/// Addressing facts the filter engine looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketEndpoints {
    /// IANA protocol number from the IP header
    pub protocol: u8,
    /// Source address
    pub source: Ipv4Addr,
    /// Source port, host order (0 when not TCP/UDP)
    pub source_port: u16,
    /// Destination address
    pub destination: Ipv4Addr,
    /// Destination port, host order (0 when not TCP/UDP)
    pub destination_port: u16,
}

/// A frame with all headers decoded
///
/// Holds only offsets and copied header fields, never the frame bytes, so it
/// stays valid after the capture buffer is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedPacket {
    /// Link-layer header, present for link-layer captures
    pub ethernet: Option<EthernetHeader>,
    /// Offset of the IP header within the frame
    pub ip_offset: usize,
    /// IPv4 header
    pub ip: Ipv4Header,
    /// Transport header
    pub transport: TransportHeader,
    /// Offset of the payload within the frame
    pub payload_offset: usize,
    /// Number of valid bytes in the frame
    pub len: usize,
}

impl DecodedPacket {
    /// Decode a whole frame
    ///
    /// With `link_layer` set the frame must start with an Ethernet II header
    /// carrying IPv4; otherwise it must start with the IPv4 header.
    pub fn decode(frame: &[u8], link_layer: bool) -> Result<Self> {
        let (ethernet, ip_offset) = if link_layer {
            let eth = EthernetHeader::parse(frame).ok_or(Error::PacketTooShort {
                expected: ETHERNET_HEADER_LEN,
                actual: frame.len(),
            })?;
            if eth.ethertype != ETHERTYPE_IPV4 {
                return Err(Error::NotIpv4(format!("ethertype 0x{:04x}", eth.ethertype)));
            }
            (Some(eth), ETHERNET_HEADER_LEN)
        } else {
            (None, 0)
        };

        let ip_packet = &frame[ip_offset..];
        let ip = Ipv4Header::parse(ip_packet)?;
        if ip.version != 4 {
            return Err(Error::NotIpv4(format!("IP version {}", ip.version)));
        }

        let transport = TransportHeader::parse(ip_packet, &ip);
        let payload_offset = ip_offset + payload_offset(&ip, &transport, ip_packet.len());

        Ok(Self {
            ethernet,
            ip_offset,
            ip,
            transport,
            payload_offset,
            len: frame.len(),
        })
    }

    /// Protocol/address/port view used by filters
    pub fn endpoints(&self) -> PacketEndpoints {
        let (source_port, destination_port) = self.transport.ports();
        PacketEndpoints {
            protocol: self.ip.protocol,
            source: self.ip.source,
            source_port,
            destination: self.ip.destination,
            destination_port,
        }
    }

    /// Byte range of the IP header within the frame
    pub fn ip_header_range(&self) -> Range<usize> {
        self.ip_offset..self.ip_offset + self.ip.header_len
    }

    /// End of the IP datagram within the frame
    ///
    /// Bytes past the IPv4 total length (Ethernet padding) are not part of
    /// the datagram. A total length of 0 (segmentation offload) falls back
    /// to the received length.
    pub fn datagram_end(&self) -> usize {
        match self.ip.total_length {
            0 => self.len,
            total => (self.ip_offset + usize::from(total)).clamp(self.payload_offset, self.len),
        }
    }

    /// Payload bytes of `frame` (the frame this packet was decoded from)
    pub fn payload<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        frame
            .get(self.payload_offset..self.datagram_end())
            .unwrap_or(&[])
    }

    /// Payload length
    pub fn payload_len(&self) -> usize {
        self.datagram_end() - self.payload_offset
    }

    /// Verify the IPv4 header checksum against the raw `frame`
    pub fn ip_checksum_valid(&self, frame: &[u8]) -> bool {
        frame
            .get(self.ip_header_range())
            .map_or(false, checksum::ipv4_header_valid)
    }
}
