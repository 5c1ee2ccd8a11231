//! Packet type definitions

use crate::error::{Error, Result};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// IP protocol selector
///
/// Wire values follow the IANA protocol numbers. `Any` is the internal
/// "unset" sentinel (0) and is only meaningful on the filter side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Matches every protocol
    #[default]
    #[serde(alias = "ANY")]
    Any,
    /// ICMP (protocol number 1)
    #[serde(alias = "ICMP")]
    Icmp,
    /// TCP (protocol number 6)
    #[serde(alias = "TCP")]
    Tcp,
    /// UDP (protocol number 17)
    #[serde(alias = "UDP")]
    Udp,
}

impl Protocol {
    /// ICMP protocol number
    pub const ICMP_NUMBER: u8 = 1;
    /// TCP protocol number
    pub const TCP_NUMBER: u8 = 6;
    /// UDP protocol number
    pub const UDP_NUMBER: u8 = 17;

    /// Create from a wire protocol number
    ///
    /// Returns `None` for protocols the decoder does not understand.
    pub fn from_number(proto: u8) -> Option<Self> {
        match proto {
            Self::ICMP_NUMBER => Some(Protocol::Icmp),
            Self::TCP_NUMBER => Some(Protocol::Tcp),
            Self::UDP_NUMBER => Some(Protocol::Udp),
            _ => None,
        }
    }

    /// Get protocol number (0 for `Any`)
    pub fn number(self) -> u8 {
        match self {
            Protocol::Any => 0,
            Protocol::Icmp => Self::ICMP_NUMBER,
            Protocol::Tcp => Self::TCP_NUMBER,
            Protocol::Udp => Self::UDP_NUMBER,
        }
    }

    /// Parse a protocol name (`any`, `icmp`, `tcp`, `udp`, case-insensitive)
    pub fn from_name(name: &str) -> Result<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ANY" => Ok(Protocol::Any),
            "ICMP" => Ok(Protocol::Icmp),
            "TCP" => Ok(Protocol::Tcp),
            "UDP" => Ok(Protocol::Udp),
            _ => Err(Error::UnknownProtocol {
                name: name.to_string(),
            }),
        }
    }

    /// Protocol gate used by filters
    pub fn admits(self, wire_protocol: u8) -> bool {
        self == Protocol::Any || self.number() == wire_protocol
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Any => "ANY",
            Protocol::Icmp => "ICMP",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

bitflags! {
    /// TCP control flags, NS in bit 8 as laid out in the header
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TcpFlags: u16 {
        /// No more data from sender
        const FIN = 0x001;
        /// Synchronize sequence numbers
        const SYN = 0x002;
        /// Reset the connection
        const RST = 0x004;
        /// Push function
        const PSH = 0x008;
        /// Acknowledgment field is significant
        const ACK = 0x010;
        /// Urgent pointer field is significant
        const URG = 0x020;
        /// ECN-Echo
        const ECE = 0x040;
        /// Congestion window reduced
        const CWR = 0x080;
        /// ECN-nonce concealment protection
        const NS = 0x100;
    }
}

impl TcpFlags {
    /// Build from header bytes 12 and 13 (data offset/NS byte and flags byte)
    pub fn from_header_bytes(offset_byte: u8, flags_byte: u8) -> Self {
        let bits = (u16::from(offset_byte & 0x01) << 8) | u16::from(flags_byte);
        Self::from_bits_truncate(bits)
    }
}

/// Ethertype carried by IPv4 frames
pub const ETHERTYPE_IPV4: u16 = 0x0800;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_from_number() {
        assert_eq!(Protocol::from_number(1), Some(Protocol::Icmp));
        assert_eq!(Protocol::from_number(6), Some(Protocol::Tcp));
        assert_eq!(Protocol::from_number(17), Some(Protocol::Udp));
        assert_eq!(Protocol::from_number(0), None);
        assert_eq!(Protocol::from_number(58), None);
    }

    #[test]
    fn test_protocol_from_name() {
        assert_eq!(Protocol::from_name("tcp").unwrap(), Protocol::Tcp);
        assert_eq!(Protocol::from_name("UDP").unwrap(), Protocol::Udp);
        assert_eq!(Protocol::from_name("Icmp").unwrap(), Protocol::Icmp);
        assert_eq!(Protocol::from_name("any").unwrap(), Protocol::Any);
        assert!(matches!(
            Protocol::from_name("sctp"),
            Err(Error::UnknownProtocol { .. })
        ));
    }

    #[test]
    fn test_protocol_admits() {
        assert!(Protocol::Any.admits(6));
        assert!(Protocol::Any.admits(47));
        assert!(Protocol::Tcp.admits(6));
        assert!(!Protocol::Tcp.admits(17));
        assert!(!Protocol::Icmp.admits(0));
    }

    #[test]
    fn test_tcp_flags_from_header_bytes() {
        let flags = TcpFlags::from_header_bytes(0x50, 0x12);
        assert!(flags.contains(TcpFlags::SYN | TcpFlags::ACK));
        assert!(!flags.contains(TcpFlags::NS));

        let flags = TcpFlags::from_header_bytes(0x51, 0x01);
        assert!(flags.contains(TcpFlags::NS));
        assert!(flags.contains(TcpFlags::FIN));
    }
}
