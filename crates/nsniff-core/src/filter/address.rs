//! Address filter rules
//!
//! A rule is parsed from `"IP:PORT"` and refined with a direction and a
//! protocol gate.

use crate::error::{Error, Result};
use crate::packet::{PacketEndpoints, Protocol};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Which endpoint of a packet a rule looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Either the source or the destination endpoint
    #[default]
    Any,
    /// Source endpoint only
    Source,
    /// Destination endpoint only
    Destination,
}

impl Direction {
    /// Whether source-side tests apply
    pub fn covers_source(self) -> bool {
        matches!(self, Direction::Any | Direction::Source)
    }

    /// Whether destination-side tests apply
    pub fn covers_destination(self) -> bool {
        matches!(self, Direction::Any | Direction::Destination)
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(Direction::Any),
            "source" | "src" => Ok(Direction::Source),
            "destination" | "dst" => Ok(Direction::Destination),
            _ => Err(Error::UnknownDirection { name: s.to_string() }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Any => "any",
            Direction::Source => "source",
            Direction::Destination => "destination",
        })
    }
}

/// Address part of a rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterAddress {
    /// The literal `any`
    Any,
    /// A single IPv4 address
    Ip(Ipv4Addr),
}

impl FilterAddress {
    /// Whether `addr` satisfies this address
    pub fn admits(self, addr: Ipv4Addr) -> bool {
        match self {
            FilterAddress::Any => true,
            FilterAddress::Ip(ip) => ip == addr,
        }
    }
}

impl fmt::Display for FilterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterAddress::Any => f.write_str("any"),
            FilterAddress::Ip(ip) => write!(f, "{ip}"),
        }
    }
}

/// One `(address, port, direction, protocol)` rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressFilter {
    /// Address to match, or any
    pub address: FilterAddress,
    /// Port to match, 0 is a wildcard
    pub port: u16,
    /// Endpoint(s) the address/port apply to
    pub direction: Direction,
    /// Protocol gate
    pub protocol: Protocol,
}

impl AddressFilter {
    /// Rule that admits every packet
    pub const ANY: Self = Self {
        address: FilterAddress::Any,
        port: 0,
        direction: Direction::Any,
        protocol: Protocol::Any,
    };

    /// Parse `"IP:PORT"`; direction and protocol default to `Any`
    ///
    /// `IP` is a dotted-decimal IPv4 address or `any`. `PORT` is a decimal
    /// number in 0..=65535 where 0 means any port.
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (ip, port) = spec
            .rsplit_once(':')
            .ok_or_else(|| Error::invalid_address(spec, "missing ':' separator"))?;

        if ip.is_empty() {
            return Err(Error::invalid_address(spec, "empty IP part"));
        }

        let address = if ip.eq_ignore_ascii_case("any") {
            FilterAddress::Any
        } else {
            let ip: Ipv4Addr = ip
                .parse()
                .map_err(|_| Error::invalid_address(spec, format!("invalid IPv4 address '{ip}'")))?;
            FilterAddress::Ip(ip)
        };

        if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::invalid_address(
                spec,
                format!("invalid port '{port}'"),
            ));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| Error::invalid_address(spec, format!("port '{port}' exceeds 65535")))?;

        Ok(Self {
            address,
            port,
            ..Self::ANY
        })
    }

    /// Set the direction
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the protocol gate
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Evaluate this rule against a packet
    ///
    /// Protocol is checked first; then the source test (if the direction
    /// covers it) and the destination test (if the direction covers it)
    /// are OR-ed.
    pub fn matches(&self, packet: &PacketEndpoints) -> bool {
        if !self.protocol.admits(packet.protocol) {
            return false;
        }

        let port_ok = |port: u16| self.port == 0 || self.port == port;

        if self.direction.covers_source()
            && self.address.admits(packet.source)
            && port_ok(packet.source_port)
        {
            return true;
        }

        self.direction.covers_destination()
            && self.address.admits(packet.destination)
            && port_ok(packet.destination_port)
    }
}

impl FromStr for AddressFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({}, {})",
            self.address, self.port, self.direction, self.protocol
        )
    }
}
