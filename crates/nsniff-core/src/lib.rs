//! # netsniffer Core
//!
//! Platform-independent part of the packet sniffer.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Header decoding** - Ethernet/IPv4/ICMP/TCP/UDP views over a captured frame
//! - **Address filters** - `IP:PORT` rules with direction and protocol gates
//! - **Duplicate suppression** - drops link-layer echoes of locally sent packets
//! - **Configuration** - TOML capture configuration
//!
//! ## Example
//!
//! ```rust
//! use nsniff_core::filter::{AddressFilter, Direction, FilterSet};
//! use nsniff_core::packet::{DecodedPacket, Protocol};
//!
//! let mut filters = FilterSet::new();
//! filters.add(
//!     AddressFilter::parse("10.0.0.1:53")?
//!         .with_direction(Direction::Source)
//!         .with_protocol(Protocol::Udp),
//! )?;
//!
//! # let frame = [0u8; 0];
//! if let Ok(packet) = DecodedPacket::decode(&frame, false) {
//!     if filters.matches(&packet.endpoints()) {
//!         // deliver
//!     }
//! }
//! # Ok::<(), nsniff_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod packet;
pub mod time;

// Re-exports for convenience
pub use config::Config;
pub use dedup::{DedupGuard, Delivery, Verdict};
pub use error::{Error, Result};
pub use filter::{AddressFilter, Direction, FilterSet};
pub use packet::{DecodedPacket, Protocol};
pub use time::TimeInfo;
