//! Error types for nsniff-core
//!
//! Centralized error handling using `thiserror` for ergonomic error definitions.

use thiserror::Error;

/// Main error type for nsniff-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Address filter string is not `IP:PORT`
    #[error("Invalid address '{address}': {reason}. Address must be in the format \"IP:PORT\"")]
    InvalidAddressFormat {
        /// The rejected address string
        address: String,
        /// Which part was wrong
        reason: String,
    },

    /// Filter set already holds its maximum number of entries
    #[error("Max addresses count reached (max value: {max})")]
    CapacityExceeded {
        /// The configured bound
        max: usize,
    },

    /// Protocol name not one of ANY/ICMP/TCP/UDP
    #[error("Unknown protocol '{name}' (expected one of: any, icmp, tcp, udp)")]
    UnknownProtocol {
        /// The rejected name
        name: String,
    },

    /// Direction name not one of any/source/destination
    #[error("Unknown direction '{name}' (expected one of: any, source, destination)")]
    UnknownDirection {
        /// The rejected name
        name: String,
    },

    /// Frame is too small to hold the header being decoded
    #[error("Packet too small: expected at least {expected} bytes, got {actual}")]
    PacketTooShort {
        /// Minimum expected size
        expected: usize,
        /// Actual byte count
        actual: usize,
    },

    /// Frame does not carry an IPv4 datagram
    #[error("Not an IPv4 packet: {0}")]
    NotIpv4(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound {
        /// Path to the missing config file
        path: String,
    },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    ConfigValue {
        /// Configuration key
        key: String,
        /// Error message
        message: String,
    },

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// I/O error wrapper
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create an invalid address error
    pub fn invalid_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddressFormat {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a config value error
    pub fn config_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValue {
            key: key.into(),
            message: message.into(),
        }
    }

    /// True for errors caused by user-supplied filters or configuration
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidAddressFormat { .. }
                | Self::CapacityExceeded { .. }
                | Self::UnknownProtocol { .. }
                | Self::UnknownDirection { .. }
                | Self::Config(_)
                | Self::ConfigNotFound { .. }
                | Self::ConfigValue { .. }
                | Self::TomlParse(_)
        )
    }
}
