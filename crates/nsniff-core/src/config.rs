//! Capture configuration
//!
//! Strongly-typed configuration with TOML support:
//!
//! ```toml
//! [capture]
//! interface = "eth0"
//! promiscuous = true
//!
//! [[filters]]
//! address = "any:443"
//! direction = "destination"
//! protocol = "tcp"
//! ```

use crate::error::{Error, Result};
use crate::filter::{AddressFilter, Direction, DEFAULT_MAX_FILTERS};
use crate::packet::Protocol;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default readiness wait of one pump step
pub const DEFAULT_POLL_TIMEOUT_MS: u64 = 1000;

/// Upper bound for the readiness wait
pub const MAX_POLL_TIMEOUT_MS: u64 = 60_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Session settings
    pub capture: CaptureConfig,

    /// Address filters
    pub filters: Vec<FilterConfig>,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Interface name (Linux) or adapter index (Windows)
    pub interface: Option<String>,

    /// Put the interface into promiscuous mode while capturing
    pub promiscuous: bool,

    /// Hand the Ethernet header to the packet handler
    pub include_link_header: bool,

    /// Readiness wait per pump step, in milliseconds
    pub poll_timeout_ms: u64,

    /// Maximum number of address filters
    pub max_filters: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: None,
            promiscuous: false,
            include_link_header: false,
            poll_timeout_ms: DEFAULT_POLL_TIMEOUT_MS,
            max_filters: DEFAULT_MAX_FILTERS,
        }
    }
}

/// One `[[filters]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// `IP:PORT`
    pub address: String,

    /// Endpoint the rule applies to
    #[serde(default)]
    pub direction: Direction,

    /// Protocol gate
    #[serde(default)]
    pub protocol: Protocol,
}

impl FilterConfig {
    /// Parse into an address filter
    pub fn to_filter(&self) -> Result<AddressFilter> {
        Ok(AddressFilter::parse(&self.address)?
            .with_direction(self.direction)
            .with_protocol(self.protocol))
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|_| Error::ConfigNotFound {
            path: path.display().to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(Error::from)
    }

    /// Serialize to TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref iface) = self.capture.interface {
            if iface.trim().is_empty() {
                return Err(Error::config_value("capture.interface", "must not be empty"));
            }
        }

        if self.capture.poll_timeout_ms == 0 || self.capture.poll_timeout_ms > MAX_POLL_TIMEOUT_MS {
            return Err(Error::config_value(
                "capture.poll_timeout_ms",
                format!("must be between 1 and {MAX_POLL_TIMEOUT_MS}"),
            ));
        }

        if self.capture.max_filters == 0 {
            return Err(Error::config_value("capture.max_filters", "must be at least 1"));
        }

        if self.filters.len() > self.capture.max_filters {
            return Err(Error::CapacityExceeded {
                max: self.capture.max_filters,
            });
        }

        for filter in &self.filters {
            filter.to_filter()?;
        }

        Ok(())
    }

    /// Parsed address filters, in file order
    pub fn address_filters(&self) -> Result<Vec<AddressFilter>> {
        self.filters.iter().map(FilterConfig::to_filter).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.capture.poll_timeout_ms, 1000);
        assert_eq!(config.capture.max_filters, 20);
        assert!(!config.capture.promiscuous);
        assert!(config.filters.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = Config::from_toml(
            r#"
            [capture]
            interface = "lo"
            promiscuous = true

            [[filters]]
            address = "127.0.0.1:8000"
            direction = "source"
            protocol = "TCP"

            [[filters]]
            address = "any:0"
            "#,
        )
        .unwrap();

        assert_eq!(config.capture.interface.as_deref(), Some("lo"));
        assert!(config.capture.promiscuous);
        assert_eq!(config.capture.poll_timeout_ms, 1000);

        let filters = config.address_filters().unwrap();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].port, 8000);
        assert_eq!(filters[0].direction, Direction::Source);
        assert_eq!(filters[0].protocol, Protocol::Tcp);
        assert_eq!(filters[1], AddressFilter::ANY);
    }

    #[test]
    fn test_validate_rejects_bad_timeout() {
        let mut config = Config::default();
        config.capture.poll_timeout_ms = 0;
        assert!(matches!(config.validate(), Err(Error::ConfigValue { .. })));
    }

    #[test]
    fn test_validate_rejects_too_many_filters() {
        let mut config = Config::default();
        config.capture.max_filters = 1;
        config.filters = vec![
            FilterConfig {
                address: "any:1".into(),
                direction: Direction::Any,
                protocol: Protocol::Any,
            };
            2
        ];
        assert!(matches!(config.validate(), Err(Error::CapacityExceeded { max: 1 })));
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let mut config = Config::default();
        config.filters.push(FilterConfig {
            address: "nope".into(),
            direction: Direction::Any,
            protocol: Protocol::Any,
        });
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidAddressFormat { .. })
        ));
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = Config::default();
        config.capture.interface = Some("eth0".into());
        let text = config.to_toml().unwrap();
        let parsed = Config::from_toml(&text).unwrap();
        assert_eq!(parsed.capture.interface.as_deref(), Some("eth0"));
    }
}
