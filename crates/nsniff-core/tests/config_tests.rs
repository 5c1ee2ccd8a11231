//! Integration tests for configuration loading

use nsniff_core::config::Config;
use nsniff_core::filter::Direction;
use nsniff_core::{Error, Protocol};
use std::io::Write;

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[capture]
interface = "eth0"
include_link_header = true
poll_timeout_ms = 250

[[filters]]
address = "any:53"
protocol = "udp"

[[filters]]
address = "10.1.2.3:0"
direction = "destination"
"#
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    config.validate().unwrap();

    assert_eq!(config.capture.interface.as_deref(), Some("eth0"));
    assert!(config.capture.include_link_header);
    assert!(!config.capture.promiscuous);
    assert_eq!(config.capture.poll_timeout_ms, 250);

    let filters = config.address_filters().unwrap();
    assert_eq!(filters[0].protocol, Protocol::Udp);
    assert_eq!(filters[0].direction, Direction::Any);
    assert_eq!(filters[1].direction, Direction::Destination);
}

#[test]
fn test_load_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::load(dir.path().join("absent.toml"));
    assert!(matches!(result, Err(Error::ConfigNotFound { .. })));
}

#[test]
fn test_unknown_protocol_rejected() {
    let result = Config::from_toml(
        r#"
[[filters]]
address = "any:0"
protocol = "sctp"
"#,
    );
    assert!(matches!(result, Err(Error::TomlParse(_))));
}

#[test]
fn test_empty_file_is_default() {
    let config = Config::from_toml("").unwrap();
    assert!(config.capture.interface.is_none());
    assert!(config.validate().is_ok());
}
