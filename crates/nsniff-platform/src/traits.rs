//! Platform-agnostic capture backend interface
//!
//! A backend owns one raw socket. The session drives it through a fixed
//! sequence: `resolve`, `bind`, optionally `set_promiscuous`, then any number
//! of `poll`/`recv` steps, and finally `close`.

use crate::Result;
use nsniff_core::Delivery;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A resolved capture interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceInfo {
    /// OS interface (adapter) index
    pub index: u32,
    /// IPv4 address bound to the interface
    pub ipv4: Ipv4Addr,
}

/// Result of one successful receive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecvMeta {
    /// Bytes written to the buffer
    pub len: usize,
    /// Link-layer delivery type, when the socket reports one
    pub delivery: Option<Delivery>,
}

/// Raw-socket capture interface
///
/// Implemented by the Linux packet-socket backend and the Windows raw IP
/// backend.
#[cfg_attr(test, mockall::automock)]
pub trait CaptureBackend: Send {
    /// Look up the interface and its IPv4 address
    fn resolve(&mut self, interface: &str) -> Result<InterfaceInfo>;

    /// Bind the socket to a resolved interface
    fn bind(&mut self, info: &InterfaceInfo) -> Result<()>;

    /// Enable or disable promiscuous reception on the bound interface
    ///
    /// Returns `true` when the interface flag was changed, `false` when it
    /// already had the requested value.
    fn set_promiscuous(&mut self, enabled: bool) -> Result<bool>;

    /// Wait up to `timeout` for the socket to become readable
    ///
    /// Returns `false` on timeout. A pending socket error counts as readable
    /// so that the following `recv` reports it.
    fn poll(&mut self, timeout: Duration) -> Result<bool>;

    /// Receive one frame into `buf`
    ///
    /// Returns `None` when no frame is pending.
    fn recv(&mut self, buf: &mut [u8]) -> Result<Option<RecvMeta>>;

    /// Close the socket
    fn close(&mut self) -> Result<()>;

    /// Whether received frames start with an Ethernet header
    fn link_layer(&self) -> bool;
}
