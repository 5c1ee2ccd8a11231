//! netsniffer Platform Abstraction Layer
//!
//! This crate provides raw-socket packet capture and the capture session.
//!
//! ## Supported Platforms
//!
//! - **Linux**: `AF_PACKET` socket, frames include the Ethernet header
//! - **Windows**: raw IP socket with `SIO_RCVALL`, frames start at the IP header

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
pub use error::{ErrorKind, PlatformError, Result, StateError};

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

pub mod session;
pub use session::{CaptureSession, CaptureStats, CapturedFrame, SessionOptions, SessionState};

// Platform-agnostic traits
mod traits;
pub use traits::{CaptureBackend, InterfaceInfo, RecvMeta};

/// Open the capture backend for the current platform
pub fn open_backend() -> Result<Box<dyn CaptureBackend>> {
    #[cfg(target_os = "linux")]
    {
        Ok(Box::new(linux::PacketSocketBackend::open()?))
    }

    #[cfg(windows)]
    {
        Ok(Box::new(windows::RawIpBackend::open()?))
    }

    #[cfg(not(any(target_os = "linux", windows)))]
    {
        Err(PlatformError::SocketCreation(
            "raw packet capture is not supported on this platform".to_string(),
        ))
    }
}
