//! Platform-specific errors

use std::fmt;
use thiserror::Error;

/// Platform and session errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// The capture socket could not be opened
    #[error("Cannot create capture socket: {0}")]
    SocketCreation(String),

    /// Interface name or index does not resolve to a usable interface
    #[error("Cannot resolve interface '{interface}': {message}")]
    InterfaceNotFound {
        /// Interface as given by the caller
        interface: String,
        /// OS error text
        message: String,
    },

    /// Binding the socket to the interface failed
    #[error("Cannot bind socket: {0}")]
    Bind(String),

    /// Raising or clearing promiscuous mode failed
    #[error("Cannot change promiscuous mode: {0}")]
    PromiscMode(String),

    /// Unrecoverable wait or receive failure
    #[error("Capture error: {0}")]
    Runtime(String),

    /// Operation invoked outside its lifecycle state
    #[error("Invalid session state: {0}")]
    State(#[from] StateError),

    /// Filter or configuration error from the core crate
    #[error(transparent)]
    Core(#[from] nsniff_core::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform result type
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Lifecycle violations
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateError {
    /// Session is not running
    #[error("this sniffer is not started")]
    NotRunning,

    /// Session was already started
    #[error("this sniffer was already started")]
    AlreadyStarted,

    /// Session was stopped and cannot be restarted
    #[error("this sniffer was stopped")]
    Stopped,

    /// Session resources were released
    #[error("this sniffer was cleared")]
    Cleared,

    /// No packet handler registered
    #[error("no packet handler registered")]
    NoHandler,
}

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad filter, address syntax, capacity or configuration
    Configuration,
    /// Socket create/bind/ioctl failure
    Socket,
    /// Unrecoverable receive failure
    Runtime,
    /// Lifecycle violation
    State,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Socket => "socket",
            ErrorKind::Runtime => "runtime",
            ErrorKind::State => "state",
        })
    }
}

impl PlatformError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SocketCreation(_)
            | Self::InterfaceNotFound { .. }
            | Self::Bind(_)
            | Self::PromiscMode(_) => ErrorKind::Socket,
            Self::Runtime(_) | Self::Io(_) => ErrorKind::Runtime,
            Self::State(_) => ErrorKind::State,
            Self::Core(e) if e.is_configuration() => ErrorKind::Configuration,
            Self::Core(_) => ErrorKind::Runtime,
        }
    }

    pub(crate) fn interface_not_found(interface: &str, message: impl fmt::Display) -> Self {
        Self::InterfaceNotFound {
            interface: interface.to_string(),
            message: message.to_string(),
        }
    }
}
