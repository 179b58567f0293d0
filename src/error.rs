//! # Error Module
//!
//! This module provides the error type shared by the transport backends and
//! the protocol layer. It uses the `thiserror` crate for ergonomic error
//! handling.

use thiserror::Error;

/// Result type alias for `serial_boot` operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Main error type for the `serial_boot` crate.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The transport was asked to open while already open.
    #[error("Transport '{0}' is already open")]
    TransportAlreadyOpen(String),

    /// The transport was used while closed.
    #[error("Transport '{0}' is not open")]
    TransportNotOpen(String),

    /// More bytes arrived than a command/response exchange allows.
    #[error("Response overflow: received {observed} bytes, expected {expected}")]
    ResponseOverflow { observed: usize, expected: usize },

    /// The transport has no implementation of the requested primitive.
    #[error("Transport does not support {0}")]
    Unsupported(&'static str),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serial port driver error.
    #[error("Serial port error: {0}")]
    SerialPort(#[from] tokio_serial::Error),

    /// I/O error on the underlying stream.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Creates a new not-open error.
    #[must_use]
    pub fn not_open(path: impl Into<String>) -> Self {
        Self::TransportNotOpen(path.into())
    }

    /// Creates a new already-open error.
    #[must_use]
    pub fn already_open(path: impl Into<String>) -> Self {
        Self::TransportAlreadyOpen(path.into())
    }

    /// Creates a new configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error reports a transport that is not open.
    ///
    /// Close paths treat this as success, because some drivers report closing
    /// an already-closed connection as an error.
    #[must_use]
    pub fn is_not_open(&self) -> bool {
        match self {
            Self::TransportNotOpen(_) => true,
            Self::SerialPort(e) => e.kind() == tokio_serial::ErrorKind::NoDevice,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotConnected,
            _ => false,
        }
    }
}
