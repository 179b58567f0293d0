//! # Serial Module
//!
//! The transport seam between the protocol layer and a concrete serial link.
//!
//! Every backend (a local port, a proxied device, a test double) implements
//! [`Transport`]. The protocol layer only ever talks to this trait.

pub mod port;

#[cfg(test)]
pub(crate) mod sim;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::error::Result;

pub use port::{PortSettings, SerialTransport};

/// Control line levels for [`Transport::set`]. `None` leaves a line untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ControlSignals {
    pub dtr: Option<bool>,
    pub rts: Option<bool>,
}

impl ControlSignals {
    /// Only drive DTR.
    pub fn dtr(level: bool) -> Self {
        ControlSignals {
            dtr: Some(level),
            rts: None,
        }
    }
}

/// An open-able serial connection.
///
/// Inbound data is pulled with [`Transport::read`]; only one consumer may
/// drive it at a time, which `&mut self` enforces.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Transport: Send {
    /// Whether the connection is currently open.
    fn is_open(&self) -> bool;

    /// Baud rate of the open connection.
    fn baud_rate(&self) -> Option<u32>;

    /// Whether [`Transport::set_break`] and [`Transport::clear_break`] are
    /// real primitives on this backend.
    fn supports_break(&self) -> bool;

    /// Open the connection at `baud_rate`.
    async fn open(&mut self, baud_rate: u32) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;

    /// Write all of `data`.
    async fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Drive the modem control lines.
    async fn set(&mut self, signals: ControlSignals) -> Result<()>;

    /// Hold the transmit line low.
    async fn set_break(&mut self) -> Result<()>;

    /// Release the transmit line.
    async fn clear_break(&mut self) -> Result<()>;

    /// Change the baud rate of the open connection.
    async fn update(&mut self, baud_rate: u32) -> Result<()>;

    /// Wait for the next inbound chunk. Never returns an empty chunk.
    async fn read(&mut self) -> Result<Vec<u8>>;
}
