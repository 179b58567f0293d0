//! # Serial Boot
//!
//! Drives a microcontroller over a serial link: puts it into its bootloader
//! with a break/DTR sequence, exchanges single-byte commands with it, and
//! decodes its console output into terminal events.
//!
//! ## Architecture
//!
//! The project is organized into the following modules:
//!
//! - [`serial`]: The [`serial::Transport`] seam and the `tokio-serial` backend
//! - [`protocol`]: Programming-mode choreography, command/response exchange
//!   and the [`protocol::Protocol`] facade
//! - [`stream`]: Terminal and transmit stream decoders
//! - [`error`]: Custom error types for the crate

pub mod error;
pub mod protocol;
pub mod serial;
pub mod stream;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::error::*;
    pub use crate::protocol::{EnterOptions, ExitOptions, Protocol, ProtocolConfig, Route};
    pub use crate::serial::{PortSettings, SerialTransport, Transport};
    pub use crate::stream::Event;
}
