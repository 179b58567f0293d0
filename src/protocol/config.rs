//! Protocol configuration and named presets.

use tokio::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default runtime baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 9600;
/// Baud rate some targets expect while the break is asserted.
pub const HANDSHAKE_BAUD_RATE: u32 = 200;
/// Time DTR is held low for the reset edge.
pub const DTR_PULSE: Duration = Duration::from_millis(2);
/// Time the break needs to propagate before it is cleared.
pub const BREAK_SETTLE: Duration = Duration::from_millis(100);
/// Default bound on bytes awaiting their echo.
pub const ECHO_CAPACITY: usize = 256;

/// Common baud rates offered by the command line.
pub const COMMON_BAUD_RATES: &[u32] = &[
    2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// How the break condition is asserted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BreakStrategy {
    /// The transport's break primitive when it has one, a zero byte otherwise.
    #[default]
    Auto,
    /// Always the transport's break primitive.
    Primitive,
    /// Always a single 0x00 byte written at the open baud rate.
    ZeroByte,
}

/// Everything the protocol layer needs to know about a target.
#[derive(Clone, Debug)]
pub struct ProtocolConfig {
    /// Port path, kept for logs and error messages.
    pub path: String,
    /// Runtime baud rate, restored after the break when a handshake baud is used.
    pub baud_rate: u32,
    /// Baud rate to open at while entering programming mode.
    pub handshake_baud: Option<u32>,
    pub break_strategy: BreakStrategy,
    pub dtr_pulse: Duration,
    pub break_settle: Duration,
    /// Whether reflected bytes are displayed.
    pub echo: bool,
    pub echo_capacity: usize,
}

impl ProtocolConfig {
    /// Open at the runtime baud, break chosen from the transport's capabilities.
    pub fn new(path: impl Into<String>) -> Self {
        ProtocolConfig {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            handshake_baud: None,
            break_strategy: BreakStrategy::Auto,
            dtr_pulse: DTR_PULSE,
            break_settle: BREAK_SETTLE,
            echo: true,
            echo_capacity: ECHO_CAPACITY,
        }
    }

    /// Open at 200 baud, break with a zero byte, then switch to `baud_rate`.
    pub fn handshake(path: impl Into<String>) -> Self {
        ProtocolConfig {
            handshake_baud: Some(HANDSHAKE_BAUD_RATE),
            break_strategy: BreakStrategy::ZeroByte,
            ..Self::new(path)
        }
    }

    /// Open at `baud_rate` and use the transport's break primitive.
    pub fn native_break(path: impl Into<String>) -> Self {
        ProtocolConfig {
            break_strategy: BreakStrategy::Primitive,
            ..Self::new(path)
        }
    }

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Baud rate the transport is opened at.
    pub fn open_baud(&self) -> u32 {
        self.handshake_baud.unwrap_or(self.baud_rate)
    }

    pub fn validate(&self) -> Result<()> {
        if self.path.is_empty() {
            return Err(ProtocolError::invalid_config("empty port path"));
        }
        if self.baud_rate == 0 || self.handshake_baud == Some(0) {
            return Err(ProtocolError::invalid_config("baud rate must be non-zero"));
        }
        if self.echo_capacity == 0 {
            return Err(ProtocolError::invalid_config("echo capacity must be non-zero"));
        }
        Ok(())
    }
}

/// Options for entering programming mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnterOptions {
    /// Runtime baud for this entry, instead of the configured one.
    pub baud_rate: Option<u32>,
}

/// Options for leaving programming mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExitOptions {
    /// Leave the transport open after the signoff.
    pub keep_open: bool,
    /// Leave it open and route inbound data to the terminal decoder.
    pub listen: bool,
}

impl ExitOptions {
    pub fn listen() -> Self {
        ExitOptions {
            keep_open: true,
            listen: true,
        }
    }
}
