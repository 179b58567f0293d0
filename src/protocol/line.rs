//! Control line choreography for entering and leaving programming mode.
//!
//! Every step awaits the previous one. A failing step aborts the rest and
//! its error is returned unchanged; nothing is rolled back.

use log::{debug, info};
use tokio::time::{Duration, sleep};

use super::config::{BreakStrategy, ProtocolConfig};
use crate::error::Result;
use crate::serial::{ControlSignals, Transport};

/// Byte that tells the target firmware to leave programming mode.
pub const SIGNOFF: u8 = 0x00;
/// Byte written to stand in for a break on transports without the primitive.
pub const BREAK_BYTE: u8 = 0x00;

/// How the break is asserted and released for one sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Break {
    Primitive,
    ZeroByte,
}

/// Drives the break, DTR and baud steps.
#[derive(Clone, Debug)]
pub struct LineControl {
    open_baud: u32,
    runtime_baud: u32,
    handshake: bool,
    strategy: BreakStrategy,
    dtr_pulse: Duration,
    break_settle: Duration,
}

impl LineControl {
    pub fn new(config: &ProtocolConfig) -> Self {
        LineControl {
            open_baud: config.open_baud(),
            runtime_baud: config.baud_rate,
            handshake: config.handshake_baud.is_some(),
            strategy: config.break_strategy,
            dtr_pulse: config.dtr_pulse,
            break_settle: config.break_settle,
        }
    }

    /// Use `baud_rate` as the runtime baud instead of the configured one.
    pub fn with_runtime_baud(mut self, baud_rate: u32) -> Self {
        if !self.handshake {
            self.open_baud = baud_rate;
        }
        self.runtime_baud = baud_rate;
        self
    }

    pub fn open_baud(&self) -> u32 {
        self.open_baud
    }

    pub fn runtime_baud(&self) -> u32 {
        self.runtime_baud
    }

    fn break_mode<T: Transport + ?Sized>(&self, transport: &T) -> Break {
        match self.strategy {
            BreakStrategy::Primitive => Break::Primitive,
            BreakStrategy::ZeroByte => Break::ZeroByte,
            BreakStrategy::Auto if transport.supports_break() => Break::Primitive,
            BreakStrategy::Auto => Break::ZeroByte,
        }
    }

    /// Open the transport at the open baud and reset the target into
    /// programming mode.
    ///
    /// A transport already open at another baud is closed first.
    pub async fn enter<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        if transport.is_open() && transport.baud_rate() != Some(self.open_baud) {
            debug!(
                "closing transport open at {:?} baud before entry",
                transport.baud_rate()
            );
            transport.close().await?;
        }
        if !transport.is_open() {
            transport.open(self.open_baud).await?;
        }
        self.reset(transport).await?;
        info!("entered programming mode at {} baud", self.runtime_baud);
        Ok(())
    }

    /// Assert break, pulse DTR, wait for the break to settle, then release
    /// it and restore the runtime baud.
    pub async fn reset<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        let mode = self.break_mode(transport);

        debug!("break assert ({mode:?})");
        match mode {
            Break::Primitive => transport.set_break().await?,
            Break::ZeroByte => transport.write(&[BREAK_BYTE]).await?,
        }

        debug!("dtr pulse");
        transport.set(ControlSignals::dtr(false)).await?;
        sleep(self.dtr_pulse).await;
        transport.set(ControlSignals::dtr(true)).await?;

        sleep(self.break_settle).await;

        if mode == Break::Primitive {
            debug!("break clear");
            transport.clear_break().await?;
        }
        if transport.baud_rate() != Some(self.runtime_baud) {
            debug!("baud restore to {}", self.runtime_baud);
            transport.update(self.runtime_baud).await?;
        }
        Ok(())
    }

    /// Write the signoff byte.
    pub async fn signoff<T: Transport + ?Sized>(&self, transport: &mut T) -> Result<()> {
        transport.write(&[SIGNOFF]).await
    }
}
