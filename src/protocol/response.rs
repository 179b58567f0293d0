//! Single-byte command/response exchanges.
//!
//! The target echoes every command byte and then sends one reply byte, so a
//! command of length N is answered by exactly N + 1 bytes.

use log::{trace, warn};

use crate::error::{ProtocolError, Result};
use crate::serial::Transport;

/// State of one in-flight exchange.
#[derive(Debug)]
pub struct PendingResponse {
    command_len: usize,
    buffer: Vec<u8>,
}

impl PendingResponse {
    pub fn new(command_len: usize) -> Self {
        PendingResponse {
            command_len,
            buffer: Vec::with_capacity(command_len + 1),
        }
    }

    /// Total number of bytes that completes the exchange.
    pub fn expected(&self) -> usize {
        self.command_len + 1
    }

    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Accumulate a chunk. Returns the reply byte once exactly
    /// [`expected`](Self::expected) bytes have arrived.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<u8>> {
        self.buffer.extend_from_slice(chunk);
        let expected = self.expected();
        if self.buffer.len() > expected {
            return Err(ProtocolError::ResponseOverflow {
                observed: self.buffer.len(),
                expected,
            });
        }
        if self.buffer.len() == expected {
            return Ok(Some(self.buffer[self.command_len]));
        }
        Ok(None)
    }
}

/// Runs exchanges one at a time over a transport's inbound stream.
#[derive(Debug, Default)]
pub struct ResponseChannel {
    pending: Option<PendingResponse>,
}

impl ResponseChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Write `command` and wait for its reply byte.
    ///
    /// Waits as long as the target stays silent; callers wanting a deadline
    /// wrap this in `tokio::time::timeout`.
    pub async fn send<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        command: &[u8],
    ) -> Result<u8> {
        if let Some(stale) = self.pending.take() {
            warn!(
                "discarding abandoned exchange ({} of {} bytes)",
                stale.received(),
                stale.expected()
            );
        }
        let pending = self.pending.insert(PendingResponse::new(command.len()));
        let result = exchange(transport, pending, command).await;
        self.pending = None;
        result
    }
}

async fn exchange<T: Transport + ?Sized>(
    transport: &mut T,
    pending: &mut PendingResponse,
    command: &[u8],
) -> Result<u8> {
    transport.write(command).await?;
    loop {
        let chunk = transport.read().await?;
        if let Some(reply) = pending.push(&chunk)? {
            trace!("reply {reply:#04x} to {}", hex::encode(command));
            return Ok(reply);
        }
    }
}
