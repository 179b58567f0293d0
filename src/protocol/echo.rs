//! Bookkeeping for bytes we wrote that the target may reflect back.

use std::collections::VecDeque;

use log::{trace, warn};

/// Bounded queue of self-written bytes awaiting their echo.
///
/// Inbound bytes matching the head of the queue are dropped. A byte that
/// does not match is target output arriving ahead of the echo: it is kept
/// and the queue waits for the next byte. Bytes that never come back stay
/// queued until capacity pushes them out or the queue is cleared.
#[derive(Debug)]
pub struct EchoFilter {
    pending: VecDeque<u8>,
    capacity: usize,
}

impl EchoFilter {
    pub fn new(capacity: usize) -> Self {
        EchoFilter {
            pending: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of bytes still expected back.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Remember bytes just written. The oldest are dropped past capacity.
    pub fn record(&mut self, written: &[u8]) {
        self.pending.extend(written);
        let overflow = self.pending.len().saturating_sub(self.capacity);
        if overflow > 0 {
            warn!("echo queue full, forgetting {overflow} bytes");
            self.pending.drain(..overflow);
        }
    }

    /// Strip the reflected bytes from an inbound chunk.
    pub fn filter(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut kept = Vec::with_capacity(chunk.len());
        for &byte in chunk {
            match self.pending.front() {
                Some(&expected) if expected == byte => {
                    self.pending.pop_front();
                }
                Some(_) => {
                    trace!("echo mismatch on {byte:#04x}, {} bytes pending", self.pending.len());
                    kept.push(byte);
                }
                None => kept.push(byte),
            }
        }
        kept
    }
}
