//! Simulated target device for tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{ControlSignals, Transport};
use crate::error::{ProtocolError, Result};

/// One recorded transport call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Open(u32),
    Close,
    Write(Vec<u8>),
    Dtr(bool),
    SetBreak,
    ClearBreak,
    Update(u32),
}

type Responder = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>> + Send>;

pub(crate) struct SimTransport {
    open: bool,
    baud_rate: Option<u32>,
    break_primitive: bool,
    echo: bool,
    inbound: VecDeque<Vec<u8>>,
    responder: Option<Responder>,
    fail_on: Option<&'static str>,
    pub(crate) calls: Vec<(Call, Instant)>,
}

impl SimTransport {
    pub(crate) fn new() -> Self {
        SimTransport {
            open: false,
            baud_rate: None,
            break_primitive: true,
            echo: false,
            inbound: VecDeque::new(),
            responder: None,
            fail_on: None,
            calls: Vec::new(),
        }
    }

    /// Start out already open at `baud_rate`.
    pub(crate) fn opened(baud_rate: u32) -> Self {
        let mut sim = Self::new();
        sim.open = true;
        sim.baud_rate = Some(baud_rate);
        sim
    }

    pub(crate) fn without_break(mut self) -> Self {
        self.break_primitive = false;
        self
    }

    /// Reflect every written chunk back as an inbound chunk.
    pub(crate) fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Fail the named operation with an I/O error.
    pub(crate) fn failing_on(mut self, op: &'static str) -> Self {
        self.fail_on = Some(op);
        self
    }

    /// Compute inbound chunks for every write.
    pub(crate) fn responding(
        mut self,
        responder: impl FnMut(&[u8]) -> Vec<Vec<u8>> + Send + 'static,
    ) -> Self {
        self.responder = Some(Box::new(responder));
        self
    }

    pub(crate) fn push_inbound(&mut self, chunk: &[u8]) {
        self.inbound.push_back(chunk.to_vec());
    }

    /// Calls without timestamps.
    pub(crate) fn call_log(&self) -> Vec<Call> {
        self.calls.iter().map(|(call, _)| call.clone()).collect()
    }

    /// Instant of the first call matching `call`.
    pub(crate) fn time_of(&self, call: &Call) -> Option<Instant> {
        self.calls
            .iter()
            .find(|(c, _)| c == call)
            .map(|(_, at)| *at)
    }

    fn record(&mut self, op: &'static str, call: Call) -> Result<()> {
        if self.fail_on == Some(op) {
            return Err(std::io::Error::other(format!("{op} failed")).into());
        }
        if !self.open && !matches!(call, Call::Open(_) | Call::Close) {
            return Err(ProtocolError::not_open("sim"));
        }
        self.calls.push((call, Instant::now()));
        Ok(())
    }
}

#[async_trait]
impl Transport for SimTransport {
    fn is_open(&self) -> bool {
        self.open
    }

    fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    fn supports_break(&self) -> bool {
        self.break_primitive
    }

    async fn open(&mut self, baud_rate: u32) -> Result<()> {
        if self.open {
            return Err(ProtocolError::already_open("sim"));
        }
        self.record("open", Call::Open(baud_rate))?;
        self.open = true;
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.open {
            return Err(ProtocolError::not_open("sim"));
        }
        self.record("close", Call::Close)?;
        self.open = false;
        self.baud_rate = None;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.record("write", Call::Write(data.to_vec()))?;
        if self.echo {
            self.inbound.push_back(data.to_vec());
        }
        if let Some(responder) = self.responder.as_mut() {
            let replies = responder(data);
            self.inbound.extend(replies.into_iter().filter(|c| !c.is_empty()));
        }
        Ok(())
    }

    async fn set(&mut self, signals: ControlSignals) -> Result<()> {
        if let Some(dtr) = signals.dtr {
            self.record("dtr", Call::Dtr(dtr))?;
        }
        Ok(())
    }

    async fn set_break(&mut self) -> Result<()> {
        if !self.break_primitive {
            return Err(ProtocolError::Unsupported("break"));
        }
        self.record("set_break", Call::SetBreak)
    }

    async fn clear_break(&mut self) -> Result<()> {
        if !self.break_primitive {
            return Err(ProtocolError::Unsupported("break"));
        }
        self.record("clear_break", Call::ClearBreak)
    }

    async fn update(&mut self, baud_rate: u32) -> Result<()> {
        self.record("update", Call::Update(baud_rate))?;
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        if !self.open {
            return Err(ProtocolError::not_open("sim"));
        }
        match self.inbound.pop_front() {
            Some(chunk) => Ok(chunk),
            // a silent device never answers
            None => std::future::pending().await,
        }
    }
}
