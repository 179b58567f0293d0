use async_trait::async_trait;
use log::{error, info, trace};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Duration;
use tokio_serial::SerialPortBuilderExt;
pub use tokio_serial::{DataBits, FlowControl, Parity, SerialPort, SerialStream, StopBits};

use super::{ControlSignals, Transport};
use crate::error::{ProtocolError, Result};

/// size of a single read from the port
const READ_BUFFER_SIZE: usize = 1024;

/// serial port settings
#[derive(Clone, Debug)]
pub struct PortSettings {
    pub port_name: String,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub parity: Parity,
    pub flow_control: FlowControl,
    pub timeout: Duration,
}

/// serial port settings implementation
impl PortSettings {
    /// serial port settings initialization
    pub fn new(port_name: impl Into<String>) -> Self {
        PortSettings {
            port_name: port_name.into(),
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            parity: Parity::None,
            flow_control: FlowControl::None,
            timeout: Duration::from_micros(500),
        }
    }

    /// get serial port data bits name
    pub fn databits_name(&self) -> String {
        format!("{}", self.data_bits)
    }
    /// get serial port stop bits name
    pub fn stop_bits_name(&self) -> String {
        format!("{}", self.stop_bits)
    }
    /// get serial port parity name
    pub fn parity_name(&self) -> String {
        format!("{}", self.parity)
    }
}

/// A local serial port driven through `tokio-serial`.
pub struct SerialTransport {
    settings: PortSettings,
    stream: Option<SerialStream>,
    baud_rate: Option<u32>,
    buffer: Box<[u8; READ_BUFFER_SIZE]>,
}

impl SerialTransport {
    pub fn new(settings: PortSettings) -> Self {
        SerialTransport {
            settings,
            stream: None,
            baud_rate: None,
            buffer: Box::new([0; READ_BUFFER_SIZE]),
        }
    }

    /// get port settings
    pub fn settings(&self) -> &PortSettings {
        &self.settings
    }

    fn stream(&mut self) -> Result<&mut SerialStream> {
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(ProtocolError::not_open(&self.settings.port_name)),
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn baud_rate(&self) -> Option<u32> {
        self.baud_rate
    }

    fn supports_break(&self) -> bool {
        true
    }

    async fn open(&mut self, baud_rate: u32) -> Result<()> {
        if self.stream.is_some() {
            return Err(ProtocolError::already_open(&self.settings.port_name));
        }
        let settings = &self.settings;
        match tokio_serial::new(&settings.port_name, baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .flow_control(settings.flow_control)
            .timeout(settings.timeout)
            .open_native_async()
        {
            Ok(stream) => {
                info!(
                    "opened {} at {} baud, {} data bits, parity {}, {} stop bits",
                    settings.port_name,
                    baud_rate,
                    settings.databits_name(),
                    settings.parity_name(),
                    settings.stop_bits_name()
                );
                self.stream = Some(stream);
                self.baud_rate = Some(baud_rate);
                Ok(())
            }
            Err(e) => {
                error!("failed to open {}: {}", settings.port_name, e);
                Err(e.into())
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                self.baud_rate = None;
                info!("closed {}", self.settings.port_name);
                Ok(())
            }
            None => Err(ProtocolError::not_open(&self.settings.port_name)),
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream()?;
        stream.write_all(data).await?;
        stream.flush().await?;
        trace!("tx {}", hex::encode(data));
        Ok(())
    }

    async fn set(&mut self, signals: ControlSignals) -> Result<()> {
        let stream = self.stream()?;
        if let Some(dtr) = signals.dtr {
            stream.write_data_terminal_ready(dtr)?;
        }
        if let Some(rts) = signals.rts {
            stream.write_request_to_send(rts)?;
        }
        Ok(())
    }

    async fn set_break(&mut self) -> Result<()> {
        self.stream()?.set_break()?;
        Ok(())
    }

    async fn clear_break(&mut self) -> Result<()> {
        self.stream()?.clear_break()?;
        Ok(())
    }

    async fn update(&mut self, baud_rate: u32) -> Result<()> {
        self.stream()?.set_baud_rate(baud_rate)?;
        self.baud_rate = Some(baud_rate);
        Ok(())
    }

    async fn read(&mut self) -> Result<Vec<u8>> {
        let port_name = self.settings.port_name.clone();
        let Some(stream) = self.stream.as_mut() else {
            return Err(ProtocolError::not_open(port_name));
        };
        let n = stream.read(&mut self.buffer[..]).await?;
        if n == 0 {
            // the driver reports a vanished device as end of stream
            self.stream = None;
            self.baud_rate = None;
            info!("{} closed by the device", port_name);
            return Err(ProtocolError::not_open(port_name));
        }
        trace!("rx {}", hex::encode(&self.buffer[..n]));
        Ok(self.buffer[..n].to_vec())
    }
}
