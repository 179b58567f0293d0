//! # Protocol Module
//!
//! [`Protocol`] ties one [`Transport`] to the pieces that drive it:
//!
//! - [`line::LineControl`] enters and leaves programming mode.
//! - [`response::ResponseChannel`] runs command/response exchanges.
//! - [`TerminalDecoder`] and [`TransmitDecoder`] turn bytes into events,
//!   published on broadcast channels.
//!
//! The transport's inbound stream has one consumer at a time. [`Route`]
//! records which one; [`Protocol::send`] takes the stream for the length of
//! an exchange and hands it back afterwards.

pub mod callback;
pub mod config;
pub mod echo;
pub mod line;
pub mod response;

use log::{debug, info, trace, warn};
use tokio::sync::broadcast;

pub use config::{BreakStrategy, EnterOptions, ExitOptions, ProtocolConfig};
pub use line::LineControl;
pub use response::{PendingResponse, ResponseChannel};

use crate::error::Result;
use crate::serial::Transport;
use crate::stream::{Event, TerminalDecoder, TransmitDecoder};
use echo::EchoFilter;

/// Capacity of the event broadcast channels.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Who consumes the transport's inbound data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    /// Nobody; inbound chunks are dropped.
    Idle,
    /// A [`Protocol::send`] exchange.
    Response,
    /// The terminal decoder.
    Terminal,
}

/// A target reachable over one transport.
pub struct Protocol<T: Transport> {
    transport: T,
    config: ProtocolConfig,
    line: LineControl,
    channel: ResponseChannel,
    terminal: TerminalDecoder,
    transmit: TransmitDecoder,
    echo: EchoFilter,
    echo_enabled: bool,
    route: Route,
    terminal_tx: broadcast::Sender<Vec<Event>>,
    transmit_tx: broadcast::Sender<Vec<Event>>,
}

impl<T: Transport> Protocol<T> {
    pub fn new(transport: T, config: ProtocolConfig) -> Result<Self> {
        config.validate()?;
        let (terminal_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (transmit_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Protocol {
            transport,
            line: LineControl::new(&config),
            channel: ResponseChannel::new(),
            terminal: TerminalDecoder::new(),
            transmit: TransmitDecoder::new(),
            echo: EchoFilter::new(config.echo_capacity),
            echo_enabled: config.echo,
            route: Route::Idle,
            config,
            terminal_tx,
            transmit_tx,
        })
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_open()
    }

    pub fn route(&self) -> Route {
        self.route
    }

    pub fn echo(&self) -> bool {
        self.echo_enabled
    }

    /// Events decoded from inbound data.
    pub fn subscribe_terminal(&self) -> broadcast::Receiver<Vec<Event>> {
        self.terminal_tx.subscribe()
    }

    /// Events decoded from bytes passed to [`Protocol::write`].
    pub fn subscribe_transmit(&self) -> broadcast::Receiver<Vec<Event>> {
        self.transmit_tx.subscribe()
    }

    fn set_route(&mut self, route: Route) {
        if self.route != route {
            debug!("route {:?} -> {:?}", self.route, route);
            self.route = route;
        }
    }

    /// Display reflected bytes (`true`) or hide our own bytes when the
    /// target reflects them (`false`).
    pub fn set_echo(&mut self, echo: bool) {
        if !echo {
            self.echo.clear();
        }
        self.echo_enabled = echo;
    }

    /// Open the transport and start listening as a terminal.
    pub async fn open(&mut self) -> Result<()> {
        self.transport.open(self.config.baud_rate).await?;
        self.terminal = TerminalDecoder::new();
        self.echo.clear();
        self.set_route(Route::Terminal);
        info!("{} open", self.config.path);
        Ok(())
    }

    /// Sign off and close. Closing a transport that is not open succeeds.
    ///
    /// The transport is closed even when the signoff fails; the signoff
    /// error is reported first.
    pub async fn close(&mut self) -> Result<()> {
        self.set_route(Route::Idle);
        let signoff = if self.transport.is_open() {
            self.line.signoff(&mut self.transport).await
        } else {
            Ok(())
        };
        let closed = self.close_transport().await;
        if let Err(e) = &signoff {
            warn!("{} signoff failed: {}", self.config.path, e);
        }
        signoff.and(closed)
    }

    async fn close_transport(&mut self) -> Result<()> {
        match self.transport.close().await {
            Err(e) if e.is_not_open() => {
                debug!("{} already closed", self.config.path);
                Ok(())
            }
            Err(e) => Err(e),
            Ok(()) => {
                info!("{} closed", self.config.path);
                Ok(())
            }
        }
    }

    /// Open the transport if needed and reset the target into programming
    /// mode. Inbound data is not routed anywhere until the next exchange.
    pub async fn enter_programming(&mut self, options: EnterOptions) -> Result<()> {
        self.set_route(Route::Idle);
        let line = match options.baud_rate {
            Some(baud_rate) => self.line.clone().with_runtime_baud(baud_rate),
            None => self.line.clone(),
        };
        line.enter(&mut self.transport).await
    }

    /// Sign off, then close, stay open, or stay open listening.
    pub async fn exit_programming(&mut self, options: ExitOptions) -> Result<()> {
        self.line.signoff(&mut self.transport).await?;
        info!("left programming mode");
        if options.listen {
            self.terminal = TerminalDecoder::new();
            self.set_route(Route::Terminal);
            Ok(())
        } else if options.keep_open {
            self.set_route(Route::Idle);
            Ok(())
        } else {
            self.set_route(Route::Idle);
            self.close_transport().await
        }
    }

    /// Run the break/DTR reset on the open transport.
    pub async fn reset(&mut self) -> Result<()> {
        self.line.reset(&mut self.transport).await
    }

    /// Write the signoff byte.
    pub async fn signoff(&mut self) -> Result<()> {
        self.line.signoff(&mut self.transport).await
    }

    /// Send a command and return the target's one-byte reply.
    ///
    /// Terminal listening is suspended for the exchange and resumed after it.
    pub async fn send(&mut self, command: &[u8]) -> Result<u8> {
        let previous = self.route;
        self.set_route(Route::Response);
        let result = self.channel.send(&mut self.transport, command).await;
        self.set_route(previous);
        result
    }

    /// Write bytes typed locally and publish them as transmit events.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.transport.write(data).await?;
        if !self.echo_enabled {
            self.echo.record(data);
        }
        let events = self.transmit.decode(data);
        if !events.is_empty() {
            let _ = self.transmit_tx.send(events);
        }
        Ok(())
    }

    /// Wait for one inbound chunk and route it.
    ///
    /// Returns the terminal events it produced, which are also published to
    /// terminal subscribers.
    pub async fn pump(&mut self) -> Result<Vec<Event>> {
        let chunk = self.transport.read().await?;
        Ok(self.dispatch(&chunk))
    }

    fn dispatch(&mut self, chunk: &[u8]) -> Vec<Event> {
        match self.route {
            Route::Terminal => {
                let events = if self.echo_enabled {
                    self.terminal.decode(chunk)
                } else {
                    let kept = self.echo.filter(chunk);
                    self.terminal.decode(&kept)
                };
                if !events.is_empty() {
                    let _ = self.terminal_tx.send(events.clone());
                }
                events
            }
            Route::Idle | Route::Response => {
                trace!("dropping {} unrouted bytes", chunk.len());
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use crate::serial::sim::{Call, SimTransport};
    use crate::stream::merge_text;

    fn protocol(sim: SimTransport, config: ProtocolConfig) -> Protocol<SimTransport> {
        Protocol::new(sim, config).unwrap()
    }

    #[tokio::test]
    async fn test_open_routes_to_terminal() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::handshake("sim"));
        proto.open().await.unwrap();
        assert_eq!(proto.route(), Route::Terminal);
        assert_eq!(proto.transport().call_log(), vec![Call::Open(9600)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_after_open_reopens_at_handshake_baud() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::handshake("sim"));
        proto.open().await.unwrap();
        proto.enter_programming(EnterOptions::default()).await.unwrap();
        let calls = proto.transport().call_log();
        assert_eq!(&calls[..3], &[Call::Open(9600), Call::Close, Call::Open(200)]);
        assert_eq!(proto.transport().baud_rate(), Some(9600));
    }

    #[tokio::test]
    async fn test_terminal_events_are_published() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::new("sim"));
        let mut rx = proto.subscribe_terminal();
        proto.open().await.unwrap();
        proto.transport.push_inbound(b"AB\x08CD");
        let events = proto.pump().await.unwrap();
        assert_eq!(
            events,
            vec![
                Event::Text("AB".into()),
                Event::Backspace,
                Event::Text("CD".into()),
            ]
        );
        assert_eq!(rx.recv().await.unwrap(), events);
    }

    #[tokio::test]
    async fn test_echo_disabled_hides_reflected_bytes() {
        let config = ProtocolConfig::new("sim").with_echo(false);
        let mut proto = protocol(SimTransport::new().echoing(), config);
        let mut tx_rx = proto.subscribe_transmit();
        proto.open().await.unwrap();

        proto.write(b"hello\r").await.unwrap();
        assert!(proto.pump().await.unwrap().is_empty());
        assert_eq!(tx_rx.recv().await.unwrap(), vec![Event::Text("hello\n".into())]);

        proto.transport.push_inbound(b"world");
        assert_eq!(proto.pump().await.unwrap(), vec![Event::Text("world".into())]);
    }

    #[tokio::test]
    async fn test_echo_enabled_shows_reflected_bytes() {
        let mut proto = protocol(SimTransport::new().echoing(), ProtocolConfig::new("sim"));
        proto.open().await.unwrap();
        proto.write(b"hello").await.unwrap();
        assert_eq!(proto.pump().await.unwrap(), vec![Event::Text("hello".into())]);
    }

    #[tokio::test]
    async fn test_set_echo_toggles_suppression() {
        let mut proto = protocol(SimTransport::new().echoing(), ProtocolConfig::new("sim"));
        proto.open().await.unwrap();
        proto.set_echo(false);
        assert!(!proto.echo());
        proto.write(b"ab").await.unwrap();
        assert!(proto.pump().await.unwrap().is_empty());

        proto.set_echo(true);
        proto.write(b"cd").await.unwrap();
        assert_eq!(proto.pump().await.unwrap(), vec![Event::Text("cd".into())]);
    }

    #[tokio::test]
    async fn test_echo_split_across_chunks() {
        let config = ProtocolConfig::new("sim").with_echo(false);
        let mut proto = protocol(SimTransport::new(), config);
        proto.open().await.unwrap();
        proto.write(b"go").await.unwrap();
        proto.transport.push_inbound(b"g");
        proto.transport.push_inbound(b"o\r\nready");
        let mut events = proto.pump().await.unwrap();
        events.extend(proto.pump().await.unwrap());
        assert_eq!(
            merge_text(events),
            vec![Event::Linefeed, Event::Text("ready".into())]
        );
    }

    #[tokio::test]
    async fn test_output_ahead_of_echo_is_shown() {
        let config = ProtocolConfig::new("sim").with_echo(false);
        let mut proto = protocol(SimTransport::new(), config);
        proto.open().await.unwrap();
        proto.write(b"hi").await.unwrap();
        proto.transport.push_inbound(b"Xhi!");
        assert_eq!(proto.pump().await.unwrap(), vec![Event::Text("X!".into())]);
    }

    #[tokio::test]
    async fn test_send_takes_stream_and_hands_it_back() {
        let sim = SimTransport::new().responding(|cmd| {
            let mut reply = cmd.to_vec();
            reply.push(0x5A);
            vec![reply]
        });
        let mut proto = protocol(sim, ProtocolConfig::new("sim"));
        let mut rx = proto.subscribe_terminal();
        proto.open().await.unwrap();

        assert_eq!(proto.send(&[0x42, 0x53]).await.unwrap(), 0x5A);
        assert_eq!(proto.route(), Route::Terminal);
        // the exchange bytes never reached the terminal
        assert!(rx.try_recv().is_err());

        proto.transport.push_inbound(b"ok");
        assert_eq!(proto.pump().await.unwrap(), vec![Event::Text("ok".into())]);
    }

    #[tokio::test]
    async fn test_send_failure_restores_route() {
        let sim = SimTransport::new().responding(|cmd| vec![cmd.to_vec(), vec![1, 2]]);
        let mut proto = protocol(sim, ProtocolConfig::new("sim"));
        proto.open().await.unwrap();
        let err = proto.send(&[0x01]).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ResponseOverflow { observed: 3, expected: 2 }));
        assert_eq!(proto.route(), Route::Terminal);
    }

    #[tokio::test(start_paused = true)]
    async fn test_programming_session() {
        let sim = SimTransport::new().responding(|cmd| {
            // only the version query is answered
            if cmd != b"V".as_slice() {
                return Vec::new();
            }
            let mut reply = cmd.to_vec();
            reply.push(0x52);
            vec![reply]
        });
        let mut proto = protocol(sim, ProtocolConfig::handshake("sim"));
        proto.enter_programming(EnterOptions::default()).await.unwrap();
        assert_eq!(proto.route(), Route::Idle);
        assert_eq!(proto.send(b"V").await.unwrap(), 0x52);
        assert_eq!(proto.route(), Route::Idle);
        proto.exit_programming(ExitOptions::default()).await.unwrap();
        assert!(!proto.is_open());

        let calls = proto.transport().call_log();
        assert_eq!(calls.first(), Some(&Call::Open(200)));
        assert!(calls.contains(&Call::Update(9600)));
        assert_eq!(&calls[calls.len() - 2..], &[Call::Write(vec![0x00]), Call::Close]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enter_with_baud_override() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::handshake("sim"));
        proto
            .enter_programming(EnterOptions {
                baud_rate: Some(38400),
            })
            .await
            .unwrap();
        assert_eq!(proto.transport().baud_rate(), Some(38400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_and_listen() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::native_break("sim"));
        proto.enter_programming(EnterOptions::default()).await.unwrap();
        proto.exit_programming(ExitOptions::listen()).await.unwrap();
        assert!(proto.is_open());
        assert_eq!(proto.route(), Route::Terminal);
        proto.transport.push_inbound(b"\x01hi");
        assert_eq!(
            proto.pump().await.unwrap(),
            vec![Event::CursorHome, Event::Text("hi".into())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_exit_keep_open() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::native_break("sim"));
        proto.enter_programming(EnterOptions::default()).await.unwrap();
        proto
            .exit_programming(ExitOptions {
                keep_open: true,
                listen: false,
            })
            .await
            .unwrap();
        assert!(proto.is_open());
        assert_eq!(proto.route(), Route::Idle);
        proto.transport.push_inbound(b"ignored");
        assert!(proto.pump().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_tolerates_not_open() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::new("sim"));
        proto.close().await.unwrap();
        assert!(proto.transport().call_log().is_empty());
    }

    #[tokio::test]
    async fn test_close_signs_off() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::new("sim"));
        proto.open().await.unwrap();
        proto.close().await.unwrap();
        assert_eq!(
            proto.transport().call_log(),
            vec![Call::Open(9600), Call::Write(vec![0x00]), Call::Close]
        );
        assert_eq!(proto.route(), Route::Idle);
    }

    #[tokio::test]
    async fn test_close_after_failed_signoff_still_closes() {
        let mut proto = protocol(
            SimTransport::opened(9600).failing_on("write"),
            ProtocolConfig::new("sim"),
        );
        assert!(matches!(proto.close().await, Err(ProtocolError::Io(_))));
        assert!(!proto.is_open());
        assert_eq!(proto.route(), Route::Idle);
        let sim = proto.into_transport();
        assert_eq!(sim.call_log(), vec![Call::Close]);
    }

    #[tokio::test]
    async fn test_open_twice_fails() {
        let mut proto = protocol(SimTransport::new(), ProtocolConfig::new("sim"));
        proto.open().await.unwrap();
        assert!(matches!(
            proto.open().await,
            Err(ProtocolError::TransportAlreadyOpen(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_failure_propagates() {
        let mut proto = protocol(
            SimTransport::opened(9600).failing_on("dtr"),
            ProtocolConfig::native_break("sim"),
        );
        assert!(matches!(proto.reset().await, Err(ProtocolError::Io(_))));
        assert_eq!(proto.transport().call_log(), vec![Call::SetBreak]);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(matches!(
            Protocol::new(SimTransport::new(), ProtocolConfig::new("")),
            Err(ProtocolError::InvalidConfig(_))
        ));
    }
}
