use std::io::Write;

use clap::Parser;
use log::{debug, error, info};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use serial_boot::prelude::*;
use serial_boot::protocol::callback::with_callback;
use serial_boot::protocol::config::COMMON_BAUD_RATES;

/// Entry sequence preset
#[derive(clap::ValueEnum, Debug, Copy, Clone, Eq, PartialEq, Default)]
enum Preset {
    /// open at 200 baud, break with a zero byte, then switch baud
    #[default]
    Handshake,
    /// open at the runtime baud and use the port's break primitive
    NativeBreak,
}

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Serial device the target is attached to
    #[arg(short, long, env = "SERIAL_BOOT_DEVICE")]
    device: String,

    /// Runtime baud rate
    #[arg(short, long, default_value_t = 9600)]
    baud: u32,

    /// Entry sequence preset
    #[arg(short, long, value_enum, default_value_t)]
    preset: Preset,

    /// Hide bytes the target reflects back
    #[arg(long)]
    no_echo: bool,

    /// Reset into programming mode and sign off before listening
    #[arg(long)]
    program: bool,

    /// Increase message verbosity
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

fn log_level(verbose: u8) -> log::LevelFilter {
    match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

/// Draw terminal events on stdout.
fn render(out: &mut impl Write, events: &[Event]) -> std::io::Result<()> {
    for event in events {
        match event {
            Event::Text(text) => write!(out, "{text}")?,
            Event::Linefeed => writeln!(out)?,
            Event::Tab => write!(out, "\t")?,
            Event::Backspace | Event::CursorLeft => write!(out, "\x08")?,
            Event::SpeakerBeep => write!(out, "\x07")?,
            Event::ClearScreen => write!(out, "\x1b[2J\x1b[H")?,
            Event::CursorHome => write!(out, "\x1b[H")?,
            Event::CursorRight => write!(out, "\x1b[C")?,
            Event::CursorUp => write!(out, "\x1b[A")?,
            Event::CursorDown => write!(out, "\x1b[B")?,
            Event::ClearEol => write!(out, "\x1b[K")?,
            Event::ClearBelow => write!(out, "\x1b[J")?,
            Event::CursorPosition { x, y } => {
                write!(out, "\x1b[{};{}H", *y as u16 + 1, *x as u16 + 1)?
            }
            Event::CursorPositionX(x) => write!(out, "\x1b[{}G", *x as u16 + 1)?,
            Event::CursorPositionY(y) => write!(out, "\x1b[{}d", *y as u16 + 1)?,
        }
    }
    out.flush()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(log_level(args.verbose))
        .parse_default_env()
        .init();

    if !COMMON_BAUD_RATES.contains(&args.baud) {
        log::warn!("{} is not a common baud rate", args.baud);
    }

    let config = match args.preset {
        Preset::Handshake => ProtocolConfig::handshake(&args.device),
        Preset::NativeBreak => ProtocolConfig::native_break(&args.device),
    }
    .with_baud_rate(args.baud)
    .with_echo(!args.no_echo);

    let transport = SerialTransport::new(PortSettings::new(&args.device));
    let mut protocol = Protocol::new(transport, config)?;

    let mut transmit = protocol.subscribe_transmit();
    tokio::spawn(async move {
        loop {
            match transmit.recv().await {
                Ok(events) => {
                    for event in events {
                        debug!("tx {event}");
                    }
                }
                Err(RecvError::Lagged(n)) => debug!("transmit log skipped {n} batches"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if args.program {
        with_callback(protocol.enter_programming(EnterOptions::default()), |result| {
            if let Err(e) = result {
                error!("reset into programming mode failed: {e}");
            }
        })
        .await?;
        protocol.exit_programming(ExitOptions::listen()).await?;
    } else {
        protocol.open().await?;
    }
    info!("listening on {}, end input to quit", args.device);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        let mut bytes = line.into_bytes();
                        bytes.push(b'\r');
                        protocol.write(&bytes).await?;
                    }
                    None => break,
                }
            }
            events = protocol.pump() => {
                render(&mut stdout, &events?)?;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    protocol.close().await
}
