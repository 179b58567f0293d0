//! # Stream Module
//!
//! Stateful decoders that turn raw serial bytes into display events.
//!
//! - [`TerminalDecoder`]: bytes received from the target, including its
//!   console control codes.
//! - [`TransmitDecoder`]: bytes typed locally and sent to the target.
//!
//! Both decoders keep state across calls, so a control sequence or a CR/LF
//! pair split over two chunks decodes the same as if it arrived whole.

pub mod terminal;
pub mod transmit;

use std::fmt;

pub use terminal::TerminalDecoder;
pub use transmit::TransmitDecoder;

/// A decoded stream event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A run of printable characters. Never empty.
    Text(String),
    ClearScreen,
    CursorHome,
    /// Absolute cursor position, column then row.
    CursorPosition { x: u8, y: u8 },
    CursorLeft,
    CursorRight,
    CursorUp,
    CursorDown,
    SpeakerBeep,
    Backspace,
    Tab,
    Linefeed,
    ClearEol,
    ClearBelow,
    CursorPositionX(u8),
    CursorPositionY(u8),
}

impl Event {
    /// Event name as shown in logs and consoles.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Text(_) => "text",
            Event::ClearScreen => "clear-screen",
            Event::CursorHome => "cursor-home",
            Event::CursorPosition { .. } => "cursor-position",
            Event::CursorLeft => "cursor-left",
            Event::CursorRight => "cursor-right",
            Event::CursorUp => "cursor-up",
            Event::CursorDown => "cursor-down",
            Event::SpeakerBeep => "speaker-beep",
            Event::Backspace => "backspace",
            Event::Tab => "tab",
            Event::Linefeed => "linefeed",
            Event::ClearEol => "clear-eol",
            Event::ClearBelow => "clear-below",
            Event::CursorPositionX(_) => "cursor-position-x",
            Event::CursorPositionY(_) => "cursor-position-y",
        }
    }

    /// Numeric arguments carried by a control event.
    pub fn args(&self) -> Vec<u8> {
        match *self {
            Event::CursorPosition { x, y } => vec![x, y],
            Event::CursorPositionX(x) => vec![x],
            Event::CursorPositionY(y) => vec![y],
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Text(text) => write!(f, "text({text:?})"),
            event if event.args().is_empty() => write!(f, "{}", event.name()),
            event => write!(f, "{}{:?}", event.name(), event.args()),
        }
    }
}

/// Join adjacent text events.
///
/// Decoders flush text at the end of every chunk, so the same bytes split
/// differently produce differently split text runs. Merged sequences are
/// identical regardless of chunking.
pub fn merge_text(events: Vec<Event>) -> Vec<Event> {
    let mut merged: Vec<Event> = Vec::with_capacity(events.len());
    for event in events {
        match (merged.last_mut(), event) {
            (Some(Event::Text(run)), Event::Text(more)) => run.push_str(&more),
            (_, event) => merged.push(event),
        }
    }
    merged
}

/// Whether `last` followed by `byte` is a CR/LF or LF/CR pair.
pub(crate) fn combines_linefeed(last: Option<u8>, byte: u8) -> bool {
    matches!((last, byte), (Some(b'\r'), b'\n') | (Some(b'\n'), b'\r'))
}

/// Push the pending text run as an event, leaving it empty.
pub(crate) fn flush_text(events: &mut Vec<Event>, text: &mut String) {
    if !text.is_empty() {
        events.push(Event::Text(std::mem::take(text)));
    }
}
