//! Decoder for the target's console output.

use super::{Event, combines_linefeed, flush_text};

/// Control event started by a byte that needs argument bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Multi {
    CursorPosition,
    CursorPositionX,
    CursorPositionY,
}

impl Multi {
    fn arg_count(self) -> usize {
        match self {
            Multi::CursorPosition => 2,
            Multi::CursorPositionX | Multi::CursorPositionY => 1,
        }
    }

    fn complete(self, args: &[u8]) -> Event {
        match self {
            Multi::CursorPosition => Event::CursorPosition {
                x: args[0],
                y: args[1],
            },
            Multi::CursorPositionX => Event::CursorPositionX(args[0]),
            Multi::CursorPositionY => Event::CursorPositionY(args[0]),
        }
    }
}

/// What a control byte means.
enum Control {
    Single(Event),
    Multi(Multi),
}

/// Map a byte to a console control code, if it is one.
fn control(byte: u8) -> Option<Control> {
    let event = match byte {
        0x00 | 0x10 => Event::ClearScreen,
        0x01 => Event::CursorHome,
        0x02 => return Some(Control::Multi(Multi::CursorPosition)),
        0x03 => Event::CursorLeft,
        0x04 => Event::CursorRight,
        0x05 => Event::CursorUp,
        0x06 => Event::CursorDown,
        0x07 => Event::SpeakerBeep,
        0x08 => Event::Backspace,
        0x09 => Event::Tab,
        0x0A | 0x0D => Event::Linefeed,
        0x0B => Event::ClearEol,
        0x0C => Event::ClearBelow,
        0x0E => return Some(Control::Multi(Multi::CursorPositionX)),
        0x0F => return Some(Control::Multi(Multi::CursorPositionY)),
        _ => return None,
    };
    Some(Control::Single(event))
}

/// A multi-byte event still collecting its arguments.
#[derive(Debug)]
struct Partial {
    kind: Multi,
    args: Vec<u8>,
}

/// Turns inbound console bytes into [`Event`]s.
///
/// One decoder must see the whole stream in order. It cannot be rewound;
/// start a new one for a new stream.
#[derive(Debug, Default)]
pub struct TerminalDecoder {
    last: Option<u8>,
    partial: Option<Partial>,
}

impl TerminalDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a multi-byte event is waiting for more argument bytes.
    pub fn is_pending(&self) -> bool {
        self.partial.is_some()
    }

    /// Decode one chunk.
    ///
    /// Trailing text is flushed at the end of the chunk; an incomplete
    /// multi-byte event carries over to the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut text = String::new();

        for &byte in chunk {
            if let Some(partial) = self.partial.as_mut() {
                partial.args.push(byte);
                if partial.args.len() >= partial.kind.arg_count() {
                    events.push(partial.kind.complete(&partial.args));
                    self.partial = None;
                }
            } else if combines_linefeed(self.last, byte) {
                // forget the pair so CR LF CR LF still yields two linefeeds
                self.last = None;
                continue;
            } else if let Some(control) = control(byte) {
                flush_text(&mut events, &mut text);
                match control {
                    Control::Single(event) => events.push(event),
                    Control::Multi(kind) => {
                        self.partial = Some(Partial {
                            kind,
                            args: Vec::with_capacity(kind.arg_count()),
                        })
                    }
                }
            } else {
                text.push(char::from(byte));
            }
            self.last = Some(byte);
        }

        flush_text(&mut events, &mut text);
        events
    }
}
