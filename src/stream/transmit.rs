//! Decoder for locally typed bytes on their way to the target.

use super::{Event, combines_linefeed, flush_text};

/// Stand-in for unprintable bytes, keeping column positions intact.
const PLACEHOLDER: char = ' ';

/// Turns outbound bytes into [`Event`]s for a transmit log.
///
/// Only backspace is a control event; CR and LF become `'\n'` in the text,
/// and other C0/C1 control bytes become a blank.
#[derive(Debug, Default)]
pub struct TransmitDecoder {
    last: Option<u8>,
}

impl TransmitDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk, flushing trailing text at the end.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut text = String::new();

        for &byte in chunk {
            if combines_linefeed(self.last, byte) {
                self.last = None;
                continue;
            }
            match byte {
                b'\r' | b'\n' => text.push('\n'),
                0x08 => {
                    flush_text(&mut events, &mut text);
                    events.push(Event::Backspace);
                }
                0x00..=0x1F | 0x80..=0x9F => text.push(PLACEHOLDER),
                _ => text.push(char::from(byte)),
            }
            self.last = Some(byte);
        }

        flush_text(&mut events, &mut text);
        events
    }
}
