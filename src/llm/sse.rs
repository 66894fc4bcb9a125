//! Server-sent event line decoding.
//!
//! Bytes arrive in arbitrary chunks; lines are only decoded once the
//! terminating `\n` has been seen, so a multi-byte UTF-8 character split
//! across two network chunks is never mangled.

use super::{DecodedEvent, ProviderProtocol};

/// Prefix of SSE payload lines. Anything else (comments, `event:`,
/// keep-alives) is ignored.
pub const DATA_PREFIX: &str = "data: ";

/// Payload of an SSE line, if it is a `data: ` line.
pub fn event_data(line: &str) -> Option<&str> {
    line.strip_prefix(DATA_PREFIX)
}

/// Incremental decoder turning a byte stream into text fragments.
///
/// Only `Fragment` and `Done` events are returned; after `Done` every
/// further byte is ignored.
pub struct SseDecoder {
    protocol: &'static dyn ProviderProtocol,
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new(protocol: &'static dyn ProviderProtocol) -> Self {
        Self {
            protocol,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Whether the end-of-stream sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed the next chunk of bytes, returning events for every line it
    /// completed, in order.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<DecodedEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.buffer.extend_from_slice(bytes);

        while let Some(newline_pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            if let Some(event) = self.decode_line(&line[..newline_pos]) {
                events.push(event);
                if self.done {
                    self.buffer.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        if self.done || self.buffer.is_empty() {
            return Vec::new();
        }
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&mut self, raw: &[u8]) -> Option<DecodedEvent> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return None;
        }
        let data = event_data(line)?;

        match self.protocol.decode_event(data) {
            DecodedEvent::Skip => None,
            DecodedEvent::Done => {
                self.done = true;
                Some(DecodedEvent::Done)
            }
            fragment => Some(fragment),
        }
    }
}
