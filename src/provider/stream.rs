//! Incremental Event-Stream Decoder
//!
//! Chunks arrive as arbitrary byte ranges of a line-oriented event stream;
//! nothing guarantees a chunk ends on a line boundary. The decoder buffers
//! partial lines across chunk boundaries, extracts `data:` event lines,
//! ignores everything else (comments, `event:` lines, keep-alive blanks),
//! and terminates on the explicit `[DONE]` marker or on stream closure.
//!
//! The decoder owns no I/O, so the line-buffering logic is unit-testable
//! independent of actual network transport.

/// One decoded event record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A data payload fragment, in arrival order
    Data(String),
    /// The explicit end-of-stream terminator
    Done,
}

/// Incremental decoder: `feed` bytes in, complete events out
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    /// Unconsumed bytes, always ending mid-line (or empty)
    buf: Vec<u8>,
    /// Set once the terminator has been seen; later input is ignored
    done: bool,
}

const DATA_PREFIX: &str = "data:";
const DONE_MARKER: &str = "[DONE]";

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk and return every event completed by it.
    ///
    /// Bytes after the last newline stay buffered until a later chunk (or
    /// `finish`) completes the line. Multi-byte characters split across
    /// chunks are therefore never decoded mid-sequence.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        if self.done {
            return Vec::new();
        }

        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buf[start..].iter().position(|&b| b == b'\n') {
            let line_end = start + offset;
            if let Some(event) = Self::parse_line(&self.buf[start..line_end]) {
                let is_done = event == StreamEvent::Done;
                events.push(event);
                if is_done {
                    self.done = true;
                    self.buf.clear();
                    return events;
                }
            }
            start = line_end + 1;
        }
        self.buf.drain(..start);

        events
    }

    /// Flush the trailing partial line on stream closure.
    ///
    /// A stream that closes without the explicit terminator may still end
    /// with an unterminated data line; that fragment is not lost.
    pub fn finish(&mut self) -> Option<StreamEvent> {
        if self.done || self.buf.is_empty() {
            return None;
        }
        let event = Self::parse_line(&std::mem::take(&mut self.buf));
        self.done = true;
        event
    }

    /// Whether the explicit terminator has been observed
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn parse_line(line: &[u8]) -> Option<StreamEvent> {
        let line = match line.last() {
            Some(b'\r') => &line[..line.len() - 1],
            _ => line,
        };
        let text = String::from_utf8_lossy(line);
        let rest = text.strip_prefix(DATA_PREFIX)?;
        let payload = rest.strip_prefix(' ').unwrap_or(rest);
        if payload.trim() == DONE_MARKER {
            Some(StreamEvent::Done)
        } else {
            Some(StreamEvent::Data(payload.to_string()))
        }
    }
}
