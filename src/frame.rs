//! Line framing for the modem's serial byte stream
//!
//! The modem talks in lines terminated by `\r\n`. A few interactive prompts
//! (the `> ` shown before an SMS body) are not terminated at all, so the
//! framer can also be told about an alternate terminator expected by the
//! command in flight. When the buffer tail matches it, the whole buffer is
//! yielded as one line, unstripped, and tagged as non-standard.

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Default line terminator on the read side
pub const LINE_TERMINATOR: &[u8] = b"\r\n";

/// One complete line received from the modem, without its terminator
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Line {
    text: String,
    alternate: bool,
}

impl Line {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alternate: false,
        }
    }

    fn alternate(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            alternate: true,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// True when the line was ended by the alternate terminator; the
    /// terminator is then still part of the text
    pub fn is_alternate(&self) -> bool {
        self.alternate
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alternate {
            write!(f, "Line({:?}, alternate)", self.text)
        } else {
            write!(f, "Line({:?})", self.text)
        }
    }
}

impl From<&str> for Line {
    fn from(text: &str) -> Self {
        Line::new(text)
    }
}

/// Splits a byte stream into [`Line`]s, keeping partial lines across reads
#[derive(Debug)]
pub struct LineFramer {
    buffer: BytesMut,
    terminator: Bytes,
    alternate: Option<Bytes>,
}

impl Default for LineFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineFramer {
    pub fn new() -> Self {
        Self::with_terminator(LINE_TERMINATOR)
    }

    pub fn with_terminator(terminator: &[u8]) -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
            terminator: Bytes::copy_from_slice(terminator),
            alternate: None,
        }
    }

    /// Sets (or clears) the alternate terminator of the command in flight
    pub fn set_alternate(&mut self, alternate: Option<&[u8]>) {
        self.alternate = alternate
            .filter(|seq| !seq.is_empty())
            .map(Bytes::copy_from_slice);
    }

    pub fn alternate_terminator(&self) -> Option<&[u8]> {
        self.alternate.as_deref()
    }

    /// Bytes received since the last complete line
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Discards any partial line
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Adds one byte, returning a line if it completed one. Empty lines are
    /// dropped.
    pub fn push(&mut self, byte: u8) -> Option<Line> {
        self.buffer.put_u8(byte);

        if self.buffer.ends_with(&self.terminator) {
            let content_len = self.buffer.len() - self.terminator.len();
            let raw = self.buffer.split();
            if content_len == 0 {
                return None;
            }
            return Some(Line::new(String::from_utf8_lossy(&raw[..content_len])));
        }

        if let Some(alternate) = &self.alternate {
            if self.buffer.ends_with(alternate) {
                let raw = self.buffer.split();
                return Some(Line::alternate(String::from_utf8_lossy(&raw)));
            }
        }
        None
    }

    /// Feeds a chunk of input, returning every line it completed in order
    pub fn feed(&mut self, data: &[u8]) -> Vec<Line> {
        data.iter().filter_map(|&byte| self.push(byte)).collect()
    }
}
