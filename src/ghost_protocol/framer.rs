//! Incremental JSON framing for the control channel
//!
//! The camera writes bare JSON objects back to back with no length prefix
//! and no delimiter, and TCP delivers them in arbitrary chunks. The framer
//! buffers bytes and hands out complete values in arrival order.
//!
//! Camera firmware also writes raw DOS path separators inside string
//! literals (`\DCIM\100MEDIA`), which are not valid JSON escapes. Every
//! backslash is rewritten to `/` on the way in, except when it escapes a
//! double quote.

use crate::error::{Error, Result};
use serde_json::Value;

/// Upper bound on buffered bytes for a single incomplete value
const DEFAULT_MAX_BUFFER: usize = 64 * 1024;

/// Per-connection message framer
///
/// Push raw chunks with [`MessageFramer::push`], then drain complete values
/// by iterating. Iteration returns `None` once the buffer holds no complete
/// value; pushing more data makes it resumable.
#[derive(Debug)]
pub struct MessageFramer {
    buf: Vec<u8>,
    /// Last byte of the previous chunk was a backslash
    pending_backslash: bool,
    max_buffer: usize,
}

impl MessageFramer {
    pub fn new() -> Self {
        Self::with_max_buffer(DEFAULT_MAX_BUFFER)
    }

    pub fn with_max_buffer(max_buffer: usize) -> Self {
        Self {
            buf: Vec::new(),
            pending_backslash: false,
            max_buffer,
        }
    }

    /// Append a raw chunk read from the socket
    pub fn push(&mut self, chunk: &[u8]) {
        self.buf.reserve(chunk.len());
        for &byte in chunk {
            self.push_byte(byte);
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if self.pending_backslash {
            self.pending_backslash = false;
            match byte {
                b'"' => {
                    self.buf.extend_from_slice(b"\\\"");
                    return;
                }
                b'\\' => {
                    self.buf.extend_from_slice(b"//");
                    return;
                }
                _ => self.buf.push(b'/'),
            }
        }

        if byte == b'\\' {
            self.pending_backslash = true;
        } else {
            self.buf.push(byte);
        }
    }

    /// Bytes held back waiting for the rest of a value
    pub fn buffered_len(&self) -> usize {
        self.buf.len() + usize::from(self.pending_backslash)
    }

    /// Drop everything buffered
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pending_backslash = false;
    }

    fn next_value(&mut self) -> Option<Result<Value>> {
        // Firmware pads with NULs and newlines between objects
        let start = match self
            .buf
            .iter()
            .position(|b| !b.is_ascii_whitespace() && *b != 0)
        {
            Some(pos) => pos,
            None => {
                self.buf.clear();
                return None;
            }
        };

        if !matches!(self.buf[start], b'{' | b'[') {
            let err = self.protocol_error(start, "unexpected byte outside of a JSON value");
            return Some(Err(err));
        }

        let parsed = {
            let mut stream =
                serde_json::Deserializer::from_slice(&self.buf[start..]).into_iter::<Value>();
            stream
                .next()
                .map(|r| r.map(|value| (value, stream.byte_offset())))
        };

        match parsed {
            Some(Ok((value, consumed))) => {
                self.buf.drain(..start + consumed);
                Some(Ok(value))
            }
            Some(Err(e)) if e.is_eof() => {
                if self.buf.len() - start > self.max_buffer {
                    let err = self.protocol_error(start, "incomplete message exceeds buffer limit");
                    return Some(Err(err));
                }
                if start > 0 {
                    self.buf.drain(..start);
                }
                None
            }
            Some(Err(e)) => {
                let err = self.protocol_error(start, &e.to_string());
                Some(Err(err))
            }
            None => {
                self.buf.clear();
                None
            }
        }
    }

    /// Report bad data at `start` and skip ahead to the next `{`
    ///
    /// Values after the bad bytes stay buffered for the next call.
    fn protocol_error(&mut self, start: usize, reason: &str) -> Error {
        let end = (start + 64).min(self.buf.len());
        let preview = String::from_utf8_lossy(&self.buf[start..end]).into_owned();

        let resume = self.buf[start + 1..]
            .iter()
            .position(|b| *b == b'{')
            .map(|pos| start + 1 + pos);
        let discarded = resume.unwrap_or(self.buf.len());

        tracing::warn!(
            reason = %reason,
            preview = %preview,
            discarded,
            "Discarding unparseable control channel data"
        );

        match resume {
            Some(pos) => {
                self.buf.drain(..pos);
            }
            None => self.reset(),
        }
        Error::Protocol(format!("{}: {}", reason, preview))
    }
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for MessageFramer {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_value()
    }
}
