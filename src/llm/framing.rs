//! Splits a streaming response body into provider payloads.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences and JSON objects split across network chunks decode correctly.

use super::adapter::StreamFraming;
use super::error::ParseError;

/// Longest unterminated line we hold before giving up on the stream.
pub const MAX_LINE_LEN: usize = 1024 * 1024;

#[derive(Debug)]
pub struct FrameDecoder {
    framing: StreamFraming,
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
}

impl FrameDecoder {
    pub fn new(framing: StreamFraming) -> Self {
        Self {
            framing,
            buffer: Vec::new(),
            scanned: 0,
        }
    }

    /// Feed one network chunk; returns every payload it completed. Fails once
    /// the pending line grows past [`MAX_LINE_LEN`].
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>, ParseError> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;
        while let Some(offset) = self.buffer[from..].iter().position(|&b| b == b'\n') {
            let end = from + offset + 1;
            if let Some(payload) = self.decode_line(&self.buffer[start..end]) {
                payloads.push(payload);
            }
            start = end;
            from = end;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();

        if self.buffer.len() > MAX_LINE_LEN {
            self.buffer.clear();
            self.scanned = 0;
            return Err(ParseError::new(format!(
                "stream line exceeds {MAX_LINE_LEN} bytes without a newline"
            )));
        }
        Ok(payloads)
    }

    /// Flush a final line that arrived without a trailing newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        self.decode_line(&rest)
    }

    fn decode_line(&self, raw: &[u8]) -> Option<String> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches(['\n', '\r']);

        match self.framing {
            // Comments (`:`), `event:`, `id:` and `retry:` lines carry no payload.
            StreamFraming::Sse => line
                .strip_prefix("data:")
                .map(str::trim_start)
                .filter(|data| !data.is_empty())
                .map(str::to_string),
            StreamFraming::Ndjson => {
                let trimmed = line.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
        }
    }
}
