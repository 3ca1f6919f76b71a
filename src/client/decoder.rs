//! Incremental decoder for the NDJSON progress stream.
//!
//! Transport chunks can end anywhere, including inside a JSON object or a
//! multi-byte character. Bytes are buffered until a newline arrives, so the
//! decoded sequence does not depend on where the chunks were cut.

use crate::deploy::ProgressEvent;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamLine {
    Event(ProgressEvent),
    /// A line that is not a progress event, kept verbatim.
    Raw(String),
}

#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns every line it completed. Blank lines are skipped.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamLine> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut cursor = self.scanned;
        while let Some(offset) = self.buffer[cursor..].iter().position(|b| *b == b'\n') {
            let end = cursor + offset;
            if let Some(line) = parse_line(&self.buffer[start..end]) {
                lines.push(line);
            }
            start = end + 1;
            cursor = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Flush a trailing line that never got its newline.
    pub fn finish(&mut self) -> Option<StreamLine> {
        let rest = std::mem::take(&mut self.buffer);
        self.scanned = 0;
        parse_line(&rest)
    }
}

fn parse_line(bytes: &[u8]) -> Option<StreamLine> {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim_end_matches('\r');
    if text.trim().is_empty() {
        return None;
    }

    Some(match serde_json::from_str::<ProgressEvent>(text) {
        Ok(event) => StreamLine::Event(event),
        Err(_) => StreamLine::Raw(text.to_string()),
    })
}
