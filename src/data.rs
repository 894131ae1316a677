//! Buffered access to an uploaded input file.
//!
//! Each input is read exactly once into memory. Sniffing (finding the first
//! line with content, detecting a delimiter) happens on the buffer, and the
//! parser then gets a slice of the same buffer, so there is no shared read
//! cursor to rewind between the two passes.

use crate::error::{MatchError, Result};
use std::io::Read;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone)]
pub struct InputBuffer {
    what: &'static str,
    bytes: Vec<u8>,
}

/// A line found by [`InputBuffer::first_line_where`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLine {
    pub offset: usize,
    pub text: String,
}

impl InputBuffer {
    pub fn from_reader(what: &'static str, mut reader: impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        reader
            .read_to_end(&mut bytes)
            .map_err(|source| MatchError::Read { what, source })?;
        if bytes.starts_with(UTF8_BOM) {
            bytes.drain(..UTF8_BOM.len());
        }
        Ok(InputBuffer { what, bytes })
    }

    pub fn from_bytes(what: &'static str, bytes: impl Into<Vec<u8>>) -> Self {
        let mut bytes = bytes.into();
        if bytes.starts_with(UTF8_BOM) {
            bytes.drain(..UTF8_BOM.len());
        }
        InputBuffer { what, bytes }
    }

    pub fn what(&self) -> &'static str {
        self.what
    }

    pub fn content_from(&self, offset: usize) -> &[u8] {
        &self.bytes[offset.min(self.bytes.len())..]
    }

    /// Scans lines from the start and returns the first one accepted by `keep`.
    /// Lines that are not valid UTF-8 are decoded lossily.
    pub fn first_line_where(&self, mut keep: impl FnMut(&str) -> bool) -> Option<ContentLine> {
        let mut offset = 0;
        for raw in self.bytes.split_inclusive(|b| *b == b'\n') {
            let text = String::from_utf8_lossy(trim_line_ending(raw));
            if keep(&text) {
                return Some(ContentLine {
                    offset,
                    text: text.into_owned(),
                });
            }
            offset += raw.len();
        }
        None
    }

    /// First line with any non-whitespace character.
    pub fn first_non_blank_line(&self) -> Option<ContentLine> {
        self.first_line_where(|line| !line.trim().is_empty())
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
