//! Pattern buffer with tail-limited last-line search.
//!
//! Device output is accumulated in full; prompt and pagination patterns are
//! only ever tested against the last line, and never further back than
//! `search_depth` bytes. For large outputs (full routing tables, long logs)
//! this keeps each match attempt cheap.
//!
//! ANSI escape sequences are removed on ingestion by a persistent `vte`
//! parser, so a sequence split across two reads is still stripped.

use std::ops::Range;

use regex::bytes::Regex;
use vte::{Params, Parser, Perform};

/// Buffer for accumulating output and searching its last line.
pub struct PatternBuffer {
    /// The accumulated output buffer, ANSI-free.
    buffer: Vec<u8>,

    /// How many bytes from the end to search for patterns.
    search_depth: usize,

    /// Escape-sequence parser state, carried across `extend` calls.
    parser: Parser,
}

impl std::fmt::Debug for PatternBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternBuffer")
            .field("len", &self.buffer.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

/// Collects printable output from the parser.
struct Sink<'a> {
    out: &'a mut Vec<u8>,
}

impl Perform for Sink<'_> {
    fn print(&mut self, c: char) {
        let mut utf8 = [0u8; 4];
        self.out.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        // NUL and backspace are kept for the erase-run cleanup.
        if matches!(byte, b'\n' | b'\r' | b'\t' | 0x00 | 0x08) {
            self.out.push(byte);
        }
    }

    fn csi_dispatch(&mut self, params: &Params, _intermediates: &[u8], _ignore: bool, action: char) {
        // Cursor-left is how some pagers erase their banner; keep it as backspaces.
        if action == 'D' {
            let count = params
                .iter()
                .next()
                .and_then(|p| p.first().copied())
                .filter(|&n| n > 0)
                .unwrap_or(1);
            self.out.extend(std::iter::repeat_n(0x08, usize::from(count)));
        }
    }
}

impl PatternBuffer {
    /// Create a new pattern buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            search_depth,
            parser: Parser::new(),
        }
    }

    /// Extend the buffer with new data, stripping ANSI escape codes.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sink = Sink {
            out: &mut self.buffer,
        };
        self.parser.advance(&mut sink, data);
    }

    /// Byte offset where the searchable last line begins.
    pub fn last_line_start(&self) -> usize {
        let floor = self.buffer.len().saturating_sub(self.search_depth);
        match memchr::memrchr(b'\n', &self.buffer[floor..]) {
            Some(pos) => floor + pos + 1,
            None => floor,
        }
    }

    /// The last line of the buffer (everything after the final `\n`).
    pub fn last_line(&self) -> &[u8] {
        &self.buffer[self.last_line_start()..]
    }

    /// Find `pattern` in the last line. Offsets are absolute buffer offsets.
    pub fn find_in_last_line(&self, pattern: &Regex) -> Option<Range<usize>> {
        let start = self.last_line_start();
        pattern
            .find(&self.buffer[start..])
            .map(|m| start + m.start()..start + m.end())
    }

    /// All matches of `pattern` in the last line, as absolute offsets.
    pub fn find_all_in_last_line(&self, pattern: &Regex) -> Vec<Range<usize>> {
        let start = self.last_line_start();
        pattern
            .find_iter(&self.buffer[start..])
            .map(|m| start + m.start()..start + m.end())
            .collect()
    }

    /// Remove and return everything up to `end`; the rest stays buffered.
    pub fn split_to(&mut self, end: usize) -> Vec<u8> {
        let end = end.min(self.buffer.len());
        let rest = self.buffer.split_off(end);
        std::mem::replace(&mut self.buffer, rest)
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    /// Get a reference to the buffer contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get the buffer contents as a string (lossy UTF-8 conversion).
    pub fn as_str_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.buffer)
    }

    /// Get the current buffer length.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for PatternBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}
