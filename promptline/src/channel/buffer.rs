//! Accumulation buffer with terminal-control stripping and tail search.
//!
//! Raw shell bytes go through a persistent `vte` parser, so escape
//! sequences and multi-byte characters split across reads are handled the
//! same as whole ones. Only the last `search_depth` bytes are handed to the
//! prompt classifier, which keeps prompt detection independent of the size
//! of the output.

use vte::{Parser, Perform};

/// Buffer for accumulating decoded shell output.
pub struct SessionBuffer {
    /// Decoded, control-stripped text of the current read cycle.
    text: String,

    /// Terminal parser state, carried across reads.
    parser: Parser,

    /// How many bytes from the end the classifier gets to see.
    search_depth: usize,

    /// A bare carriage return was seen; the next printed character
    /// overwrites the current line.
    carriage_return: bool,
}

impl SessionBuffer {
    /// Create a new buffer with the specified search depth.
    pub fn new(search_depth: usize) -> Self {
        Self {
            text: String::with_capacity(4096),
            parser: Parser::new(),
            search_depth,
            carriage_return: false,
        }
    }

    /// Decode `data` and append it.
    ///
    /// Malformed UTF-8 becomes U+FFFD. CSI/OSC/ESC sequences and bells
    /// are dropped; backspace erases the previous character on the current
    /// line. Text printed after a bare carriage return replaces the
    /// current line, so `\r\n` stays a plain line break.
    pub fn extend(&mut self, data: &[u8]) {
        let mut sink = TextSink {
            text: &mut self.text,
            carriage_return: &mut self.carriage_return,
        };
        self.parser.advance(&mut sink, data);
    }

    /// The last `search_depth` bytes, aligned to a character boundary.
    pub fn tail(&self) -> &str {
        let mut start = self.text.len().saturating_sub(self.search_depth);
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        &self.text[start..]
    }

    /// Remove `len` bytes from the end.
    ///
    /// Callers pass the length of a suffix they just matched, so the cut
    /// always lands on a character boundary.
    pub fn truncate_tail(&mut self, len: usize) {
        let keep = self.text.len().saturating_sub(len);
        self.text.truncate(keep);
    }

    /// Get the buffer contents.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take ownership of the buffer contents and reset.
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }

    /// Clear the text. Parser state is kept so a sequence split across
    /// the boundary still decodes.
    pub fn clear(&mut self) {
        self.text.clear();
    }

    /// Get the current buffer length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Get the search depth setting.
    pub fn search_depth(&self) -> usize {
        self.search_depth
    }
}

impl Default for SessionBuffer {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl std::fmt::Debug for SessionBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuffer")
            .field("len", &self.text.len())
            .field("search_depth", &self.search_depth)
            .finish()
    }
}

struct TextSink<'a> {
    text: &'a mut String,
    carriage_return: &'a mut bool,
}

impl TextSink<'_> {
    fn overwrite(&mut self, c: char) {
        if std::mem::take(self.carriage_return) {
            let line_start = self.text.rfind('\n').map_or(0, |idx| idx + 1);
            self.text.truncate(line_start);
        }
        self.text.push(c);
    }
}

impl Perform for TextSink<'_> {
    fn print(&mut self, c: char) {
        self.overwrite(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => {
                *self.carriage_return = false;
                self.text.push('\n');
            }
            b'\r' => *self.carriage_return = true,
            b'\t' => self.overwrite('\t'),
            0x08 => {
                if !*self.carriage_return && !self.text.ends_with('\n') {
                    self.text.pop();
                }
            }
            _ => {}
        }
    }
}
