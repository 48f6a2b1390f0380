//! Byte stream to text lines

/// Longest line kept before it is force-split
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4096;

/// Incremental line splitter for device output
///
/// Accepts `\n`, `\r\n` and bare `\r` as terminators. Blank lines are dropped
/// and invalid UTF-8 is replaced rather than rejected.
#[derive(Debug, Clone)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    max_line_length: usize,
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl LineDecoder {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            max_line_length: max_line_length.max(1),
        }
    }

    /// Feed bytes, returning every line they complete
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &byte in bytes {
            match byte {
                b'\n' | b'\r' => self.take_line(&mut lines),
                _ => {
                    self.buffer.push(byte);
                    if self.buffer.len() >= self.max_line_length {
                        warn!("Device line exceeded {} bytes, splitting", self.max_line_length);
                        let tail = self.buffer.split_off(char_boundary(&self.buffer));
                        self.take_line(&mut lines);
                        self.buffer = tail;
                    }
                }
            }
        }
        lines
    }

    /// Flush a trailing unterminated line
    pub fn finish(&mut self) -> Option<String> {
        let mut lines = Vec::new();
        self.take_line(&mut lines);
        lines.pop()
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn take_line(&mut self, lines: &mut Vec<String>) {
        if self.buffer.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.buffer).trim().to_string();
        self.buffer.clear();
        if !line.is_empty() {
            lines.push(line);
        }
    }
}

/// Largest split point that does not cut a UTF-8 character in half
///
/// An incomplete trailing character is left for the next line. Invalid input
/// and characters wider than the whole buffer split at the end.
fn char_boundary(buffer: &[u8]) -> usize {
    let mut start = buffer.len();
    while start > 0 && buffer.len() - start < 4 {
        start -= 1;
        if buffer[start] & 0xC0 != 0x80 {
            break;
        }
    }
    let width = match buffer.get(start) {
        Some(&b) if b >= 0xF0 => 4,
        Some(&b) if b >= 0xE0 => 3,
        Some(&b) if b >= 0xC0 => 2,
        _ => 1,
    };
    if start > 0 && start + width > buffer.len() {
        start
    } else {
        buffer.len()
    }
}
