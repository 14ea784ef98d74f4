//! Line reassembly across chunk boundaries.
//!
//! A [`LineReassembler`] belongs to exactly one partition. It holds the carry
//! fragment (bytes after the last `\n` seen so far) and prepends it to the
//! next chunk, so a line split over any number of chunks comes out whole.
//! Bytes between separators are preserved exactly; invalid UTF-8 is replaced
//! per line with U+FFFD rather than failing the partition.
//!
//! ```
//! use linesieve::reassembly::LineReassembler;
//!
//! let mut lines = LineReassembler::new();
//! let first: Vec<String> = lines.feed(b"{\"a\":1}\n{\"b\"").collect();
//! assert_eq!(first, vec!["{\"a\":1}"]);
//! let second: Vec<String> = lines.feed(b":2}\n{\"c\":3}").collect();
//! assert_eq!(second, vec!["{\"b\":2}"]);
//! assert_eq!(lines.flush().as_deref(), Some("{\"c\":3}"));
//! ```

/// Line separator byte.
pub const SEPARATOR: u8 = b'\n';

/// Carry buffer plus scanner for one partition.
#[derive(Debug, Default)]
pub struct LineReassembler {
    carry: Vec<u8>,
    /// Prefix of `carry` already known to hold no separator.
    scanned: usize,
}

impl LineReassembler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            carry: Vec::new(),
            scanned: 0,
        }
    }

    /// Append `bytes` and lazily yield every line they complete.
    ///
    /// Lines are cut as the iterator is advanced; whatever is left when it is
    /// dropped (including lines not yet pulled) stays in the carry.
    pub fn feed(&mut self, bytes: &[u8]) -> CompleteLines<'_> {
        self.carry.extend_from_slice(bytes);
        CompleteLines {
            search_from: self.scanned,
            owner: self,
            start: 0,
        }
    }

    /// End of partition: the unterminated tail, if any, as a final line.
    pub fn flush(&mut self) -> Option<String> {
        if self.carry.is_empty() {
            return None;
        }
        self.scanned = 0;
        let tail = std::mem::take(&mut self.carry);
        Some(decode_lossy(tail))
    }

    /// Bytes currently held back waiting for a separator.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.carry.len()
    }

    /// Drop the carry without emitting it.
    pub fn discard(&mut self) -> usize {
        let dropped = self.carry.len();
        self.carry.clear();
        self.scanned = 0;
        dropped
    }
}

/// Lines completed by one [`LineReassembler::feed`] call.
pub struct CompleteLines<'a> {
    owner: &'a mut LineReassembler,
    start: usize,
    search_from: usize,
}

impl Iterator for CompleteLines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let buf = &self.owner.carry;
        let from = self.search_from.max(self.start);
        let Some(found) = buf[from..].iter().position(|&b| b == SEPARATOR) else {
            self.search_from = buf.len();
            return None;
        };
        let pos = from + found;
        let line = decode_lossy(buf[self.start..pos].to_vec());
        self.start = pos + 1;
        self.search_from = self.start;
        Some(line)
    }
}

impl Drop for CompleteLines<'_> {
    fn drop(&mut self) {
        self.owner.carry.drain(..self.start);
        self.owner.scanned = self.search_from.max(self.start) - self.start;
    }
}

fn decode_lossy(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes)
        .unwrap_or_else(|err| String::from_utf8_lossy(err.as_bytes()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut r = LineReassembler::new();
        assert_eq!(r.feed(b"").count(), 0);
        assert_eq!(r.pending(), 0);
        assert_eq!(r.flush(), None);
    }

    #[test]
    fn test_unpulled_lines_stay_in_carry() {
        let mut r = LineReassembler::new();
        {
            let mut lines = r.feed(b"a\nb\nc");
            assert_eq!(lines.next().as_deref(), Some("a"));
        }
        assert_eq!(r.pending(), 3);
        let rest: Vec<String> = r.feed(b"\n").collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn test_invalid_utf8_replaced() {
        let mut r = LineReassembler::new();
        let lines: Vec<String> = r.feed(b"ok\xff\n").collect();
        assert_eq!(lines, vec!["ok\u{FFFD}"]);
    }
}
