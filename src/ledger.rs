//! Shadow ledger of per-line fingerprints.
//!
//! One decimal entry per original line, newline terminated. The verifier
//! reads it back and compares against the rewritten file.

use crate::utf8::fingerprint;
use std::io::{self, Write};

/// Appends fingerprints of original lines as they are read.
#[derive(Debug)]
pub struct LedgerWriter<W: Write> {
    out: W,
    entries: usize,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, entries: 0 }
    }

    /// Record one original line; returns its fingerprint.
    pub fn record(&mut self, line: &[u8]) -> io::Result<usize> {
        let value = fingerprint(line);
        writeln!(self.out, "{value}")?;
        self.entries += 1;
        Ok(value)
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Parse a ledger entry (without its newline).
pub fn parse_entry(text: &[u8]) -> Option<usize> {
    std::str::from_utf8(text).ok()?.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_writes_one_entry_per_line() {
        let mut ledger = LedgerWriter::new(Vec::new());
        assert_eq!(ledger.record(b"foo(bar)").unwrap(), 8);
        assert_eq!(ledger.record(b"").unwrap(), 0);
        assert_eq!(ledger.record("\tпри вет".as_bytes()).unwrap(), 6);
        assert_eq!(ledger.entries(), 3);
        assert_eq!(ledger.out, b"8\n0\n6\n");
    }

    #[test]
    fn test_parse_entry() {
        assert_eq!(parse_entry(b"42"), Some(42));
        assert_eq!(parse_entry(b"7\r"), Some(7));
        assert_eq!(parse_entry(b"x"), None);
        assert_eq!(parse_entry(b""), None);
    }
}
