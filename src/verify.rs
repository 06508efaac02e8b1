//! Post-rewrite verification against the shadow ledger.
//!
//! The rewritten file passes only if it has exactly as many lines as the
//! ledger and every line has the same number of non-whitespace units as the
//! original line it came from.

use crate::ledger::parse_entry;
use crate::rewrite::read_line;
use crate::utf8::fingerprint;
use std::io::{self, BufRead};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("line count mismatch: original has {expected} lines, rewritten has {found}")]
    LineCountMismatch { expected: usize, found: usize },

    #[error("line {line}: expected {expected} non-whitespace characters, found {found}")]
    FingerprintMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("ledger entry {entry} is not a number: {text:?}")]
    CorruptLedger { entry: usize, text: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn read_ledger<R: BufRead>(mut ledger: R) -> Result<Vec<usize>, VerifyError> {
    let mut entries = Vec::new();
    let mut buf = Vec::new();
    while read_line(&mut ledger, &mut buf)? {
        let value = parse_entry(&buf).ok_or_else(|| VerifyError::CorruptLedger {
            entry: entries.len() + 1,
            text: String::from_utf8_lossy(&buf).into_owned(),
        })?;
        entries.push(value);
    }
    Ok(entries)
}

/// Compare `rewritten` line by line with `ledger`. Returns the verified line count.
pub fn verify<L: BufRead, R: BufRead>(ledger: L, mut rewritten: R) -> Result<usize, VerifyError> {
    let expected = read_ledger(ledger)?;

    let mut found = Vec::with_capacity(expected.len());
    let mut buf = Vec::new();
    while read_line(&mut rewritten, &mut buf)? {
        found.push(fingerprint(&buf));
    }

    if found.len() != expected.len() {
        return Err(VerifyError::LineCountMismatch {
            expected: expected.len(),
            found: found.len(),
        });
    }

    if let Some((index, (&expected, &found))) = expected
        .iter()
        .zip(found.iter())
        .enumerate()
        .find(|(_, (e, f))| e != f)
    {
        return Err(VerifyError::FingerprintMismatch {
            line: index + 1,
            expected,
            found,
        });
    }

    Ok(expected.len())
}
