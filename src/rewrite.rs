//! Streaming rewriter: copies a file line by line, applying directives in order.
//!
//! Output lines are joined with `\n` and terminated by a final `\n`. Every
//! line read from the input, touched or not, is fingerprinted into the ledger.

use crate::cursor::LineCursor;
use crate::directive::{Directive, DirectiveSet};
use crate::ledger::LedgerWriter;
use crate::utf8::EncodingError;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RewriteError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("directive for line {line} but the file has only {lines} lines")]
    LineBeyondEof { line: usize, lines: usize },

    #[error("directive for line {line} arrived after line {current}")]
    OutOfOrder { line: usize, current: usize },

    #[error("line {line}: offset {offset} is behind the cursor at unit {cursor}")]
    OffsetBehindCursor {
        line: usize,
        offset: usize,
        cursor: usize,
    },

    #[error("line {line}: offset {offset} is past the end of the line ({units} units)")]
    OffsetBeyondLine {
        line: usize,
        offset: usize,
        units: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Counters reported once the rewrite is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RewriteStats {
    /// Lines read from the original (equals ledger entries).
    pub lines: usize,
    /// Spaces inserted.
    pub insertions: usize,
}

/// Read one `\n`-terminated line into `buf`, without the terminator.
///
/// Returns `false` at end of input. A final line without `\n` is still a line.
pub(crate) fn read_line<R: BufRead>(input: &mut R, buf: &mut Vec<u8>) -> io::Result<bool> {
    buf.clear();
    if input.read_until(b'\n', buf)? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    Ok(true)
}

/// Rewrites one file.
///
/// `line_number` is the 1-based number of the line held by the cursor (0
/// before the first read). `started` suppresses the separator before the
/// first emitted line.
pub struct Rewriter<R, W, L: Write> {
    input: R,
    output: W,
    ledger: LedgerWriter<L>,
    cursor: LineCursor,
    line_number: usize,
    started: bool,
    insertions: usize,
}

impl<R: BufRead, W: Write, L: Write> Rewriter<R, W, L> {
    pub fn new(input: R, output: W, ledger: L) -> Self {
        Self {
            input,
            output,
            ledger: LedgerWriter::new(ledger),
            cursor: LineCursor::new(),
            line_number: 0,
            started: false,
            insertions: 0,
        }
    }

    /// Flush the current line and load the next one. `false` at end of input.
    fn advance_line(&mut self) -> Result<bool, RewriteError> {
        self.cursor.flush_remainder(&mut self.output)?;

        let mut line = Vec::new();
        if !read_line(&mut self.input, &mut line)? {
            return Ok(false);
        }

        if self.started {
            self.output.write_all(b"\n")?;
        }
        self.started = true;
        self.line_number += 1;
        self.ledger.record(&line)?;
        self.cursor.load(self.line_number, line);
        Ok(true)
    }

    /// Apply one directive. Directives must arrive in `(line, start_offset)` order.
    pub fn apply(&mut self, directive: &Directive) -> Result<(), RewriteError> {
        if directive.line < self.line_number {
            return Err(RewriteError::OutOfOrder {
                line: directive.line,
                current: self.line_number,
            });
        }

        while self.line_number < directive.line {
            if !self.advance_line()? {
                return Err(RewriteError::LineBeyondEof {
                    line: directive.line,
                    lines: self.line_number,
                });
            }
        }

        let inserted = self.cursor.consume_until(directive, &mut self.output)?;
        self.insertions += inserted;
        tracing::debug!(%directive, inserted, "applied directive");
        Ok(())
    }

    /// Copy everything after the last directive and flush both sinks.
    pub fn finish(mut self) -> Result<RewriteStats, RewriteError> {
        while self.advance_line()? {}

        if self.started {
            self.output.write_all(b"\n")?;
        }
        self.output.flush()?;
        self.ledger.flush()?;

        Ok(RewriteStats {
            lines: self.ledger.entries(),
            insertions: self.insertions,
        })
    }
}

/// Rewrite `input` into `output`, recording fingerprints into `ledger`.
pub fn rewrite<R, W, L>(
    input: R,
    output: W,
    ledger: L,
    directives: &DirectiveSet,
) -> Result<RewriteStats, RewriteError>
where
    R: BufRead,
    W: Write,
    L: Write,
{
    let mut rewriter = Rewriter::new(input, output, ledger);
    for directive in directives {
        rewriter.apply(directive)?;
    }
    rewriter.finish()
}
