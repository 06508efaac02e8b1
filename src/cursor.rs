//! Read position inside the line currently being rewritten.

use crate::directive::Directive;
use crate::rewrite::RewriteError;
use crate::utf8::{has_bom, unit_len, BOM};
use std::io::{self, Write};

/// Byte and unit position within one loaded line.
///
/// Owned by the [`Rewriter`](crate::rewrite::Rewriter). Loading a line resets
/// both positions to zero; [`consume_until`](Self::consume_until) and
/// [`flush_remainder`](Self::flush_remainder) only ever move forward.
#[derive(Debug, Default)]
pub struct LineCursor {
    line: Vec<u8>,
    line_number: usize,
    /// Byte position of the next unread byte.
    column: usize,
    /// 0-based index of the next unread unit.
    unit: usize,
}

impl LineCursor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, line_number: usize, line: Vec<u8>) {
        self.line = line;
        self.line_number = line_number;
        self.column = 0;
        self.unit = 0;
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Index of the next unit to be read.
    pub fn unit(&self) -> usize {
        self.unit
    }

    pub fn is_consumed(&self) -> bool {
        self.column >= self.line.len()
    }

    fn emit_bom<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.column == 0 && has_bom(&self.line) {
            out.write_all(&BOM)?;
            self.column = BOM.len();
        }
        Ok(())
    }

    /// Copy units to `out` until every side of `directive` has been applied.
    ///
    /// Returns the number of spaces inserted. The cursor stays right after the
    /// last unit touched so a later directive on the same line can resume.
    pub fn consume_until<W: Write>(
        &mut self,
        directive: &Directive,
        out: &mut W,
    ) -> Result<usize, RewriteError> {
        let mut before = directive.side.inserts_before();
        let mut after = directive.side.inserts_after();

        let first_target = if before {
            directive.start_offset
        } else {
            directive.end_offset
        };
        if first_target < self.unit {
            return Err(RewriteError::OffsetBehindCursor {
                line: self.line_number,
                offset: first_target,
                cursor: self.unit,
            });
        }

        self.emit_bom(out)?;

        let mut inserted = 0;
        while before || after {
            if self.is_consumed() {
                return Err(RewriteError::OffsetBeyondLine {
                    line: self.line_number,
                    offset: if before {
                        directive.start_offset
                    } else {
                        directive.end_offset
                    },
                    units: self.unit,
                });
            }

            let width = unit_len(&self.line, self.column, self.line_number)?;
            let index = self.unit;

            if before && index == directive.start_offset {
                out.write_all(b" ")?;
                before = false;
                inserted += 1;
            }

            out.write_all(&self.line[self.column..self.column + width])?;
            self.column += width;
            self.unit += 1;

            if after && index == directive.end_offset {
                out.write_all(b" ")?;
                after = false;
                inserted += 1;
            }
        }

        Ok(inserted)
    }

    /// Copy the unread rest of the line verbatim.
    pub fn flush_remainder<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if let Some(rest) = self.line.get(self.column..) {
            out.write_all(rest)?;
        }
        self.column = self.line.len();
        Ok(())
    }
}
