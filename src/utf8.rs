//! Byte classification for UTF-8 encoded lines.
//!
//! Offsets in analyzer reports count characters, not bytes. Everything that
//! maps a character offset onto a byte position goes through [`classify`],
//! which looks only at the leading bit pattern of a byte.

use thiserror::Error;

/// UTF-8 byte-order mark.
pub const BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Classification of a single byte within a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteKind {
    /// Horizontal tab. Counted as one unit by the analyzer.
    Tab,
    /// First byte of a sequence that is `width` bytes long (1..=4).
    Lead { width: usize },
    /// `10xxxxxx`
    Continuation,
    /// `11111xxx`, never valid in UTF-8.
    Invalid,
}

impl ByteKind {
    /// Whether this byte starts a new encoding unit.
    pub fn starts_unit(self) -> bool {
        matches!(self, ByteKind::Tab | ByteKind::Lead { .. })
    }
}

/// Encoding errors found while walking a line.
///
/// `column` is the 0-based byte position inside the line.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("line {line}: continuation byte {byte:#04x} at byte {column} where a character was expected")]
    UnexpectedContinuation { line: usize, column: usize, byte: u8 },

    #[error("line {line}: {width}-byte sequence starting at byte {column} is truncated")]
    TruncatedSequence {
        line: usize,
        column: usize,
        width: usize,
    },

    #[error("line {line}: invalid byte {byte:#04x} at byte {column}")]
    InvalidByte { line: usize, column: usize, byte: u8 },
}

/// Classify a byte by its leading bit pattern.
pub fn classify(byte: u8) -> ByteKind {
    if byte == b'\t' {
        ByteKind::Tab
    } else if byte >> 7 == 0 {
        ByteKind::Lead { width: 1 }
    } else if byte >> 6 == 0b10 {
        ByteKind::Continuation
    } else if byte >> 5 == 0b110 {
        ByteKind::Lead { width: 2 }
    } else if byte >> 4 == 0b1110 {
        ByteKind::Lead { width: 3 }
    } else if byte >> 3 == 0b11110 {
        ByteKind::Lead { width: 4 }
    } else {
        ByteKind::Invalid
    }
}

/// Check whether `line` starts with a byte-order mark.
pub fn has_bom(line: &[u8]) -> bool {
    line.starts_with(&BOM)
}

/// Byte length of the unit starting at `column`, validating its continuation bytes.
pub fn unit_len(line: &[u8], column: usize, line_number: usize) -> Result<usize, EncodingError> {
    let byte = line[column];
    let width = match classify(byte) {
        ByteKind::Tab => return Ok(1),
        ByteKind::Lead { width } => width,
        ByteKind::Continuation => {
            return Err(EncodingError::UnexpectedContinuation {
                line: line_number,
                column,
                byte,
            })
        }
        ByteKind::Invalid => {
            return Err(EncodingError::InvalidByte {
                line: line_number,
                column,
                byte,
            })
        }
    };

    let tail = line.get(column + 1..column + width).ok_or(EncodingError::TruncatedSequence {
        line: line_number,
        column,
        width,
    })?;
    if tail.iter().any(|&b| classify(b) != ByteKind::Continuation) {
        return Err(EncodingError::TruncatedSequence {
            line: line_number,
            column,
            width,
        });
    }

    Ok(width)
}

/// Number of encoding units in `line`, excluding a leading BOM.
///
/// Does not validate; continuation and invalid bytes are simply not counted.
pub fn count_units(line: &[u8]) -> usize {
    let body = if has_bom(line) { &line[BOM.len()..] } else { line };
    body.iter().filter(|&&b| classify(b).starts_unit()).count()
}

/// Per-line fingerprint: units that are neither space nor tab.
pub fn fingerprint(line: &[u8]) -> usize {
    line.iter()
        .filter(|&&b| b != b' ' && b != b'\t' && classify(b).starts_unit())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ascii_and_tab() {
        assert_eq!(classify(b'a'), ByteKind::Lead { width: 1 });
        assert_eq!(classify(b' '), ByteKind::Lead { width: 1 });
        assert_eq!(classify(b'\t'), ByteKind::Tab);
    }

    #[test]
    fn test_classify_multibyte_leads() {
        // 'п' = D0 BF, '€' = E2 82 AC, '😀' = F0 9F 98 80
        assert_eq!(classify(0xD0), ByteKind::Lead { width: 2 });
        assert_eq!(classify(0xBF), ByteKind::Continuation);
        assert_eq!(classify(0xE2), ByteKind::Lead { width: 3 });
        assert_eq!(classify(0xF0), ByteKind::Lead { width: 4 });
        assert_eq!(classify(0xF8), ByteKind::Invalid);
        assert_eq!(classify(0xFF), ByteKind::Invalid);
    }

    #[test]
    fn test_unit_len() {
        let line = "a€😀".as_bytes();
        assert_eq!(unit_len(line, 0, 1).unwrap(), 1);
        assert_eq!(unit_len(line, 1, 1).unwrap(), 3);
        assert_eq!(unit_len(line, 4, 1).unwrap(), 4);
    }

    #[test]
    fn test_unit_len_rejects_stray_continuation() {
        let line = [b'a', 0x82, b'b'];
        let err = unit_len(&line, 1, 7).unwrap_err();
        assert_eq!(
            err,
            EncodingError::UnexpectedContinuation {
                line: 7,
                column: 1,
                byte: 0x82
            }
        );
    }

    #[test]
    fn test_unit_len_rejects_truncated_sequence() {
        assert!(matches!(
            unit_len(&[0xE2, 0x82], 0, 1),
            Err(EncodingError::TruncatedSequence { width: 3, .. })
        ));
        assert!(matches!(
            unit_len(&[0xE2, b'a', b'b'], 0, 1),
            Err(EncodingError::TruncatedSequence { .. })
        ));
    }

    #[test]
    fn test_count_units_skips_bom() {
        let mut line = BOM.to_vec();
        line.extend_from_slice("ab\tпривет".as_bytes());
        assert_eq!(count_units(&line), 9);
    }

    #[test]
    fn test_fingerprint_ignores_spaces_and_tabs() {
        assert_eq!(fingerprint(b"foo(bar)"), 8);
        assert_eq!(fingerprint(b"foo ( bar)"), 8);
        assert_eq!(fingerprint(b"\t a\t b "), 2);
        assert_eq!(fingerprint("x = «да»".as_bytes()), 6);
        assert_eq!(fingerprint(b""), 0);
    }
}
