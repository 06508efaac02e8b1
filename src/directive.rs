//! Insertion directives: one requested space insertion per reported defect.

use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;
use thiserror::Error;

/// Which side(s) of the flagged range need a space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// Space immediately before the unit at `start_offset`.
    Before,
    /// Space immediately after the unit at `end_offset`.
    After,
    Both,
}

impl Side {
    pub fn inserts_before(self) -> bool {
        matches!(self, Side::Before | Side::Both)
    }

    pub fn inserts_after(self) -> bool {
        matches!(self, Side::After | Side::Both)
    }

    /// Number of spaces this side adds.
    pub fn insertions(self) -> usize {
        match self {
            Side::Both => 2,
            Side::Before | Side::After => 1,
        }
    }

    fn merge(self, other: Side) -> Side {
        if self == other {
            self
        } else {
            Side::Both
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Before => write!(f, "before"),
            Side::After => write!(f, "after"),
            Side::Both => write!(f, "both"),
        }
    }
}

/// Phrases that mark a missing space on the left or right in an issue message.
///
/// Matching is a case-insensitive substring search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideMarkers {
    left: Vec<String>,
    right: Vec<String>,
}

impl SideMarkers {
    pub fn new<L, R>(left: L, right: R) -> Self
    where
        L: IntoIterator,
        L::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        Self {
            left: left.into_iter().map(|m| m.as_ref().to_lowercase()).collect(),
            right: right.into_iter().map(|m| m.as_ref().to_lowercase()).collect(),
        }
    }

    /// Classify a message, `None` if it mentions neither side.
    pub fn classify(&self, message: &str) -> Option<Side> {
        let message = message.to_lowercase();
        let left = self.left.iter().any(|m| message.contains(m.as_str()));
        let right = self.right.iter().any(|m| message.contains(m.as_str()));
        match (left, right) {
            (true, true) => Some(Side::Both),
            (true, false) => Some(Side::Before),
            (false, true) => Some(Side::After),
            (false, false) => None,
        }
    }
}

impl Default for SideMarkers {
    fn default() -> Self {
        Self::new(["слева"], ["справа"])
    }
}

/// How the report expresses the end of a text range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OffsetConvention {
    /// `end_offset` is the index of the last flagged unit.
    #[default]
    Inclusive,
    /// `end_offset` is one past the last flagged unit.
    Exclusive,
}

/// An issue as delivered by the issue-retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportedIssue {
    pub start_line: usize,
    pub end_line: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub message: String,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("issue spans lines {start_line}..{end_line}, expected a single line")]
    MultiLineSpan { start_line: usize, end_line: usize },

    #[error("line {line}: cannot tell which side needs a space from message {message:?}")]
    UnknownSide { line: usize, message: String },

    #[error("line {line}: end offset {end_offset} is before start offset {start_offset}")]
    InvertedRange {
        line: usize,
        start_offset: usize,
        end_offset: usize,
    },

    #[error("line {line}: empty text range at offset {offset}")]
    EmptyRange { line: usize, offset: usize },

    #[error("line {line}: line numbers are 1-based")]
    ZeroLine { line: usize },

    #[error("line {line}: conflicting directives at offset {start_offset} (end offsets {first_end} and {second_end})")]
    ConflictingDirectives {
        line: usize,
        start_offset: usize,
        first_end: usize,
        second_end: usize,
    },
}

/// One requested insertion. Offsets are 0-based unit indices, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Directive {
    pub line: usize,
    pub start_offset: usize,
    pub end_offset: usize,
    pub side: Side,
}

impl Directive {
    pub fn new(
        line: usize,
        start_offset: usize,
        end_offset: usize,
        side: Side,
    ) -> Result<Self, DirectiveError> {
        if line == 0 {
            return Err(DirectiveError::ZeroLine { line });
        }
        if end_offset < start_offset {
            return Err(DirectiveError::InvertedRange {
                line,
                start_offset,
                end_offset,
            });
        }
        Ok(Self {
            line,
            start_offset,
            end_offset,
            side,
        })
    }

    /// Build a directive from a reported issue.
    pub fn from_issue(
        issue: &ReportedIssue,
        markers: &SideMarkers,
        convention: OffsetConvention,
    ) -> Result<Self, DirectiveError> {
        if issue.start_line != issue.end_line {
            return Err(DirectiveError::MultiLineSpan {
                start_line: issue.start_line,
                end_line: issue.end_line,
            });
        }
        let line = issue.start_line;

        let side = markers
            .classify(&issue.message)
            .ok_or_else(|| DirectiveError::UnknownSide {
                line,
                message: issue.message.clone(),
            })?;

        let end_offset = match convention {
            OffsetConvention::Inclusive => issue.end_offset,
            OffsetConvention::Exclusive => {
                if issue.end_offset <= issue.start_offset {
                    return Err(DirectiveError::EmptyRange {
                        line,
                        offset: issue.start_offset,
                    });
                }
                issue.end_offset - 1
            }
        };

        Self::new(line, issue.start_offset, end_offset, side)
    }

    /// Sort key within a file.
    pub fn key(&self) -> (usize, usize) {
        (self.line, self.start_offset)
    }
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}-{} ({})",
            self.line, self.start_offset, self.end_offset, self.side
        )
    }
}

/// Directives for one file, ordered by `(line, start_offset)`.
///
/// Two directives with the same key and end offset are merged into one
/// (`Before` + `After` becomes `Both`, repeats collapse). Same key with a
/// different end offset is a [`DirectiveError::ConflictingDirectives`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectiveSet {
    directives: BTreeMap<(usize, usize), Directive>,
}

impl DirectiveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, directive: Directive) -> Result<(), DirectiveError> {
        match self.directives.entry(directive.key()) {
            Entry::Vacant(slot) => {
                slot.insert(directive);
            }
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                if existing.end_offset != directive.end_offset {
                    return Err(DirectiveError::ConflictingDirectives {
                        line: directive.line,
                        start_offset: directive.start_offset,
                        first_end: existing.end_offset,
                        second_end: directive.end_offset,
                    });
                }
                existing.side = existing.side.merge(directive.side);
            }
        }
        Ok(())
    }

    /// Convert and collect reported issues, failing on the first malformed one.
    pub fn from_issues<'a>(
        issues: impl IntoIterator<Item = &'a ReportedIssue>,
        markers: &SideMarkers,
        convention: OffsetConvention,
    ) -> Result<Self, DirectiveError> {
        let mut set = Self::new();
        for issue in issues {
            set.insert(Directive::from_issue(issue, markers, convention)?)?;
        }
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Directive> {
        self.directives.values()
    }

    /// Total number of spaces the set asks for.
    pub fn insertions(&self) -> usize {
        self.iter().map(|d| d.side.insertions()).sum()
    }
}

impl<'a> IntoIterator for &'a DirectiveSet {
    type Item = &'a Directive;
    type IntoIter = std::collections::btree_map::Values<'a, (usize, usize), Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.values()
    }
}

impl TryFrom<Vec<Directive>> for DirectiveSet {
    type Error = DirectiveError;

    fn try_from(directives: Vec<Directive>) -> Result<Self, Self::Error> {
        let mut set = Self::new();
        for directive in directives {
            set.insert(directive)?;
        }
        Ok(set)
    }
}
