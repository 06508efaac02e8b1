//! Space Patcher: offset-addressed whitespace insertion for analyzer reports
//!
//! Static analyzers report "missing space" defects as a line number plus
//! character offsets. This crate turns those reports into single-space
//! insertions applied directly to UTF-8 source files.
//!
//! # Architecture
//!
//! Each file goes through one sequential pass:
//!
//! 1. [`Rewriter`] streams the original line by line into a scratch file,
//!    stopping mid-line at each [`Directive`] to insert a space. Character
//!    offsets are mapped to byte positions by the [`utf8`] decoder.
//! 2. Every original line is fingerprinted into a shadow ledger (count of
//!    characters that are neither space nor tab).
//! 3. [`verify`](verify::verify) re-reads the scratch file and compares
//!    fingerprints line by line.
//! 4. Only a verified rewrite is renamed over the original.
//!
//! # Safety
//!
//! - Multi-byte sequences are never split; malformed UTF-8 aborts the file
//! - The original is replaced by a single atomic rename, or not at all
//! - Failed verifications keep the scratch files for inspection
//! - Component paths cannot escape the base directory
//!
//! # Example
//!
//! ```no_run
//! use space_patcher::{patch_file, Directive, DirectiveSet, PatchMode, Side};
//!
//! let mut directives = DirectiveSet::new();
//! directives.insert(Directive::new(1, 3, 3, Side::Both)?)?;
//!
//! let report = patch_file("db/forms/main.xml", &directives, PatchMode::Commit)?;
//! println!("{} spaces inserted", report.insertions);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod cursor;
pub mod directive;
pub mod ledger;
pub mod patch;
pub mod report;
pub mod rewrite;
pub mod safety;
pub mod utf8;
pub mod verify;

// Re-exports
pub use config::{load_from_path, load_from_str, ConfigError, PatcherConfig};
pub use cursor::LineCursor;
pub use directive::{
    Directive, DirectiveError, DirectiveSet, OffsetConvention, ReportedIssue, Side, SideMarkers,
};
pub use patch::{patch_file, PatchError, PatchMode, PatchReport, PreparedPatch};
pub use report::{Report, ReportError, ReportFilter, DEFAULT_RULE};
pub use rewrite::{rewrite, RewriteError, RewriteStats, Rewriter};
pub use safety::{BaseDir, PathError};
pub use utf8::EncodingError;
pub use verify::VerifyError;
