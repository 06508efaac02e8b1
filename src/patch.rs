//! Per-file patch pipeline: rewrite into scratch files, verify, commit.
//!
//! The original file is only ever replaced by a single rename of a verified
//! rewrite. Scratch files live next to the original so the rename stays on
//! one filesystem.

use crate::directive::DirectiveSet;
use crate::rewrite::{rewrite, RewriteError, RewriteStats};
use crate::verify::{verify, VerifyError};
use std::fs::{self, File, Permissions};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("{file}: {source}")]
    Rewrite {
        file: PathBuf,
        #[source]
        source: RewriteError,
    },

    #[error("{file}: verification failed: {source} (kept {rewritten} and {ledger})")]
    Verification {
        file: PathBuf,
        #[source]
        source: VerifyError,
        rewritten: PathBuf,
        ledger: PathBuf,
    },

    #[error("{file}: I/O error: {source}")]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Whether a verified rewrite replaces the original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatchMode {
    #[default]
    Commit,
    /// Verify, keep the rewritten bytes for preview, leave the original alone.
    DryRun,
}

/// Outcome of a successful patch.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchReport says whether the file was committed"]
pub struct PatchReport {
    pub file: PathBuf,
    /// Verified line count.
    pub lines: usize,
    pub insertions: usize,
    pub committed: bool,
    /// Rewritten content, only in [`PatchMode::DryRun`].
    pub preview: Option<Vec<u8>>,
}

fn scratch_file(dir: &Path, name: &str, suffix: &str) -> std::io::Result<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(suffix)
        .tempfile_in(dir)
}

/// A rewrite that exists only in scratch files.
#[derive(Debug)]
pub struct PreparedPatch {
    file: PathBuf,
    permissions: Permissions,
    rewritten: NamedTempFile,
    ledger: NamedTempFile,
    stats: RewriteStats,
}

impl PreparedPatch {
    /// Rewrite `path` into scratch files. The original is not modified.
    ///
    /// Scratch files are removed if rewriting fails.
    pub fn prepare(path: impl AsRef<Path>, directives: &DirectiveSet) -> Result<Self, PatchError> {
        let file = path.as_ref().to_path_buf();
        let io_err = |source| PatchError::Io {
            file: file.clone(),
            source,
        };

        let original = File::open(&file).map_err(io_err)?;
        let permissions = original.metadata().map_err(io_err)?.permissions();

        let dir = match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut rewritten = scratch_file(dir, &name, ".patched").map_err(io_err)?;
        let mut ledger = scratch_file(dir, &name, ".ledger").map_err(io_err)?;

        let stats = rewrite(
            BufReader::new(original),
            BufWriter::new(rewritten.as_file_mut()),
            BufWriter::new(ledger.as_file_mut()),
            directives,
        )
        .map_err(|source| PatchError::Rewrite {
            file: file.clone(),
            source,
        })?;

        rewritten.as_file().sync_all().map_err(io_err)?;
        ledger.as_file().sync_all().map_err(io_err)?;

        tracing::debug!(
            file = %file.display(),
            lines = stats.lines,
            insertions = stats.insertions,
            "rewrite prepared"
        );

        Ok(Self {
            file,
            permissions,
            rewritten,
            ledger,
            stats,
        })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn rewritten_path(&self) -> &Path {
        self.rewritten.path()
    }

    pub fn ledger_path(&self) -> &Path {
        self.ledger.path()
    }

    pub fn stats(&self) -> RewriteStats {
        self.stats
    }

    /// Re-read both scratch files and compare them line by line.
    pub fn verify(&self) -> Result<usize, VerifyError> {
        let ledger = BufReader::new(self.ledger.reopen()?);
        let rewritten = BufReader::new(self.rewritten.reopen()?);
        verify(ledger, rewritten)
    }

    /// Verify, or keep the scratch files on disk and report where they are.
    fn verified(self) -> Result<(Self, usize), PatchError> {
        match self.verify() {
            Ok(lines) => Ok((self, lines)),
            Err(source) => {
                let file = self.file.clone();
                let io_err = |e: tempfile::PersistError| PatchError::Io {
                    file: file.clone(),
                    source: e.error,
                };
                let (_, rewritten) = self.rewritten.keep().map_err(io_err)?;
                let (_, ledger) = self.ledger.keep().map_err(io_err)?;
                tracing::warn!(
                    file = %file.display(),
                    error = %source,
                    rewritten = %rewritten.display(),
                    ledger = %ledger.display(),
                    "verification failed, original left untouched"
                );
                Err(PatchError::Verification {
                    file,
                    source,
                    rewritten,
                    ledger,
                })
            }
        }
    }

    /// Verify and atomically rename the rewrite over the original.
    pub fn commit(self) -> Result<PatchReport, PatchError> {
        let (patch, lines) = self.verified()?;
        let Self {
            file,
            permissions,
            rewritten,
            ledger,
            stats,
        } = patch;
        let io_err = |source| PatchError::Io {
            file: file.clone(),
            source,
        };

        fs::set_permissions(rewritten.path(), permissions).map_err(io_err)?;
        rewritten.persist(&file).map_err(|e| io_err(e.error))?;
        drop(ledger);

        tracing::info!(
            file = %file.display(),
            insertions = stats.insertions,
            "committed"
        );

        Ok(PatchReport {
            file,
            lines,
            insertions: stats.insertions,
            committed: true,
            preview: None,
        })
    }

    /// Verify and return the rewritten bytes; scratch files are discarded.
    pub fn preview(self) -> Result<PatchReport, PatchError> {
        let (patch, lines) = self.verified()?;
        let content = fs::read(patch.rewritten.path()).map_err(|source| PatchError::Io {
            file: patch.file.clone(),
            source,
        })?;

        Ok(PatchReport {
            file: patch.file,
            lines,
            insertions: patch.stats.insertions,
            committed: false,
            preview: Some(content),
        })
    }
}

/// Patch one file: rewrite, verify, then commit or preview depending on `mode`.
///
/// An empty directive set leaves the file alone.
pub fn patch_file(
    path: impl AsRef<Path>,
    directives: &DirectiveSet,
    mode: PatchMode,
) -> Result<PatchReport, PatchError> {
    let path = path.as_ref();

    if directives.is_empty() {
        tracing::debug!(file = %path.display(), "no directives, skipping");
        return Ok(PatchReport {
            file: path.to_path_buf(),
            lines: 0,
            insertions: 0,
            committed: false,
            preview: None,
        });
    }

    let prepared = PreparedPatch::prepare(path, directives)?;
    match mode {
        PatchMode::Commit => prepared.commit(),
        PatchMode::DryRun => prepared.preview(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directive::{Directive, Side};

    fn set(directives: Vec<Directive>) -> DirectiveSet {
        DirectiveSet::try_from(directives).unwrap()
    }

    fn scratch_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_commit_replaces_original() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("module.xml");
        fs::write(&file, "<a x=\"1\"/>\nfoo(bar)\n").unwrap();

        let directives = set(vec![Directive::new(2, 3, 3, Side::Both).unwrap()]);
        let report = patch_file(&file, &directives, PatchMode::Commit).unwrap();

        assert!(report.committed);
        assert_eq!(report.lines, 2);
        assert_eq!(report.insertions, 2);
        assert_eq!(
            fs::read_to_string(&file).unwrap(),
            "<a x=\"1\"/>\nfoo ( bar)\n"
        );
        // Scratch files are gone
        assert_eq!(scratch_count(temp_dir.path()), 1);
    }

    #[test]
    fn test_prepare_writes_ledger_to_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("module.xml");
        fs::write(&file, "foo(bar)\n\ta b\n").unwrap();

        let directives = set(vec![Directive::new(1, 3, 3, Side::Both).unwrap()]);
        let prepared = PreparedPatch::prepare(&file, &directives).unwrap();

        assert_eq!(fs::read_to_string(prepared.ledger_path()).unwrap(), "8\n2\n");
        assert_eq!(
            fs::read_to_string(prepared.rewritten_path()).unwrap(),
            "foo ( bar)\n\ta b\n"
        );
        assert_eq!(prepared.verify().unwrap(), 2);
    }

    #[test]
    fn test_dry_run_leaves_original() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("module.xml");
        fs::write(&file, "a,b\n").unwrap();

        let directives = set(vec![Directive::new(1, 1, 1, Side::After).unwrap()]);
        let report = patch_file(&file, &directives, PatchMode::DryRun).unwrap();

        assert!(!report.committed);
        assert_eq!(report.preview.as_deref(), Some(&b"a, b\n"[..]));
        assert_eq!(fs::read_to_string(&file).unwrap(), "a,b\n");
        assert_eq!(scratch_count(temp_dir.path()), 1);
    }

    #[test]
    fn test_rewrite_error_discards_scratch_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("module.xml");
        fs::write(&file, "abc\n").unwrap();

        let directives = set(vec![Directive::new(1, 9, 9, Side::Before).unwrap()]);
        let err = patch_file(&file, &directives, PatchMode::Commit).unwrap_err();

        assert!(matches!(
            err,
            PatchError::Rewrite {
                source: RewriteError::OffsetBeyondLine { .. },
                ..
            }
        ));
        assert_eq!(fs::read_to_string(&file).unwrap(), "abc\n");
        assert_eq!(scratch_count(temp_dir.path()), 1);
    }

    #[test]
    fn test_verification_failure_keeps_artifacts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("module.xml");
        fs::write(&file, "a,b\nc\n").unwrap();

        let directives = set(vec![Directive::new(1, 1, 1, Side::After).unwrap()]);
        let prepared = PreparedPatch::prepare(&file, &directives).unwrap();

        // Drop one non-space character from the rewrite
        fs::write(prepared.rewritten_path(), "a, \nc\n").unwrap();

        match prepared.commit().unwrap_err() {
            PatchError::Verification {
                source,
                rewritten,
                ledger,
                ..
            } => {
                assert!(matches!(
                    source,
                    VerifyError::FingerprintMismatch { line: 1, .. }
                ));
                assert!(rewritten.exists());
                assert!(ledger.exists());
            }
            other => panic!("expected verification error, got {other:?}"),
        }
        assert_eq!(fs::read_to_string(&file).unwrap(), "a,b\nc\n");
    }

    #[test]
    #[cfg(unix)]
    fn test_commit_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("script.sh");
        fs::write(&file, "a,b\n").unwrap();
        fs::set_permissions(&file, Permissions::from_mode(0o755)).unwrap();

        let directives = set(vec![Directive::new(1, 1, 1, Side::After).unwrap()]);
        let _ = patch_file(&file, &directives, PatchMode::Commit).unwrap();

        let mode = fs::metadata(&file).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[test]
    fn test_empty_directive_set_is_a_no_op() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file = temp_dir.path().join("module.xml");
        fs::write(&file, "a,b").unwrap();

        let report = patch_file(&file, &DirectiveSet::new(), PatchMode::Commit).unwrap();
        assert!(!report.committed);
        assert_eq!(fs::read_to_string(&file).unwrap(), "a,b");
    }
}
