use std::path::{Path, PathBuf};
use thiserror::Error;

/// Storage directory that reported component paths are resolved against.
///
/// Component paths come from an external report, so every resolved path is
/// canonicalized and must stay inside the base directory.
#[derive(Debug, Clone)]
pub struct BaseDir {
    /// Canonical absolute path
    root: PathBuf,
}

#[derive(Error, Debug)]
pub enum PathError {
    #[error("Path is outside base directory: {path} (base: {base})")]
    OutsideBase { path: PathBuf, base: PathBuf },

    #[error("Failed to resolve {path}: {source}")]
    Canonicalize {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn canonicalize(path: &Path) -> Result<PathBuf, PathError> {
    path.canonicalize().map_err(|source| PathError::Canonicalize {
        path: path.to_path_buf(),
        source,
    })
}

impl BaseDir {
    /// The root is canonicalized to handle symlinks correctly.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, PathError> {
        Ok(Self {
            root: canonicalize(root.as_ref())?,
        })
    }

    /// Resolve a component path to an existing file inside the base directory.
    pub fn resolve(&self, component: impl AsRef<Path>) -> Result<PathBuf, PathError> {
        let component = component.as_ref();

        let absolute = if component.is_absolute() {
            component.to_path_buf()
        } else {
            self.root.join(component)
        };

        // Resolves symlinks and .. components
        let canonical = canonicalize(&absolute)?;

        if !canonical.starts_with(&self.root) {
            return Err(PathError::OutsideBase {
                path: canonical,
                base: self.root.clone(),
            });
        }

        Ok(canonical)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
