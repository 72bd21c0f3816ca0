use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Keeps every rule-file path inside the project root and out of the
/// backup directory.
#[derive(Debug, Clone)]
pub struct WorkspaceGuard {
    /// Canonical project root
    root: PathBuf,
    /// Directories nothing may be patched in (root-relative or absolute)
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside project root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl WorkspaceGuard {
    /// Create a guard for `root`, forbidding the given directories.
    ///
    /// The root is canonicalized to handle symlinks correctly.
    pub fn new(root: impl AsRef<Path>, forbidden: Vec<PathBuf>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;
        let forbidden_paths = forbidden
            .into_iter()
            .map(|p| if p.is_absolute() { p } else { root.join(p) })
            .collect();
        Ok(Self {
            root,
            forbidden_paths,
        })
    }

    /// Resolve a root-relative path and check it is safe to read and patch.
    ///
    /// The path need not exist. Lexically it may not be absolute or climb
    /// with `..`. The canonical form of the path, or of its nearest existing
    /// ancestor when it does not exist yet, must still be under the root, so
    /// a file created later cannot land outside it through a symlinked
    /// directory.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let relative = relative.as_ref();

        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(SafetyError::OutsideRoot {
                path: relative.to_path_buf(),
                root: self.root.clone(),
            });
        }

        let joined = self.root.join(relative);
        self.check_forbidden(&joined)?;

        let existing = joined
            .ancestors()
            .find(|p| p.symlink_metadata().is_ok())
            .unwrap_or(&self.root);
        let canonical = existing.canonicalize()?;
        if !canonical.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: canonical,
                root: self.root.clone(),
            });
        }
        self.check_forbidden(&canonical)?;

        Ok(joined)
    }

    fn check_forbidden(&self, path: &Path) -> Result<(), SafetyError> {
        for forbidden in &self.forbidden_paths {
            if path.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: path.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }
        Ok(())
    }

    /// Get the canonical project root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative form of a path returned by [`resolve`](Self::resolve).
    pub fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}
