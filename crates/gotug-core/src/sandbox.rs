//! Path confinement for caller-supplied paths.
//!
//! Every path a caller hands to the engine is resolved against a workspace
//! root and must stay inside it, both lexically (no `..` escape) and after
//! following symlinks.

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::warn;

/// A caller path that resolves outside the workspace root.
#[derive(Debug, Error)]
pub enum PathViolation {
    #[error("path escapes the workspace root")]
    EscapesRoot { path: PathBuf },

    #[error("path resolves outside the workspace root through a symlink to {}", target.display())]
    SymlinkEscape { path: PathBuf, target: PathBuf },
}

impl PathViolation {
    /// The offending path as supplied by the caller.
    pub fn path(&self) -> &Path {
        match self {
            PathViolation::EscapesRoot { path } => path,
            PathViolation::SymlinkEscape { path, .. } => path,
        }
    }
}

/// Normalize `.` and `..` components without touching the filesystem.
///
/// Returns `None` when `..` would climb above the first component.
pub fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}

/// A workspace root that caller paths are confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create a sandbox rooted at `root`, which must exist.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        let root = root.as_ref().canonicalize()?;
        Ok(Sandbox { root })
    }

    /// The canonical workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `path` against the root and check that it stays inside.
    ///
    /// Relative paths are joined to the root; absolute paths are accepted
    /// only if they already lie under it. The path does not need to exist,
    /// but if it does its canonical form must also lie under the root.
    pub fn confine(&self, path: impl AsRef<Path>) -> Result<PathBuf, PathViolation> {
        let raw = path.as_ref();
        let joined = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            self.root.join(raw)
        };
        let normalized = normalize_lexically(&joined)
            .filter(|p| p.starts_with(&self.root))
            .ok_or_else(|| PathViolation::EscapesRoot {
                path: raw.to_path_buf(),
            })?;

        if let Ok(target) = normalized.canonicalize() {
            if !target.starts_with(&self.root) {
                warn!(
                    path = %raw.display(),
                    target = %target.display(),
                    "path resolves outside workspace"
                );
                return Err(PathViolation::SymlinkEscape {
                    path: raw.to_path_buf(),
                    target,
                });
            }
        }
        Ok(normalized)
    }

    /// Render an absolute path under the root as a `/`-separated relative path.
    ///
    /// Paths outside the root are returned unchanged.
    pub fn relative(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
            Ok(rel) => rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            Err(_) => path.display().to_string(),
        }
    }
}
