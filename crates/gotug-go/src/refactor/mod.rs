//! Rewrite imports after a package has been split into sub-packages.
//!
//! [`update_imports_for_moved_package`] runs the pipeline:
//!
//! 1. Build the [`SymbolMap`] of the split package (fatal on ambiguity)
//! 2. Load every package in the scan scope, excluding the split subtree
//! 3. Per file: fail on syntax or type errors, skip, or rewrite qualifiers
//!    and imports
//! 4. Validate, format and write each rewritten file (or diff it on a dry run)
//!
//! Per-file problems never abort the run; they are reported as
//! [`FileOutcome::Failed`]. A file is either left byte-for-byte untouched or
//! replaced whole.

pub mod analyze;
pub mod surgeon;
pub mod symbol_map;

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use gotug_core::diff::unified_diff;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::format::{FormatError, Formatter};
use crate::loader::{load_program, Excluded, LoadError, SourceFile};
use crate::syntax::{self, first_syntax_error};

pub use analyze::{analyze_file, Analysis, RewritePlan, SkipReason};
pub use surgeon::{add_import, remove_import, SurgeryError};
pub use symbol_map::{build_symbol_map, MovedSymbol, SymbolMap, SymbolMapError};

// ============================================================================
// Error Types
// ============================================================================

/// Pipeline-fatal errors. Nothing has been written when one is returned.
#[derive(Debug, Error)]
pub enum RewriteError {
    #[error(transparent)]
    SymbolMap(#[from] SymbolMapError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("scan scope not found: {path}")]
    ScopeNotFound { path: String },
}

/// Why one file could not be rewritten.
#[derive(Debug, Error)]
enum ApplyError {
    #[error("import surgery failed: {0}")]
    Surgery(#[from] SurgeryError),

    #[error("rewritten source is invalid: {diagnostic}")]
    Invalid { diagnostic: String },

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("failed to write file: {0}")]
    Write(#[from] io::Error),
}

// ============================================================================
// Options and Report
// ============================================================================

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct UpdateImportsOptions {
    /// Compute outcomes and diffs without writing.
    pub dry_run: bool,
    pub formatter: Formatter,
}

impl Default for UpdateImportsOptions {
    fn default() -> Self {
        UpdateImportsOptions {
            dry_run: false,
            formatter: Formatter::Disabled,
        }
    }
}

/// What happened to one candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Modified { path: PathBuf },
    Skipped { path: PathBuf, reason: SkipReason },
    Failed { path: PathBuf, reason: String },
}

impl FileOutcome {
    pub fn path(&self) -> &Path {
        match self {
            FileOutcome::Modified { path }
            | FileOutcome::Skipped { path, .. }
            | FileOutcome::Failed { path, .. } => path,
        }
    }
}

/// Outcome of every candidate file, in load order. Paths are absolute.
#[derive(Debug, Clone, Default)]
pub struct UpdateImportsReport {
    pub outcomes: Vec<FileOutcome>,
    /// Unified diff per modified file; filled on dry runs only.
    pub diffs: BTreeMap<PathBuf, String>,
}

impl UpdateImportsReport {
    pub fn modified(&self) -> Vec<&Path> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                FileOutcome::Modified { path } => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn skipped(&self) -> Vec<(&Path, SkipReason)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                FileOutcome::Skipped { path, reason } => Some((path.as_path(), *reason)),
                _ => None,
            })
            .collect()
    }

    pub fn failed(&self) -> Vec<(&Path, &str)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                FileOutcome::Failed { path, reason } => Some((path.as_path(), reason.as_str())),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Rewrite every file under `scope` that uses symbols moved out of the
/// package in `refactored` into its sub-packages.
pub fn update_imports_for_moved_package(
    refactored: &Path,
    scope: &Path,
    options: &UpdateImportsOptions,
) -> Result<UpdateImportsReport, RewriteError> {
    let map = build_symbol_map(refactored)?;
    let scope = fs::canonicalize(scope)
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| RewriteError::ScopeNotFound {
            path: scope.display().to_string(),
        })?;

    info!(
        package = %map.base_import_path,
        scope = %scope.display(),
        symbols = map.len(),
        dry_run = options.dry_run,
        "updating imports"
    );

    let excluded = Excluded {
        dir: &map.base_dir,
        import_path: &map.base_import_path,
        name: &map.base_package_name,
    };
    let program = match load_program(&scope, Some(excluded)) {
        Ok(program) => program,
        Err(LoadError::NoPackages { path }) => {
            info!(scope = %path, "no candidate packages");
            return Ok(UpdateImportsReport::default());
        }
        Err(err) => return Err(err.into()),
    };

    let mut report = UpdateImportsReport::default();
    for file in &program.files {
        let path = file.abs_path.clone();
        let problem = file.syntax_error.as_ref().or(file.type_error.as_ref());
        let outcome = if let Some(diag) = problem {
            FileOutcome::Failed {
                path,
                reason: diag.render(&file.path),
            }
        } else {
            match analyze_file(&program, file, &map) {
                Analysis::Skip(reason) => FileOutcome::Skipped { path, reason },
                Analysis::Conflict(reason) => FileOutcome::Failed { path, reason },
                Analysis::Rewrite(plan) => {
                    match apply(file, &plan, &map.base_import_path, options) {
                        Ok(Some(diff)) => {
                            report.diffs.insert(path.clone(), diff);
                            FileOutcome::Modified { path }
                        }
                        Ok(None) => FileOutcome::Modified { path },
                        Err(err) => FileOutcome::Failed {
                            path,
                            reason: err.to_string(),
                        },
                    }
                }
            }
        };
        match &outcome {
            FileOutcome::Modified { .. } => info!(file = %file.path, "modified"),
            FileOutcome::Skipped { reason, .. } => debug!(file = %file.path, %reason, "skipped"),
            FileOutcome::Failed { reason, .. } => warn!(file = %file.path, %reason, "failed"),
        }
        report.outcomes.push(outcome);
    }

    info!(
        modified = report.modified().len(),
        skipped = report.skipped().len(),
        failed = report.failed().len(),
        "import update finished"
    );
    Ok(report)
}

/// Rewrite one file. Returns the diff on a dry run.
fn apply(
    file: &SourceFile,
    plan: &RewritePlan,
    old_path: &str,
    options: &UpdateImportsOptions,
) -> Result<Option<String>, ApplyError> {
    let rewritten = surgeon::apply_plan(&file.source, plan, old_path)?;
    validate(&rewritten, &file.path)?;
    let formatted = options.formatter.format(&rewritten)?;
    validate(&formatted, &file.path)?;

    if options.dry_run {
        return Ok(Some(unified_diff(&file.path, &file.source, &formatted)));
    }
    write_atomic(&file.abs_path, &formatted)?;
    Ok(None)
}

fn validate(source: &str, path: &str) -> Result<(), ApplyError> {
    let tree = syntax::parse(source).map_err(SurgeryError::from)?;
    match first_syntax_error(&tree, source) {
        Some(diag) => Err(ApplyError::Invalid {
            diagnostic: diag.render(path),
        }),
        None => Ok(()),
    }
}

/// Replace `path` with `content` through a sibling temp file carrying the
/// original permission bits.
fn write_atomic(path: &Path, content: &str) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = fs::metadata(path).map(|m| m.permissions()).ok();

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    match permissions {
        Some(perms) => fs::set_permissions(tmp.path(), perms)?,
        None => set_default_permissions(tmp.path())?,
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn set_default_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn set_default_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
