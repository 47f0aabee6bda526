//! The engine behind both front doors.
//!
//! An [`Engine`] owns a workspace [`Sandbox`], a [`HandleRegistry`] of code
//! indexes, and the configuration for import rewrites. Every operation takes
//! workspace-relative paths, confines them to the workspace, and returns a
//! JSON-ready response or a [`GotugError`].
//!
//! Queries are the exception: their file paths, in and out, are relative to
//! the root of the index named by the handle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use gotug_core::error::GotugError;
use gotug_core::handles::HandleRegistry;
use gotug_core::output::{
    DeclarationResponse, IndexResponse, ReleaseResponse, UpdateImportsResponse, UsagesResponse,
};
use gotug_core::sandbox::Sandbox;
use gotug_go::{
    find_declaration, find_usages, update_imports_for_moved_package, CodeIndex, Formatter,
    UpdateImportsOptions,
};
use tracing::{debug, info};

// ============================================================================
// Configuration
// ============================================================================

/// Engine settings that are not per-request.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Formatter applied to rewritten files.
    pub formatter: Formatter,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            formatter: Formatter::Disabled,
        }
    }
}

impl EngineConfig {
    /// Configuration from front-door flags: `--no-format` wins over
    /// `--gofmt`, which wins over `$GOTUG_GOFMT` and `PATH`.
    pub fn from_flags(gofmt: Option<&Path>, no_format: bool) -> Self {
        let formatter = if no_format {
            Formatter::Disabled
        } else {
            Formatter::detect(gofmt)
        };
        EngineConfig { formatter }
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Debug)]
pub struct Engine {
    sandbox: Sandbox,
    handles: HandleRegistry,
    config: EngineConfig,
}

impl Engine {
    /// Create an engine for the workspace at `root`, which must exist.
    pub fn new(root: impl AsRef<Path>, config: EngineConfig) -> Result<Self, GotugError> {
        let root = root.as_ref();
        let sandbox = Sandbox::new(root).map_err(|e| {
            GotugError::invalid_args(format!("workspace {}: {}", root.display(), e))
        })?;
        Ok(Engine {
            sandbox,
            handles: HandleRegistry::new(),
            config,
        })
    }

    pub fn workspace_root(&self) -> &Path {
        self.sandbox.root()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Confine `path` and require an existing directory.
    fn existing_dir(&self, path: &str, what: &str) -> Result<PathBuf, GotugError> {
        let confined = self.sandbox.confine(path)?;
        confined
            .canonicalize()
            .ok()
            .filter(|p| p.is_dir())
            .ok_or_else(|| GotugError::invalid_args(format!("{} is not a directory: {}", what, path)))
    }

    // ========================================================================
    // Index
    // ========================================================================

    /// Index the Go packages under `directory` and register the index.
    pub fn index_code(&self, directory: &str) -> Result<IndexResponse, GotugError> {
        let dir = self.existing_dir(directory, "directory")?;
        let index = CodeIndex::build(&dir)?;
        let response_root = self.sandbox.relative(&index.root);
        let module_path = index.module_path.clone();
        let packages = index.package_count;
        let files = index.file_count();
        let diagnostics = index.diagnostics.clone();

        let handle = self.handles.register(index);
        info!(handle = %handle, root = %response_root, packages, files, "indexed");
        Ok(IndexResponse::new(
            handle,
            response_root,
            module_path,
            packages,
            files,
            diagnostics,
            chrono::Utc::now().to_rfc3339(),
        ))
    }

    /// Drop the index named by `handle`.
    pub fn release_handle(&self, handle: &str) -> Result<ReleaseResponse, GotugError> {
        self.handles.release(handle)?;
        Ok(ReleaseResponse::new(handle))
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Map a path relative to the index root onto the index, or `None` if
    /// it leaves the indexed directory.
    fn index_path(&self, index: &CodeIndex, path: &str) -> Result<Option<String>, GotugError> {
        let abs = self.sandbox.confine(index.root.join(path))?;
        let abs = abs.canonicalize().unwrap_or(abs);
        Ok(abs.strip_prefix(&index.root).ok().map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/")
        }))
    }

    pub fn find_declaration(
        &self,
        handle: &str,
        path: &str,
        line: i64,
        col: i64,
    ) -> Result<DeclarationResponse, GotugError> {
        let index = self.handles.resolve::<CodeIndex>(handle)?;
        let Some(rel) = self.index_path(&index, path)? else {
            if line <= 0 || col <= 0 {
                return Err(GotugError::invalid_args(format!(
                    "line and column must be >= 1, got {}:{}",
                    line, col
                )));
            }
            debug!(path, "file outside index");
            return Ok(DeclarationResponse::new(None));
        };
        let declaration = find_declaration(&index, &rel, line, col)?;
        Ok(DeclarationResponse::new(declaration))
    }

    pub fn find_usages(
        &self,
        handle: &str,
        path: &str,
        line: i64,
        col: i64,
    ) -> Result<UsagesResponse, GotugError> {
        let index = self.handles.resolve::<CodeIndex>(handle)?;
        let Some(rel) = self.index_path(&index, path)? else {
            if line <= 0 || col <= 0 {
                return Err(GotugError::invalid_args(format!(
                    "line and column must be >= 1, got {}:{}",
                    line, col
                )));
            }
            return Ok(UsagesResponse::new(Vec::new()));
        };
        let usages = find_usages(&index, &rel, line, col)?;
        Ok(UsagesResponse::new(usages))
    }

    // ========================================================================
    // Import Rewrite
    // ========================================================================

    /// Rewrite imports under `scope` after the package in `package` was split
    /// into sub-packages.
    pub fn update_imports(
        &self,
        package: &str,
        scope: &str,
        dry_run: bool,
    ) -> Result<UpdateImportsResponse, GotugError> {
        let refactored = self.sandbox.confine(package)?;
        let scope = self.existing_dir(scope, "scan scope")?;
        let options = UpdateImportsOptions {
            dry_run,
            formatter: self.config.formatter.clone(),
        };
        let report = update_imports_for_moved_package(&refactored, &scope, &options)?;

        let modified = report
            .modified()
            .into_iter()
            .map(|p| self.sandbox.relative(p))
            .collect();
        let skipped: BTreeMap<String, String> = report
            .skipped()
            .into_iter()
            .map(|(p, reason)| (self.sandbox.relative(p), reason.to_string()))
            .collect();
        let failed: BTreeMap<String, String> = report
            .failed()
            .into_iter()
            .map(|(p, reason)| (self.sandbox.relative(p), reason.to_string()))
            .collect();
        let diffs: BTreeMap<String, String> = report
            .diffs
            .iter()
            .map(|(p, diff)| (self.sandbox.relative(p), diff.clone()))
            .collect();
        Ok(UpdateImportsResponse::new(
            modified, skipped, failed, dry_run, diffs,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotug_core::types::Location;
    use std::fs;
    use tempfile::TempDir;

    fn engine(files: &[(&str, &str)]) -> (TempDir, Engine) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let p = dir.path().join(path);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        let engine = Engine::new(dir.path(), EngineConfig::default()).unwrap();
        (dir, engine)
    }

    #[test]
    fn no_format_flag_disables_formatter() {
        let config = EngineConfig::from_flags(Some(Path::new("/usr/bin/gofmt")), true);
        assert_eq!(config.formatter, Formatter::Disabled);
        let config = EngineConfig::from_flags(Some(Path::new("/usr/bin/gofmt")), false);
        assert_eq!(config.formatter, Formatter::gofmt("/usr/bin/gofmt"));
    }

    #[test]
    fn missing_workspace_is_invalid_arguments() {
        let err = Engine::new("/nonexistent/gotug/workspace", EngineConfig::default()).unwrap_err();
        assert!(matches!(err, GotugError::InvalidArguments { .. }));
    }

    #[test]
    fn query_paths_are_index_relative() {
        let (_dir, engine) = engine(&[(
            "svc/a.go",
            "package a\n\nfunc A() {}\n\nfunc B() { A() }\n",
        )]);
        let index = engine.index_code("svc").unwrap();
        assert_eq!(index.root, "svc");
        assert_eq!(index.handle, "index_1");

        let decl = engine
            .find_declaration(&index.handle, "a.go", 5, 12)
            .unwrap()
            .declaration
            .unwrap();
        assert_eq!(decl.location, Location::new("a.go", 3, 6));

        let usages = engine.find_usages(&index.handle, "a.go", 3, 6).unwrap().usages;
        assert_eq!(usages.len(), 1);
        assert_eq!(usages[0].location, Location::new("a.go", 5, 12));

        let missing = engine
            .find_declaration(&index.handle, "svc/a.go", 5, 12)
            .unwrap();
        assert!(missing.declaration.is_none());
    }

    #[test]
    fn file_outside_index_is_not_found() {
        let (_dir, engine) = engine(&[
            ("svc/a.go", "package a\n\nfunc A() {}\n"),
            ("other/b.go", "package b\n\nfunc B() {}\n"),
        ]);
        let index = engine.index_code("svc").unwrap();
        let decl = engine.find_declaration(&index.handle, "../other/b.go", 3, 6).unwrap();
        assert!(decl.declaration.is_none());
        let err = engine.find_usages(&index.handle, "../other/b.go", 0, 6).unwrap_err();
        assert!(matches!(err, GotugError::InvalidArguments { .. }));
    }

    #[test]
    fn escaping_paths_are_violations() {
        let (_dir, engine) = engine(&[("a.go", "package a\n")]);
        let err = engine.index_code("../..").unwrap_err();
        assert!(matches!(err, GotugError::PathViolation { .. }));

        let handle = engine.index_code(".").unwrap().handle;
        let err = engine
            .find_declaration(&handle, "../escape.go", 1, 1)
            .unwrap_err();
        assert!(matches!(err, GotugError::PathViolation { .. }));
    }
}
