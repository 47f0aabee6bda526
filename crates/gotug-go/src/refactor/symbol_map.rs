//! Exported-symbol map of a package split into sub-packages.
//!
//! Each immediate subdirectory of the split package is parsed on its own
//! (non-test files only) and its exported top-level names are recorded
//! against the subdirectory's import path. Names the base package still
//! exports itself are checked too. A name contributed by two packages is a
//! conflict; any conflict fails the whole build.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gotug_core::types::SymbolConflict;
use thiserror::Error;
use tracing::{debug, info};

use crate::files::{go_files_in_dir, package_subdirs, rel_slash, FileError};
use crate::gomod::{GoModError, GoModule};
use crate::syntax::{
    self, default_package_name, first_syntax_error, is_exported, text, SyntaxError,
};

#[derive(Debug, Error)]
pub enum SymbolMapError {
    #[error("refactored package path not found: {path}")]
    NotFound { path: String },

    #[error("no go.mod found above {path}")]
    NoModule { path: String },

    #[error("{path} is outside module {module}")]
    OutsideModule { path: String, module: String },

    #[error(transparent)]
    Files(#[from] FileError),

    #[error(transparent)]
    GoMod(#[from] GoModError),

    #[error(transparent)]
    Parser(#[from] SyntaxError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{diagnostic}")]
    Syntax { diagnostic: String },

    #[error("ambiguous symbols: {}", format_conflicts(.conflicts))]
    Ambiguous { conflicts: Vec<SymbolConflict> },
}

fn format_conflicts(conflicts: &[SymbolConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Where a moved symbol now lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovedSymbol {
    pub import_path: String,
    /// Package clause name of the sub-package.
    pub package_name: String,
}

/// Exported name -> new home, for one split package.
#[derive(Debug, Clone)]
pub struct SymbolMap {
    /// Canonical directory of the split package.
    pub base_dir: PathBuf,
    /// Import path of the split package.
    pub base_import_path: String,
    /// Package clause name of the split package, which default imports of
    /// it bind.
    pub base_package_name: String,
    pub symbols: BTreeMap<String, MovedSymbol>,
}

impl SymbolMap {
    pub fn get(&self, name: &str) -> Option<&MovedSymbol> {
        self.symbols.get(name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

/// One parsed package directory.
struct DirPackage {
    name: String,
    exports: Vec<String>,
}

/// Build the symbol map for the package in `base_dir`.
pub fn build_symbol_map(base_dir: &Path) -> Result<SymbolMap, SymbolMapError> {
    let base_dir = fs::canonicalize(base_dir)
        .ok()
        .filter(|p| p.is_dir())
        .ok_or_else(|| SymbolMapError::NotFound {
            path: base_dir.display().to_string(),
        })?;
    let module = GoModule::find(&base_dir)?;

    let base = scan_dir(&base_dir)?;
    let mut subs = Vec::new();
    for dir in package_subdirs(&base_dir)? {
        if let Some(pkg) = scan_dir(&dir)? {
            subs.push((dir, pkg));
        }
    }

    let import_path = |dir: &Path| -> Result<String, SymbolMapError> {
        let module = module.as_ref().ok_or_else(|| SymbolMapError::NoModule {
            path: base_dir.display().to_string(),
        })?;
        module
            .import_path(dir)
            .ok_or_else(|| SymbolMapError::OutsideModule {
                path: dir.display().to_string(),
                module: module.path.clone(),
            })
    };

    if base.is_none() && subs.is_empty() {
        debug!(dir = %base_dir.display(), "no Go files; empty symbol map");
        let base_import_path = module
            .as_ref()
            .and_then(|m| m.import_path(&base_dir))
            .unwrap_or_default();
        return Ok(SymbolMap {
            base_package_name: default_package_name(&base_import_path),
            base_import_path,
            base_dir,
            symbols: BTreeMap::new(),
        });
    }

    let base_import_path = import_path(&base_dir)?;
    let base_package_name = match &base {
        Some(pkg) => pkg.name.clone(),
        None => default_package_name(&base_import_path),
    };
    let mut conflicts = Vec::new();
    let retained: Vec<String> = base.map(|b| b.exports).unwrap_or_default();
    let mut symbols: BTreeMap<String, MovedSymbol> = BTreeMap::new();

    for (dir, pkg) in subs {
        let path = import_path(&dir)?;
        debug!(package = %path, exports = pkg.exports.len(), "sub-package");
        for name in pkg.exports {
            if retained.contains(&name) {
                conflicts.push(SymbolConflict {
                    name: name.clone(),
                    first: base_import_path.clone(),
                    second: path.clone(),
                });
            }
            match symbols.get(&name) {
                Some(existing) if existing.import_path != path => {
                    conflicts.push(SymbolConflict {
                        name: name.clone(),
                        first: existing.import_path.clone(),
                        second: path.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    symbols.insert(
                        name,
                        MovedSymbol {
                            import_path: path.clone(),
                            package_name: pkg.name.clone(),
                        },
                    );
                }
            }
        }
    }

    if !conflicts.is_empty() {
        return Err(SymbolMapError::Ambiguous { conflicts });
    }
    info!(package = %base_import_path, symbols = symbols.len(), "built symbol map");
    Ok(SymbolMap {
        base_dir,
        base_import_path,
        base_package_name,
        symbols,
    })
}

/// Parse the non-test Go files directly in `dir`. `None` if there are none.
fn scan_dir(dir: &Path) -> Result<Option<DirPackage>, SymbolMapError> {
    let files = go_files_in_dir(dir, false)?;
    if files.is_empty() {
        return Ok(None);
    }
    let mut name = None;
    let mut exports = Vec::new();
    for path in files {
        let source = fs::read_to_string(&path).map_err(|source| SymbolMapError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let tree = syntax::parse(&source)?;
        if let Some(diag) = first_syntax_error(&tree, &source) {
            return Err(SymbolMapError::Syntax {
                diagnostic: diag.render(&rel_slash(dir, &path)),
            });
        }
        let root = tree.root_node();
        if name.is_none() {
            name = syntax::package_name(root, &source).map(str::to_string);
        }
        for decl in syntax::top_level_names(root) {
            let ident = text(decl.ident, &source);
            if is_exported(ident) && !exports.iter().any(|e| e == ident) {
                exports.push(ident.to_string());
            }
        }
    }
    let name = name.unwrap_or_else(|| {
        dir.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    });
    Ok(Some(DirPackage { name, exports }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let p = dir.path().join(path);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        dir
    }

    const GO_MOD: (&str, &str) = ("go.mod", "module example.com/m\n");

    #[test]
    fn maps_exports_of_each_sub_package() {
        let dir = workspace(&[
            GO_MOD,
            (
                "pkg/refactored/sub1/sub1.go",
                "package sub1\n\nfunc FuncS1() {}\n\nvar VarS1 = 1\n\ntype TypeS1 struct{}\n\nfunc helper() {}\n\nfunc (TypeS1) Method() {}\n",
            ),
            (
                "pkg/refactored/sub2/sub2.go",
                "package sub2\n\nfunc FuncS2() {}\n\nconst (\n\tConstS2, other = 1, 2\n)\n",
            ),
            ("pkg/refactored/sub2/sub2_test.go", "package sub2\n\nfunc TestOnly() {}\n"),
        ]);
        let map = build_symbol_map(&dir.path().join("pkg/refactored")).unwrap();
        assert_eq!(map.base_import_path, "example.com/m/pkg/refactored");
        assert_eq!(map.base_package_name, "refactored");
        let names: Vec<&str> = map.symbols.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["ConstS2", "FuncS1", "FuncS2", "TypeS1", "VarS1"]);
        let s1 = map.get("FuncS1").unwrap();
        assert_eq!(s1.import_path, "example.com/m/pkg/refactored/sub1");
        assert_eq!(s1.package_name, "sub1");
    }

    #[test]
    fn duplicate_exports_are_ambiguous() {
        let dir = workspace(&[
            GO_MOD,
            ("pkg/r/a/a.go", "package a\n\nfunc Shared() {}\n"),
            ("pkg/r/b/b.go", "package b\n\nvar Shared = 1\n"),
        ]);
        let err = build_symbol_map(&dir.path().join("pkg/r")).unwrap_err();
        let SymbolMapError::Ambiguous { conflicts } = &err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].name, "Shared");
        assert_eq!(conflicts[0].first, "example.com/m/pkg/r/a");
        assert_eq!(conflicts[0].second, "example.com/m/pkg/r/b");
        assert!(err.to_string().contains("Shared"));
    }

    #[test]
    fn retained_base_export_conflicts_with_sub_package() {
        let dir = workspace(&[
            GO_MOD,
            ("pkg/r/r.go", "package r\n\nfunc Keep() {}\n"),
            ("pkg/r/a/a.go", "package a\n\nfunc Keep() {}\n\nfunc Moved() {}\n"),
        ]);
        let err = build_symbol_map(&dir.path().join("pkg/r")).unwrap_err();
        let SymbolMapError::Ambiguous { conflicts } = err else {
            panic!("expected ambiguity");
        };
        assert_eq!(conflicts[0].first, "example.com/m/pkg/r");
    }

    #[test]
    fn base_package_name_comes_from_its_package_clause() {
        let dir = workspace(&[
            GO_MOD,
            ("pkg/r/r.go", "package legacy\n\nfunc Keep() {}\n"),
            ("pkg/r/a/a.go", "package a\n\nfunc Moved() {}\n"),
        ]);
        let map = build_symbol_map(&dir.path().join("pkg/r")).unwrap();
        assert_eq!(map.base_package_name, "legacy");
    }

    #[test]
    fn empty_directory_is_an_empty_map() {
        let dir = workspace(&[GO_MOD, ("pkg/r/README.md", "moved\n")]);
        let map = build_symbol_map(&dir.path().join("pkg/r")).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn missing_directory_is_not_found() {
        let dir = workspace(&[GO_MOD]);
        let err = build_symbol_map(&dir.path().join("pkg/nope")).unwrap_err();
        assert!(matches!(err, SymbolMapError::NotFound { .. }));
    }

    #[test]
    fn syntax_error_in_sub_package_is_fatal() {
        let dir = workspace(&[GO_MOD, ("pkg/r/a/a.go", "package a\n\nfunc Broken( {\n")]);
        let err = build_symbol_map(&dir.path().join("pkg/r")).unwrap_err();
        assert!(matches!(err, SymbolMapError::Syntax { .. }));
    }
}
