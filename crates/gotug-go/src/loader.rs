//! Package loading: the Indexer.
//!
//! [`load_program`] collects the Go files under a directory, parses them,
//! groups them into packages (one per directory and package clause, so
//! external `_test` packages stand alone), and runs the resolver over all of
//! them. Syntax and type errors are kept as per-file diagnostics; only
//! finding no packages at all is fatal.
//!
//! [`CodeIndex`] is the query-side view of a program: it keeps the position
//! table, the identifier tables and a flat list of identifier spans per file,
//! and drops the syntax trees.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gotug_core::handles::HandleKind;
use gotug_core::position::{FileId, PositionTable};
use thiserror::Error;
use tracing::{debug, info, warn};
use tree_sitter::Tree;

use crate::files::{collect_go_files, is_test_file, rel_slash, FileError};
use crate::gomod::{GoModError, GoModule};
use crate::objects::{ObjectId, PkgId, TypeInfo};
use crate::resolver::check_program;
use crate::syntax::{self, first_syntax_error, Diagnostic, SyntaxError};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Files(#[from] FileError),

    #[error(transparent)]
    GoMod(#[from] GoModError),

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("no Go packages found in {path}")]
    NoPackages { path: String },
}

// ============================================================================
// Program
// ============================================================================

/// One parsed source file.
pub struct SourceFile {
    pub id: FileId,
    /// Path relative to the program root, `/`-separated.
    pub path: String,
    pub abs_path: PathBuf,
    pub source: String,
    pub tree: Tree,
    pub package: PkgId,
    pub is_test: bool,
    pub syntax_error: Option<Diagnostic>,
    /// First identifier the resolver could not find in any scope.
    pub type_error: Option<Diagnostic>,
}

/// A package: the files sharing one directory and package clause.
#[derive(Debug, Clone)]
pub struct Package {
    pub id: PkgId,
    pub name: String,
    pub import_path: String,
    /// Directory relative to the program root.
    pub dir: String,
    /// Indices into [`Program::files`].
    pub files: Vec<usize>,
    /// Package-level declarations.
    pub scope: HashMap<String, ObjectId>,
}

/// Loaded and resolved packages under one root.
pub struct Program {
    pub root: PathBuf,
    pub module: Option<GoModule>,
    pub positions: PositionTable,
    /// Indexed by `FileId`.
    pub files: Vec<SourceFile>,
    pub packages: Vec<Package>,
    pub info: TypeInfo,
    pub diagnostics: Vec<String>,
}

impl Program {
    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }
}

/// A package left out of a load. Default imports of it bind `name`.
#[derive(Debug, Clone, Copy)]
pub struct Excluded<'e> {
    pub dir: &'e Path,
    pub import_path: &'e str,
    pub name: &'e str,
}

/// Load every package under `root`, skipping the subtree of `exclude`.
pub fn load_program(root: &Path, exclude: Option<Excluded<'_>>) -> Result<Program, LoadError> {
    let paths = collect_go_files(root, exclude.map(|e| e.dir))?;
    let module = GoModule::find(root)?;
    info!(root = %root.display(), files = paths.len(), "loading Go packages");

    let mut positions = PositionTable::new();
    let mut diagnostics = Vec::new();
    let mut parsed = Vec::new();

    for abs_path in paths {
        let rel = rel_slash(root, &abs_path);
        let source = match fs::read_to_string(&abs_path) {
            Ok(s) => s,
            Err(source) => {
                // Unreadable files are reported, not fatal.
                let err = LoadError::Read {
                    path: rel.clone(),
                    source,
                };
                warn!("{}", err);
                diagnostics.push(err.to_string());
                continue;
            }
        };
        let tree = syntax::parse(&source)?;
        let syntax_error = first_syntax_error(&tree, &source);
        if let Some(diag) = &syntax_error {
            diagnostics.push(diag.render(&rel));
        }
        let pkg_name = syntax::package_name(tree.root_node(), &source)
            .unwrap_or("")
            .to_string();
        let id = positions.add_file(rel.clone(), source.as_bytes());
        parsed.push((id, rel, abs_path, source, tree, pkg_name, syntax_error));
    }

    // (dir, package name) -> file indices, in path order
    let mut groups: BTreeMap<(String, String), Vec<usize>> = BTreeMap::new();
    for (idx, (_, rel, _, _, _, pkg_name, _)) in parsed.iter().enumerate() {
        let dir = match rel.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => ".".to_string(),
        };
        groups
            .entry((dir, pkg_name.clone()))
            .or_default()
            .push(idx);
    }

    if groups.is_empty() {
        return Err(LoadError::NoPackages {
            path: root.display().to_string(),
        });
    }

    let mut packages = Vec::new();
    let mut file_pkg = vec![PkgId(0); parsed.len()];
    for ((dir, name), members) in groups {
        let id = PkgId(packages.len() as u32);
        let dir_abs = if dir == "." {
            root.to_path_buf()
        } else {
            root.join(&dir)
        };
        let mut import_path = module
            .as_ref()
            .and_then(|m| m.import_path(&dir_abs))
            .unwrap_or_else(|| dir.clone());
        if name.ends_with("_test") {
            import_path.push_str("_test");
        }
        for &m in &members {
            file_pkg[m] = id;
        }
        debug!(package = %name, import_path = %import_path, files = members.len(), "package");
        packages.push(Package {
            id,
            name,
            import_path,
            dir,
            files: members,
            scope: HashMap::new(),
        });
    }

    let mut files: Vec<SourceFile> = parsed
        .into_iter()
        .enumerate()
        .map(
            |(idx, (id, path, abs_path, source, tree, _, syntax_error))| SourceFile {
                id,
                is_test: is_test_file(&abs_path),
                path,
                abs_path,
                source,
                tree,
                package: file_pkg[idx],
                syntax_error,
                type_error: None,
            },
        )
        .collect();

    let mut info = TypeInfo::new();
    let external: HashMap<String, String> = exclude
        .map(|e| (e.import_path.to_string(), e.name.to_string()))
        .into_iter()
        .collect();
    let type_errors = check_program(&files, &mut packages, &positions, &mut info, &external);
    for (file, type_error) in files.iter_mut().zip(type_errors) {
        // A syntax error already explains the file.
        if file.syntax_error.is_some() {
            continue;
        }
        if let Some(diag) = &type_error {
            debug!(file = %file.path, error = %diag.message, "type error");
            diagnostics.push(diag.render(&file.path));
        }
        file.type_error = type_error;
    }
    info!(
        packages = packages.len(),
        objects = info.objects.len(),
        uses = info.uses.len(),
        "resolved packages"
    );

    Ok(Program {
        root: root.to_path_buf(),
        module,
        positions,
        files,
        packages,
        info,
        diagnostics,
    })
}

// ============================================================================
// CodeIndex
// ============================================================================

/// Span of one identifier node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentSite {
    pub start: u32,
    pub end: u32,
    /// Depth of the node in the syntax tree.
    pub depth: u32,
}

/// An immutable, queryable index of a loaded source tree.
pub struct CodeIndex {
    pub root: PathBuf,
    pub module_path: Option<String>,
    pub positions: PositionTable,
    /// Identifier spans per file, indexed by `FileId`.
    pub idents: Vec<Vec<IdentSite>>,
    pub info: TypeInfo,
    pub package_count: usize,
    pub diagnostics: Vec<String>,
}

impl HandleKind for CodeIndex {
    const TAG: &'static str = "code_index";
    const PREFIX: &'static str = "index";
}

impl std::fmt::Debug for CodeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeIndex")
            .field("root", &self.root)
            .field("files", &self.positions.file_count())
            .field("packages", &self.package_count)
            .finish()
    }
}

impl CodeIndex {
    /// Load `root` and build an index over it.
    pub fn build(root: &Path) -> Result<CodeIndex, LoadError> {
        Ok(CodeIndex::from_program(load_program(root, None)?))
    }

    pub fn from_program(program: Program) -> CodeIndex {
        let idents = program
            .files
            .iter()
            .map(|f| collect_idents(&f.tree))
            .collect();
        CodeIndex {
            root: program.root,
            module_path: program.module.map(|m| m.path),
            package_count: program.packages.len(),
            positions: program.positions,
            idents,
            info: program.info,
            diagnostics: program.diagnostics,
        }
    }

    pub fn file_count(&self) -> usize {
        self.positions.file_count()
    }
}

fn collect_idents(tree: &Tree) -> Vec<IdentSite> {
    let mut out = Vec::new();
    let mut stack = vec![(tree.root_node(), 0u32)];
    while let Some((node, depth)) = stack.pop() {
        if syntax::is_identifier_kind(node.kind()) {
            out.push(IdentSite {
                start: node.start_byte() as u32,
                end: node.end_byte() as u32,
                depth,
            });
        }
        for child in syntax::named_children(node) {
            stack.push((child, depth + 1));
        }
    }
    out.sort_by_key(|s| (s.start, s.end));
    out
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

    #[test]
    fn groups_files_into_packages() {
        let dir = workspace(&[
            ("go.mod", "module example.com/m\n"),
            ("main.go", "package main\n\nfunc main() {}\n"),
            ("pkg/a/a.go", "package a\n\nfunc A() {}\n"),
            ("pkg/a/a_test.go", "package a\n\nfunc helper() {}\n"),
            ("pkg/a/ext_test.go", "package a_test\n"),
        ]);
        let program = load_program(dir.path(), None).unwrap();
        let paths: Vec<&str> = program
            .packages
            .iter()
            .map(|p| p.import_path.as_str())
            .collect();
        assert_eq!(
            paths,
            vec!["example.com/m", "example.com/m/pkg/a", "example.com/m/pkg/a_test"]
        );
        let a = &program.packages[1];
        assert_eq!(a.files.len(), 2);
        assert!(a.scope.contains_key("A"));
        assert!(a.scope.contains_key("helper"));
    }

    #[test]
    fn syntax_errors_are_diagnostics() {
        let dir = workspace(&[
            ("ok.go", "package p\n\nfunc F() {}\n"),
            ("bad.go", "package p\n\nfunc G( {\n"),
        ]);
        let program = load_program(dir.path(), None).unwrap();
        assert_eq!(program.files.len(), 2);
        assert_eq!(program.diagnostics.len(), 1);
        assert!(program.diagnostics[0].starts_with("bad.go:"));
        assert!(program.files[0].syntax_error.is_some());
    }

    #[test]
    fn undefined_identifiers_are_type_errors() {
        let dir = workspace(&[
            ("a.go", "package p\n\nfunc F() int {\n\treturn missing() + len(\"x\")\n}\n"),
            ("b.go", "package p\n\nvar v Unknown\n"),
            ("c.go", "package p\n\nfunc G() int { return F() }\n"),
        ]);
        let program = load_program(dir.path(), None).unwrap();
        let errors: Vec<Option<String>> = program
            .files
            .iter()
            .map(|f| f.type_error.as_ref().map(|d| d.render(&f.path)))
            .collect();
        assert_eq!(
            errors,
            vec![
                Some("a.go:4:9: undefined: missing".to_string()),
                Some("b.go:3:7: undefined: Unknown".to_string()),
                None,
            ]
        );
        assert_eq!(program.diagnostics.len(), 2);
    }

    #[test]
    fn unloaded_imports_are_not_type_errors() {
        let dir = workspace(&[
            (
                "a.go",
                "package p\n\nimport (\n\t\"fmt\"\n\t\"example.com/go-yaml\"\n)\n\nfunc F() { fmt.Println(yaml.Marshal) }\n",
            ),
            (
                "b.go",
                "package p\n\nimport . \"strings\"\n\nfunc G() bool { return HasPrefix(\"a\", \"b\") }\n",
            ),
        ]);
        let program = load_program(dir.path(), None).unwrap();
        assert!(program.files.iter().all(|f| f.type_error.is_none()));
        assert!(program.diagnostics.is_empty());
    }

    #[test]
    fn empty_directory_has_no_packages() {
        let dir = workspace(&[("README.md", "hi\n")]);
        let err = load_program(dir.path(), None).err().unwrap();
        assert!(matches!(err, LoadError::NoPackages { .. }));
    }

    #[test]
    fn index_collects_identifier_spans() {
        let dir = workspace(&[("a.go", "package a\n\nvar x = 1\n")]);
        let index = CodeIndex::build(dir.path()).unwrap();
        assert_eq!(index.file_count(), 1);
        let starts: Vec<u32> = index.idents[0].iter().map(|s| s.start).collect();
        // package name and `x`
        assert_eq!(starts, vec![8, 15]);
    }
}
