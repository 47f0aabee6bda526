//! Go file collection.
//!
//! Mirrors the `go` tool's view of a source tree: directories whose names
//! start with `.` or `_`, `vendor` and `testdata` are never part of a
//! package, and neither are files whose names start with `.` or `_`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

// ============================================================================
// Error Types
// ============================================================================

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    /// The directory to scan does not exist or is not a directory.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// Walking the tree failed.
    #[error("failed to walk {path}: {message}")]
    Walk { path: String, message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

// ============================================================================
// Filters
// ============================================================================

/// True if a directory with this name is ignored by the Go tool.
pub fn is_ignored_dir_name(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_') || name == "vendor" || name == "testdata"
}

/// True if `path` names a Go source file the Go tool would consider.
pub fn is_go_source(path: &Path) -> bool {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
        return false;
    };
    name.ends_with(".go") && !name.starts_with('.') && !name.starts_with('_')
}

/// True for `_test.go` files.
pub fn is_test_file(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|n| n.to_string_lossy().ends_with("_test.go"))
}

/// Render `path` relative to `root` with `/` separators.
pub fn rel_slash(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_string(),
        Ok(rel) => rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"),
        Err(_) => path.display().to_string(),
    }
}

// ============================================================================
// Collection
// ============================================================================

/// Collect every Go source file under `root`, test files included, sorted.
///
/// When `exclude` is given, files under that directory are skipped.
pub fn collect_go_files(root: &Path, exclude: Option<&Path>) -> FileResult<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(FileError::NotADirectory {
            path: root.display().to_string(),
        });
    }

    let keep = |e: &DirEntry| {
        if e.depth() == 0 {
            return true;
        }
        if let Some(ex) = exclude {
            if e.path().starts_with(ex) {
                return false;
            }
        }
        !(e.file_type().is_dir() && is_ignored_dir_name(&e.file_name().to_string_lossy()))
    };

    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep)
    {
        let entry = entry.map_err(|e| FileError::Walk {
            path: e
                .path()
                .unwrap_or(root)
                .display()
                .to_string(),
            message: e.to_string(),
        })?;
        if entry.file_type().is_file() && is_go_source(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Go source files directly inside `dir` (no recursion), sorted.
pub fn go_files_in_dir(dir: &Path, include_tests: bool) -> FileResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && is_go_source(&path)
            && (include_tests || !is_test_file(&path))
        {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Immediate subdirectories of `dir` that the Go tool would consider, sorted.
pub fn package_subdirs(dir: &Path) -> FileResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir()
            && !is_ignored_dir_name(&entry.file_name().to_string_lossy())
        {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for f in files {
            let p = dir.path().join(f);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, "package x\n").unwrap();
        }
        dir
    }

    #[test]
    fn collects_sorted_and_skips_ignored_dirs() {
        let dir = tree(&[
            "main.go",
            "pkg/a/a.go",
            "pkg/a/a_test.go",
            "vendor/v/v.go",
            "testdata/t.go",
            ".hidden/h.go",
            "_skip/s.go",
            "pkg/_tmp.go",
            "README.md",
        ]);
        let files = collect_go_files(dir.path(), None).unwrap();
        let rel: Vec<String> = files.iter().map(|p| rel_slash(dir.path(), p)).collect();
        assert_eq!(rel, vec!["main.go", "pkg/a/a.go", "pkg/a/a_test.go"]);
    }

    #[test]
    fn excludes_subtree() {
        let dir = tree(&["main.go", "pkg/old/sub1/s.go", "pkg/other/o.go"]);
        let exclude = dir.path().join("pkg/old");
        let files = collect_go_files(dir.path(), Some(&exclude)).unwrap();
        let rel: Vec<String> = files.iter().map(|p| rel_slash(dir.path(), p)).collect();
        assert_eq!(rel, vec!["main.go", "pkg/other/o.go"]);
    }

    #[test]
    fn missing_root_is_error() {
        let dir = TempDir::new().unwrap();
        let err = collect_go_files(&dir.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, FileError::NotADirectory { .. }));
    }

    #[test]
    fn dir_listing_filters_tests() {
        let dir = tree(&["p/a.go", "p/a_test.go", "p/sub/b.go"]);
        let p = dir.path().join("p");
        assert_eq!(go_files_in_dir(&p, false).unwrap().len(), 1);
        assert_eq!(go_files_in_dir(&p, true).unwrap().len(), 2);
        assert_eq!(package_subdirs(&p).unwrap(), vec![p.join("sub")]);
    }

    #[test]
    fn test_file_detection() {
        assert!(is_test_file(Path::new("x/a_test.go")));
        assert!(!is_test_file(Path::new("x/a.go")));
    }
}
