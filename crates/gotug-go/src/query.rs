//! Read-only queries over a [`CodeIndex`].
//!
//! A query goes position -> identifier -> object:
//!
//! - [`resolve_position`] turns `path:line:col` into a global [`Pos`]
//! - [`locate_identifier`] picks the innermost identifier covering it
//! - [`resolve_object`] maps the identifier to its object
//!
//! [`find_declaration`] and [`find_usages`] build on that chain. Out-of-range
//! positions and unresolvable identifiers are "not found" results; only
//! non-positive line or column numbers are errors.

use gotug_core::position::Pos;
use gotug_core::types::{Declaration, Usage};
use thiserror::Error;
use tracing::debug;

use crate::loader::CodeIndex;
use crate::objects::{ObjectId, TypeInfo};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("{message}")]
    InvalidArgument { message: String },
}

// ============================================================================
// Position resolution
// ============================================================================

/// Resolve a root-relative `path` and 1-based `line`/`col`.
///
/// Returns `Ok(None)` for an unknown file or a position past its end.
pub fn resolve_position(
    index: &CodeIndex,
    path: &str,
    line: i64,
    col: i64,
) -> Result<Option<Pos>, QueryError> {
    if line <= 0 || col <= 0 {
        return Err(QueryError::InvalidArgument {
            message: format!("line and column must be >= 1, got {}:{}", line, col),
        });
    }
    let (Ok(line), Ok(col)) = (u32::try_from(line), u32::try_from(col)) else {
        return Ok(None);
    };
    Ok(index.positions.resolve(path, line, col))
}

/// Start position of the innermost identifier whose `[start, end)` range
/// contains `pos`.
pub fn locate_identifier(index: &CodeIndex, pos: Pos) -> Option<Pos> {
    let (file, offset) = index.positions.locate(pos)?;
    let sites = index.idents.get(file.0 as usize)?;
    sites
        .iter()
        .filter(|s| s.start <= offset && offset < s.end)
        .min_by(|a, b| {
            (a.end - a.start)
                .cmp(&(b.end - b.start))
                .then(b.depth.cmp(&a.depth))
        })
        .map(|s| index.positions.pos(file, s.start))
}

// ============================================================================
// Object resolution
// ============================================================================

type Strategy = fn(&TypeInfo, Pos) -> Option<ObjectId>;

fn by_def(info: &TypeInfo, pos: Pos) -> Option<ObjectId> {
    info.defs.get(&pos).copied()
}

fn by_use(info: &TypeInfo, pos: Pos) -> Option<ObjectId> {
    info.uses.get(&pos).copied()
}

fn by_implicit(info: &TypeInfo, pos: Pos) -> Option<ObjectId> {
    info.implicits.get(&pos).copied()
}

/// Lookup tables tried in order; the first hit wins.
const STRATEGIES: &[(&str, Strategy)] = &[
    ("defs", by_def),
    ("uses", by_use),
    ("implicits", by_implicit),
];

/// The object named by the identifier starting at `ident`.
pub fn resolve_object(info: &TypeInfo, ident: Pos) -> Option<ObjectId> {
    STRATEGIES.iter().find_map(|&(table, lookup)| {
        let hit = lookup(info, ident);
        if let Some(obj) = hit {
            debug!(table, object = obj.0, "resolved identifier");
        }
        hit
    })
}

/// Resolve `path:line:col` to a non-package object.
fn object_at(
    index: &CodeIndex,
    path: &str,
    line: i64,
    col: i64,
) -> Result<Option<ObjectId>, QueryError> {
    let Some(pos) = resolve_position(index, path, line, col)? else {
        return Ok(None);
    };
    let Some(ident) = locate_identifier(index, pos) else {
        return Ok(None);
    };
    Ok(resolve_object(&index.info, ident).filter(|obj| !index.info.object(*obj).is_pkg_name()))
}

// ============================================================================
// Queries
// ============================================================================

/// Declaration of the symbol at `path:line:col`.
///
/// Package names, universe objects and anything declared outside the
/// indexed files yield `None`.
pub fn find_declaration(
    index: &CodeIndex,
    path: &str,
    line: i64,
    col: i64,
) -> Result<Option<Declaration>, QueryError> {
    let Some(obj) = object_at(index, path, line, col)? else {
        return Ok(None);
    };
    let object = index.info.object(obj);
    let Some(location) = index.positions.location(object.pos) else {
        return Ok(None);
    };
    Ok(Some(Declaration {
        location,
        name: object.name.clone(),
        kind: object.symbol_kind(),
    }))
}

/// Every identifier referring to the symbol at `path:line:col`, sorted.
///
/// The declaring identifier itself is not a usage.
pub fn find_usages(
    index: &CodeIndex,
    path: &str,
    line: i64,
    col: i64,
) -> Result<Vec<Usage>, QueryError> {
    let Some(obj) = object_at(index, path, line, col)? else {
        return Ok(Vec::new());
    };
    let name = &index.info.object(obj).name;
    let mut usages: Vec<Usage> = index
        .info
        .uses
        .iter()
        .filter(|(_, used)| **used == obj)
        .filter_map(|(pos, _)| index.positions.location(*pos))
        .map(|location| Usage {
            location,
            name: name.clone(),
        })
        .collect();
    usages.sort();
    Ok(usages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotug_core::types::SymbolKind;
    use std::fs;
    use tempfile::TempDir;

    fn index(files: &[(&str, &str)]) -> (TempDir, CodeIndex) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let p = dir.path().join(path);
            fs::create_dir_all(p.parent().unwrap()).unwrap();
            fs::write(p, content).unwrap();
        }
        let index = CodeIndex::build(dir.path()).unwrap();
        (dir, index)
    }

    const SRC: &str = "package p

type T struct{ N int }

func (t *T) Get() int { return t.N }

func use1() int {
	v := &T{N: 1}
	return v.Get() + v.N
}
";

    mod positions {
        use super::*;

        #[test]
        fn non_positive_line_or_col_is_an_error() {
            let (_d, idx) = index(&[("p.go", SRC)]);
            assert!(resolve_position(&idx, "p.go", 0, 1).is_err());
            assert!(resolve_position(&idx, "p.go", 1, -3).is_err());
            assert!(find_declaration(&idx, "p.go", -1, 1).is_err());
            assert!(find_usages(&idx, "p.go", 1, 0).is_err());
        }

        #[test]
        fn out_of_range_is_not_found() {
            let (_d, idx) = index(&[("p.go", SRC)]);
            assert_eq!(resolve_position(&idx, "p.go", 999, 1).unwrap(), None);
            assert_eq!(resolve_position(&idx, "p.go", 1, 999).unwrap(), None);
            assert_eq!(resolve_position(&idx, "missing.go", 1, 1).unwrap(), None);
            assert_eq!(find_declaration(&idx, "p.go", 999, 1).unwrap(), None);
            assert!(find_usages(&idx, "p.go", 999, 999).unwrap().is_empty());
        }

        #[test]
        fn keywords_and_comments_have_no_identifier() {
            let (_d, idx) = index(&[("p.go", "package p\n\n// hello\nfunc F() {}\n")]);
            assert_eq!(find_declaration(&idx, "p.go", 3, 4).unwrap(), None);
            assert_eq!(find_declaration(&idx, "p.go", 4, 2).unwrap(), None);
        }
    }

    mod declarations {
        use super::*;

        #[test]
        fn declaration_site_is_a_fixed_point() {
            let (_d, idx) = index(&[("p.go", SRC)]);
            // `T` in `type T struct`
            let decl = find_declaration(&idx, "p.go", 3, 6).unwrap().unwrap();
            assert_eq!(decl.name, "T");
            assert_eq!(decl.kind, SymbolKind::Type);
            assert_eq!((decl.location.line, decl.location.col), (3, 6));
            let again = find_declaration(&idx, &decl.location.file, 3, 6)
                .unwrap()
                .unwrap();
            assert_eq!(again, decl);
        }

        #[test]
        fn use_site_resolves_to_declaration() {
            let (_d, idx) = index(&[("p.go", SRC)]);
            // `Get` in `v.Get()`
            let decl = find_declaration(&idx, "p.go", 9, 11).unwrap().unwrap();
            assert_eq!(decl.name, "Get");
            assert_eq!(decl.kind, SymbolKind::Method);
            assert_eq!((decl.location.line, decl.location.col), (5, 13));
            // `N` in `v.N`
            let field = find_declaration(&idx, "p.go", 9, 21).unwrap().unwrap();
            assert_eq!(field.kind, SymbolKind::Field);
            assert_eq!((field.location.line, field.location.col), (3, 16));
        }

        #[test]
        fn builtins_and_package_names_are_not_found() {
            let src = "package p\n\nimport \"fmt\"\n\nfunc F(s []int) { fmt.Println(len(s)) }\n";
            let (_d, idx) = index(&[("p.go", src)]);
            // `fmt` qualifier
            assert_eq!(find_declaration(&idx, "p.go", 5, 19).unwrap(), None);
            // `len`
            assert_eq!(find_declaration(&idx, "p.go", 5, 31).unwrap(), None);
            assert!(find_usages(&idx, "p.go", 5, 19).unwrap().is_empty());
        }
    }

    mod usages {
        use super::*;

        #[test]
        fn usages_are_identical_from_any_site() {
            let (_d, idx) = index(&[("p.go", SRC)]);
            let from_decl = find_usages(&idx, "p.go", 3, 16).unwrap();
            let from_use = find_usages(&idx, "p.go", 9, 21).unwrap();
            assert_eq!(from_decl, from_use);
            let lines: Vec<(u32, u32)> = from_decl
                .iter()
                .map(|u| (u.location.line, u.location.col))
                .collect();
            assert_eq!(lines, vec![(5, 34), (8, 10), (9, 21)]);
            assert!(from_decl.iter().all(|u| u.name == "N"));
        }

        #[test]
        fn shadowed_names_are_distinct() {
            let src = "package p\n\nvar x = 1\n\nfunc f() int {\n\tx := 2\n\treturn x\n}\n\nfunc g() int { return x }\n";
            let (_d, idx) = index(&[("p.go", src)]);
            let outer = find_usages(&idx, "p.go", 3, 5).unwrap();
            assert_eq!(outer.len(), 1);
            assert_eq!(outer[0].location.line, 10);
            let inner = find_usages(&idx, "p.go", 6, 2).unwrap();
            assert_eq!(inner.len(), 1);
            assert_eq!(inner[0].location.line, 7);
        }

        #[test]
        fn usages_cross_packages() {
            let (_d, idx) = index(&[
                ("go.mod", "module example.com/m\n"),
                ("lib/lib.go", "package lib\n\nfunc Hello() {}\n"),
                (
                    "main.go",
                    "package main\n\nimport \"example.com/m/lib\"\n\nfunc main() { lib.Hello() }\n",
                ),
            ]);
            let usages = find_usages(&idx, "lib/lib.go", 3, 6).unwrap();
            assert_eq!(usages.len(), 1);
            assert_eq!(usages[0].location.file, "main.go");
            let decl = find_declaration(&idx, "main.go", 5, 19).unwrap().unwrap();
            assert_eq!(decl.location.file, "lib/lib.go");
            assert_eq!(decl.kind, SymbolKind::Function);
        }
    }
}
