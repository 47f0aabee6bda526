// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! Declaration and usage queries over an indexed multi-package module.

use std::fs;

use gotug_core::types::SymbolKind;
use gotug_go::{find_declaration, find_usages, CodeIndex};
use tempfile::TempDir;

/// Helper to set up a test workspace with the given files.
fn setup_workspace(files: &[(&str, &str)]) -> TempDir {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    for (path, content) in files {
        let full_path = temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directories");
        }
        fs::write(&full_path, content).expect("Failed to write file");
    }
    temp_dir
}

const SHAPES: &str = "package shapes

type Shape interface {
	Area() float64
}

type Rect struct {
	W, H float64
}

func (r Rect) Area() float64 { return r.W * r.H }

func NewRect(w, h float64) *Rect {
	return &Rect{W: w, H: h}
}
";

const MAIN: &str = "package main

import (
	\"fmt\"

	\"example.com/geo/shapes\"
)

func main() {
	r := shapes.NewRect(2, 3)
	var s shapes.Shape = r
	fmt.Println(s.Area(), r.W)
	switch v := s.(type) {
	case *shapes.Rect:
		fmt.Println(v.H)
	}
}
";

fn index() -> (TempDir, CodeIndex) {
    let dir = setup_workspace(&[
        ("go.mod", "module example.com/geo\n"),
        ("shapes/shapes.go", SHAPES),
        ("main.go", MAIN),
    ]);
    let index = CodeIndex::build(dir.path()).expect("index");
    (dir, index)
}

mod summary {
    use super::*;

    #[test]
    fn index_reports_packages_and_module() {
        let (_dir, idx) = index();
        assert_eq!(idx.package_count, 2);
        assert_eq!(idx.file_count(), 2);
        assert_eq!(idx.module_path.as_deref(), Some("example.com/geo"));
        assert!(idx.diagnostics.is_empty());
    }
}

mod declarations {
    use super::*;

    #[test]
    fn cross_package_function() {
        let (_dir, idx) = index();
        // `NewRect` in `shapes.NewRect(2, 3)`
        let decl = find_declaration(&idx, "main.go", 10, 14).unwrap().unwrap();
        assert_eq!(decl.name, "NewRect");
        assert_eq!(decl.kind, SymbolKind::Function);
        assert_eq!(decl.location.file, "shapes/shapes.go");
        assert_eq!((decl.location.line, decl.location.col), (13, 6));
    }

    #[test]
    fn field_through_pointer() {
        let (_dir, idx) = index();
        // `W` in `r.W`, where r is *shapes.Rect
        let decl = find_declaration(&idx, "main.go", 12, 26).unwrap().unwrap();
        assert_eq!(decl.kind, SymbolKind::Field);
        assert_eq!((decl.location.line, decl.location.col), (8, 2));
    }

    #[test]
    fn every_declaration_is_a_fixed_point() {
        let (_dir, idx) = index();
        let sites = [
            ("shapes/shapes.go", 3, 6),
            ("shapes/shapes.go", 4, 2),
            ("shapes/shapes.go", 7, 6),
            ("shapes/shapes.go", 8, 5),
            ("shapes/shapes.go", 11, 15),
            ("shapes/shapes.go", 13, 14),
            ("main.go", 10, 2),
        ];
        for (path, line, col) in sites {
            let decl = find_declaration(&idx, path, line, col)
                .unwrap()
                .unwrap_or_else(|| panic!("no declaration at {path}:{line}:{col}"));
            assert_eq!(decl.location.file, path);
            assert_eq!(
                (decl.location.line as i64, decl.location.col as i64),
                (line, col)
            );
        }
    }

    #[test]
    fn positions_past_the_end_are_not_found() {
        let (_dir, idx) = index();
        assert_eq!(find_declaration(&idx, "main.go", 500, 1).unwrap(), None);
        assert_eq!(find_declaration(&idx, "main.go", 10, 500).unwrap(), None);
        assert_eq!(find_declaration(&idx, "nope.go", 1, 1).unwrap(), None);
        assert!(find_declaration(&idx, "main.go", 0, 1).is_err());
    }
}

mod usages {
    use super::*;

    #[test]
    fn query_site_independence() {
        let (_dir, idx) = index();
        // `Rect` type: declaration, receiver, composite literal, case clause
        let from_decl = find_usages(&idx, "shapes/shapes.go", 7, 6).unwrap();
        let from_receiver = find_usages(&idx, "shapes/shapes.go", 11, 9).unwrap();
        let from_client = find_usages(&idx, "main.go", 14, 15).unwrap();
        assert_eq!(from_decl, from_receiver);
        assert_eq!(from_decl, from_client);
        let sites: Vec<(&str, u32, u32)> = from_decl
            .iter()
            .map(|u| (u.location.file.as_str(), u.location.line, u.location.col))
            .collect();
        assert_eq!(
            sites,
            vec![
                ("main.go", 14, 15),
                ("shapes/shapes.go", 11, 9),
                ("shapes/shapes.go", 13, 29),
                ("shapes/shapes.go", 14, 10),
            ]
        );
    }

    #[test]
    fn type_switch_guard_usages() {
        let (_dir, idx) = index();
        // `v` in `fmt.Println(v.H)`
        let usages = find_usages(&idx, "main.go", 15, 15).unwrap();
        assert_eq!(usages.len(), 1);
        assert_eq!((usages[0].location.line, usages[0].location.col), (15, 15));
    }

    #[test]
    fn out_of_range_is_empty() {
        let (_dir, idx) = index();
        assert!(find_usages(&idx, "main.go", 99, 99).unwrap().is_empty());
        assert!(find_usages(&idx, "main.go", 1, -1).is_err());
    }
}
