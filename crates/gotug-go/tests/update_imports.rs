// Copyright (c) Ken Kocienda and other contributors.
//
// This source code is licensed under the MIT license found in the
// LICENSE file in the root directory of this source tree.

//! End-to-end tests for the moved-package import rewrite.
//!
//! Every test builds a throwaway Go module with a package `pkg/refactored`
//! whose symbols now live in `pkg/refactored/sub1` and `pkg/refactored/sub2`.
//! No Go toolchain is needed; the formatter is disabled unless a test says
//! otherwise.

use std::fs;
use std::path::{Path, PathBuf};

use gotug_go::{
    update_imports_for_moved_package, FileOutcome, Formatter, RewriteError, SkipReason,
    UpdateImportsOptions,
};
use tempfile::TempDir;

/// Helper to set up a test workspace with the given files.
fn setup_workspace(files: &[(&str, &str)]) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    for (path, content) in files {
        let full_path = temp_dir.path().join(path);
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).expect("Failed to create directories");
        }
        fs::write(&full_path, content).expect("Failed to write file");
    }
    let root = fs::canonicalize(temp_dir.path()).expect("Failed to canonicalize");
    (temp_dir, root)
}

const GO_MOD: (&str, &str) = ("go.mod", "module example.com/m\n\ngo 1.21\n");

const SUB1: (&str, &str) = (
    "pkg/refactored/sub1/sub1.go",
    "package sub1

func FuncS1() int { return 1 }

var VarS1 = \"v\"

type TypeS1 struct{ ID int }
",
);

const SUB2: (&str, &str) = (
    "pkg/refactored/sub2/sub2.go",
    "package sub2

func FuncS2() {}

const ConstS2 = 2
",
);

const CLIENT: &str = "package client

import (
	\"fmt\"

	\"example.com/m/pkg/refactored\"
)

func Run() {
	refactored.FuncS1()
	fmt.Println(refactored.VarS1)
	fmt.Println(refactored.ConstS2)
	refactored.FuncS2()
}
";

const CLIENT_REWRITTEN: &str = "package client

import (
	\"fmt\"

	\"example.com/m/pkg/refactored/sub1\"
	\"example.com/m/pkg/refactored/sub2\"
)

func Run() {
	sub1.FuncS1()
	fmt.Println(sub1.VarS1)
	fmt.Println(sub2.ConstS2)
	sub2.FuncS2()
}
";

fn run(root: &Path) -> Result<gotug_go::UpdateImportsReport, RewriteError> {
    update_imports_for_moved_package(
        &root.join("pkg/refactored"),
        root,
        &UpdateImportsOptions::default(),
    )
}

// ============================================================================
// Rewrite Scenarios
// ============================================================================

mod rewrite {
    use super::*;

    #[test]
    fn rewrites_client_of_split_package() {
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2, ("client/client.go", CLIENT)]);
        let report = run(&root).unwrap();

        let client = root.join("client/client.go");
        assert_eq!(report.modified(), vec![client.as_path()]);
        assert!(report.failed().is_empty());
        assert_eq!(fs::read_to_string(&client).unwrap(), CLIENT_REWRITTEN);
    }

    #[test]
    fn file_not_importing_is_skipped_untouched() {
        let other = "package other\n\nfunc Other() int { return 2 }\n";
        let (_dir, root) = setup_workspace(&[
            GO_MOD,
            SUB1,
            SUB2,
            ("client/client.go", CLIENT),
            ("other/other.go", other),
        ]);
        let report = run(&root).unwrap();

        let path = root.join("other/other.go");
        assert!(report
            .skipped()
            .contains(&(path.as_path(), SkipReason::NotImported)));
        assert_eq!(fs::read_to_string(&path).unwrap(), other);
    }

    #[test]
    fn syntax_error_fails_one_file_only() {
        let broken = "package client\n\nfunc Broken( {\n";
        let (_dir, root) = setup_workspace(&[
            GO_MOD,
            SUB1,
            SUB2,
            ("client/client.go", CLIENT),
            ("broken/broken.go", broken),
        ]);
        let report = run(&root).unwrap();

        let path = root.join("broken/broken.go");
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, path.as_path());
        assert!(failed[0].1.contains("broken/broken.go"));
        assert_eq!(fs::read_to_string(&path).unwrap(), broken);
        assert_eq!(report.modified().len(), 1);
    }

    #[test]
    fn undefined_identifier_fails_the_file() {
        let typeerr = "package c

import \"example.com/m/pkg/refactored\"

func F() {
	refactored.FuncS1()
	undefinedThing()
}
";
        let (_dir, root) = setup_workspace(&[
            GO_MOD,
            SUB1,
            SUB2,
            ("client/client.go", CLIENT),
            ("c/typeerr.go", typeerr),
        ]);
        let report = run(&root).unwrap();

        let path = root.join("c/typeerr.go");
        let failed = report.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0, path.as_path());
        assert_eq!(failed[0].1, "c/typeerr.go:7:2: undefined: undefinedThing");
        assert_eq!(fs::read_to_string(&path).unwrap(), typeerr);
        let client = root.join("client/client.go");
        assert_eq!(report.modified(), vec![client.as_path()]);
    }

    #[test]
    fn second_run_modifies_nothing() {
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2, ("client/client.go", CLIENT)]);
        run(&root).unwrap();
        let second = run(&root).unwrap();

        assert!(second.modified().is_empty());
        assert!(second.failed().is_empty());
        assert!(second.skipped().iter().all(|(_, reason)| matches!(
            reason,
            SkipReason::NotImported | SkipReason::NoRelevantSymbol
        )));
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            CLIENT_REWRITTEN
        );
    }

    #[test]
    fn unmoved_symbols_keep_old_import() {
        let client = "package client

import \"example.com/m/pkg/refactored\"

func Run() {
	refactored.FuncS1()
	refactored.Stays()
}
";
        let expected = "package client

import (
	\"example.com/m/pkg/refactored\"
	\"example.com/m/pkg/refactored/sub1\"
)

func Run() {
	sub1.FuncS1()
	refactored.Stays()
}
";
        let (_dir, root) = setup_workspace(&[
            GO_MOD,
            SUB1,
            ("pkg/refactored/rest.go", "package refactored\n\nfunc Stays() {}\n"),
            ("client/client.go", client),
        ]);
        let report = run(&root).unwrap();

        assert_eq!(report.modified().len(), 1);
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            expected
        );
    }

    #[test]
    fn field_named_like_new_package_and_old_import_comment() {
        let client = "package client

import (
	\"fmt\"

	// the old one
	\"example.com/m/pkg/refactored\"
)

type Cfg struct{ sub1 int }

func Run(c Cfg) {
	fmt.Println(c.sub1, refactored.FuncS1())
}
";
        let expected = "package client

import (
	\"fmt\"

	\"example.com/m/pkg/refactored/sub1\"
)

type Cfg struct{ sub1 int }

func Run(c Cfg) {
	fmt.Println(c.sub1, sub1.FuncS1())
}
";
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, ("client/client.go", client)]);
        let report = run(&root).unwrap();

        assert!(report.failed().is_empty());
        assert_eq!(report.modified().len(), 1);
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            expected
        );
    }

    #[test]
    fn type_references_are_rewritten() {
        let client = "package client

import r \"example.com/m/pkg/refactored\"

func Make() r.TypeS1 { return r.TypeS1{ID: r.FuncS1()} }
";
        let expected = "package client

import (
	\"example.com/m/pkg/refactored/sub1\"
)

func Make() sub1.TypeS1 { return sub1.TypeS1{ID: sub1.FuncS1()} }
";
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, ("client/client.go", client)]);
        run(&root).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            expected
        );
    }

    #[test]
    fn files_inside_split_package_are_not_candidates() {
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2, ("client/client.go", CLIENT)]);
        let report = run(&root).unwrap();
        let base = root.join("pkg/refactored");
        assert!(report.outcomes.iter().all(|o| !o.path().starts_with(&base)));
    }
}

// ============================================================================
// Fatal Conditions
// ============================================================================

mod fatal {
    use super::*;

    #[test]
    fn ambiguous_symbol_aborts_before_writing() {
        let (_dir, root) = setup_workspace(&[
            GO_MOD,
            ("pkg/refactored/sub1/a.go", "package sub1\n\nfunc Shared() {}\n"),
            ("pkg/refactored/sub2/b.go", "package sub2\n\nfunc Shared() {}\n"),
            (
                "client/client.go",
                "package client\n\nimport \"example.com/m/pkg/refactored\"\n\nfunc Run() { refactored.Shared() }\n",
            ),
        ]);
        let before = fs::read_to_string(root.join("client/client.go")).unwrap();
        let err = run(&root).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("Shared"));
        assert!(message.contains("example.com/m/pkg/refactored/sub1"));
        assert!(message.contains("example.com/m/pkg/refactored/sub2"));
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            before
        );
    }

    #[test]
    fn missing_refactored_package() {
        let (_dir, root) = setup_workspace(&[GO_MOD, ("client/client.go", CLIENT)]);
        let err = update_imports_for_moved_package(
            &root.join("pkg/missing"),
            &root,
            &UpdateImportsOptions::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn scope_with_no_candidates_is_empty_report() {
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2]);
        let report = run(&root).unwrap();
        assert!(report.outcomes.is_empty());
    }
}

// ============================================================================
// Options
// ============================================================================

mod options {
    use super::*;

    #[test]
    fn dry_run_reports_diff_without_writing() {
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2, ("client/client.go", CLIENT)]);
        let options = UpdateImportsOptions {
            dry_run: true,
            formatter: Formatter::Disabled,
        };
        let report =
            update_imports_for_moved_package(&root.join("pkg/refactored"), &root, &options)
                .unwrap();

        let client = root.join("client/client.go");
        assert!(matches!(&report.outcomes[..], [FileOutcome::Modified { .. }]));
        assert_eq!(fs::read_to_string(&client).unwrap(), CLIENT);
        let diff = &report.diffs[&client];
        assert!(diff.contains("--- a/client/client.go"));
        assert!(diff.contains("-\t\"example.com/m/pkg/refactored\"\n"));
        assert!(diff.contains("+\t\"example.com/m/pkg/refactored/sub1\"\n"));
        assert!(diff.contains("+\tsub2.FuncS2()\n"));
    }

    #[test]
    fn output_is_stable_under_gofmt() {
        let Ok(gofmt) = which::which("gofmt") else {
            eprintln!("gofmt not installed; skipping");
            return;
        };
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2, ("client/client.go", CLIENT)]);
        let options = UpdateImportsOptions {
            dry_run: false,
            formatter: Formatter::gofmt(gofmt),
        };
        update_imports_for_moved_package(&root.join("pkg/refactored"), &root, &options).unwrap();
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            CLIENT_REWRITTEN
        );
    }

    #[test]
    fn formatter_failure_leaves_file_untouched() {
        let (_dir, root) = setup_workspace(&[GO_MOD, SUB1, SUB2, ("client/client.go", CLIENT)]);
        let options = UpdateImportsOptions {
            dry_run: false,
            formatter: Formatter::gofmt(root.join("no-such-gofmt")),
        };
        let report =
            update_imports_for_moved_package(&root.join("pkg/refactored"), &root, &options)
                .unwrap();
        assert_eq!(report.failed().len(), 1);
        assert_eq!(
            fs::read_to_string(root.join("client/client.go")).unwrap(),
            CLIENT
        );
    }
}
