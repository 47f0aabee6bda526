//! Import block surgery on Go source text.
//!
//! Each operation parses the current text, computes span edits, and applies
//! them in one [`BatchEditor`] pass. Edits follow gofmt layout (tab-indented
//! grouped specs, no doubled blank lines) so the output is stable with or
//! without a formatter run afterwards.

use std::collections::HashSet;

use gotug_core::edit::{BatchEditor, Edit, EditError, Span};
use thiserror::Error;

use crate::syntax::{self, import_decls, import_specs, named_children, text, ImportSpecNode, SyntaxError};

use super::analyze::RewritePlan;

#[derive(Debug, Error)]
pub enum SurgeryError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error("file has no package clause")]
    NoPackageClause,
}

/// Apply a rewrite plan: qualifier edits, new imports, then removal of the
/// old import unless the plan keeps it.
pub fn apply_plan(source: &str, plan: &RewritePlan, old_path: &str) -> Result<String, SurgeryError> {
    let mut editor = BatchEditor::new(source);
    editor.add_all(plan.edits.iter().cloned());
    let mut out = editor.apply()?;
    for (path, alias) in &plan.add {
        out = add_import(&out, path, alias.as_deref())?;
    }
    if !plan.keep_old {
        out = remove_import(&out, old_path)?;
    }
    Ok(out)
}

// ============================================================================
// Removal
// ============================================================================

/// Remove every import of `path`. A missing import is not an error.
pub fn remove_import(source: &str, path: &str) -> Result<String, SurgeryError> {
    let tree = syntax::parse(source)?;
    let specs = import_specs(tree.root_node());
    let targets: Vec<&ImportSpecNode<'_>> = specs
        .iter()
        .filter(|s| s.path_value(source) == path)
        .collect();
    if targets.is_empty() {
        return Ok(source.to_string());
    }

    let mut editor = BatchEditor::new(source);
    let mut removed_decls = HashSet::new();
    for target in &targets {
        let decl_id = target.decl.id();
        let in_decl = specs.iter().filter(|s| s.decl.id() == decl_id).count();
        let removing = targets.iter().filter(|s| s.decl.id() == decl_id).count();
        if !target.grouped || in_decl == removing {
            if removed_decls.insert(decl_id) {
                editor.add(Edit::delete(decl_span(source, target.decl.byte_range())));
            }
        } else {
            editor.add(Edit::delete(spec_line_span(source, target.spec.byte_range())));
        }
    }
    Ok(editor.apply()?)
}

/// Span removing a whole declaration with its line break, plus one blank
/// line when the declaration sits between two blank lines.
fn decl_span(source: &str, range: std::ops::Range<usize>) -> Span {
    let start = range.start;
    let mut end = range.end;
    if source[end..].starts_with('\n') {
        end += 1;
    }
    if source[..start].ends_with("\n\n") && source[end..].starts_with('\n') {
        end += 1;
    }
    Span::new(start, end)
}

/// Span removing one grouped spec. Whole-line when the spec has its own
/// line, along with the comment lines directly above it; a blank line left
/// dangling before `)` or another blank line goes too.
fn spec_line_span(source: &str, range: std::ops::Range<usize>) -> Span {
    let ls = line_start(source, range.start);
    let le = line_end(source, range.end);
    let before = &source[ls..range.start];
    let after = source[range.end..le].trim();
    if !before.trim().is_empty() || !(after.is_empty() || after.starts_with("//")) {
        return Span::new(range.start, range.end);
    }
    let end = (le + 1).min(source.len());
    let mut start = ls;
    while start > 0 {
        let prev_start = line_start(source, start - 1);
        if !source[prev_start..start].trim_start().starts_with("//") {
            break;
        }
        start = prev_start;
    }
    if start > 0 {
        let prev_start = line_start(source, start - 1);
        let prev_blank = source[prev_start..start].trim().is_empty();
        let next = source[end..line_end(source, end)].trim();
        if prev_blank && (next.is_empty() || next == ")") {
            start = prev_start;
        }
    }
    Span::new(start, end)
}

// ============================================================================
// Addition
// ============================================================================

/// Add an import of `path`, optionally named. A path already imported is
/// left as is.
///
/// The spec goes into the first grouped declaration, into the run of specs
/// sharing the longest prefix with `path`, in sorted position. Without a
/// group, the last single declaration becomes a group; without any import,
/// a declaration is added after the package clause.
pub fn add_import(source: &str, path: &str, alias: Option<&str>) -> Result<String, SurgeryError> {
    let tree = syntax::parse(source)?;
    let root = tree.root_node();
    let specs = import_specs(root);
    if specs.iter().any(|s| s.path_value(source) == path) {
        return Ok(source.to_string());
    }
    let new_spec = match alias {
        Some(name) => format!("{} \"{}\"", name, path),
        None => format!("\"{}\"", path),
    };

    let mut editor = BatchEditor::new(source);
    let decls = import_decls(root);
    let group = decls.iter().find(|d| {
        named_children(**d)
            .iter()
            .any(|c| c.kind() == "import_spec_list")
    });

    if let Some(group) = group {
        let members: Vec<&ImportSpecNode<'_>> =
            specs.iter().filter(|s| s.decl.id() == group.id()).collect();
        editor.add(insert_into_group(source, group.byte_range(), &members, path, &new_spec));
    } else if let Some(single) = decls.last() {
        let existing = specs
            .iter()
            .find(|s| s.decl.id() == single.id())
            .map(|s| (s.path_value(source), text(s.spec, source).to_string()));
        let mut lines: Vec<(String, String)> = existing.into_iter().collect();
        lines.push((path.to_string(), new_spec));
        lines.sort();
        let body: String = lines.iter().map(|(_, spec)| format!("\t{}\n", spec)).collect();
        editor.add(Edit::replace(
            Span::new(single.start_byte(), single.end_byte()),
            format!("import (\n{})", body),
        ));
    } else {
        let clause = named_children(root)
            .into_iter()
            .find(|n| n.kind() == "package_clause")
            .ok_or(SurgeryError::NoPackageClause)?;
        editor.add(Edit::insert_at(
            clause.end_byte(),
            format!("\n\nimport {}", new_spec),
        ));
    }
    Ok(editor.apply()?)
}

fn insert_into_group(
    source: &str,
    decl: std::ops::Range<usize>,
    members: &[&ImportSpecNode<'_>],
    path: &str,
    new_spec: &str,
) -> Edit {
    if members.is_empty() {
        return Edit::replace(
            Span::new(decl.start, decl.end),
            format!("import (\n\t{}\n)", new_spec),
        );
    }

    // Runs of specs separated by blank lines.
    let mut runs: Vec<Vec<&ImportSpecNode<'_>>> = Vec::new();
    let mut prev_end: Option<usize> = None;
    for spec in members {
        let gap_blank = prev_end.is_some_and(|end| {
            source[end..spec.spec.start_byte()].matches('\n').count() >= 2
        });
        match runs.last_mut() {
            Some(run) if !gap_blank => run.push(spec),
            _ => runs.push(vec![spec]),
        }
        prev_end = Some(spec.spec.end_byte());
    }

    let run = runs
        .iter()
        .enumerate()
        .max_by_key(|(idx, run)| {
            let best = run
                .iter()
                .map(|s| common_prefix(&s.path_value(source), path))
                .max()
                .unwrap_or(0);
            (best, *idx)
        })
        .map(|(_, run)| run)
        .unwrap_or(&runs[0]);

    let indent_of = |spec: &ImportSpecNode<'_>| {
        let ls = line_start(source, spec.spec.start_byte());
        let indent = &source[ls..spec.spec.start_byte()];
        if indent.trim().is_empty() {
            indent.to_string()
        } else {
            "\t".to_string()
        }
    };

    match run.iter().find(|s| s.path_value(source).as_str() > path) {
        Some(next) => {
            let ls = line_start(source, next.spec.start_byte());
            Edit::insert_at(ls, format!("{}{}\n", indent_of(*next), new_spec))
        }
        None => {
            let last = run[run.len() - 1];
            let le = line_end(source, last.spec.end_byte());
            Edit::insert_at(le, format!("\n{}{}", indent_of(last), new_spec))
        }
    }
}

fn common_prefix(a: &str, b: &str) -> usize {
    a.bytes().zip(b.bytes()).take_while(|(x, y)| x == y).count()
}

fn line_start(source: &str, offset: usize) -> usize {
    source[..offset].rfind('\n').map_or(0, |i| i + 1)
}

/// Offset of the `\n` ending the line containing `offset`, or the end of
/// the source.
fn line_end(source: &str, offset: usize) -> usize {
    source[offset..]
        .find('\n')
        .map_or(source.len(), |i| offset + i)
}
