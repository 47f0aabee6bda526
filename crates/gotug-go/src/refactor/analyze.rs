//! Per-file analysis for the moved-package rewrite.
//!
//! Decides from resolved identifiers (never from import alias text) whether
//! a file refers to the split package, which of those references name moved
//! symbols, and what the file needs: new imports, qualifier replacements,
//! and whether the old import can go.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use gotug_core::edit::{Edit, Span};
use tracing::debug;
use tree_sitter::Node;

use crate::loader::{Program, SourceFile};
use crate::objects::{ObjKind, ObjectId};
use crate::syntax::{self, default_package_name, named_children, text, ImportName};

use super::symbol_map::SymbolMap;

/// Why a file was left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotImported,
    NoRelevantSymbol,
    DotImport,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotImported => "not imported",
            SkipReason::NoRelevantSymbol => "imported but no relevant symbol used",
            SkipReason::DotImport => "dot import cannot be rewritten",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a file needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewritePlan {
    /// Import path -> explicit name, for imports to add.
    pub add: BTreeMap<String, Option<String>>,
    /// Qualifier replacements on the original source.
    pub edits: Vec<Edit>,
    /// True if references to unmoved symbols keep the old import alive.
    pub keep_old: bool,
    /// Moved symbols referenced, for logging.
    pub symbols: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Analysis {
    Skip(SkipReason),
    Rewrite(RewritePlan),
    /// The rewrite is unsafe; the reason is reported as a failure.
    Conflict(String),
}

/// Analyze one loaded file against the symbol map.
pub fn analyze_file(program: &Program, file: &SourceFile, map: &SymbolMap) -> Analysis {
    let src = file.source.as_str();
    let root = file.tree.root_node();
    let pos = |node: Node<'_>| program.positions.pos(file.id, node.start_byte() as u32);

    // Imports of the split package, and what else the file imports.
    let mut old_names: HashSet<ObjectId> = HashSet::new();
    let mut imported_old = false;
    let mut other_imports: BTreeMap<String, String> = BTreeMap::new();
    let mut existing: BTreeMap<String, String> = BTreeMap::new();
    for spec in syntax::import_specs(root) {
        let path = spec.path_value(src);
        let name = spec.import_name(src);
        if path == map.base_import_path {
            imported_old = true;
            match name {
                ImportName::Dot => return Analysis::Skip(SkipReason::DotImport),
                ImportName::Blank => {}
                ImportName::Named(_) => {
                    if let Some(obj) = spec.name.and_then(|n| program.info.defs.get(&pos(n))) {
                        old_names.insert(*obj);
                    }
                }
                ImportName::Default => {
                    if let Some(obj) = program.info.implicits.get(&pos(spec.path)) {
                        old_names.insert(*obj);
                    }
                }
            }
            continue;
        }
        let bound = match name {
            ImportName::Named(n) => Some(n),
            ImportName::Default => Some(
                program
                    .info
                    .implicits
                    .get(&pos(spec.path))
                    .map(|obj| program.info.object(*obj).name.clone())
                    .unwrap_or_else(|| default_package_name(&path)),
            ),
            ImportName::Dot | ImportName::Blank => None,
        };
        if let Some(bound) = bound {
            existing.entry(path.clone()).or_insert_with(|| bound.clone());
            other_imports.insert(bound, path);
        }
    }
    if !imported_old {
        return Analysis::Skip(SkipReason::NotImported);
    }

    // Qualified references through the old package name.
    let mut plan = RewritePlan {
        add: BTreeMap::new(),
        edits: Vec::new(),
        keep_old: false,
        symbols: BTreeSet::new(),
    };
    let mut qualifiers: BTreeMap<String, String> = BTreeMap::new();
    let mut sites: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    let mut mapped = 0usize;
    let mut total = 0usize;
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let parts = match node.kind() {
            "selector_expression" => node
                .child_by_field_name("operand")
                .filter(|o| o.kind() == "identifier")
                .zip(node.child_by_field_name("field")),
            "qualified_type" => node
                .child_by_field_name("package")
                .zip(node.child_by_field_name("name")),
            _ => None,
        };
        if let Some((qualifier, member)) = parts {
            let used = program.info.uses.get(&pos(qualifier));
            if used.is_some_and(|obj| old_names.contains(obj)) {
                total += 1;
                let name = text(member, src);
                if let Some(moved) = map.get(name) {
                    let new_qualifier = match qualifiers.get(&moved.import_path) {
                        Some(q) => q.clone(),
                        None => {
                            let q = match existing.get(&moved.import_path) {
                                Some(bound) => bound.clone(),
                                None => {
                                    let alias = (moved.package_name
                                        != default_package_name(&moved.import_path))
                                    .then(|| moved.package_name.clone());
                                    plan.add.insert(moved.import_path.clone(), alias);
                                    moved.package_name.clone()
                                }
                            };
                            qualifiers.insert(moved.import_path.clone(), q.clone());
                            q
                        }
                    };
                    sites
                        .entry(moved.import_path.clone())
                        .or_default()
                        .push(qualifier.start_byte());
                    plan.edits.push(Edit::replace(
                        Span::new(qualifier.start_byte(), qualifier.end_byte()),
                        new_qualifier,
                    ));
                    plan.symbols.insert(name.to_string());
                    mapped += 1;
                }
            }
        }
        stack.extend(named_children(node));
    }

    if mapped == 0 {
        return Analysis::Skip(SkipReason::NoRelevantSymbol);
    }
    plan.keep_old = total > mapped;

    // Every new qualifier must be free in this file.
    let old_bound: HashSet<&str> = old_names
        .iter()
        .map(|obj| program.info.object(*obj).name.as_str())
        .collect();
    let pkg = &program.packages[file.package.0 as usize];
    for (path, qualifier) in &qualifiers {
        if existing.get(path) == Some(qualifier) {
            continue;
        }
        if let Some(other) = other_imports.get(qualifier) {
            if other != path {
                return Analysis::Conflict(format!(
                    "qualifier '{}' for {} is already bound to import {}",
                    qualifier, path, other
                ));
            }
        }
        if plan.keep_old && old_bound.contains(qualifier.as_str()) {
            return Analysis::Conflict(format!(
                "qualifier '{}' for {} is still needed by {}",
                qualifier, path, map.base_import_path
            ));
        }
        let rewritten = sites.get(path).map(Vec::as_slice).unwrap_or_default();
        if pkg.scope.contains_key(qualifier) || shadows(program, file, qualifier, rewritten) {
            return Analysis::Conflict(format!(
                "qualifier '{}' for {} collides with a declaration in this package",
                qualifier, path
            ));
        }
    }

    debug!(
        file = %file.path,
        symbols = plan.symbols.len(),
        imports = plan.add.len(),
        keep_old = plan.keep_old,
        "rewrite planned"
    );
    Analysis::Rewrite(plan)
}

/// Nodes that open a Go scope for the identifiers declared inside them.
const SCOPE_KINDS: &[&str] = &[
    "block",
    "function_declaration",
    "method_declaration",
    "func_literal",
    "if_statement",
    "for_statement",
    "expression_switch_statement",
    "type_switch_statement",
    "select_statement",
    "expression_case",
    "type_case",
    "default_case",
    "communication_case",
];

/// True if `file` declares `name` in a scope enclosing one of the `sites`
/// (byte offsets of rewritten qualifiers). Fields, methods and labels never
/// shadow a package name; import names are checked against the imports.
fn shadows(program: &Program, file: &SourceFile, name: &str, sites: &[usize]) -> bool {
    let entry = program.positions.file(file.id);
    let root = file.tree.root_node();
    program.info.defs.iter().any(|(pos, obj)| {
        let obj = program.info.object(*obj);
        if obj.name != name || pos.0 < entry.base || pos.0 > entry.base + entry.size {
            return false;
        }
        if matches!(
            obj.kind,
            ObjKind::Field { .. }
                | ObjKind::Func { has_receiver: true }
                | ObjKind::Label
                | ObjKind::PkgName { .. }
        ) {
            return false;
        }
        let offset = (pos.0 - entry.base) as usize;
        let scope = root
            .descendant_for_byte_range(offset, offset)
            .map(enclosing_scope)
            .unwrap_or(root);
        sites
            .iter()
            .any(|site| (scope.start_byte()..scope.end_byte()).contains(site))
    })
}

fn enclosing_scope(node: Node<'_>) -> Node<'_> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        if SCOPE_KINDS.contains(&parent.kind()) {
            return parent;
        }
        current = parent;
    }
    current
}
