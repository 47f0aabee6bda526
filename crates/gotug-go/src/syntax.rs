//! tree-sitter-go parsing and small syntax helpers.
//!
//! Everything here is purely syntactic: no scopes, no types. The resolver,
//! the symbol map builder and the import surgeon all read import blocks and
//! top-level declarations through these helpers so they agree on what a
//! declaration is.

use thiserror::Error;
use tree_sitter::{Node, Parser, Tree};

/// Node kinds that are identifiers for position queries.
pub const IDENTIFIER_KINDS: &[&str] = &[
    "identifier",
    "field_identifier",
    "type_identifier",
    "package_identifier",
    "label_name",
    "blank_identifier",
    "nil",
    "true",
    "false",
    "iota",
];

pub fn is_identifier_kind(kind: &str) -> bool {
    IDENTIFIER_KINDS.contains(&kind)
}

/// Errors from setting up or running the parser.
#[derive(Debug, Error)]
pub enum SyntaxError {
    #[error("failed to load Go grammar: {0}")]
    Language(String),

    #[error("parser produced no tree")]
    NoTree,
}

/// Parse Go source into a tree.
///
/// Syntax errors do not fail the parse; they show up as `ERROR` and
/// missing nodes, see [`first_syntax_error`].
pub fn parse(source: &str) -> Result<Tree, SyntaxError> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_go::LANGUAGE.into())
        .map_err(|e| SyntaxError::Language(e.to_string()))?;
    parser.parse(source, None).ok_or(SyntaxError::NoTree)
}

/// Source text covered by `node`.
pub fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    source.get(node.byte_range()).unwrap_or("")
}

/// True if `name` starts with an upper-case letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Named children of `node`, collected.
pub fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let children = node.named_children(&mut cursor).collect();
    children
}

/// Children of `node` stored under field `field`.
pub fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    let children = node.children_by_field_name(field, &mut cursor).collect();
    children
}

/// True if `node` has an anonymous child token `token`.
pub fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|c| !c.is_named() && c.kind() == token);
    found
}

// ============================================================================
// Diagnostics
// ============================================================================

/// A problem at one position of a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub line: u32,
    pub col: u32,
    pub message: String,
}

impl Diagnostic {
    /// A diagnostic at the start of `node`.
    pub fn at(node: Node<'_>, message: impl Into<String>) -> Self {
        let point = node.start_position();
        Diagnostic {
            line: point.row as u32 + 1,
            col: point.column as u32 + 1,
            message: message.into(),
        }
    }

    /// Render as `path:line:col: message`.
    pub fn render(&self, path: &str) -> String {
        format!("{}:{}:{}: {}", path, self.line, self.col, self.message)
    }
}

/// Find the first `ERROR` or missing node in document order.
pub fn first_syntax_error(tree: &Tree, source: &str) -> Option<Diagnostic> {
    let root = tree.root_node();
    if !root.has_error() {
        return None;
    }
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            let message = if node.is_missing() {
                format!("syntax error: missing {}", node.kind())
            } else {
                let snippet: String = text(node, source)
                    .chars()
                    .take_while(|c| *c != '\n')
                    .take(20)
                    .collect();
                format!("syntax error: unexpected {}", snippet.trim())
            };
            return Some(Diagnostic::at(node, message));
        }
        if node.has_error() {
            let mut children = named_children(node);
            // Unnamed children can be missing tokens too.
            let mut cursor = node.walk();
            children.extend(node.children(&mut cursor).filter(|c| c.is_missing()));
            children.sort_by_key(|c| std::cmp::Reverse(c.start_byte()));
            stack.extend(children);
        }
    }
    None
}

// ============================================================================
// Package clause and imports
// ============================================================================

/// The package clause name, if present.
pub fn package_name<'s>(root: Node<'_>, source: &'s str) -> Option<&'s str> {
    named_children(root)
        .into_iter()
        .find(|n| n.kind() == "package_clause")
        .and_then(|clause| {
            named_children(clause)
                .into_iter()
                .find(|n| n.kind() == "package_identifier")
        })
        .map(|id| text(id, source))
}

/// How an import spec names its package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportName {
    /// `import "p"`
    Default,
    /// `import . "p"`
    Dot,
    /// `import _ "p"`
    Blank,
    /// `import name "p"`
    Named(String),
}

/// One import spec with its surrounding declaration.
#[derive(Debug, Clone, Copy)]
pub struct ImportSpecNode<'t> {
    pub decl: Node<'t>,
    pub spec: Node<'t>,
    pub name: Option<Node<'t>>,
    pub path: Node<'t>,
    /// True if the declaration uses a parenthesised list.
    pub grouped: bool,
}

impl<'t> ImportSpecNode<'t> {
    pub fn path_value(&self, source: &str) -> String {
        unquote(text(self.path, source))
    }

    pub fn import_name(&self, source: &str) -> ImportName {
        match self.name {
            None => ImportName::Default,
            Some(n) => match n.kind() {
                "dot" => ImportName::Dot,
                "blank_identifier" => ImportName::Blank,
                _ => match text(n, source) {
                    "." => ImportName::Dot,
                    "_" => ImportName::Blank,
                    other => ImportName::Named(other.to_string()),
                },
            },
        }
    }
}

/// Top-level import declarations in source order.
pub fn import_decls(root: Node<'_>) -> Vec<Node<'_>> {
    named_children(root)
        .into_iter()
        .filter(|n| n.kind() == "import_declaration")
        .collect()
}

/// Every import spec in the file, in source order.
pub fn import_specs(root: Node<'_>) -> Vec<ImportSpecNode<'_>> {
    let mut out = Vec::new();
    for decl in import_decls(root) {
        for child in named_children(decl) {
            match child.kind() {
                "import_spec" => push_spec(&mut out, decl, child, false),
                "import_spec_list" => {
                    for spec in named_children(child) {
                        if spec.kind() == "import_spec" {
                            push_spec(&mut out, decl, spec, true);
                        }
                    }
                }
                _ => {}
            }
        }
    }
    out
}

fn push_spec<'t>(out: &mut Vec<ImportSpecNode<'t>>, decl: Node<'t>, spec: Node<'t>, grouped: bool) {
    if let Some(path) = spec.child_by_field_name("path") {
        out.push(ImportSpecNode {
            decl,
            spec,
            name: spec.child_by_field_name("name"),
            path,
            grouped,
        });
    }
}

/// Strip quotes from a Go string literal.
///
/// Only the escapes that can appear in import paths are decoded.
pub fn unquote(literal: &str) -> String {
    let s = literal.trim();
    if s.len() >= 2 && s.starts_with('`') && s.ends_with('`') {
        return s[1..s.len() - 1].to_string();
    }
    if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
        return s[1..s.len() - 1]
            .replace("\\\\", "\\")
            .replace("\\\"", "\"");
    }
    s.to_string()
}

/// Last element of an import path, ignoring a trailing `.vN` or `/vN`
/// major-version suffix.
pub fn default_package_name(import_path: &str) -> String {
    let mut parts: Vec<&str> = import_path.split('/').collect();
    if parts.len() > 1 && is_major_version(parts[parts.len() - 1]) {
        parts.pop();
    }
    let last = parts.last().copied().unwrap_or(import_path);
    let last = match last.rsplit_once('.') {
        Some((head, tail)) if is_major_version(tail) => head,
        _ => last,
    };
    last.replace('-', "_")
}

fn is_major_version(s: &str) -> bool {
    s.len() > 1 && s.starts_with('v') && s[1..].chars().all(|c| c.is_ascii_digit())
}

// ============================================================================
// Top-level declarations
// ============================================================================

/// Category of a top-level declared name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopLevelKind {
    Func,
    Type,
    Const,
    Var,
}

/// A name declared at package level.
#[derive(Debug, Clone, Copy)]
pub struct TopLevelName<'t> {
    pub kind: TopLevelKind,
    pub ident: Node<'t>,
}

/// Specs of a `const`/`var`/`type` declaration, looking through the
/// parenthesised list form.
pub fn decl_specs<'t>(decl: Node<'t>, spec_kinds: &[&str]) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    for child in named_children(decl) {
        if spec_kinds.contains(&child.kind()) {
            out.push(child);
        } else if child.kind().ends_with("_spec_list") {
            out.extend(
                named_children(child)
                    .into_iter()
                    .filter(|n| spec_kinds.contains(&n.kind())),
            );
        }
    }
    out
}

/// Every name declared at package level: functions (not methods), types,
/// constants and variables. Each name of a multi-name spec is listed
/// separately.
pub fn top_level_names(root: Node<'_>) -> Vec<TopLevelName<'_>> {
    let mut out = Vec::new();
    for decl in named_children(root) {
        match decl.kind() {
            "function_declaration" => {
                if let Some(name) = decl.child_by_field_name("name") {
                    out.push(TopLevelName {
                        kind: TopLevelKind::Func,
                        ident: name,
                    });
                }
            }
            "type_declaration" => {
                for spec in decl_specs(decl, &["type_spec", "type_alias"]) {
                    if let Some(name) = spec.child_by_field_name("name") {
                        out.push(TopLevelName {
                            kind: TopLevelKind::Type,
                            ident: name,
                        });
                    }
                }
            }
            "const_declaration" | "var_declaration" => {
                let (kinds, kind): (&[&str], _) = if decl.kind() == "const_declaration" {
                    (&["const_spec"], TopLevelKind::Const)
                } else {
                    (&["var_spec"], TopLevelKind::Var)
                };
                for spec in decl_specs(decl, kinds) {
                    for name in field_children(spec, "name") {
                        out.push(TopLevelName { kind, ident: name });
                    }
                }
            }
            _ => {}
        }
    }
    out
}
