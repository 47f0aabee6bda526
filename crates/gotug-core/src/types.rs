//! Common types shared between error and output modules.
//!
//! This module contains types that are used by both the error and output modules,
//! avoiding circular dependencies.

use serde::{Deserialize, Serialize};

// ============================================================================
// Location Type
// ============================================================================

/// Location in a source file.
///
/// - `file`: Root-relative path (required)
/// - `line`: 1-indexed line number (required)
/// - `col`: 1-indexed column, UTF-8 bytes (required)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Location {
    /// File path (root-relative).
    pub file: String,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, UTF-8 bytes).
    pub col: u32,
}

impl Location {
    /// Create a new location.
    pub fn new(file: impl Into<String>, line: u32, col: u32) -> Self {
        Location {
            file: file.into(),
            line,
            col,
        }
    }

    /// Parse a location from "path:line:col" format.
    ///
    /// This parsing is robust against paths containing colons (e.g., Windows paths).
    /// Line and column are parsed as signed integers so that callers can report
    /// non-positive values as argument errors instead of parse failures.
    pub fn parse_signed(s: &str) -> Option<(String, i64, i64)> {
        let parts: Vec<&str> = s.rsplitn(3, ':').collect();
        if parts.len() != 3 {
            return None;
        }
        let col: i64 = parts[0].parse().ok()?;
        let line: i64 = parts[1].parse().ok()?;
        Some((parts[2].to_string(), line, col))
    }

    /// Comparison key for deterministic sorting: (file, line, col).
    fn sort_key(&self) -> (&str, u32, u32) {
        (&self.file, self.line, self.col)
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

// ============================================================================
// Symbol Kinds and Query Results
// ============================================================================

/// Category of a resolved symbol.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Variable,
    Field,
    Function,
    Method,
    Type,
    Constant,
    Package,
    Label,
    Builtin,
    Nil,
    Unknown,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Field => "field",
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Type => "type",
            SymbolKind::Constant => "constant",
            SymbolKind::Package => "package",
            SymbolKind::Label => "label",
            SymbolKind::Builtin => "builtin",
            SymbolKind::Nil => "nil",
            SymbolKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a symbol is declared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Declaration {
    /// Declaring identifier's location, relative to the index root.
    #[serde(flatten)]
    pub location: Location,
    /// Symbol name.
    pub name: String,
    /// Symbol category.
    pub kind: SymbolKind,
}

/// One occurrence of a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Usage {
    #[serde(flatten)]
    pub location: Location,
    pub name: String,
}

// ============================================================================
// SymbolConflict Type
// ============================================================================

/// An exported name contributed by two different packages.
///
/// Produced when a package is split into sub-packages and two of them (or a
/// sub-package and the remaining base package) export the same name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SymbolConflict {
    /// The exported symbol name.
    pub name: String,
    /// Import path of the first package seen exporting the name.
    pub first: String,
    /// Import path of the second package exporting the name.
    pub second: String,
}

impl std::fmt::Display for SymbolConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "symbol '{}' is exported by both {} and {}",
            self.name, self.first, self.second
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
