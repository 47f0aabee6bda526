//! Go language support for gotug.
//!
//! This crate provides:
//! - File collection and `go.mod` discovery
//! - Parsing with tree-sitter-go
//! - Package loading with name and type resolution ([`loader`], [`resolver`])
//! - Position, declaration and usage queries ([`query`])
//! - The move-package import rewrite ([`refactor`]) and the gofmt bridge
//!   ([`format`])

pub mod error_bridges;
pub mod files;
pub mod format;
pub mod gomod;
pub mod loader;
pub mod objects;
pub mod query;
pub mod refactor;
pub mod resolver;
pub mod syntax;

pub use format::Formatter;
pub use loader::{load_program, CodeIndex, Excluded, LoadError, Program};
pub use query::{find_declaration, find_usages, QueryError};
pub use refactor::{
    update_imports_for_moved_package, FileOutcome, RewriteError, SkipReason, UpdateImportsOptions,
    UpdateImportsReport,
};
