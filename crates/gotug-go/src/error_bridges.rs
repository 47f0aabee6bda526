//! Error bridge implementations for Go-specific errors.
//!
//! This module provides `impl From<X> for GotugError` conversions from the
//! error types of this crate to the unified `GotugError` type. They live
//! here rather than in `gotug-core` because the source types are defined here.

use gotug_core::error::GotugError;

use crate::format::FormatError;
use crate::loader::LoadError;
use crate::query::QueryError;
use crate::refactor::{RewriteError, SymbolMapError};

// ============================================================================
// Bridge: LoadError -> GotugError
// ============================================================================

impl From<LoadError> for GotugError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Syntax(e) => GotugError::internal(e.to_string()),
            other => GotugError::load_failed(other.to_string()),
        }
    }
}

// ============================================================================
// Bridge: QueryError -> GotugError
// ============================================================================

impl From<QueryError> for GotugError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::InvalidArgument { message } => GotugError::invalid_args(message),
        }
    }
}

// ============================================================================
// Bridge: SymbolMapError -> GotugError
// ============================================================================

impl From<SymbolMapError> for GotugError {
    fn from(err: SymbolMapError) -> Self {
        match err {
            SymbolMapError::NotFound { path } => GotugError::RefactoredPathNotFound { path },
            SymbolMapError::Ambiguous { conflicts } => GotugError::AmbiguousSymbol { conflicts },
            SymbolMapError::Parser(e) => GotugError::internal(e.to_string()),
            other => GotugError::load_failed(other.to_string()),
        }
    }
}

// ============================================================================
// Bridge: RewriteError -> GotugError
// ============================================================================

impl From<RewriteError> for GotugError {
    fn from(err: RewriteError) -> Self {
        match err {
            RewriteError::SymbolMap(e) => GotugError::from(e),
            RewriteError::Load(e) => GotugError::from(e),
            RewriteError::ScopeNotFound { path } => {
                GotugError::invalid_args(format!("scan scope not found: {}", path))
            }
        }
    }
}

// ============================================================================
// Bridge: FormatError -> GotugError
// ============================================================================

impl From<FormatError> for GotugError {
    fn from(err: FormatError) -> Self {
        GotugError::ApplyError {
            message: err.to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gotug_core::error::OutputErrorCode;
    use gotug_core::types::SymbolConflict;

    #[test]
    fn not_found_and_ambiguity_are_resolution_errors() {
        let err = GotugError::from(SymbolMapError::NotFound {
            path: "/w/pkg".to_string(),
        });
        assert!(matches!(err, GotugError::RefactoredPathNotFound { .. }));
        assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);

        let err = GotugError::from(RewriteError::SymbolMap(SymbolMapError::Ambiguous {
            conflicts: vec![SymbolConflict {
                name: "Shared".to_string(),
                first: "m/a".to_string(),
                second: "m/b".to_string(),
            }],
        }));
        assert_eq!(err.error_code(), OutputErrorCode::ResolutionError);
        assert!(err.to_string().contains("Shared"));
    }

    #[test]
    fn no_packages_is_a_load_failure() {
        let err = GotugError::from(LoadError::NoPackages {
            path: "/w".to_string(),
        });
        assert_eq!(err.error_code(), OutputErrorCode::LoadError);
    }

    #[test]
    fn query_argument_errors_are_invalid_arguments() {
        let err = GotugError::from(QueryError::InvalidArgument {
            message: "line must be >= 1".to_string(),
        });
        assert_eq!(err.error_code(), OutputErrorCode::InvalidArguments);
    }
}
