//! Error types and error code constants for gotug.
//!
//! This module provides a unified error type (`GotugError`) that bridges
//! domain-specific errors from different subsystems (handles, sandbox,
//! loading, refactoring) into a common format suitable for JSON output.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad input from caller)
//! - `3`: Resolution errors (unknown handle, wrong handle type, missing
//!   refactor target, ambiguous symbol)
//! - `4`: Apply errors (failed to write changes)
//! - `6`: Path violations (path escapes the sandbox root)
//! - `7`: Load failures (no packages, missing module)
//! - `10`: Internal errors (bugs, unexpected state)
//!
//! "Not found" results (no declaration, no usages, position out of range)
//! are values, not errors, and never appear here.

use std::fmt;

use thiserror::Error;

use crate::handles::HandleError;
use crate::sandbox::PathViolation;

pub use crate::types::{Location, SymbolConflict};

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output.
///
/// These codes map to CLI exit codes and appear in JSON error responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Resolution errors (unknown handle, refactor target missing, ambiguous).
    ResolutionError = 3,
    /// Apply errors (failed to write changes).
    ApplyError = 4,
    /// Path escapes the sandbox root.
    PathViolation = 6,
    /// Package loading failed entirely.
    LoadError = 7,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI and MCP output.
///
/// This is the canonical error type that all subsystem errors are converted to
/// before being rendered as JSON output.
#[derive(Debug, Error)]
pub enum GotugError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments {
        message: String,
        details: Option<serde_json::Value>,
    },

    /// A caller path escapes the sandbox root.
    #[error("path violation: {path}: {reason}")]
    PathViolation { path: String, reason: String },

    /// The handle is not registered.
    #[error("unknown handle: {handle}")]
    UnknownHandle { handle: String },

    /// The handle names a value of a different type.
    #[error("handle {handle} is a {actual}, expected {expected}")]
    WrongHandleType {
        handle: String,
        expected: String,
        actual: String,
    },

    /// The directory of the package being split does not exist.
    #[error("refactored package path not found: {path}")]
    RefactoredPathNotFound { path: String },

    /// Two packages export the same name; a unique rewrite is impossible.
    #[error("ambiguous symbols: {}", format_conflicts(.conflicts))]
    AmbiguousSymbol { conflicts: Vec<SymbolConflict> },

    /// No packages could be loaded.
    #[error("load failed: {message}")]
    LoadFailed { message: String },

    /// Failed to apply changes.
    #[error("apply error: {message}")]
    ApplyError {
        message: String,
        file: Option<String>,
    },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

fn format_conflicts(conflicts: &[SymbolConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Error Code Mapping
// ============================================================================

impl From<&GotugError> for OutputErrorCode {
    fn from(err: &GotugError) -> Self {
        match err {
            GotugError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            GotugError::PathViolation { .. } => OutputErrorCode::PathViolation,
            GotugError::UnknownHandle { .. } => OutputErrorCode::ResolutionError,
            GotugError::WrongHandleType { .. } => OutputErrorCode::ResolutionError,
            GotugError::RefactoredPathNotFound { .. } => OutputErrorCode::ResolutionError,
            GotugError::AmbiguousSymbol { .. } => OutputErrorCode::ResolutionError,
            GotugError::LoadFailed { .. } => OutputErrorCode::LoadError,
            GotugError::ApplyError { .. } => OutputErrorCode::ApplyError,
            GotugError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<GotugError> for OutputErrorCode {
    fn from(err: GotugError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges: core subsystem errors -> GotugError
// ============================================================================

impl From<HandleError> for GotugError {
    fn from(err: HandleError) -> Self {
        match err {
            HandleError::Unknown { handle } => GotugError::UnknownHandle { handle },
            HandleError::WrongType {
                handle,
                expected,
                actual,
            } => GotugError::WrongHandleType {
                handle,
                expected: expected.to_string(),
                actual: actual.to_string(),
            },
        }
    }
}

impl From<PathViolation> for GotugError {
    fn from(err: PathViolation) -> Self {
        let reason = err.to_string();
        GotugError::PathViolation {
            path: err.path().display().to_string(),
            reason,
        }
    }
}

// ============================================================================
// Convenience Constructors
// ============================================================================

impl GotugError {
    /// Create an invalid arguments error.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        GotugError::InvalidArguments {
            message: message.into(),
            details: None,
        }
    }

    /// Create an invalid arguments error with JSON details.
    pub fn invalid_args_with_details(
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        GotugError::InvalidArguments {
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a load failure.
    pub fn load_failed(message: impl Into<String>) -> Self {
        GotugError::LoadFailed {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        GotugError::InternalError {
            message: message.into(),
        }
    }

    /// Get the error code for this error.
    pub fn error_code(&self) -> OutputErrorCode {
        OutputErrorCode::from(self)
    }
}

// ============================================================================
// Tests
// ============================================================================
