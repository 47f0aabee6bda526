//! JSON output types for CLI and MCP responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same input -> same output (maps are `BTreeMap`,
//!    lists are sorted)
//! 3. **Nullable vs absent:** Explicit `null` for "no value"; absent field
//!    means "not applicable"
//! 4. **Versioned:** Schema version in response enables forward compatibility

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::error::{GotugError, OutputErrorCode};

pub use crate::types::{Declaration, Location, SymbolKind, Usage};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Error Types
// ============================================================================

/// Error information for error responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
    /// Error-specific structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorInfo {
    /// Create from a GotugError.
    pub fn from_error(err: &GotugError) -> Self {
        let code = OutputErrorCode::from(err).code();
        let message = err.to_string();

        let details = match err {
            GotugError::InvalidArguments { details, .. } => details.clone(),
            GotugError::PathViolation { path, .. } => Some(serde_json::json!({ "path": path })),
            GotugError::UnknownHandle { handle } => Some(serde_json::json!({ "handle": handle })),
            GotugError::WrongHandleType {
                handle,
                expected,
                actual,
            } => Some(serde_json::json!({
                "handle": handle,
                "expected": expected,
                "actual": actual
            })),
            GotugError::RefactoredPathNotFound { path } => {
                Some(serde_json::json!({ "path": path }))
            }
            GotugError::AmbiguousSymbol { conflicts } => {
                Some(serde_json::json!({ "conflicts": conflicts }))
            }
            GotugError::ApplyError { file, .. } => {
                file.as_ref().map(|f| serde_json::json!({ "file": f }))
            }
            _ => None,
        };

        ErrorInfo {
            code,
            message,
            details,
        }
    }
}

/// Response for any failed request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    pub schema_version: String,
    pub error: ErrorInfo,
}

impl ErrorResponse {
    pub fn from_error(err: &GotugError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Query Responses
// ============================================================================

/// Response for the `index` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexResponse {
    pub status: String,
    pub schema_version: String,
    /// Handle naming the in-memory index.
    pub handle: String,
    /// Indexed directory, relative to the workspace root.
    pub root: String,
    /// Module path from the governing `go.mod`, if any.
    pub module_path: Option<String>,
    /// Number of packages loaded.
    pub packages: usize,
    /// Number of files loaded.
    pub files: usize,
    /// Non-fatal load diagnostics.
    pub diagnostics: Vec<String>,
    /// RFC 3339 time the index was built.
    pub indexed_at: String,
}

impl IndexResponse {
    pub fn new(
        handle: impl Into<String>,
        root: impl Into<String>,
        module_path: Option<String>,
        packages: usize,
        files: usize,
        diagnostics: Vec<String>,
        indexed_at: impl Into<String>,
    ) -> Self {
        IndexResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            handle: handle.into(),
            root: root.into(),
            module_path,
            packages,
            files,
            diagnostics,
            indexed_at: indexed_at.into(),
        }
    }
}

/// Response for the `decl` command. `declaration` is `null` when not found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeclarationResponse {
    pub status: String,
    pub schema_version: String,
    pub declaration: Option<Declaration>,
}

impl DeclarationResponse {
    pub fn new(declaration: Option<Declaration>) -> Self {
        DeclarationResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            declaration,
        }
    }
}

/// Response for the `usages` command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsagesResponse {
    pub status: String,
    pub schema_version: String,
    pub usages: Vec<Usage>,
}

impl UsagesResponse {
    /// Build a response; usages are sorted for stable output.
    pub fn new(mut usages: Vec<Usage>) -> Self {
        usages.sort();
        UsagesResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            usages,
        }
    }
}

/// Response for releasing a handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseResponse {
    pub status: String,
    pub schema_version: String,
    pub handle: String,
}

impl ReleaseResponse {
    pub fn new(handle: impl Into<String>) -> Self {
        ReleaseResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            handle: handle.into(),
        }
    }
}

// ============================================================================
// Refactor Responses
// ============================================================================

/// Response for the `update-imports` command.
///
/// `error` carries a pipeline-fatal condition; per-file problems are listed
/// in `failed` instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateImportsResponse {
    pub status: String,
    pub schema_version: String,
    pub modified: Vec<String>,
    pub skipped: BTreeMap<String, String>,
    pub failed: BTreeMap<String, String>,
    pub error: Option<String>,
    pub dry_run: bool,
    /// Unified diff per modified file (dry runs only).
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub diffs: BTreeMap<String, String>,
}

impl UpdateImportsResponse {
    pub fn new(
        modified: Vec<String>,
        skipped: BTreeMap<String, String>,
        failed: BTreeMap<String, String>,
        dry_run: bool,
        diffs: BTreeMap<String, String>,
    ) -> Self {
        UpdateImportsResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            modified,
            skipped,
            failed,
            error: None,
            dry_run,
            diffs,
        }
    }
}

// ============================================================================
// Emit
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolConflict;

    mod error_response {
        use super::*;

        #[test]
        fn status_is_error_with_code() {
            let err = GotugError::invalid_args("column must be >= 1");
            let resp = ErrorResponse::from_error(&err);
            let v = serde_json::to_value(&resp).unwrap();
            assert_eq!(v["status"], "error");
            assert_eq!(v["error"]["code"], 2);
            assert!(v["error"].get("details").is_none());
        }

        #[test]
        fn ambiguous_symbol_details_list_conflicts() {
            let err = GotugError::AmbiguousSymbol {
                conflicts: vec![SymbolConflict {
                    name: "Dup".to_string(),
                    first: "m/a".to_string(),
                    second: "m/b".to_string(),
                }],
            };
            let info = ErrorInfo::from_error(&err);
            let details = info.details.unwrap();
            assert_eq!(details["conflicts"][0]["name"], "Dup");
            assert_eq!(info.code, 3);
        }
    }

    mod query_responses {
        use super::*;

        #[test]
        fn missing_declaration_is_null() {
            let v = serde_json::to_value(DeclarationResponse::new(None)).unwrap();
            assert!(v["declaration"].is_null());
        }

        #[test]
        fn usages_are_sorted() {
            let resp = UsagesResponse::new(vec![
                Usage {
                    location: Location::new("b.go", 1, 1),
                    name: "x".to_string(),
                },
                Usage {
                    location: Location::new("a.go", 4, 2),
                    name: "x".to_string(),
                },
            ]);
            assert_eq!(resp.usages[0].location.file, "a.go");
        }
    }

    mod update_imports {
        use super::*;

        #[test]
        fn diffs_omitted_when_empty() {
            let resp = UpdateImportsResponse::new(
                vec!["main.go".to_string()],
                BTreeMap::new(),
                BTreeMap::new(),
                false,
                BTreeMap::new(),
            );
            let v = serde_json::to_value(&resp).unwrap();
            assert!(v.get("diffs").is_none());
            assert!(v["error"].is_null());
            assert_eq!(v["modified"][0], "main.go");
        }
    }

    #[test]
    fn emit_response_produces_valid_json() {
        let resp = ReleaseResponse::new("index_1");
        let mut out = Vec::new();
        emit_response(&resp, &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["handle"], "index_1");
    }
}
