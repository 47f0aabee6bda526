//! MCP server front door.
//!
//! Exposes the engine operations as MCP tools over stdio:
//! - `index_code` - index a directory, returning a handle
//! - `find_declaration` / `find_usages` - query an index by position
//! - `release_handle` - drop an index
//! - `update_imports_for_moved_package` - rewrite imports after a package split
//!
//! Handles stay valid for the lifetime of the server. Engine calls block on
//! parsing and file IO, so each one runs on the blocking thread pool.

#![cfg(feature = "mcp")]

use std::sync::Arc;

use gotug_core::error::GotugError;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{
        CallToolResult, Content, ErrorCode, Implementation, ProtocolVersion, ServerCapabilities,
        ServerInfo,
    },
    tool, tool_handler, tool_router,
    transport::stdio,
    ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::engine::Engine;

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for the index tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IndexCodeParams {
    /// Directory to index, relative to the workspace.
    #[schemars(description = "Directory to index, relative to the workspace (default \".\")")]
    #[serde(default = "default_directory")]
    pub directory: String,
}

/// Parameters for position queries.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct PositionParams {
    /// Handle returned by `index_code`.
    #[schemars(description = "Handle returned by index_code")]
    pub handle: String,

    /// File path relative to the indexed directory.
    #[schemars(description = "File path relative to the directory passed to index_code")]
    pub file: String,

    /// 1-based line number.
    #[schemars(description = "1-based line number")]
    pub line: i64,

    /// 1-based column number (UTF-8 bytes).
    #[schemars(description = "1-based column number (UTF-8 bytes)")]
    pub column: i64,
}

/// Parameters for the release tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReleaseHandleParams {
    /// Handle to release.
    #[schemars(description = "Handle to release")]
    pub handle: String,
}

/// Parameters for the import rewrite tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateImportsParams {
    /// Directory of the package that was split into sub-packages.
    #[schemars(description = "Directory of the package that was split into sub-packages")]
    pub refactored_package_path: String,

    /// Directory whose Go files are rewritten.
    #[schemars(description = "Directory whose Go files are rewritten (default \".\")")]
    #[serde(default = "default_directory")]
    pub scan_scope: String,

    /// Report outcomes and diffs without writing.
    #[schemars(description = "Report outcomes and diffs without writing")]
    #[serde(default)]
    pub dry_run: bool,
}

fn default_directory() -> String {
    ".".to_string()
}

// ============================================================================
// MCP Server
// ============================================================================

/// MCP server over one workspace engine.
#[derive(Clone)]
pub struct GotugServer {
    tool_router: ToolRouter<Self>,
    engine: Arc<Engine>,
}

#[tool_router]
impl GotugServer {
    pub fn new(engine: Engine) -> Self {
        Self {
            tool_router: Self::tool_router(),
            engine: Arc::new(engine),
        }
    }

    /// Run `op` on the blocking pool and serialize its response.
    async fn run_json<T, F>(&self, op: F) -> Result<String, GotugError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(&Engine) -> Result<T, GotugError> + Send + 'static,
    {
        let engine = Arc::clone(&self.engine);
        let response = tokio::task::spawn_blocking(move || op(engine.as_ref()))
            .await
            .map_err(|e| GotugError::internal(format!("engine task failed: {}", e)))??;
        serde_json::to_string_pretty(&response)
            .map_err(|e| GotugError::internal(format!("JSON serialization error: {}", e)))
    }

    async fn run<T, F>(&self, op: F) -> Result<CallToolResult, McpError>
    where
        T: Serialize + Send + 'static,
        F: FnOnce(&Engine) -> Result<T, GotugError> + Send + 'static,
    {
        let json = self.run_json(op).await.map_err(to_mcp_error)?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Index the Go packages in a directory; returns a handle for queries")]
    async fn index_code(
        &self,
        Parameters(params): Parameters<IndexCodeParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |engine| engine.index_code(&params.directory))
            .await
    }

    #[tool(description = "Find the declaration of the symbol at a file position")]
    async fn find_declaration(
        &self,
        Parameters(p): Parameters<PositionParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |engine| engine.find_declaration(&p.handle, &p.file, p.line, p.column))
            .await
    }

    #[tool(description = "Find every usage of the symbol at a file position")]
    async fn find_usages(
        &self,
        Parameters(p): Parameters<PositionParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |engine| engine.find_usages(&p.handle, &p.file, p.line, p.column))
            .await
    }

    #[tool(description = "Release an index handle")]
    async fn release_handle(
        &self,
        Parameters(p): Parameters<ReleaseHandleParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |engine| engine.release_handle(&p.handle)).await
    }

    #[tool(
        description = "Rewrite imports of a package that was split into sub-packages, for every Go file in the scan scope"
    )]
    async fn update_imports_for_moved_package(
        &self,
        Parameters(p): Parameters<UpdateImportsParams>,
    ) -> Result<CallToolResult, McpError> {
        self.run(move |engine| {
            engine.update_imports(&p.refactored_package_path, &p.scan_scope, p.dry_run)
        })
        .await
    }
}

// ============================================================================
// Error Conversions
// ============================================================================

/// Custom JSON-RPC error codes for gotug operations.
///
/// These codes are in the reserved range -32000 to -32099 for server-defined errors.
mod error_codes {
    /// Handle resolution or symbol ambiguity.
    pub const RESOLUTION_ERROR: i32 = -32000;
    /// Refactored package directory not found.
    pub const RESOURCE_NOT_FOUND: i32 = -32001;
    /// Failed to write changes.
    pub const APPLY_ERROR: i32 = -32002;
    /// Path escapes the workspace.
    pub const PATH_VIOLATION: i32 = -32003;
    /// No packages could be loaded.
    pub const LOAD_ERROR: i32 = -32004;
}

/// Map an engine error onto a JSON-RPC error carrying `gotug_code`.
pub fn to_mcp_error(err: GotugError) -> McpError {
    let gotug_code = err.error_code().code();
    let mut data = serde_json::json!({ "gotug_code": gotug_code });

    match &err {
        GotugError::InvalidArguments { message, details } => {
            if let Some(d) = details {
                data["details"] = d.clone();
            }
            McpError::invalid_params(message.clone(), Some(data))
        }
        GotugError::PathViolation { path, .. } => {
            data["path"] = serde_json::json!(path);
            McpError::new(
                ErrorCode(error_codes::PATH_VIOLATION),
                err.to_string(),
                Some(data),
            )
        }
        GotugError::UnknownHandle { handle } | GotugError::WrongHandleType { handle, .. } => {
            data["handle"] = serde_json::json!(handle);
            McpError::new(
                ErrorCode(error_codes::RESOLUTION_ERROR),
                err.to_string(),
                Some(data),
            )
        }
        GotugError::AmbiguousSymbol { conflicts } => {
            data["conflicts"] = serde_json::json!(conflicts);
            McpError::new(
                ErrorCode(error_codes::RESOLUTION_ERROR),
                err.to_string(),
                Some(data),
            )
        }
        GotugError::RefactoredPathNotFound { path } => {
            data["path"] = serde_json::json!(path);
            McpError::new(
                ErrorCode(error_codes::RESOURCE_NOT_FOUND),
                err.to_string(),
                Some(data),
            )
        }
        GotugError::LoadFailed { .. } => McpError::new(
            ErrorCode(error_codes::LOAD_ERROR),
            err.to_string(),
            Some(data),
        ),
        GotugError::ApplyError { file, .. } => {
            if let Some(f) = file {
                data["file"] = serde_json::json!(f);
            }
            McpError::new(
                ErrorCode(error_codes::APPLY_ERROR),
                err.to_string(),
                Some(data),
            )
        }
        GotugError::InternalError { .. } => McpError::internal_error(err.to_string(), Some(data)),
    }
}

// ============================================================================
// ServerHandler Implementation
// ============================================================================

#[tool_handler]
impl ServerHandler for GotugServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "gotug".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "gotug is a Go source intelligence tool for AI coding agents. \
                 Index a directory with index_code, then query declarations and usages \
                 by position. update_imports_for_moved_package rewrites imports after \
                 a package is split into sub-packages."
                    .to_string(),
            ),
        }
    }
}

// ============================================================================
// Entry Point
// ============================================================================

/// Run the MCP server on stdio until the client disconnects.
pub async fn run_mcp_server(engine: Engine) -> Result<(), GotugError> {
    info!(workspace = %engine.workspace_root().display(), "starting MCP server");
    let server = GotugServer::new(engine);
    let service = server
        .serve(stdio())
        .await
        .map_err(|e| GotugError::internal(format!("MCP server failed to start: {}", e)))?;

    service
        .waiting()
        .await
        .map_err(|e| GotugError::internal(format!("MCP server error: {}", e)))?;

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
