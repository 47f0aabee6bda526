//! Binary entry point for the gotug CLI.
//!
//! Every command prints one JSON response on stdout. Errors are printed as a
//! JSON `ErrorResponse` and reflected in the exit code. Logs go to stderr.
//!
//! ## Usage
//!
//! ```bash
//! # Summarize the packages under a directory
//! gotug index ./svc
//!
//! # Declaration and usages of the symbol at a position (path relative to --dir)
//! gotug decl --dir svc --at handler.go:42:7
//! gotug usages --dir svc --at handler.go:42:7
//!
//! # Rewrite imports after splitting pkg/util into sub-packages
//! gotug update-imports --package pkg/util --scope . --dry-run
//!
//! # Serve the same operations over MCP on stdio
//! gotug mcp
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;

use gotug::{Engine, EngineConfig};
use gotug_core::error::{GotugError, OutputErrorCode};
use gotug_core::output::{emit_response, ErrorResponse};
use gotug_core::types::Location;

// ============================================================================
// CLI Structure
// ============================================================================

/// Go source intelligence and import rewriting for AI agents.
#[derive(Parser, Debug)]
#[command(name = "gotug", version, about = "Go source intelligence for AI agents")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Args, Debug)]
struct GlobalArgs {
    /// Workspace root directory; all paths are confined to it (default: current directory).
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Log level for tracing output (overridden by RUST_LOG).
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value = "text")]
    log_format: LogFormat,

    /// Path to the gofmt binary (default: $GOTUG_GOFMT, then PATH).
    #[arg(long, global = true)]
    gofmt: Option<PathBuf>,

    /// Do not run gofmt on rewritten files.
    #[arg(long, global = true)]
    no_format: bool,
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log output format.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index the Go packages under a directory and print a summary.
    Index {
        /// Directory to index, relative to the workspace.
        #[arg(default_value = ".")]
        directory: String,
    },
    /// Find the declaration of the symbol at a position.
    Decl {
        /// Position as `path:line:col` (1-based, path relative to `--dir`).
        #[arg(long)]
        at: String,
        /// Directory to index.
        #[arg(long, default_value = ".")]
        dir: String,
    },
    /// Find every usage of the symbol at a position.
    Usages {
        /// Position as `path:line:col` (1-based, path relative to `--dir`).
        #[arg(long)]
        at: String,
        /// Directory to index.
        #[arg(long, default_value = ".")]
        dir: String,
    },
    /// Rewrite imports after a package was split into sub-packages.
    UpdateImports {
        /// Directory of the split package.
        #[arg(long)]
        package: String,
        /// Directory whose Go files are rewritten.
        #[arg(long, default_value = ".")]
        scope: String,
        /// Report outcomes and diffs without writing.
        #[arg(long)]
        dry_run: bool,
    },
    /// Serve the operations over MCP on stdio.
    #[cfg(feature = "mcp")]
    Mcp,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level, cli.global.log_format);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON, like every other response.
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber on stderr.
fn init_tracing(level: LogLevel, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn open_engine(global: &GlobalArgs) -> Result<Engine, GotugError> {
    let root = match &global.workspace {
        Some(path) => path.clone(),
        None => std::env::current_dir()
            .map_err(|e| GotugError::internal(format!("failed to get current directory: {}", e)))?,
    };
    let config = EngineConfig::from_flags(global.gofmt.as_deref(), global.no_format);
    Engine::new(root, config)
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), GotugError> {
    let engine = open_engine(&cli.global)?;
    match cli.command {
        Command::Index { directory } => emit(&engine.index_code(&directory)?),
        Command::Decl { at, dir } => {
            let (path, line, col) = parse_at(&at)?;
            let index = engine.index_code(&dir)?;
            let response = engine.find_declaration(&index.handle, &path, line, col)?;
            engine.release_handle(&index.handle)?;
            emit(&response)
        }
        Command::Usages { at, dir } => {
            let (path, line, col) = parse_at(&at)?;
            let index = engine.index_code(&dir)?;
            let response = engine.find_usages(&index.handle, &path, line, col)?;
            engine.release_handle(&index.handle)?;
            emit(&response)
        }
        Command::UpdateImports {
            package,
            scope,
            dry_run,
        } => emit(&engine.update_imports(&package, &scope, dry_run)?),
        #[cfg(feature = "mcp")]
        Command::Mcp => execute_mcp(engine),
    }
}

#[cfg(feature = "mcp")]
fn execute_mcp(engine: Engine) -> Result<(), GotugError> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| GotugError::internal(format!("failed to start runtime: {}", e)))?;
    runtime.block_on(gotug::mcp::run_mcp_server(engine))
}

fn parse_at(at: &str) -> Result<(String, i64, i64), GotugError> {
    Location::parse_signed(at).ok_or_else(|| {
        GotugError::invalid_args(format!(
            "invalid location format '{}', expected path:line:col",
            at
        ))
    })
}

fn emit<T: Serialize>(response: &T) -> Result<(), GotugError> {
    emit_response(response, &mut io::stdout()).map_err(|e| GotugError::internal(e.to_string()))?;
    let _ = io::stdout().flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_update_imports() {
        let cli = Cli::try_parse_from([
            "gotug",
            "--no-format",
            "update-imports",
            "--package",
            "pkg/util",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.global.no_format);
        match cli.command {
            Command::UpdateImports {
                package,
                scope,
                dry_run,
            } => {
                assert_eq!(package, "pkg/util");
                assert_eq!(scope, ".");
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn at_requires_three_parts() {
        assert_eq!(
            parse_at("a/b.go:3:7").unwrap(),
            ("a/b.go".to_string(), 3, 7)
        );
        assert!(parse_at("a/b.go:3").is_err());
        assert_eq!(parse_at("a.go:-1:2").unwrap().1, -1);
    }
}
