//! gotug: Go source intelligence and import rewriting for AI agents.
//!
//! Two front doors share one [`engine::Engine`]:
//! - the `gotug` CLI binary, one operation per invocation
//! - an MCP server over stdio (feature `mcp`), where index handles live for
//!   the lifetime of the server

pub mod engine;

#[cfg(feature = "mcp")]
pub mod mcp;

pub use engine::{Engine, EngineConfig};
