//! Core infrastructure for gotug.
//!
//! This crate provides language-agnostic infrastructure:
//! - Error types and error codes
//! - Position tables (file bases, line tables, line:col <-> offset)
//! - The handle registry that names in-memory values for callers
//! - Path confinement for caller-supplied paths
//! - Span edit batching and unified diff rendering
//! - JSON output types for CLI and MCP responses

pub mod diff;
pub mod edit;
pub mod error;
pub mod handles;
pub mod output;
pub mod position;
pub mod sandbox;
pub mod types;
