//! `go.mod` discovery and import path computation.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::files::rel_slash;
use crate::syntax::unquote;

#[derive(Debug, Error)]
pub enum GoModError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("{path}: no module directive")]
    NoModuleDirective { path: String },
}

/// A Go module: the directory holding `go.mod` and the declared module path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoModule {
    pub root: PathBuf,
    pub path: String,
}

impl GoModule {
    /// Find the module governing `start` by walking up to the nearest `go.mod`.
    pub fn find(start: &Path) -> Result<Option<GoModule>, GoModError> {
        for dir in start.ancestors() {
            let gomod = dir.join("go.mod");
            if gomod.is_file() {
                let content = fs::read_to_string(&gomod).map_err(|source| GoModError::Read {
                    path: gomod.display().to_string(),
                    source,
                })?;
                let path = parse_module_path(&content).ok_or_else(|| {
                    GoModError::NoModuleDirective {
                        path: gomod.display().to_string(),
                    }
                })?;
                debug!(module = %path, root = %dir.display(), "found go.mod");
                return Ok(Some(GoModule {
                    root: dir.to_path_buf(),
                    path,
                }));
            }
        }
        Ok(None)
    }

    /// Import path of the package in `dir`, or `None` if `dir` is outside
    /// the module.
    pub fn import_path(&self, dir: &Path) -> Option<String> {
        if !dir.starts_with(&self.root) {
            return None;
        }
        match rel_slash(&self.root, dir).as_str() {
            "." => Some(self.path.clone()),
            rel => Some(format!("{}/{}", self.path, rel)),
        }
    }
}

/// Extract the module path from `go.mod` content.
pub fn parse_module_path(content: &str) -> Option<String> {
    let mut in_block = false;
    for raw in content.lines() {
        let line = match raw.find("//") {
            Some(i) => &raw[..i],
            None => raw,
        }
        .trim();
        if in_block {
            if line == ")" {
                in_block = false;
            } else if !line.is_empty() {
                return Some(unquote(line));
            }
            continue;
        }
        if let Some(rest) = line.strip_prefix("module") {
            if !rest.starts_with(|c: char| c.is_whitespace() || c == '"' || c == '(') {
                continue;
            }
            let rest = rest.trim();
            if rest == "(" {
                in_block = true;
            } else if !rest.is_empty() {
                return Some(unquote(rest));
            }
        }
    }
    None
}
