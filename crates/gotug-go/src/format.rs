//! Bridge to the external `gofmt` formatter.
//!
//! The source is written to a temporary `.go` file, formatted in place with
//! `gofmt -w`, and read back. The child is waited on with a timeout and
//! killed if it overruns.

use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};
use wait_timeout::ChildExt;

/// Environment variable naming the formatter binary.
pub const GOFMT_ENV: &str = "GOTUG_GOFMT";

/// Default time allowed for one formatter run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("formatter IO error: {0}")]
    Io(#[from] io::Error),

    #[error("gofmt timed out after {seconds}s")]
    TimedOut { seconds: u64 },

    #[error("gofmt failed: {stderr}")]
    Failed { stderr: String },
}

/// The source formatter used after import surgery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formatter {
    /// Run `gofmt` at this path.
    Gofmt { path: PathBuf, timeout: Duration },
    /// Leave source as produced by the surgeon.
    Disabled,
}

impl Formatter {
    /// Pick a formatter: `explicit`, then `$GOTUG_GOFMT`, then `gofmt` on
    /// `PATH`. Falls back to [`Formatter::Disabled`].
    pub fn detect(explicit: Option<&Path>) -> Formatter {
        let path = explicit
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(GOFMT_ENV).map(PathBuf::from))
            .or_else(|| which::which("gofmt").ok());
        match path {
            Some(path) => {
                debug!(gofmt = %path.display(), "using formatter");
                Formatter::gofmt(path)
            }
            None => {
                info!("gofmt not found; rewritten files will not be reformatted");
                Formatter::Disabled
            }
        }
    }

    pub fn gofmt(path: impl Into<PathBuf>) -> Formatter {
        Formatter::Gofmt {
            path: path.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Formatter::Gofmt { .. })
    }

    /// Format `source`, returning the formatted text.
    pub fn format(&self, source: &str) -> Result<String, FormatError> {
        match self {
            Formatter::Disabled => Ok(source.to_string()),
            Formatter::Gofmt { path, timeout } => run_gofmt(path, *timeout, source),
        }
    }
}

fn run_gofmt(gofmt: &Path, timeout: Duration, source: &str) -> Result<String, FormatError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("gotug-")
        .suffix(".go")
        .tempfile()?;
    tmp.write_all(source.as_bytes())?;
    tmp.flush()?;

    let mut child = Command::new(gofmt)
        .arg("-w")
        .arg(tmp.path())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let Some(status) = child.wait_timeout(timeout)? else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(FormatError::TimedOut {
            seconds: timeout.as_secs(),
        });
    };

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            pipe.read_to_string(&mut stderr).ok();
        }
        // gofmt names the temp file in its messages
        let stderr = stderr
            .replace(&tmp.path().display().to_string(), "<source>")
            .trim()
            .to_string();
        return Err(FormatError::Failed { stderr });
    }

    Ok(fs::read_to_string(tmp.path())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_formatter_is_identity() {
        let src = "package p\n\nimport \"a\"\n";
        assert_eq!(Formatter::Disabled.format(src).unwrap(), src);
        assert!(!Formatter::Disabled.is_enabled());
    }

    #[test]
    fn explicit_path_wins() {
        let f = Formatter::detect(Some(Path::new("/opt/go/bin/gofmt")));
        assert_eq!(f, Formatter::gofmt("/opt/go/bin/gofmt"));
    }

    #[test]
    fn missing_binary_is_io_error() {
        let f = Formatter::gofmt("/nonexistent/gotug/gofmt");
        assert!(matches!(f.format("package p\n"), Err(FormatError::Io(_))));
    }

    #[cfg(unix)]
    mod scripts {
        use super::*;
        use std::os::unix::fs::PermissionsExt;
        use tempfile::TempDir;

        fn script(dir: &TempDir, body: &str) -> PathBuf {
            let path = dir.path().join("fake-gofmt");
            fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        #[test]
        fn reads_back_rewritten_file() {
            let dir = TempDir::new().unwrap();
            // Appends a comment to the file passed after -w.
            let fake = script(&dir, "echo '// formatted' >> \"$2\"");
            let out = Formatter::gofmt(fake).format("package p\n").unwrap();
            assert_eq!(out, "package p\n// formatted\n");
        }

        #[test]
        fn non_zero_exit_is_failure_with_stderr() {
            let dir = TempDir::new().unwrap();
            let fake = script(&dir, "echo \"$2:3:1: expected declaration\" >&2\nexit 2");
            let err = Formatter::gofmt(fake).format("package p\n").unwrap_err();
            match err {
                FormatError::Failed { stderr } => {
                    assert_eq!(stderr, "<source>:3:1: expected declaration");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }
}
