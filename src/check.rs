//! Configuration syntax checking
//! Delegates validation to the daemon's own `-c -f` check mode

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Errors from running the syntax checker itself (not from a rejected file)
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to run syntax checker '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: io::Error,
    },
}

/// Result of a syntax check: pass/fail plus captured diagnostics
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub passed: bool,
    pub output: String,
}

/// Syntax checker for a candidate configuration file.
///
/// Implementations must not touch the live configuration; they operate on
/// the candidate path only.
pub trait ConfigCheck {
    fn check(&self, candidate: &Path) -> Result<CheckReport, CheckError>;
}

/// Checks a candidate with `haproxy -c -f <file>`
pub struct HaproxyCheck {
    binary: PathBuf,
}

impl HaproxyCheck {
    pub fn new<P: Into<PathBuf>>(binary: P) -> Self {
        Self { binary: binary.into() }
    }
}

impl ConfigCheck for HaproxyCheck {
    fn check(&self, candidate: &Path) -> Result<CheckReport, CheckError> {
        debug!(candidate = %candidate.display(), "running syntax check");

        let output = Command::new(&self.binary)
            .arg("-c")
            .arg("-f")
            .arg(candidate)
            .output()
            .map_err(|source| CheckError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        let mut diagnostics = String::from_utf8_lossy(&output.stdout).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(CheckReport {
            passed: output.status.success(),
            output: diagnostics.trim().to_string(),
        })
    }
}
