//! Configuration publication
//! Backup, candidate side file, validation gate, atomic promotion

use crate::check::{CheckError, ConfigCheck};
use crate::config::{extract_preamble, DEFAULT_PREAMBLE};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by a publication attempt
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("candidate configuration rejected by syntax check:\n{diagnostics}")]
    Rejected { diagnostics: String },

    #[error(transparent)]
    Check(#[from] CheckError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Publishes rendered configurations to the live path.
///
/// Ordering per attempt: back up the current live file first, write the
/// candidate to a side path, validate, then either atomically rename the
/// candidate over the live path or remove it. A rejected candidate leaves
/// the live file and its backup untouched.
pub struct ConfigPublisher<C> {
    live_path: PathBuf,
    backup_dir: PathBuf,
    backup_prefix: String,
    checker: C,
}

impl<C: ConfigCheck> ConfigPublisher<C> {
    pub fn new<P, Q>(live_path: P, backup_dir: Q, backup_prefix: &str, checker: C) -> Self
    where
        P: Into<PathBuf>,
        Q: Into<PathBuf>,
    {
        Self {
            live_path: live_path.into(),
            backup_dir: backup_dir.into(),
            backup_prefix: backup_prefix.to_string(),
            checker,
        }
    }

    /// Path of the live configuration file
    pub fn live_path(&self) -> &Path {
        &self.live_path
    }

    /// Preamble for the next render: the live file's own preamble when it
    /// carries the managed marker, else the default template
    pub fn current_preamble(&self) -> io::Result<String> {
        if self.live_path.exists() {
            let live = fs::read_to_string(&self.live_path)?;
            if let Some(preamble) = extract_preamble(&live) {
                return Ok(preamble);
            }
            warn!(
                live = %self.live_path.display(),
                "live configuration has no managed marker, using default preamble"
            );
        }
        Ok(DEFAULT_PREAMBLE.to_string())
    }

    /// Publish a rendered document, returning the backup path created (if a
    /// live file existed to back up)
    pub fn publish(&self, rendered: &str) -> Result<Option<PathBuf>, PublishError> {
        if let Some(parent) = self.live_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Backup before anything else so a crash mid-publish never loses
        // the last-known-good document.
        let backup = self.backup_live()?;

        let candidate = candidate_path(&self.live_path);
        fs::write(&candidate, rendered)?;

        let report = match self.checker.check(&candidate) {
            Ok(report) => report,
            Err(err) => {
                let _ = fs::remove_file(&candidate);
                return Err(err.into());
            }
        };

        if !report.passed {
            fs::remove_file(&candidate)?;
            warn!("candidate rejected, live configuration unchanged");
            return Err(PublishError::Rejected {
                diagnostics: report.output,
            });
        }

        fs::rename(&candidate, &self.live_path)?;
        info!(live = %self.live_path.display(), "configuration published");

        Ok(backup)
    }

    fn backup_live(&self) -> io::Result<Option<PathBuf>> {
        if !self.live_path.exists() {
            return Ok(None);
        }

        fs::create_dir_all(&self.backup_dir)?;

        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let backup = self
            .backup_dir
            .join(format!("{}_{}.cfg", self.backup_prefix, stamp));
        fs::copy(&self.live_path, &backup)?;
        info!(backup = %backup.display(), "backed up live configuration");

        Ok(Some(backup))
    }
}

/// Side path the candidate is written to before promotion
fn candidate_path(live: &Path) -> PathBuf {
    let mut name = live.as_os_str().to_os_string();
    name.push(".candidate");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::check::CheckReport;
    use tempfile::tempdir;

    /// Checker with a fixed verdict
    struct StubCheck {
        passed: bool,
        output: &'static str,
    }

    impl ConfigCheck for StubCheck {
        fn check(&self, _candidate: &Path) -> Result<CheckReport, CheckError> {
            Ok(CheckReport {
                passed: self.passed,
                output: self.output.to_string(),
            })
        }
    }

    fn publisher(dir: &Path, passed: bool) -> ConfigPublisher<StubCheck> {
        ConfigPublisher::new(
            dir.join("haproxy.cfg"),
            dir.join("backup"),
            "haproxy",
            StubCheck {
                passed,
                output: "parse error near 'frontend'",
            },
        )
    }

    #[test]
    fn test_first_publish_creates_live_without_backup() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), true);

        let backup = publisher.publish("config v1\n").unwrap();
        assert!(backup.is_none());
        assert_eq!(fs::read_to_string(publisher.live_path()).unwrap(), "config v1\n");
    }

    #[test]
    fn test_backup_matches_prior_live_content() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), true);

        publisher.publish("config v1\n").unwrap();
        let backup = publisher.publish("config v2\n").unwrap().unwrap();

        assert_eq!(fs::read_to_string(&backup).unwrap(), "config v1\n");
        assert_eq!(fs::read_to_string(publisher.live_path()).unwrap(), "config v2\n");

        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("haproxy_"));
        assert!(name.ends_with(".cfg"));
    }

    #[test]
    fn test_rejected_candidate_leaves_live_untouched() {
        let dir = tempdir().unwrap();
        publisher(dir.path(), true).publish("config v1\n").unwrap();

        let failing = publisher(dir.path(), false);
        let err = failing.publish("config v2 broken\n").unwrap_err();

        match err {
            PublishError::Rejected { diagnostics } => {
                assert!(diagnostics.contains("parse error"))
            }
            other => panic!("expected rejection, got {other}"),
        }

        assert_eq!(
            fs::read_to_string(failing.live_path()).unwrap(),
            "config v1\n"
        );
        // No stray candidate left on the side path.
        assert!(!candidate_path(failing.live_path()).exists());
    }

    #[test]
    fn test_rejection_still_backs_up_prior_live() {
        let dir = tempdir().unwrap();
        publisher(dir.path(), true).publish("config v1\n").unwrap();

        let failing = publisher(dir.path(), false);
        failing.publish("config v2 broken\n").unwrap_err();

        let backups: Vec<_> = fs::read_dir(dir.path().join("backup"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert!(!backups.is_empty());
        assert!(backups
            .iter()
            .any(|b| fs::read_to_string(b).unwrap() == "config v1\n"));
    }

    #[test]
    fn test_current_preamble_defaults_when_no_live_file() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), true);

        assert_eq!(publisher.current_preamble().unwrap(), DEFAULT_PREAMBLE);
    }

    #[test]
    fn test_current_preamble_reads_back_published_preamble() {
        let dir = tempdir().unwrap();
        let publisher = publisher(dir.path(), true);

        let rendered = crate::config::render("global\n    maxconn 123\n", &[]);
        publisher.publish(&rendered).unwrap();

        let preamble = publisher.current_preamble().unwrap();
        assert!(preamble.contains("maxconn 123"));
    }
}
