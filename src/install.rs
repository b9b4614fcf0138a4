//! Daemon installation glue
//! Presence probe plus best-effort install via the OS package manager

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Command;
use tracing::info;

/// Package name installed when the daemon binary is missing
const PACKAGE: &str = "haproxy";

/// Whether the daemon binary is present and runnable
pub fn daemon_present(binary: &Path) -> bool {
    Command::new(binary)
        .arg("-v")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Install the daemon package through whichever package manager exists.
/// Tries apt-get, dnf, then yum; non-interactive.
pub fn install_daemon() -> Result<()> {
    let managers: [(&str, &[&str]); 3] = [
        ("apt-get", &["install", "-y", PACKAGE]),
        ("dnf", &["install", "-y", PACKAGE]),
        ("yum", &["install", "-y", PACKAGE]),
    ];

    for (manager, args) in managers {
        if !tool_available(manager) {
            continue;
        }

        info!(manager, package = PACKAGE, "installing daemon package");
        let status = Command::new(manager)
            .args(args)
            .env("DEBIAN_FRONTEND", "noninteractive")
            .status()
            .with_context(|| format!("failed to run {manager}"))?;

        if !status.success() {
            bail!("{manager} exited with {status} while installing {PACKAGE}");
        }
        return Ok(());
    }

    bail!("no supported package manager found (tried apt-get, dnf, yum)")
}

fn tool_available(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|out| out.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_not_present() {
        assert!(!daemon_present(Path::new("/nonexistent/haproxy-binary")));
    }

    #[cfg(unix)]
    #[test]
    fn test_probe_accepts_any_zero_exit_binary() {
        // `true` ignores `-v` and exits 0, standing in for the daemon.
        assert!(daemon_present(Path::new("true")));
    }
}
