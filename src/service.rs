//! Service lifecycle control
//! Thin wrapper over systemctl for the proxy daemon unit

use std::io;
use std::path::PathBuf;
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info};

/// Errors from driving the OS service manager.
///
/// These are deliberately distinct from configuration errors: a failed
/// restart never rolls back a published configuration.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("systemctl {action} {unit} failed: {detail}")]
    ActionFailed {
        action: &'static str,
        unit: String,
        detail: String,
    },

    #[error("failed to run systemctl: {0}")]
    Spawn(#[from] io::Error),
}

/// Reported daemon state after an action or status query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Active,
    Inactive,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Active => "active",
            ServiceState::Inactive => "inactive",
        }
    }
}

/// Issues start/stop/restart/reload to systemd and reports resulting state
pub struct ServiceManager {
    unit: String,
    systemctl: PathBuf,
}

impl ServiceManager {
    pub fn new(unit: &str) -> Self {
        Self::with_command(unit, "systemctl")
    }

    /// Use an alternative control command (tests substitute a stub binary)
    pub fn with_command<P: Into<PathBuf>>(unit: &str, systemctl: P) -> Self {
        Self {
            unit: unit.to_string(),
            systemctl: systemctl.into(),
        }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn start(&self) -> Result<ServiceState, ServiceError> {
        self.action("start")
    }

    pub fn stop(&self) -> Result<ServiceState, ServiceError> {
        self.action("stop")
    }

    pub fn restart(&self) -> Result<ServiceState, ServiceError> {
        self.action("restart")
    }

    pub fn reload(&self) -> Result<ServiceState, ServiceError> {
        self.action("reload")
    }

    /// Query the unit state without changing it
    pub fn status(&self) -> Result<ServiceState, ServiceError> {
        // `is-active` exits non-zero for inactive units; only the output
        // matters here.
        let output = Command::new(&self.systemctl)
            .arg("is-active")
            .arg(&self.unit)
            .output()?;

        let state = String::from_utf8_lossy(&output.stdout);
        debug!(unit = %self.unit, state = %state.trim(), "queried unit state");

        if state.trim() == "active" {
            Ok(ServiceState::Active)
        } else {
            Ok(ServiceState::Inactive)
        }
    }

    fn action(&self, action: &'static str) -> Result<ServiceState, ServiceError> {
        info!(unit = %self.unit, action, "issuing service action");

        let output = Command::new(&self.systemctl)
            .arg(action)
            .arg(&self.unit)
            .output()?;

        if !output.status.success() {
            let mut detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if detail.is_empty() {
                detail = format!("exit status {}", output.status);
            }
            return Err(ServiceError::ActionFailed {
                action,
                unit: self.unit.clone(),
                detail,
            });
        }

        self.status()
    }
}
