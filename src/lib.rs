//! RustFwd - TCP port-forwarding rule manager for HAProxy
//!
//! Provides:
//! - A flat-file store of forwarding rules keyed by front port
//! - Full-config regeneration from the rule list
//! - Validation through the daemon's own syntax checker
//! - Atomic publication with timestamped backups
//! - systemd service control for the daemon unit

pub mod check;
pub mod config;
pub mod install;
pub mod lock;
pub mod manager;
pub mod menu;
pub mod publish;
pub mod rule;
pub mod service;
pub mod store;

pub use check::{CheckReport, ConfigCheck, HaproxyCheck};
pub use lock::InstanceLock;
pub use manager::{ApplyError, ApplyOutcome, ForwardManager};
pub use menu::Menu;
pub use publish::{ConfigPublisher, PublishError};
pub use rule::{IpVersion, Rule, RuleStatus};
pub use service::{ServiceManager, ServiceState};
pub use store::{RuleStore, StoreError};
