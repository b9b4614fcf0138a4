//! Forwarding pipeline
//! Composes store, renderer and publisher; a mutation is committed to the
//! rule store only after its rendered configuration has been validated and
//! published

use crate::check::ConfigCheck;
use crate::config::render;
use crate::publish::{ConfigPublisher, PublishError};
use crate::rule::{Rule, RuleStatus};
use crate::store::{RuleStore, StoreError};
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Errors from a pipeline operation
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Result of a successful publication
#[derive(Debug)]
pub struct ApplyOutcome {
    /// Backup created from the prior live file, if one existed
    pub backup: Option<PathBuf>,
    /// Number of active rules in the rendered document
    pub active_rules: usize,
}

/// Drives the rule store and config pipeline as one unit
pub struct ForwardManager<C> {
    store: RuleStore,
    publisher: ConfigPublisher<C>,
}

impl<C: ConfigCheck> ForwardManager<C> {
    pub fn new(store: RuleStore, publisher: ConfigPublisher<C>) -> Self {
        Self { store, publisher }
    }

    /// Current rule list in display order
    pub fn rules(&self) -> Result<Vec<Rule>, StoreError> {
        self.store.list()
    }

    /// Add a rule: publish the grown configuration first, persist second,
    /// so the store never holds a rule that failed validation
    pub fn add_rule(&self, rule: Rule) -> Result<ApplyOutcome, ApplyError> {
        let mut rules = self.store.list()?;

        if rules.iter().any(|r| r.front_port == rule.front_port) {
            return Err(StoreError::DuplicatePort(rule.front_port).into());
        }

        info!(front_port = rule.front_port, "adding forwarding rule");
        rules.push(rule);

        let outcome = self.apply(&rules)?;
        self.store.replace_all(&rules)?;
        Ok(outcome)
    }

    /// Delete by 1-based listing position; the position is resolved to the
    /// rule's front port before anything is mutated
    pub fn delete_at(&self, pos: usize) -> Result<(Rule, ApplyOutcome), ApplyError> {
        let rules = self.store.list()?;

        if pos == 0 || pos > rules.len() {
            return Err(StoreError::BadIndex {
                pos,
                len: rules.len(),
            }
            .into());
        }

        self.delete_port(rules[pos - 1].front_port)
    }

    /// Delete by front port, the store's stable identifier
    pub fn delete_port(&self, port: u16) -> Result<(Rule, ApplyOutcome), ApplyError> {
        let mut rules = self.store.list()?;

        let idx = rules
            .iter()
            .position(|r| r.front_port == port)
            .ok_or(StoreError::PortNotFound(port))?;

        info!(front_port = port, "deleting forwarding rule");
        let removed = rules.remove(idx);

        let outcome = self.apply(&rules)?;
        self.store.replace_all(&rules)?;
        Ok((removed, outcome))
    }

    /// Remove every rule and publish the bare preamble
    pub fn clear(&self) -> Result<ApplyOutcome, ApplyError> {
        info!("clearing all forwarding rules");
        let outcome = self.apply(&[])?;
        self.store.replace_all(&[])?;
        Ok(outcome)
    }

    /// Re-render and publish from the current store without mutating it.
    /// Recovery path for a live file that drifted (e.g. edited by hand).
    pub fn regenerate(&self) -> Result<ApplyOutcome, ApplyError> {
        let rules = self.store.list()?;
        self.apply(&rules)
    }

    fn apply(&self, rules: &[Rule]) -> Result<ApplyOutcome, ApplyError> {
        let preamble = self.publisher.current_preamble().map_err(PublishError::Io)?;
        let rendered = render(&preamble, rules);
        let backup = self.publisher.publish(&rendered)?;

        Ok(ApplyOutcome {
            backup,
            active_rules: rules.iter().filter(|r| r.status == RuleStatus::Active).count(),
        })
    }
}
