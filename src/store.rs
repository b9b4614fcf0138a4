//! Rule store backed by the flat rule file
//! One colon-delimited record per line; insertion order is display order

use crate::rule::{Rule, RuleParseError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors surfaced by rule store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a rule for front port {0} already exists")]
    DuplicatePort(u16),

    #[error("no rule with front port {0}")]
    PortNotFound(u16),

    #[error("no rule at position {pos} (store has {len} rule(s))")]
    BadIndex { pos: usize, len: usize },

    #[error("corrupt record at line {line}: {source}")]
    Corrupt {
        line: usize,
        #[source]
        source: RuleParseError,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Persisted ordered collection of forwarding rules
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    /// Open a rule store, creating the file and parent directory if missing
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !path.exists() {
            fs::write(&path, "")?;
        }

        Ok(Self { path })
    }

    /// Path of the backing rule file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all rules in file order.
    ///
    /// Blank lines are ignored; a malformed record is an error carrying its
    /// 1-based line number, never silently skipped.
    pub fn list(&self) -> Result<Vec<Rule>, StoreError> {
        let text = fs::read_to_string(&self.path)?;
        let mut rules = Vec::new();

        for (idx, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let rule = Rule::parse_record(line)
                .map_err(|source| StoreError::Corrupt { line: idx + 1, source })?;
            rules.push(rule);
        }

        Ok(rules)
    }

    /// Append a rule, failing if its front port is already present
    pub fn add(&self, rule: Rule) -> Result<(), StoreError> {
        let mut rules = self.list()?;

        if rules.iter().any(|r| r.front_port == rule.front_port) {
            return Err(StoreError::DuplicatePort(rule.front_port));
        }

        debug!(front_port = rule.front_port, "appending rule");
        rules.push(rule);
        self.replace_all(&rules)
    }

    /// Remove the rule with the given front port, returning it
    pub fn delete_port(&self, port: u16) -> Result<Rule, StoreError> {
        let mut rules = self.list()?;

        let idx = rules
            .iter()
            .position(|r| r.front_port == port)
            .ok_or(StoreError::PortNotFound(port))?;

        let removed = rules.remove(idx);
        self.replace_all(&rules)?;
        Ok(removed)
    }

    /// Remove the rule at a 1-based listing position.
    ///
    /// The position is resolved to the rule's front port first; the port,
    /// not the raw line number, is the deletion key.
    pub fn delete_at(&self, pos: usize) -> Result<Rule, StoreError> {
        let rules = self.list()?;

        if pos == 0 || pos > rules.len() {
            return Err(StoreError::BadIndex { pos, len: rules.len() });
        }

        self.delete_port(rules[pos - 1].front_port)
    }

    /// Remove every rule
    pub fn clear(&self) -> Result<(), StoreError> {
        self.replace_all(&[])
    }

    /// Rewrite the whole store atomically (temp file + rename)
    pub fn replace_all(&self, rules: &[Rule]) -> Result<(), StoreError> {
        let mut text = String::new();
        for rule in rules {
            text.push_str(&rule.to_record());
            text.push('\n');
        }

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, text)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
