//! Ban rule store implementations.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{BanRule, RuleId};
use crate::storage::{QuotaUpdate, RuleStore};

/// Decrement-if-positive on a rule list. Shared by both stores.
fn decrement_in(rules: &mut [BanRule], rule_id: RuleId) -> QuotaUpdate {
    match rules.iter_mut().find(|r| r.id == rule_id) {
        None => QuotaUpdate::UnknownRule,
        Some(rule) if rule.quota == 0 => QuotaUpdate::AlreadyExhausted,
        Some(rule) => {
            rule.quota -= 1;
            QuotaUpdate::Decremented {
                remaining: rule.quota,
            }
        }
    }
}

/// In-memory rule store, mainly for tests and one-shot runs.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    rules: Mutex<Vec<BanRule>>,
}

impl MemoryRuleStore {
    pub fn new(rules: Vec<BanRule>) -> Self {
        Self {
            rules: Mutex::new(rules),
        }
    }

    /// Current quota of a rule, if present.
    pub fn quota(&self, rule_id: RuleId) -> Option<u32> {
        self.rules
            .lock()
            .ok()?
            .iter()
            .find(|r| r.id == rule_id)
            .map(|r| r.quota)
    }
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn list_rules(&self) -> Result<Vec<BanRule>> {
        self.rules
            .lock()
            .map(|rules| rules.clone())
            .map_err(|_| AppError::rule_store("rule list lock poisoned"))
    }

    async fn decrement_quota(&self, rule_id: RuleId) -> Result<QuotaUpdate> {
        let mut rules = self
            .rules
            .lock()
            .map_err(|_| AppError::rule_store("rule list lock poisoned"))?;
        Ok(decrement_in(&mut rules, rule_id))
    }
}

/// Rule store backed by a JSON array on disk.
///
/// Every successful decrement rewrites the file atomically (write to temp,
/// then rename), so a crash never leaves a truncated rule list.
pub struct JsonRuleStore {
    path: PathBuf,
    rules: tokio::sync::Mutex<Vec<BanRule>>,
}

impl JsonRuleStore {
    /// Load rules from `path`. A missing file yields an empty rule list.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let rules = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                AppError::rule_store(format!("invalid rule file {}: {e}", path.display()))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!("No rule file at {}, starting with no rules", path.display());
                Vec::new()
            }
            Err(e) => return Err(AppError::Io(e)),
        };

        Ok(Self {
            path,
            rules: tokio::sync::Mutex::new(rules),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn persist(&self, rules: &[BanRule]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = serde_json::to_vec_pretty(rules)?;

        let tmp = self.path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for JsonRuleStore {
    async fn list_rules(&self) -> Result<Vec<BanRule>> {
        Ok(self.rules.lock().await.clone())
    }

    async fn decrement_quota(&self, rule_id: RuleId) -> Result<QuotaUpdate> {
        let mut rules = self.rules.lock().await;
        let update = decrement_in(&mut rules, rule_id);

        if let QuotaUpdate::Decremented { .. } = update {
            if let Err(e) = self.persist(&rules).await {
                // Keep memory and disk in agreement.
                if let Some(rule) = rules.iter_mut().find(|r| r.id == rule_id) {
                    rule.quota += 1;
                }
                return Err(AppError::rule_store(format!(
                    "failed to persist quota for rule {rule_id}: {e}"
                )));
            }
        }

        Ok(update)
    }
}
