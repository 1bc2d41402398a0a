//! Persistence for the push pipeline.
//!
//! - `ContentStore`: content-addressed image cache, `{root}/{md5}.{ext}`
//! - `RuleStore`: collaborator interface over the ban rule list, with
//!   `MemoryRuleStore` and `JsonRuleStore` implementations

pub mod content;
pub mod rules;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{BanRule, RuleId};

// Re-export for convenience
pub use content::{ContentStore, StoredEntry};
pub use rules::{JsonRuleStore, MemoryRuleStore};

/// Result of a quota decrement request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaUpdate {
    /// One pass consumed
    Decremented { remaining: u32 },
    /// Quota was already 0; nothing changed
    AlreadyExhausted,
    /// No rule with that id
    UnknownRule,
}

/// Narrow read/update interface over the external ban rule list.
///
/// Implementations never create or delete rules on behalf of the pipeline.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Snapshot of all rules, in evaluation order.
    async fn list_rules(&self) -> Result<Vec<BanRule>>;

    /// Atomically decrement a rule's quota if it is positive.
    async fn decrement_quota(&self, rule_id: RuleId) -> Result<QuotaUpdate>;
}
