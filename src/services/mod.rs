//! Service layer for the push pipeline.
//!
//! This module contains the business logic for:
//! - Recent-changes polling (`ChangeFeedPoller`)
//! - Page metadata and image retrieval (`WikiPageClient`)
//! - Ban rule evaluation with decaying quotas (`BanRuleEngine`)

mod changes;
mod rules;
mod wiki;

pub use changes::{ChangeFeedPoller, MAX_CONTINUATIONS, TIMESTAMP_FORMAT, parse_recent_changes};
pub use rules::{BanRuleEngine, Evaluation, RuleOutcome};
pub use wiki::{MAX_CATEGORY_REQUESTS, WikiPageClient, parse_metadata, select_image};
