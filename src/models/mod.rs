// src/models/mod.rs

//! Domain models for the push pipeline.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod image;
mod page;
mod rule;

// Re-export all public types
pub use config::{CacheConfig, Config, ImageConfig, PipelineConfig, RulesConfig, WikiConfig};
pub use image::{AcceptedCandidate, FetchedImage, content_hash};
pub use page::{PageMetadata, RecentChange, Title};
pub use rule::{BanRule, CATEGORY_PREFIX, Decision, RuleDecision, RuleId, RuleKind};
