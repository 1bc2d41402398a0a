// src/services/rules.rs

//! Ban rule engine.
//!
//! Rules carry a quota of free passes: a match on a rule with quota left
//! consumes one pass and lets the page through, a match on an exhausted rule
//! blocks it. New rules therefore roll out softly. Every rule is evaluated in
//! the order given, even after a block is found, so quota consumption does
//! not depend on where the blocking rule sits in the list.

use std::collections::HashMap;
use std::sync::RwLock;

use regex::Regex;
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{BanRule, Decision, PageMetadata, RuleDecision, RuleId, RuleKind, RulesConfig};
use crate::storage::{QuotaUpdate, RuleStore};

/// Outcome of one rule against one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleOutcome {
    pub rule_id: RuleId,
    pub pattern: String,
    pub decision: RuleDecision,
}

/// Full evaluation of a page against the rule list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    /// Page carries the fixed banned category
    pub banned_category: bool,
    /// One entry per valid rule, in evaluation order
    pub outcomes: Vec<RuleOutcome>,
    /// Rules whose quota is (or must be) decremented for this page
    pub applied_decrements: Vec<RuleId>,
    /// Rules skipped because their pattern does not compile
    pub invalid_rules: Vec<RuleId>,
}

impl Evaluation {
    pub fn is_blocked(&self) -> bool {
        self.decision.is_blocked()
    }

    /// Decision recorded for a given rule.
    pub fn outcome_for(&self, rule_id: RuleId) -> Option<RuleDecision> {
        self.outcomes
            .iter()
            .find(|o| o.rule_id == rule_id)
            .map(|o| o.decision)
    }

    fn recompute(&mut self) {
        let any_block = self
            .outcomes
            .iter()
            .any(|o| o.decision == RuleDecision::MatchAndBlock);
        self.decision = if self.banned_category || any_block {
            Decision::Blocked
        } else {
            Decision::Allowed
        };
    }
}

/// Compiled regexes keyed by source; failures are cached as their message.
type RegexCache = RwLock<HashMap<String, std::result::Result<Regex, String>>>;

/// Decides whether a page may be announced.
///
/// Each distinct pattern is compiled once per engine and reused for every
/// later title, whatever rule snapshot it arrives in.
#[derive(Debug)]
pub struct BanRuleEngine {
    banned_category: String,
    compiled: RegexCache,
}

impl BanRuleEngine {
    /// Create an engine with the given always-blocking category.
    pub fn new(banned_category: impl Into<String>) -> Self {
        Self {
            banned_category: banned_category.into(),
            compiled: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RulesConfig) -> Self {
        Self::new(&config.banned_category)
    }

    /// Whether the page carries the fixed banned category.
    pub fn is_banned_category(&self, metadata: &PageMetadata) -> bool {
        metadata.has_category(&self.banned_category)
    }

    /// Whether `rule` matches the page.
    ///
    /// Category rules search their derived name in each category; other
    /// rules search their pattern in the title. Both are unanchored regex
    /// searches.
    pub fn matches(&self, rule: &BanRule, metadata: &PageMetadata) -> Result<bool> {
        match rule.kind() {
            RuleKind::Category => {
                let name = rule
                    .category_name()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| AppError::invalid_pattern(&rule.pattern, "empty category name"))?;
                let re = self.regex(&rule.pattern, name)?;
                Ok(metadata.categories.iter().any(|c| re.is_match(c)))
            }
            RuleKind::Regex => {
                let re = self.regex(&rule.pattern, &rule.pattern)?;
                Ok(re.is_match(&metadata.title))
            }
        }
    }

    /// Compiled form of `source`, from the cache when already seen.
    fn regex(&self, pattern: &str, source: &str) -> Result<Regex> {
        let cached = self
            .compiled
            .read()
            .ok()
            .and_then(|cache| cache.get(source).cloned());

        let compiled = match cached {
            Some(compiled) => compiled,
            None => {
                let compiled = Regex::new(source).map_err(|e| e.to_string());
                if let Ok(mut cache) = self.compiled.write() {
                    cache.insert(source.to_string(), compiled.clone());
                }
                compiled
            }
        };
        compiled.map_err(|message| AppError::invalid_pattern(pattern, message))
    }

    /// Evaluate the page against a snapshot of rules.
    ///
    /// Quotas are not touched here: `applied_decrements` lists the rules
    /// whose quota the caller must decrement.
    pub fn evaluate(&self, metadata: &PageMetadata, rules: &[BanRule]) -> Evaluation {
        let banned_category = self.is_banned_category(metadata);
        if banned_category {
            log::info!(
                "'{}' is in banned category {}",
                metadata.title,
                self.banned_category
            );
        }

        let mut evaluation = Evaluation {
            decision: Decision::Allowed,
            banned_category,
            outcomes: Vec::with_capacity(rules.len()),
            applied_decrements: Vec::new(),
            invalid_rules: Vec::new(),
        };

        for rule in rules {
            let matched = match self.matches(rule, metadata) {
                Ok(matched) => matched,
                Err(e) => {
                    log::error!("Skipping rule {} for '{}': {}", rule.id, metadata.title, e);
                    evaluation.invalid_rules.push(rule.id);
                    continue;
                }
            };

            let decision = match (matched, rule.is_exhausted()) {
                (false, _) => RuleDecision::NoMatch,
                (true, true) => {
                    log::info!("Rule {} ({}) blocks '{}'", rule.id, rule.pattern, metadata.title);
                    RuleDecision::MatchAndBlock
                }
                (true, false) => {
                    evaluation.applied_decrements.push(rule.id);
                    RuleDecision::MatchAndThrottled
                }
            };

            evaluation.outcomes.push(RuleOutcome {
                rule_id: rule.id,
                pattern: rule.pattern.clone(),
                decision,
            });
        }

        evaluation.recompute();
        evaluation
    }

    /// Evaluate against the live rule store, applying quota decrements.
    ///
    /// A throttled match whose decrement finds the quota already exhausted
    /// (another worker consumed the last pass) becomes a block. Store failures
    /// are reported as `AppError::RuleStore`.
    pub async fn evaluate_with_store(
        &self,
        metadata: &PageMetadata,
        store: &dyn RuleStore,
    ) -> Result<Evaluation> {
        let rules = store.list_rules().await.map_err(as_store_error)?;
        let mut evaluation = self.evaluate(metadata, &rules);

        let requested = std::mem::take(&mut evaluation.applied_decrements);
        for rule_id in requested {
            let update = store
                .decrement_quota(rule_id)
                .await
                .map_err(as_store_error)?;

            let outcome = evaluation
                .outcomes
                .iter_mut()
                .find(|o| o.rule_id == rule_id);

            match update {
                QuotaUpdate::Decremented { remaining } => {
                    log::info!(
                        "Rule {} throttled '{}', quota now {}",
                        rule_id,
                        metadata.title,
                        remaining
                    );
                    evaluation.applied_decrements.push(rule_id);
                }
                QuotaUpdate::AlreadyExhausted => {
                    log::info!(
                        "Rule {} exhausted concurrently, blocking '{}'",
                        rule_id,
                        metadata.title
                    );
                    if let Some(outcome) = outcome {
                        outcome.decision = RuleDecision::MatchAndBlock;
                    }
                }
                QuotaUpdate::UnknownRule => {
                    log::warn!("Rule {} vanished from the store during evaluation", rule_id);
                    if let Some(outcome) = outcome {
                        outcome.decision = RuleDecision::NoMatch;
                    }
                }
            }
        }

        evaluation.recompute();
        Ok(evaluation)
    }
}


fn as_store_error(e: AppError) -> AppError {
    match e {
        AppError::RuleStore(_) => e,
        other => AppError::rule_store(other.to_string()),
    }
}
