//! Ban rule data structures.

use serde::{Deserialize, Serialize};

/// Identifier assigned to a rule by the rule store.
pub type RuleId = u64;

/// Literal prefix marking a category rule.
pub const CATEGORY_PREFIX: &str = "Category:";

/// How a rule pattern is matched against a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    /// Matches against the page's categories
    Category,
    /// Matches against the page title
    Regex,
}

/// A ban rule with a decaying quota of free passes.
///
/// The kind is derived from the pattern so the two can never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BanRule {
    pub id: RuleId,
    pub pattern: String,
    /// Matches still allowed before the rule starts blocking
    pub quota: u32,
}

impl BanRule {
    pub fn new(id: RuleId, pattern: impl Into<String>, quota: u32) -> Self {
        Self {
            id,
            pattern: pattern.into(),
            quota,
        }
    }

    pub fn kind(&self) -> RuleKind {
        if self.pattern.starts_with(CATEGORY_PREFIX) {
            RuleKind::Category
        } else {
            RuleKind::Regex
        }
    }

    /// Category name searched for by a category rule.
    ///
    /// The prefix is stripped and only the text after the last space is kept,
    /// so `Category:Foo Bar` searches for `Bar`.
    pub fn category_name(&self) -> Option<&str> {
        let rest = self.pattern.strip_prefix(CATEGORY_PREFIX)?;
        rest.rsplit(' ').next()
    }

    pub fn is_exhausted(&self) -> bool {
        self.quota == 0
    }
}

/// Outcome of evaluating one rule against one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RuleDecision {
    NoMatch,
    /// Matched with quota already exhausted
    MatchAndBlock,
    /// Matched with quota left; one pass consumed, page still allowed
    MatchAndThrottled,
}

/// Final verdict for a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    Allowed,
    Blocked,
}

impl Decision {
    pub fn is_blocked(self) -> bool {
        self == Decision::Blocked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_prefix() {
        assert_eq!(BanRule::new(1, "Category:Anime", 0).kind(), RuleKind::Category);
        assert_eq!(BanRule::new(2, "Foo.*", 0).kind(), RuleKind::Regex);
        // Prefix must lead the pattern
        assert_eq!(BanRule::new(3, "Not Category:X", 0).kind(), RuleKind::Regex);
    }

    #[test]
    fn category_name_takes_text_after_last_space() {
        assert_eq!(BanRule::new(1, "Category:Anime", 0).category_name(), Some("Anime"));
        assert_eq!(BanRule::new(1, "Category:Foo Bar", 0).category_name(), Some("Bar"));
        assert_eq!(BanRule::new(1, "Foo", 0).category_name(), None);
    }

    #[test]
    fn rule_round_trips_through_json() {
        let rule: BanRule = serde_json::from_str(r#"{"id":7,"pattern":"Foo.*","quota":2}"#).unwrap();
        assert_eq!(rule, BanRule::new(7, "Foo.*", 2));
        assert!(!rule.is_exhausted());
    }
}
