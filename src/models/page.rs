//! Wiki page and recent-change data structures.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque page identifier used as the query key everywhere.
pub type Title = String;

/// Categories and namespace of a page, as reported by the metadata query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMetadata {
    /// Page title
    pub title: Title,

    /// Namespace id; `None` when the upstream reports the page as missing
    pub namespace: Option<i64>,

    /// Full category titles in upstream order (e.g. `Category:Anime`)
    pub categories: Vec<String>,
}

impl PageMetadata {
    pub fn new(title: impl Into<Title>, namespace: Option<i64>, categories: Vec<String>) -> Self {
        Self {
            title: title.into(),
            namespace,
            categories,
        }
    }

    /// Whether the page exists upstream.
    pub fn exists(&self) -> bool {
        self.namespace.is_some()
    }

    /// Exact membership test against a full category title.
    pub fn has_category(&self, category: &str) -> bool {
        self.categories.iter().any(|c| c == category)
    }
}

/// A single entry of the recent-changes feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentChange {
    pub title: Title,

    /// Page size in bytes before the edit (0 for creations)
    #[serde(rename = "oldlen", default)]
    pub byte_size_before: u64,

    /// Page size in bytes after the edit
    #[serde(rename = "newlen", default)]
    pub byte_size_after: u64,

    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RecentChange {
    /// Signed byte difference introduced by the edit.
    pub fn size_delta(&self) -> i64 {
        self.byte_size_after as i64 - self.byte_size_before as i64
    }
}
