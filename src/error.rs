// src/error.rs

//! Unified error handling for the push pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Transport or connection failure talking to the wiki
    #[error("Upstream unavailable ({context}): {message}")]
    UpstreamUnavailable { context: String, message: String },

    /// Upstream replied with an unexpected JSON shape
    #[error("Malformed response ({context}): {message}")]
    MalformedResponse { context: String, message: String },

    /// No image link on the page passed the size filter
    #[error("No qualifying image found for '{title}'")]
    NoImageFound { title: String },

    /// Page HTML could not be read or an image link carried unreadable attributes
    #[error("Unparseable HTML at {url}: {message}")]
    UnparseableHtml { url: String, message: String },

    /// Upstream kept returning continuation tokens past the request cap
    #[error("Continuation limit reached ({context}) after {requests} requests")]
    ContinuationLimit { context: String, requests: usize },

    /// Image download failed (transport error or non-success status)
    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    /// Ban rule pattern does not compile as a regular expression
    #[error("Invalid rule pattern '{pattern}': {message}")]
    InvalidRulePattern { pattern: String, message: String },

    /// Writing a cache entry failed
    #[error("Store write failed for {path}: {source}")]
    StoreWriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Rule store collaborator failure
    #[error("Rule store error: {0}")]
    RuleStore(String),

    /// Batch did not finish within the caller-supplied deadline
    #[error("Pipeline run exceeded its deadline of {secs}s")]
    DeadlineExceeded { secs: u64 },

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create an upstream transport error with context.
    pub fn upstream(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UpstreamUnavailable {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a malformed-response error with context.
    pub fn malformed(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::MalformedResponse {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a download error.
    pub fn download(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an unparseable-HTML error.
    pub fn unparseable(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::UnparseableHtml {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create an invalid rule pattern error.
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::InvalidRulePattern {
            pattern: pattern.into(),
            message: message.to_string(),
        }
    }

    /// Create a store write error for the given path.
    pub fn store_write(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Self::StoreWriteFailed {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    /// Create a rule store error.
    pub fn rule_store(message: impl Into<String>) -> Self {
        Self::RuleStore(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Whether a retry could plausibly succeed.
    ///
    /// Only transport failures qualify; malformed replies and missing images
    /// are terminal for the title that produced them.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable { .. })
    }
}
