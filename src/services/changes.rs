// src/services/changes.rs

//! Recent-changes poller.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{Config, RecentChange};
use crate::utils::http::{
    RetryPolicy, continuation_params, create_async_client, initial_continuation, query_json,
};

/// Timestamp format of `rcstart`/`rcend`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Upper bound on requests for one window; reaching it fails the poll.
pub const MAX_CONTINUATIONS: usize = 20;

/// Polls the upstream recent-changes list.
#[derive(Debug, Clone)]
pub struct ChangeFeedPoller {
    client: Client,
    api_root: String,
    retry: RetryPolicy,
}

impl ChangeFeedPoller {
    /// Create a poller with its own HTTP connection pool.
    pub fn new(config: &Config) -> Result<Self> {
        let client = create_async_client(&config.wiki)?;
        Ok(Self::with_client(client, config))
    }

    /// Create a poller sharing an existing HTTP connection pool.
    pub fn with_client(client: Client, config: &Config) -> Self {
        Self {
            client,
            api_root: config.wiki.api_root.clone(),
            retry: RetryPolicy::from_config(&config.wiki),
        }
    }

    /// Namespace-0 edits and creations between the two bounds, oldest first.
    ///
    /// Only the latest revision of each page is reported. Continuation
    /// tokens are followed until the upstream reports none; a feed still
    /// continuing after `MAX_CONTINUATIONS` requests is an error rather than
    /// a silently shortened window.
    pub async fn poll(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<RecentChange>> {
        if window_start > window_end {
            return Err(AppError::validation(format!(
                "window start {window_start} is after window end {window_end}"
            )));
        }

        let context = "recent changes query";
        let base = base_params(window_start, window_end);
        let mut continuation = initial_continuation();
        let mut changes = Vec::new();

        for round in 0..MAX_CONTINUATIONS {
            let params: Vec<(String, String)> =
                base.iter().cloned().chain(continuation).collect();
            let value =
                query_json(&self.client, self.retry, &self.api_root, context, &params).await?;
            let (batch, next) = parse_recent_changes(&value)?;

            log::debug!("Recent changes round {}: {} entries", round + 1, batch.len());
            changes.extend(batch);

            match next {
                Some(next) => continuation = next,
                None => {
                    log::info!(
                        "Polled {} recent changes between {} and {}",
                        changes.len(),
                        window_start.format(TIMESTAMP_FORMAT),
                        window_end.format(TIMESTAMP_FORMAT)
                    );
                    return Ok(changes);
                }
            }
        }

        log::error!(
            "Recent changes still continuing after {} requests ({} entries read)",
            MAX_CONTINUATIONS,
            changes.len()
        );
        Err(AppError::ContinuationLimit {
            context: context.to_string(),
            requests: MAX_CONTINUATIONS,
        })
    }
}

fn base_params(window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> Vec<(String, String)> {
    [
        ("format", "json".to_string()),
        ("action", "query".to_string()),
        ("list", "recentchanges".to_string()),
        ("rcstart", window_start.format(TIMESTAMP_FORMAT).to_string()),
        ("rcend", window_end.format(TIMESTAMP_FORMAT).to_string()),
        ("rcdir", "newer".to_string()),
        ("rcnamespace", "0".to_string()),
        ("rctoponly", "true".to_string()),
        ("rctype", "edit|new".to_string()),
        ("rcprop", "title|sizes|timestamp".to_string()),
        ("rclimit", "max".to_string()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// Split a `list=recentchanges` reply into entries and the continuation
/// parameters for the next request, if any.
pub fn parse_recent_changes(
    value: &Value,
) -> Result<(Vec<RecentChange>, Option<Vec<(String, String)>>)> {
    let context = "recent changes query";
    if !value.is_object() {
        return Err(AppError::malformed(context, "top-level reply is not an object"));
    }

    let list = value
        .get("query")
        .and_then(|q| q.get("recentchanges"))
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::malformed(context, "missing query.recentchanges"))?;

    let changes = list
        .iter()
        .map(|entry| {
            RecentChange::deserialize(entry).map_err(|e| AppError::malformed(context, e))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((changes, continuation_params(value)))
}
