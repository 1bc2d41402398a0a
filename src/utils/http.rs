// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::WikiConfig;

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &WikiConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()
        .map_err(|e| AppError::config(format!("failed to build HTTP client: {e}")))
}

/// Retry budget for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Linear backoff step
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &WikiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff: config.retry_backoff(),
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.backoff * retry
    }
}

/// Send a request, retrying transport failures under `policy`.
///
/// `build` is called once per attempt since a `RequestBuilder` is consumed by
/// `send`. The response status is not inspected here.
pub async fn send_with_retry<F>(
    policy: RetryPolicy,
    context: &str,
    build: F,
) -> Result<reqwest::Response>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut retry = 0;
    loop {
        match build().send().await {
            Ok(response) => return Ok(response),
            Err(e) if retry < policy.max_retries => {
                retry += 1;
                let delay = policy.delay_for(retry);
                log::warn!(
                    "{} failed ({}), retry {}/{} in {:?}",
                    context,
                    e,
                    retry,
                    policy.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(AppError::upstream(context, e)),
        }
    }
}

/// GET an `api.php` query and parse the JSON reply.
///
/// A non-success status is `UpstreamUnavailable` and is not retried; a body
/// that is not JSON is `MalformedResponse`.
pub async fn query_json(
    client: &reqwest::Client,
    policy: RetryPolicy,
    api_root: &str,
    context: &str,
    params: &[(String, String)],
) -> Result<Value> {
    let response = send_with_retry(policy, context, || client.get(api_root).query(params)).await?;

    let status = response.status();
    if !status.is_success() {
        return Err(AppError::upstream(context, format!("HTTP {status}")));
    }

    let body = response
        .text()
        .await
        .map_err(|e| AppError::upstream(context, e))?;
    serde_json::from_str(&body).map_err(|e| AppError::malformed(context, e))
}

/// Parameters to send with the next request of a continued query, taken
/// from the reply's `continue` object. `None` once the query is complete.
pub fn continuation_params(reply: &Value) -> Option<Vec<(String, String)>> {
    let params: Vec<_> = reply
        .get("continue")?
        .as_object()?
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    (!params.is_empty()).then_some(params)
}

/// Parameters for the first request of a continued query.
pub fn initial_continuation() -> Vec<(String, String)> {
    vec![("continue".to_string(), String::new())]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_linear() {
        let policy = RetryPolicy {
            max_retries: 2,
            backoff: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
    }

    #[test]
    fn policy_reads_config() {
        let policy = RetryPolicy::from_config(&WikiConfig::default());
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.backoff, Duration::from_millis(500));
    }

    #[test]
    fn continuation_params_read_continue_object() {
        let reply = serde_json::json!({
            "continue": {"clcontinue": "4242|Zeta", "continue": "||"},
            "query": {}
        });
        let params = continuation_params(&reply).unwrap();
        assert!(params.contains(&("clcontinue".to_string(), "4242|Zeta".to_string())));
        assert!(params.contains(&("continue".to_string(), "||".to_string())));

        assert!(continuation_params(&serde_json::json!({"query": {}})).is_none());
        assert!(continuation_params(&serde_json::json!({"continue": {}})).is_none());
    }

    #[tokio::test]
    async fn unreachable_host_exhausts_retries() {
        let client = reqwest::Client::new();
        let policy = RetryPolicy {
            max_retries: 1,
            backoff: Duration::from_millis(1),
        };
        // Port 9 on localhost is not expected to accept connections.
        let err = send_with_retry(policy, "connect check", || client.get("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
