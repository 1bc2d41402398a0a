// src/pipeline/push.rs

//! Push pipeline: poll → metadata → rules → image → cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{AcceptedCandidate, Config, RecentChange, Title};
use crate::services::{BanRuleEngine, ChangeFeedPoller, WikiPageClient};
use crate::storage::{ContentStore, RuleStore};
use crate::utils::http::create_async_client;

/// Stage at which a title dropped out of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipStage {
    Metadata,
    MissingPage,
    Image,
    Store,
}

/// A title that produced no candidate because of a per-title failure.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedTitle {
    pub title: Title,
    pub stage: SkipStage,
    pub reason: String,
}

/// Summary of a pipeline run.
#[derive(Debug, Default, Serialize)]
pub struct PushOutcome {
    /// Accepted pages, in feed order
    pub candidates: Vec<AcceptedCandidate>,
    pub skipped: Vec<SkippedTitle>,
    /// Titles blocked by the rule engine
    pub blocked: Vec<Title>,
    pub change_total: usize,
}

enum TitleResult {
    Accepted(AcceptedCandidate),
    Blocked,
    Skipped(SkipStage, String),
}

/// Orchestrates poller, page client, rule engine and content store.
pub struct PushPipeline {
    config: Arc<Config>,
    client: WikiPageClient,
    poller: ChangeFeedPoller,
    engine: BanRuleEngine,
    store: ContentStore,
}

impl PushPipeline {
    /// Build all components from configuration, sharing one HTTP pool.
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let http = create_async_client(&config.wiki)?;
        Ok(Self {
            client: WikiPageClient::with_client(http.clone(), &config)?,
            poller: ChangeFeedPoller::with_client(http, &config),
            engine: BanRuleEngine::from_config(&config.rules),
            store: ContentStore::from_config(&config.cache),
            config,
        })
    }

    /// Process every change in the window.
    ///
    /// Per-title failures are recorded in the outcome; only poller and rule
    /// store failures abort the run.
    pub async fn run(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        rules: &dyn RuleStore,
    ) -> Result<PushOutcome> {
        let changes = self.poller.poll(window_start, window_end).await?;
        let concurrency = self.config.pipeline.max_concurrent.max(1);

        let mut outcome = PushOutcome {
            change_total: changes.len(),
            ..PushOutcome::default()
        };

        let mut results = stream::iter(changes)
            .map(|change| async move {
                let result = self.process(&change, rules).await;
                (change.title, result)
            })
            .buffered(concurrency);

        while let Some((title, result)) = results.next().await {
            match result? {
                TitleResult::Accepted(candidate) => outcome.candidates.push(candidate),
                TitleResult::Blocked => outcome.blocked.push(title),
                TitleResult::Skipped(stage, reason) => {
                    log::warn!("Skipping '{}' at {:?}: {}", title, stage, reason);
                    outcome.skipped.push(SkippedTitle {
                        title,
                        stage,
                        reason,
                    });
                }
            }
        }

        log::info!(
            "Push run: {} changes, {} accepted, {} blocked, {} skipped",
            outcome.change_total,
            outcome.candidates.len(),
            outcome.blocked.len(),
            outcome.skipped.len()
        );

        Ok(outcome)
    }

    /// `run`, bounded by a deadline for the whole batch.
    pub async fn run_with_deadline(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        rules: &dyn RuleStore,
        deadline: Duration,
    ) -> Result<PushOutcome> {
        tokio::time::timeout(deadline, self.run(window_start, window_end, rules))
            .await
            .map_err(|_| AppError::DeadlineExceeded {
                secs: deadline.as_secs(),
            })?
    }

    /// Carry one title through the pipeline.
    ///
    /// `Err` only for rule store failures; everything else becomes a result.
    async fn process(&self, change: &RecentChange, rules: &dyn RuleStore) -> Result<TitleResult> {
        let title = change.title.as_str();

        let metadata = match self.client.fetch_metadata(title).await {
            Ok(metadata) => metadata,
            Err(e) => return Ok(TitleResult::Skipped(SkipStage::Metadata, e.to_string())),
        };
        if !metadata.exists() {
            return Ok(TitleResult::Skipped(
                SkipStage::MissingPage,
                "page reported missing".to_string(),
            ));
        }

        // Checked before any image traffic.
        let evaluation = self.engine.evaluate_with_store(&metadata, rules).await?;
        if evaluation.is_blocked() {
            return Ok(TitleResult::Blocked);
        }

        let image = match self.client.fetch_image(title).await {
            Ok(image) => image,
            Err(e) => return Ok(TitleResult::Skipped(SkipStage::Image, e.to_string())),
        };

        match self.store.put_image(&image).await {
            Ok(entry) => Ok(TitleResult::Accepted(AcceptedCandidate {
                title: change.title.clone(),
                image_path: entry.path,
                image_url: image.source_url,
                content_hash: image.content_hash,
            })),
            Err(e) => Ok(TitleResult::Skipped(SkipStage::Store, e.to_string())),
        }
    }
}

/// Run the pipeline over the configured window ending now.
pub async fn run_push(
    config: Arc<Config>,
    rules: &dyn RuleStore,
    window_minutes: u32,
) -> Result<PushOutcome> {
    let deadline = config.pipeline.deadline();
    let pipeline = PushPipeline::new(config)?;

    let window_end = Utc::now();
    let window_start = window_end - chrono::Duration::minutes(i64::from(window_minutes));

    pipeline
        .run_with_deadline(window_start, window_end, rules, deadline)
        .await
}
