//! The sync state machine.
//!
//! One [`SyncOrchestrator::run`] call drives a job through
//! `pending → starting → syncing → completed | completed_with_errors`,
//! checkpointing every transition and every batch's counters to the job
//! row before proceeding. Per-item failures are data (error-log entries),
//! never exceptions; only authentication and whole-discovery failures
//! propagate and fail the job.
//!
//! Concurrency model: detail downloads inside one batch fan out together
//! (`join_all`), batches run strictly sequentially with an inter-batch
//! delay as admission control against the marketplace. Progress counters
//! only move forward because each batch is joined before the next write.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

use lumen_core::formation::Formation;
use lumen_core::job::{SyncJobStatus, SyncMode};
use lumen_core::retry::{RetryPolicy, linear_backoff_delay};
use lumen_core::{SyncError, SyncResult};
use lumen_scraper::{SourceClient, parse_detail_page, parse_listing_page};
use lumen_store::Store;

/// Default candidates per concurrent batch.
pub const DEFAULT_BATCH_SIZE: usize = 5;
/// Default delay between batches.
pub const DEFAULT_BATCH_DELAY: Duration = Duration::from_millis(500);

/// Orchestrator configuration.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Origin tag recorded on every imported formation.
    pub source: String,
    /// Listing endpoints, fetched independently; one failing is skipped.
    pub listing_paths: Vec<String>,
    /// Detail URL templates with an `{id}` placeholder, tried in order.
    pub detail_path_templates: Vec<String>,
    /// Candidates per concurrent batch.
    pub batch_size: usize,
    /// Delay between batches.
    pub batch_delay: Duration,
    /// Per-item retry policy (linear backoff).
    pub retry: RetryPolicy,
}

impl SyncConfig {
    /// Config with the standard marketplace endpoints and pacing.
    #[must_use]
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            listing_paths: vec![
                "formations?page=1".into(),
                "formations?page=2".into(),
                "formations/featured".into(),
            ],
            detail_path_templates: vec!["formations/{id}".into(), "api/formations/{id}".into()],
            batch_size: DEFAULT_BATCH_SIZE,
            batch_delay: DEFAULT_BATCH_DELAY,
            retry: RetryPolicy::default(),
        }
    }
}

/// Cooperative cancellation handle, checked between batches.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Fresh, uncancelled flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The stateful sync driver.
pub struct SyncOrchestrator {
    client: Arc<SourceClient>,
    store: Store,
    config: SyncConfig,
}

impl SyncOrchestrator {
    /// Build an orchestrator over a client and store.
    #[must_use]
    pub fn new(client: Arc<SourceClient>, store: Store, config: SyncConfig) -> Self {
        Self {
            client,
            store,
            config,
        }
    }

    /// Drive one sync run for an already-created (`pending`) job.
    ///
    /// Returns `Err` only for job-fatal conditions (authentication,
    /// whole-discovery failure, checkpoint writes failing); the caller owns
    /// marking the job `failed` in that case. Per-item failures are
    /// recorded in the job row and do not surface here.
    pub async fn run(
        &self,
        job_id: &str,
        mode: SyncMode,
        cancel: CancellationFlag,
    ) -> SyncResult<()> {
        let run_started = std::time::Instant::now();
        let _ = self
            .checkpoint(|| self.store.transition_job(job_id, SyncJobStatus::Starting))?;

        match self.client.ensure_authenticated().await {
            Ok(true) => {}
            Ok(false) => {
                return Err(SyncError::Authentication(
                    "marketplace login could not be verified".into(),
                ));
            }
            Err(e) => return Err(SyncError::Authentication(e.to_string())),
        }

        let _ = self
            .checkpoint(|| self.store.transition_job(job_id, SyncJobStatus::Syncing))?;

        let candidates = self.discover().await?;
        let filtered = self.filter_by_mode(candidates, mode)?;
        self.checkpoint(|| self.store.set_job_total(job_id, filtered.len() as u64))?;
        info!(job_id, total = filtered.len(), mode = mode.as_str(), "sync discovery complete");

        let mut processed: u64 = 0;
        let mut successful: u64 = 0;
        let mut failed: u64 = 0;
        let mut cancelled = false;

        let batches: Vec<&[Formation]> = filtered.chunks(self.config.batch_size).collect();
        let batch_count = batches.len();
        for (index, batch) in batches.into_iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                warn!(job_id, processed, "sync cancelled between batches");
                break;
            }

            let outcomes = futures::future::join_all(
                batch.iter().map(|candidate| self.process_candidate(candidate, mode)),
            )
            .await;

            for (candidate, outcome) in batch.iter().zip(outcomes) {
                processed += 1;
                match outcome {
                    Ok(stored) => {
                        successful += 1;
                        tracing::debug!(job_id, formation = %stored.id, "candidate stored");
                    }
                    Err(e) => {
                        failed += 1;
                        let identifier = candidate.source_id.as_deref().unwrap_or(&candidate.id);
                        self.checkpoint(|| {
                            self.store.append_job_error(
                                job_id,
                                identifier,
                                &format!("{}: {e}", candidate.name),
                            )
                        })?;
                    }
                }
            }

            self.checkpoint(|| {
                self.store
                    .checkpoint_progress(job_id, processed, successful, failed)
            })?;

            if index + 1 < batch_count && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
        }

        let status = if failed > 0 || cancelled {
            SyncJobStatus::CompletedWithErrors
        } else {
            SyncJobStatus::Completed
        };
        self.checkpoint(|| {
            self.store.merge_job_metadata(
                job_id,
                &json!({
                    "syncMode": mode.as_str(),
                    "durationMs": run_started.elapsed().as_millis() as u64,
                    "cancelled": cancelled,
                    "categories": self.category_counts()?,
                }),
            )
        })?;
        let _ = self.checkpoint(|| self.store.transition_job(job_id, status))?;
        info!(job_id, processed, successful, failed, status = status.as_sql(), "sync run finished");
        Ok(())
    }

    /// Fetch all listing endpoints and merge their candidates, first-seen
    /// record winning on duplicate ids. One endpoint failing is logged and
    /// skipped; all endpoints failing is job-fatal.
    async fn discover(&self) -> SyncResult<Vec<Formation>> {
        let mut merged: Vec<Formation> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut failures = 0usize;

        for path in &self.config.listing_paths {
            let url = self.client.absolute(path);
            match self.client.get_text(&url).await {
                Ok(body) => {
                    for candidate in parse_listing_page(&body, &self.config.source) {
                        let key = candidate
                            .source_id
                            .clone()
                            .unwrap_or_else(|| candidate.id.clone());
                        if seen.insert(key) {
                            merged.push(candidate);
                        }
                    }
                }
                Err(e) => {
                    warn!(endpoint = %path, "listing fetch failed, skipping endpoint: {e}");
                    failures += 1;
                }
            }
        }

        if failures == self.config.listing_paths.len() {
            return Err(SyncError::JobFatal(format!(
                "all {failures} listing endpoints failed"
            )));
        }
        Ok(merged)
    }

    /// Apply the sync mode filter. `new` drops candidates whose source id
    /// already has a stored record; `all` and `force` keep everything.
    fn filter_by_mode(
        &self,
        candidates: Vec<Formation>,
        mode: SyncMode,
    ) -> SyncResult<Vec<Formation>> {
        if mode != SyncMode::New {
            return Ok(candidates);
        }
        let existing = self
            .store
            .existing_source_ids(&self.config.source)
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(candidates
            .into_iter()
            .filter(|c| {
                c.source_id
                    .as_deref()
                    .is_none_or(|sid| !existing.contains(sid))
            })
            .collect())
    }

    /// Download, parse, and upsert one candidate.
    ///
    /// Each detail URL template is tried in order; each URL gets up to
    /// `retry.max_attempts` attempts with linear backoff. A parse failure
    /// follows the same retry/skip policy as a fetch failure — a retry or a
    /// different template may yield a parseable response.
    async fn process_candidate(
        &self,
        candidate: &Formation,
        mode: SyncMode,
    ) -> SyncResult<Formation> {
        let Some(source_id) = candidate.source_id.as_deref() else {
            return Err(SyncError::Parse("candidate has no source id".into()));
        };

        let mut last_error = SyncError::TransientFetch("no detail URL templates".into());

        for template in &self.config.detail_path_templates {
            let url = self.client.absolute(&template.replace("{id}", source_id));

            for attempt in 1..=self.config.retry.max_attempts {
                match self.client.get_text(&url).await {
                    Ok(body) => match parse_detail_page(&body, &self.config.source) {
                        Some(detail) => {
                            let record = enrich_from_listing(detail, candidate);
                            return self
                                .store
                                .upsert_formation(&record, mode)
                                .map_err(|e| SyncError::Store(e.to_string()));
                        }
                        None => {
                            last_error =
                                SyncError::Parse(format!("no recognized data shape at {url}"));
                        }
                    },
                    Err(e) => {
                        last_error = e.into_sync_error();
                        if let SyncError::Authentication(_) = last_error {
                            // Re-login already failed inside the client;
                            // further attempts cannot recover this item.
                            return Err(last_error);
                        }
                    }
                }

                if attempt < self.config.retry.max_attempts {
                    let delay =
                        linear_backoff_delay(attempt, self.config.retry.base_delay_ms);
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
            }
        }

        Err(last_error)
    }

    /// Per-category stored-formation counts for the completion metadata.
    fn category_counts(&self) -> lumen_store::Result<serde_json::Value> {
        let formations = self.store.list_formations(&lumen_store::ListFormationsOptions {
            source: Some(&self.config.source),
            ..Default::default()
        })?;
        let mut counts = serde_json::Map::new();
        for f in formations {
            let key = if f.category.is_empty() {
                "uncategorized".to_string()
            } else {
                f.category
            };
            let entry = counts.entry(key).or_insert(json!(0));
            if let Some(n) = entry.as_u64() {
                *entry = json!(n + 1);
            }
        }
        Ok(serde_json::Value::Object(counts))
    }

    /// Run a store write, folding failures into the job-fatal taxonomy —
    /// a checkpoint that cannot be written means progress can no longer be
    /// trusted.
    fn checkpoint<T>(&self, write: impl FnOnce() -> lumen_store::Result<T>) -> SyncResult<T> {
        write().map_err(|e| SyncError::Store(e.to_string()))
    }
}

/// Fill detail-record gaps from the listing card: the detail page is the
/// more trusted source, but a sparse detail parse must not lose card-level
/// fields the listing already supplied.
fn enrich_from_listing(mut detail: Formation, candidate: &Formation) -> Formation {
    if detail.description.is_empty() {
        detail.description.clone_from(&candidate.description);
    }
    if detail.category.is_empty() {
        detail.category.clone_from(&candidate.category);
    }
    if detail.tags.is_empty() {
        detail.tags.clone_from(&candidate.tags);
    }
    if detail.thumbnail_url.is_none() {
        detail.thumbnail_url.clone_from(&candidate.thumbnail_url);
    }
    if detail.price.is_none() {
        detail.price = candidate.price;
    }
    if detail.creator.is_none() {
        detail.creator.clone_from(&candidate.creator);
    }
    if detail.drone_count == 0 {
        detail.drone_count = candidate.drone_count;
    }
    if detail.duration_secs.abs() < f64::EPSILON {
        detail.duration_secs = candidate.duration_secs;
    }
    if detail.rating.abs() < f64::EPSILON {
        detail.rating = candidate.rating;
    }
    if detail.download_count == 0 {
        detail.download_count = candidate.download_count;
    }
    detail
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
