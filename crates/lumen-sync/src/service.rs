//! Supervised background sync service.
//!
//! [`SyncService::start_sync`] creates the job row synchronously — the
//! caller gets an id to poll immediately — then hands the run to a
//! supervised tokio task. The supervision wrapper is the failure channel:
//! a run that returns an error or panics is folded back into the job
//! record as `failed` with a top-level error entry, so no failure path
//! escapes the durable record.
//!
//! Active runs are tracked in an explicit registry owned by the service
//! (job id → cancellation flag); there is no module-level state.

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{error, info};

use lumen_core::job::{SyncJob, SyncJobStatus, SyncMode};
use lumen_store::{AnalyticsEvent, Store, StoreError};

use crate::orchestrator::{CancellationFlag, SyncOrchestrator};

/// Job type recorded for formation ingestion runs.
const JOB_TYPE: &str = "formation_import";

/// Options for starting a sync run.
#[derive(Clone, Debug)]
pub struct StartSyncOptions {
    /// Which candidates to process.
    pub mode: SyncMode,
    /// Initiator recorded on the job (user id or `"system"`).
    pub created_by: String,
}

/// Job control and status surface over the orchestrator.
pub struct SyncService {
    store: Store,
    orchestrator: Arc<SyncOrchestrator>,
    active: parking_lot::Mutex<HashMap<String, CancellationFlag>>,
}

impl SyncService {
    /// Build the service.
    #[must_use]
    pub fn new(store: Store, orchestrator: Arc<SyncOrchestrator>) -> Arc<Self> {
        Arc::new(Self {
            store,
            orchestrator,
            active: parking_lot::Mutex::new(HashMap::new()),
        })
    }

    /// Create a job and start a supervised background run.
    ///
    /// Returns the job id immediately; the caller polls
    /// [`Self::get_sync_status`] for progress.
    pub fn start_sync(self: &Arc<Self>, opts: &StartSyncOptions) -> Result<String, StoreError> {
        let job = self.store.create_job(
            JOB_TYPE,
            &opts.created_by,
            serde_json::json!({
                "syncMode": opts.mode.as_str(),
                "initiator": opts.created_by,
            }),
        )?;
        let job_id = job.id.clone();

        let cancel = CancellationFlag::new();
        let _ = self
            .active
            .lock()
            .insert(job_id.clone(), cancel.clone());

        self.store.record_event(
            &AnalyticsEvent::new("sync_started", "sync_job", Some(&job_id)).with_metadata(
                serde_json::json!({"syncMode": opts.mode.as_str()}),
            ),
        );
        info!(job_id = %job_id, mode = opts.mode.as_str(), "sync job accepted");

        let service = Arc::clone(self);
        let mode = opts.mode;
        let spawned_id = job_id.clone();
        drop(tokio::spawn(async move {
            service.supervise(&spawned_id, mode, cancel).await;
        }));

        Ok(job_id)
    }

    /// Run the orchestrator and fold every failure path into the job row.
    async fn supervise(&self, job_id: &str, mode: SyncMode, cancel: CancellationFlag) {
        let run = std::panic::AssertUnwindSafe(self.orchestrator.run(job_id, mode, cancel))
            .catch_unwind()
            .await;

        let failure: Option<String> = match run {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(&panic)),
        };

        if let Some(message) = failure {
            error!(job_id, %message, "sync run failed");
            if let Err(e) = self.store.append_job_error(job_id, "sync", &message) {
                error!(job_id, "failed to record job error: {e}");
            }
            // A run that already reached a terminal state cannot move to
            // `failed`; that transition error is expected and dropped.
            if let Err(e) = self.store.transition_job(job_id, SyncJobStatus::Failed) {
                tracing::debug!(job_id, "job not transitioned to failed: {e}");
            }
            self.store.record_event(
                &AnalyticsEvent::new("sync_failed", "sync_job", Some(job_id))
                    .with_metadata(serde_json::json!({"error": message})),
            );
        } else {
            self.store
                .record_event(&AnalyticsEvent::new("sync_completed", "sync_job", Some(job_id)));
        }

        let _ = self.active.lock().remove(job_id);
    }

    /// Snapshot of one job; `None` when unknown.
    pub fn get_sync_status(&self, job_id: &str) -> Result<Option<SyncJob>, StoreError> {
        self.store.get_job(job_id)
    }

    /// Most recent jobs, newest first.
    pub fn get_recent_jobs(&self, limit: u32) -> Result<Vec<SyncJob>, StoreError> {
        self.store.recent_jobs(limit)
    }

    /// Request cooperative cancellation of an active run.
    ///
    /// Returns `false` when the job is not currently running.
    pub fn cancel(&self, job_id: &str) -> bool {
        match self.active.lock().get(job_id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    /// Whether a run for this job is still active.
    #[must_use]
    pub fn is_running(&self, job_id: &str) -> bool {
        self.active.lock().contains_key(job_id)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "sync task panicked".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
