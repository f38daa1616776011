//! Error taxonomy for the sync pipeline.
//!
//! [`SyncError`] classifies every failure the pipeline can hit. The
//! classification drives the handling policy: per-item errors are caught at
//! the item level and recorded in the job's error log; only
//! [`SyncError::Authentication`] and [`SyncError::JobFatal`] terminate a
//! run.

use thiserror::Error;

/// Errors produced by the sync pipeline.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Credentials missing/invalid, or post-login verification failed.
    /// Fatal to a run's start; never auto-retried.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network failure, timeout, or non-200 on a candidate URL. Retried with
    /// linear backoff; non-fatal to the job.
    #[error("fetch failed: {0}")]
    TransientFetch(String),

    /// No recognized data shape in a fetched page. Same per-item retry/skip
    /// policy as a fetch failure.
    #[error("parse failed: {0}")]
    Parse(String),

    /// Persistence-layer failure on upsert. Per-item, non-fatal to the job.
    #[error("store failed: {0}")]
    Store(String),

    /// Listing discovery failed on every endpoint, or another whole-job
    /// failure. Terminates the run.
    #[error("sync job failed: {0}")]
    JobFatal(String),
}

impl SyncError {
    /// Whether this error terminates the whole run rather than one item.
    #[must_use]
    pub fn is_job_fatal(&self) -> bool {
        matches!(self, Self::Authentication(_) | Self::JobFatal(_))
    }

    /// Whether a retry of the same item may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetch(_) | Self::Parse(_))
    }
}

/// Convenience alias for sync pipeline results.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
