//! High-level [`Store`] facade over the connection pool and repositories.
//!
//! Cheap to clone (the pool is reference-counted); one instance is shared
//! by the HTTP surface and the sync orchestrator. Opening a store runs all
//! pending migrations.

use std::collections::HashSet;
use std::path::Path;

use lumen_core::formation::Formation;
use lumen_core::job::{SyncJob, SyncJobStatus, SyncMode};

use crate::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::errors::{Result, StoreError};
use crate::migrations::run_migrations;
use crate::repositories::analytics::{AnalyticsEvent, AnalyticsRepo};
use crate::repositories::formation::{FormationRepo, ListFormationsOptions};
use crate::repositories::sync_job::SyncJobRepo;

/// Outcome of a bulk import.
#[derive(Clone, Debug, Default)]
pub struct BulkImportReport {
    /// Records stored successfully.
    pub succeeded: u64,
    /// Failed records as `(name, message)` pairs.
    pub failed: Vec<(String, String)>,
}

/// Shared handle to the Lumen database.
#[derive(Clone)]
pub struct Store {
    pool: ConnectionPool,
}

impl Store {
    /// Open (or create) a file-backed store and run migrations.
    pub fn open(path: &Path, config: &ConnectionConfig) -> Result<Self> {
        let path = path.to_str().ok_or_else(|| StoreError::Migration {
            message: format!("non-UTF-8 database path: {}", path.display()),
        })?;
        let pool = connection::new_file(path, config)?;
        Self::from_pool(pool)
    }

    /// Open an in-memory store (tests) and run migrations.
    pub fn in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::from_pool(pool)
    }

    /// Wrap an existing pool, running migrations.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let _ = run_migrations(&conn)?;
        drop(conn);
        Ok(Self { pool })
    }

    /// Borrow a pooled connection for repository calls.
    pub fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Formations
    // ─────────────────────────────────────────────────────────────────────

    /// Idempotent create-or-update keyed by `(source, source_id)`.
    pub fn upsert_formation(&self, record: &Formation, mode: SyncMode) -> Result<Formation> {
        FormationRepo::upsert(&*self.conn()?, record, mode)
    }

    /// Get a formation by local ID.
    pub fn get_formation(&self, id: &str) -> Result<Option<Formation>> {
        FormationRepo::get_by_id(&*self.conn()?, id)
    }

    /// List formations.
    pub fn list_formations(&self, opts: &ListFormationsOptions<'_>) -> Result<Vec<Formation>> {
        FormationRepo::list(&*self.conn()?, opts)
    }

    /// Count formations, optionally per source.
    pub fn count_formations(&self, source: Option<&str>) -> Result<u64> {
        FormationRepo::count(&*self.conn()?, source)
    }

    /// Source ids already stored for a source (for `new`-mode filtering).
    pub fn existing_source_ids(&self, source: &str) -> Result<HashSet<String>> {
        FormationRepo::existing_source_ids(&*self.conn()?, source)
    }

    /// Upsert a batch of records (standalone bulk-import path).
    ///
    /// Per-record failures are collected, not propagated — one bad record
    /// must not abort an import file.
    pub fn bulk_import(&self, records: &[Formation], mode: SyncMode) -> Result<BulkImportReport> {
        let conn = self.conn()?;
        let mut report = BulkImportReport::default();
        for record in records {
            match FormationRepo::upsert(&conn, record, mode) {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(name = %record.name, "bulk import record failed: {e}");
                    report.failed.push((record.name.clone(), e.to_string()));
                }
            }
        }
        Ok(report)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sync jobs
    // ─────────────────────────────────────────────────────────────────────

    /// Create a new job in `pending` state.
    pub fn create_job(
        &self,
        job_type: &str,
        created_by: &str,
        metadata: serde_json::Value,
    ) -> Result<SyncJob> {
        SyncJobRepo::create(&*self.conn()?, job_type, created_by, metadata)
    }

    /// Get a job snapshot.
    pub fn get_job(&self, id: &str) -> Result<Option<SyncJob>> {
        SyncJobRepo::get_by_id(&*self.conn()?, id)
    }

    /// Most recent jobs, newest first.
    pub fn recent_jobs(&self, limit: u32) -> Result<Vec<SyncJob>> {
        SyncJobRepo::recent(&*self.conn()?, limit)
    }

    /// Forward-only status transition.
    pub fn transition_job(&self, id: &str, next: SyncJobStatus) -> Result<SyncJob> {
        SyncJobRepo::transition(&*self.conn()?, id, next)
    }

    /// Set total candidates once discovery completes.
    pub fn set_job_total(&self, id: &str, total: u64) -> Result<()> {
        SyncJobRepo::set_total_items(&*self.conn()?, id, total)
    }

    /// Checkpoint progress counters.
    pub fn checkpoint_progress(
        &self,
        id: &str,
        processed: u64,
        successful: u64,
        failed: u64,
    ) -> Result<()> {
        SyncJobRepo::update_progress(&*self.conn()?, id, processed, successful, failed)
    }

    /// Append an attributed per-item failure.
    pub fn append_job_error(&self, id: &str, identifier: &str, message: &str) -> Result<()> {
        SyncJobRepo::append_error(&*self.conn()?, id, identifier, message)
    }

    /// Merge keys into job metadata.
    pub fn merge_job_metadata(&self, id: &str, patch: &serde_json::Value) -> Result<()> {
        SyncJobRepo::merge_metadata(&*self.conn()?, id, patch)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Analytics
    // ─────────────────────────────────────────────────────────────────────

    /// Record an analytics event; failures are logged and swallowed.
    pub fn record_event(&self, event: &AnalyticsEvent) {
        match self.conn() {
            Ok(conn) => AnalyticsRepo::record_best_effort(&conn, event),
            Err(e) => tracing::warn!("analytics event dropped, no connection: {e}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
