//! Sync job repository — durable progress checkpoints for ingestion runs.
//!
//! Every state transition and per-item outcome is written here before the
//! orchestrator proceeds, so a crash mid-run leaves an accurate partial
//! record. Status transitions are validated against the forward-only
//! ordering in `lumen_core::job::SyncJobStatus`.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use lumen_core::ids::new_job_id;
use lumen_core::job::{SyncErrorEntry, SyncJob, SyncJobStatus};

use crate::errors::{Result, StoreError};

/// Sync job repository — stateless, every method takes `&Connection`.
pub struct SyncJobRepo;

impl SyncJobRepo {
    /// Create a new job in `pending` state.
    pub fn create(
        conn: &Connection,
        job_type: &str,
        created_by: &str,
        metadata: serde_json::Value,
    ) -> Result<SyncJob> {
        let id = new_job_id();
        let now = Utc::now();
        let _ = conn.execute(
            "INSERT INTO sync_jobs (id, job_type, status, metadata, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                id,
                job_type,
                SyncJobStatus::Pending.as_sql(),
                metadata.to_string(),
                created_by,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(SyncJob {
            id,
            job_type: job_type.to_string(),
            status: SyncJobStatus::Pending,
            total_items: 0,
            processed_items: 0,
            successful_items: 0,
            failed_items: 0,
            error_log: Vec::new(),
            metadata,
            started_at: None,
            completed_at: None,
            created_by: created_by.to_string(),
            created_at: now,
        })
    }

    /// Get a job snapshot by ID.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<SyncJob>> {
        let row = conn
            .query_row(
                "SELECT * FROM sync_jobs WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Most recent jobs, newest first.
    pub fn recent(conn: &Connection, limit: u32) -> Result<Vec<SyncJob>> {
        let mut stmt =
            conn.prepare("SELECT * FROM sync_jobs ORDER BY created_at DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], Self::map_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Transition to a new status, enforcing the forward-only ordering.
    ///
    /// Sets `started_at` on entering `syncing` and `completed_at` on any
    /// terminal state.
    pub fn transition(conn: &Connection, id: &str, next: SyncJobStatus) -> Result<SyncJob> {
        let current =
            Self::get_by_id(conn, id)?.ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;

        if !current.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                from: current.status.as_sql().to_string(),
                to: next.as_sql().to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let _ = conn.execute(
            "UPDATE sync_jobs SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, next.as_sql(), now],
        )?;
        if next == SyncJobStatus::Syncing {
            let _ = conn.execute(
                "UPDATE sync_jobs SET started_at = ?2 WHERE id = ?1 AND started_at IS NULL",
                params![id, now],
            )?;
        }
        if next.is_terminal() {
            let _ = conn.execute(
                "UPDATE sync_jobs SET completed_at = ?2 WHERE id = ?1",
                params![id, now],
            )?;
        }

        Self::get_by_id(conn, id)?.ok_or_else(|| StoreError::JobNotFound(id.to_string()))
    }

    /// Set the total candidate count once discovery completes.
    pub fn set_total_items(conn: &Connection, id: &str, total: u64) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sync_jobs SET total_items = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, total, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Checkpoint progress counters after a processed batch.
    pub fn update_progress(
        conn: &Connection,
        id: &str,
        processed: u64,
        successful: u64,
        failed: u64,
    ) -> Result<()> {
        let _ = conn.execute(
            "UPDATE sync_jobs SET processed_items = ?2, successful_items = ?3,
             failed_items = ?4, updated_at = ?5 WHERE id = ?1",
            params![id, processed, successful, failed, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Append one attributed failure to the job's error log.
    pub fn append_error(conn: &Connection, id: &str, identifier: &str, message: &str) -> Result<()> {
        let current =
            Self::get_by_id(conn, id)?.ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
        let mut log = current.error_log;
        log.push(SyncErrorEntry {
            identifier: identifier.to_string(),
            message: message.to_string(),
        });
        let _ = conn.execute(
            "UPDATE sync_jobs SET error_log = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, serde_json::to_string(&log)?, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// Merge keys into the job's metadata object.
    pub fn merge_metadata(conn: &Connection, id: &str, patch: &serde_json::Value) -> Result<()> {
        let current =
            Self::get_by_id(conn, id)?.ok_or_else(|| StoreError::JobNotFound(id.to_string()))?;
        let mut metadata = current.metadata;
        if let (Some(base), Some(extra)) = (metadata.as_object_mut(), patch.as_object()) {
            for (k, v) in extra {
                let _ = base.insert(k.clone(), v.clone());
            }
        }
        let _ = conn.execute(
            "UPDATE sync_jobs SET metadata = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, metadata.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<SyncJob> {
        let status: String = row.get("status")?;
        let error_log: String = row.get("error_log")?;
        let metadata: String = row.get("metadata")?;
        let started_at: Option<String> = row.get("started_at")?;
        let completed_at: Option<String> = row.get("completed_at")?;
        let created_at: String = row.get("created_at")?;

        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        };

        Ok(SyncJob {
            id: row.get("id")?,
            job_type: row.get("job_type")?,
            status: SyncJobStatus::from_sql(&status).unwrap_or(SyncJobStatus::Failed),
            total_items: row.get("total_items")?,
            processed_items: row.get("processed_items")?,
            successful_items: row.get("successful_items")?,
            failed_items: row.get("failed_items")?,
            error_log: serde_json::from_str(&error_log).unwrap_or_default(),
            metadata: serde_json::from_str(&metadata).unwrap_or_default(),
            started_at: started_at.as_deref().and_then(parse_ts),
            completed_at: completed_at.as_deref().and_then(parse_ts),
            created_by: row.get("created_by")?,
            created_at: parse_ts(&created_at).unwrap_or_else(Utc::now),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;
    use serde_json::json;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn make_job(conn: &Connection) -> SyncJob {
        SyncJobRepo::create(conn, "formation_import", "system", json!({"syncMode": "new"}))
            .unwrap()
    }

    #[test]
    fn create_starts_pending() {
        let conn = test_conn();
        let job = make_job(&conn);
        assert_eq!(job.status, SyncJobStatus::Pending);
        assert_eq!(job.total_items, 0);
        assert!(job.id.starts_with("job_"));
    }

    #[test]
    fn forward_transition_chain() {
        let conn = test_conn();
        let job = make_job(&conn);
        let job = SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Starting).unwrap();
        assert_eq!(job.status, SyncJobStatus::Starting);
        let job = SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Syncing).unwrap();
        assert!(job.started_at.is_some());
        let job = SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Completed).unwrap();
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn backward_transition_rejected() {
        let conn = test_conn();
        let job = make_job(&conn);
        SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Syncing).unwrap();
        let err = SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Pending).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn terminal_state_is_final() {
        let conn = test_conn();
        let job = make_job(&conn);
        SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Failed).unwrap();
        let err = SyncJobRepo::transition(&conn, &job.id, SyncJobStatus::Syncing).unwrap_err();
        assert!(matches!(err, StoreError::InvalidTransition { .. }));
    }

    #[test]
    fn progress_checkpoints_persist() {
        let conn = test_conn();
        let job = make_job(&conn);
        SyncJobRepo::set_total_items(&conn, &job.id, 10).unwrap();
        SyncJobRepo::update_progress(&conn, &job.id, 5, 4, 1).unwrap();

        let snapshot = SyncJobRepo::get_by_id(&conn, &job.id).unwrap().unwrap();
        assert_eq!(snapshot.total_items, 10);
        assert_eq!(snapshot.processed_items, 5);
        assert_eq!(snapshot.successful_items, 4);
        assert_eq!(snapshot.failed_items, 1);
    }

    #[test]
    fn error_log_appends_in_order() {
        let conn = test_conn();
        let job = make_job(&conn);
        SyncJobRepo::append_error(&conn, &job.id, "a", "timeout").unwrap();
        SyncJobRepo::append_error(&conn, &job.id, "b", "no parseable data").unwrap();

        let snapshot = SyncJobRepo::get_by_id(&conn, &job.id).unwrap().unwrap();
        assert_eq!(snapshot.error_log.len(), 2);
        assert_eq!(snapshot.error_log[0].identifier, "a");
        assert_eq!(snapshot.error_log[1].message, "no parseable data");
    }

    #[test]
    fn metadata_merge_keeps_existing_keys() {
        let conn = test_conn();
        let job = make_job(&conn);
        SyncJobRepo::merge_metadata(&conn, &job.id, &json!({"durationMs": 1234})).unwrap();

        let snapshot = SyncJobRepo::get_by_id(&conn, &job.id).unwrap().unwrap();
        assert_eq!(snapshot.metadata["syncMode"], "new");
        assert_eq!(snapshot.metadata["durationMs"], 1234);
    }

    #[test]
    fn recent_returns_newest_first() {
        let conn = test_conn();
        let _first = make_job(&conn);
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = make_job(&conn);

        let jobs = SyncJobRepo::recent(&conn, 10).unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].id, second.id);
    }

    #[test]
    fn missing_job_errors() {
        let conn = test_conn();
        let err = SyncJobRepo::transition(&conn, "job_missing", SyncJobStatus::Failed).unwrap_err();
        assert!(matches!(err, StoreError::JobNotFound(_)));
    }
}
