//! Analytics event log — fire-and-forget writes.
//!
//! The sink contract: a failure to record an event must never fail the
//! calling operation. Callers use [`AnalyticsRepo::record_best_effort`],
//! which logs the error at warn level and swallows it.

use chrono::Utc;
use rusqlite::{Connection, params};
use tracing::warn;

use crate::errors::Result;

/// One analytics event.
#[derive(Clone, Debug)]
pub struct AnalyticsEvent {
    /// Event kind, e.g. `"sync_started"`.
    pub event_type: String,
    /// Entity kind, e.g. `"sync_job"`, `"formation"`.
    pub entity_type: String,
    /// Optional entity ID.
    pub entity_id: Option<String>,
    /// Optional acting user.
    pub user_id: Option<String>,
    /// Free-form event metadata.
    pub metadata: serde_json::Value,
}

impl AnalyticsEvent {
    /// Event with just a type, entity kind, and entity id.
    #[must_use]
    pub fn new(event_type: &str, entity_type: &str, entity_id: Option<&str>) -> Self {
        Self {
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.map(String::from),
            user_id: None,
            metadata: serde_json::Value::Object(serde_json::Map::new()),
        }
    }

    /// Attach metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Analytics repository — stateless, every method takes `&Connection`.
pub struct AnalyticsRepo;

impl AnalyticsRepo {
    /// Insert one event.
    pub fn record(conn: &Connection, event: &AnalyticsEvent) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO analytics_events (event_type, entity_type, entity_id, user_id, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.event_type,
                event.entity_type,
                event.entity_id,
                event.user_id,
                event.metadata.to_string(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insert one event, swallowing any failure.
    pub fn record_best_effort(conn: &Connection, event: &AnalyticsEvent) {
        if let Err(e) = Self::record(conn, event) {
            warn!(event_type = %event.event_type, "failed to record analytics event: {e}");
        }
    }

    /// Count events of a type (used by tests and admin stats).
    pub fn count(conn: &Connection, event_type: &str) -> Result<u64> {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM analytics_events WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(count)
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

    #[test]
    fn record_and_count() {
        let conn = test_conn();
        let event = AnalyticsEvent::new("sync_started", "sync_job", Some("job_1"))
            .with_metadata(json!({"syncMode": "new"}));
        AnalyticsRepo::record(&conn, &event).unwrap();
        assert_eq!(AnalyticsRepo::count(&conn, "sync_started").unwrap(), 1);
        assert_eq!(AnalyticsRepo::count(&conn, "sync_completed").unwrap(), 0);
    }

    #[test]
    fn best_effort_swallows_errors() {
        // No migrations — the insert will fail, but must not panic.
        let conn = Connection::open_in_memory().unwrap();
        let event = AnalyticsEvent::new("sync_started", "sync_job", None);
        AnalyticsRepo::record_best_effort(&conn, &event);
    }
}
