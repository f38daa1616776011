//! Formation repository — idempotent create-or-update keyed by source id.
//!
//! The upsert contract (used by the sync orchestrator and the bulk-import
//! job):
//!
//! - absent → insert; the source's own id is adopted as the local primary
//!   key only when it is safe (`lumen_core::ids::source_id_adoptable`),
//!   otherwise a fresh `frm_<uuidv7>` key is generated and bound to the
//!   source id.
//! - present + `force` → full field replacement.
//! - present + `all` → merge; existing non-null media fields (thumbnail,
//!   file URL) win over incoming nulls, so a partial detail fetch never
//!   blanks previously-known data.
//! - present + `new` → untouched (the orchestrator filters these out before
//!   download; hitting this branch is a no-op, not an error).
//!
//! Every successful upsert sets `sync_status = 'synced'` and refreshes
//! `last_synced` and `updated_at`. The local `id` is stable across re-syncs.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use lumen_core::formation::{Formation, FormationData, SyncStatus};
use lumen_core::ids::{new_formation_id, source_id_adoptable};
use lumen_core::job::SyncMode;

use crate::errors::Result;

/// Options for listing formations.
#[derive(Default)]
pub struct ListFormationsOptions<'a> {
    /// Filter by origin system tag.
    pub source: Option<&'a str>,
    /// Filter by category label.
    pub category: Option<&'a str>,
    /// Maximum results.
    pub limit: Option<i64>,
    /// Skip results.
    pub offset: Option<i64>,
}

/// Formation repository — stateless, every method takes `&Connection`.
pub struct FormationRepo;

impl FormationRepo {
    /// Idempotent create-or-update keyed by `(source, source_id)`.
    pub fn upsert(conn: &Connection, record: &Formation, mode: SyncMode) -> Result<Formation> {
        let existing = match record.source_id.as_deref() {
            Some(sid) => Self::find_by_source_id(conn, &record.source, sid)?,
            None => Self::get_by_id(conn, &record.id)?,
        };

        match existing {
            None => Self::insert(conn, record),
            Some(current) => match mode {
                SyncMode::New => Ok(current),
                SyncMode::Force => Self::replace(conn, &current.id, record),
                SyncMode::All => {
                    let merged = Self::merge(&current, record);
                    Self::replace(conn, &current.id, &merged)
                }
            },
        }
    }

    /// Look up by the idempotency key.
    pub fn find_by_source_id(
        conn: &Connection,
        source: &str,
        source_id: &str,
    ) -> Result<Option<Formation>> {
        let row = conn
            .query_row(
                "SELECT * FROM formations WHERE source = ?1 AND source_id = ?2",
                params![source, source_id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// Get by local primary key.
    pub fn get_by_id(conn: &Connection, id: &str) -> Result<Option<Formation>> {
        let row = conn
            .query_row(
                "SELECT * FROM formations WHERE id = ?1",
                params![id],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List formations with filtering and pagination, newest first.
    pub fn list(conn: &Connection, opts: &ListFormationsOptions<'_>) -> Result<Vec<Formation>> {
        use std::fmt::Write;
        let mut sql = String::from("SELECT * FROM formations WHERE 1=1");
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(source) = opts.source {
            let _ = write!(sql, " AND source = ?{}", param_values.len() + 1);
            param_values.push(Box::new(source.to_string()));
        }
        if let Some(category) = opts.category {
            let _ = write!(sql, " AND category = ?{}", param_values.len() + 1);
            param_values.push(Box::new(category.to_string()));
        }
        sql.push_str(" ORDER BY created_at DESC");
        if let Some(limit) = opts.limit {
            let _ = write!(sql, " LIMIT {limit}");
            if let Some(offset) = opts.offset {
                let _ = write!(sql, " OFFSET {offset}");
            }
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(AsRef::as_ref).collect();
        let rows = stmt.query_map(params_ref.as_slice(), Self::map_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Count stored formations, optionally for one source.
    pub fn count(conn: &Connection, source: Option<&str>) -> Result<u64> {
        let count: u64 = match source {
            Some(s) => conn.query_row(
                "SELECT COUNT(*) FROM formations WHERE source = ?1",
                params![s],
                |row| row.get(0),
            )?,
            None => conn.query_row("SELECT COUNT(*) FROM formations", [], |row| row.get(0))?,
        };
        Ok(count)
    }

    /// All source ids already stored for a source, for `new`-mode filtering.
    pub fn existing_source_ids(conn: &Connection, source: &str) -> Result<HashSet<String>> {
        let mut stmt = conn
            .prepare("SELECT source_id FROM formations WHERE source = ?1 AND source_id IS NOT NULL")?;
        let rows = stmt.query_map(params![source], |row| row.get::<_, String>(0))?;
        let mut out = HashSet::new();
        for row in rows {
            let _ = out.insert(row?);
        }
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────

    fn insert(conn: &Connection, record: &Formation) -> Result<Formation> {
        let id = match record.source_id.as_deref() {
            Some(sid) if source_id_adoptable(sid) => sid.to_string(),
            // Local records (no source id) keep their caller-assigned key
            // so re-imports find them again.
            None if source_id_adoptable(&record.id) => record.id.clone(),
            _ => new_formation_id(),
        };
        let now = Utc::now();
        let data_json = record
            .formation_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let _ = conn.execute(
            "INSERT INTO formations (id, source, source_id, name, description, category, tags,
             drone_count, duration_secs, thumbnail_url, file_url, price, creator, rating,
             download_count, sync_status, last_synced, formation_data, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                id,
                record.source,
                record.source_id,
                record.name,
                record.description,
                record.category,
                record.tags.join(","),
                record.drone_count,
                record.duration_secs,
                record.thumbnail_url,
                record.file_url,
                record.price,
                record.creator,
                record.rating,
                record.download_count,
                SyncStatus::Synced.as_sql(),
                now.to_rfc3339(),
                data_json,
                now.to_rfc3339(),
                now.to_rfc3339(),
            ],
        )?;

        Ok(Formation {
            id,
            sync_status: SyncStatus::Synced,
            last_synced: Some(now),
            ..record.clone()
        })
    }

    /// Full field replacement under the stable local `id`.
    fn replace(conn: &Connection, id: &str, record: &Formation) -> Result<Formation> {
        let now = Utc::now();
        let data_json = record
            .formation_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let _ = conn.execute(
            "UPDATE formations SET source = ?2, source_id = ?3, name = ?4, description = ?5,
             category = ?6, tags = ?7, drone_count = ?8, duration_secs = ?9, thumbnail_url = ?10,
             file_url = ?11, price = ?12, creator = ?13, rating = ?14, download_count = ?15,
             sync_status = ?16, last_synced = ?17, formation_data = ?18, updated_at = ?19
             WHERE id = ?1",
            params![
                id,
                record.source,
                record.source_id,
                record.name,
                record.description,
                record.category,
                record.tags.join(","),
                record.drone_count,
                record.duration_secs,
                record.thumbnail_url,
                record.file_url,
                record.price,
                record.creator,
                record.rating,
                record.download_count,
                SyncStatus::Synced.as_sql(),
                now.to_rfc3339(),
                data_json,
                now.to_rfc3339(),
            ],
        )?;

        Ok(Formation {
            id: id.to_string(),
            sync_status: SyncStatus::Synced,
            last_synced: Some(now),
            ..record.clone()
        })
    }

    /// Additive merge: incoming wins except null media fields.
    fn merge(current: &Formation, incoming: &Formation) -> Formation {
        Formation {
            id: current.id.clone(),
            thumbnail_url: incoming
                .thumbnail_url
                .clone()
                .or_else(|| current.thumbnail_url.clone()),
            file_url: incoming.file_url.clone().or_else(|| current.file_url.clone()),
            ..incoming.clone()
        }
    }

    fn map_row(row: &Row<'_>) -> rusqlite::Result<Formation> {
        let tags: String = row.get("tags")?;
        let data_json: Option<String> = row.get("formation_data")?;
        let formation_data = data_json
            .as_deref()
            .and_then(|s| serde_json::from_str::<FormationData>(s).ok());
        let sync_status: String = row.get("sync_status")?;
        let last_synced: Option<String> = row.get("last_synced")?;

        Ok(Formation {
            id: row.get("id")?,
            source: row.get("source")?,
            source_id: row.get("source_id")?,
            name: row.get("name")?,
            description: row.get("description")?,
            category: row.get("category")?,
            tags: if tags.is_empty() {
                Vec::new()
            } else {
                tags.split(',').map(str::to_string).collect()
            },
            drone_count: row.get("drone_count")?,
            duration_secs: row.get("duration_secs")?,
            thumbnail_url: row.get("thumbnail_url")?,
            file_url: row.get("file_url")?,
            price: row.get("price")?,
            creator: row.get("creator")?,
            rating: row.get("rating")?,
            download_count: row.get("download_count")?,
            sync_status: SyncStatus::from_sql(&sync_status),
            last_synced: last_synced
                .as_deref()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            formation_data,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
