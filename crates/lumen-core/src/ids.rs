//! Prefixed ID generation.
//!
//! Local identifiers are UUID v7 (time-ordered) with a short entity prefix,
//! so an ID is recognizable in logs without a table lookup. Source-native
//! identifiers are kept verbatim in `source_id` columns and never share this
//! namespace.

use uuid::Uuid;

/// Generate a new formation ID (`frm_<uuidv7>`).
#[must_use]
pub fn new_formation_id() -> String {
    format!("frm_{}", Uuid::now_v7())
}

/// Generate a new sync job ID (`job_<uuidv7>`).
#[must_use]
pub fn new_job_id() -> String {
    format!("job_{}", Uuid::now_v7())
}

/// Whether a source-native identifier is safe to adopt as a local primary
/// key: nonempty, at most 64 chars, and limited to `[A-Za-z0-9_-]`.
#[must_use]
pub fn source_id_adoptable(source_id: &str) -> bool {
    !source_id.is_empty()
        && source_id.len() <= 64
        && source_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
