//! Canonical formation record and choreography payload types.
//!
//! A [`Formation`] is a named, timed sequence of per-drone 3D positions
//! (with optional color/brightness) imported from an external marketplace
//! or created locally. The `(source, source_id)` pair is the idempotency
//! key for the sync pipeline; the local `id` is stable once assigned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sync state of a stored formation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Discovered but not yet fully downloaded.
    #[default]
    Pending,
    /// Detail payload fetched and stored.
    Synced,
    /// Last sync attempt for this record failed.
    Failed,
}

impl SyncStatus {
    /// SQL string form.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// Parse from the SQL string form. Unknown values map to `Pending`.
    #[must_use]
    pub fn from_sql(s: &str) -> Self {
        match s {
            "synced" => Self::Synced,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One drone's position sample within a frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DronePoint {
    /// Drone index within the show.
    pub drone_id: u32,
    /// X coordinate in meters.
    pub x: f64,
    /// Y coordinate in meters.
    pub y: f64,
    /// Z coordinate in meters.
    pub z: f64,
    /// Optional color as `#rrggbb`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Optional brightness in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
}

/// One time-indexed frame of the choreography.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    /// Frame time in seconds from show start.
    pub t: f64,
    /// Per-drone positions at this time.
    pub positions: Vec<DronePoint>,
}

/// The opaque-but-structured choreography payload.
///
/// The producer defines the schema; we round-trip the fields we know and
/// store the blob as JSON. An empty `frames` list is valid (metadata-only
/// records discovered from listing pages).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormationData {
    /// Time-ordered frames.
    #[serde(default)]
    pub frames: Vec<Frame>,
}

impl FormationData {
    /// Number of distinct drones across all frames.
    #[must_use]
    pub fn drone_count(&self) -> usize {
        let mut ids: Vec<u32> = self
            .frames
            .iter()
            .flat_map(|f| f.positions.iter().map(|p| p.drone_id))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.len()
    }

    /// Show duration in seconds (time of the last frame), 0 when empty.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        self.frames.last().map_or(0.0, |f| f.t)
    }
}

/// Canonical imported formation record.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formation {
    /// Local primary key (`frm_<uuidv7>`, or an adopted source id).
    pub id: String,
    /// Origin system tag (e.g. `"skybrush-market"`, `"local"`).
    pub source: String,
    /// Origin's native identifier; idempotency key when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Display name.
    pub name: String,
    /// Free-text description.
    #[serde(default)]
    pub description: String,
    /// Free-text category label.
    #[serde(default)]
    pub category: String,
    /// Ordered tag list (comma-joined in storage).
    #[serde(default)]
    pub tags: Vec<String>,
    /// Number of drones required.
    pub drone_count: u32,
    /// Show duration in seconds.
    pub duration_secs: f64,
    /// Preview image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Downloadable asset URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Price in the source's currency; `None` for free/unknown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    /// Creator display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// Rating in `[0, 5]`.
    #[serde(default)]
    pub rating: f64,
    /// Number of downloads reported by the source.
    #[serde(default)]
    pub download_count: u64,
    /// Sync state of this record.
    #[serde(default)]
    pub sync_status: SyncStatus,
    /// Last successful sync time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_synced: Option<DateTime<Utc>>,
    /// Choreography payload; `None` until a detail fetch succeeds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formation_data: Option<FormationData>,
}

impl Formation {
    /// Minimal record as discovered from a listing card.
    ///
    /// The detail fetch fills in `formation_data` and any fields the card
    /// omitted; until then the record is `Pending`.
    #[must_use]
    pub fn candidate(source: &str, source_id: &str, name: &str) -> Self {
        Self {
            id: source_id.to_string(),
            source: source.to_string(),
            source_id: Some(source_id.to_string()),
            name: name.to_string(),
            description: String::new(),
            category: String::new(),
            tags: Vec::new(),
            drone_count: 0,
            duration_secs: 0.0,
            thumbnail_url: None,
            file_url: None,
            price: None,
            creator: None,
            rating: 0.0,
            download_count: 0,
            sync_status: SyncStatus::Pending,
            last_synced: None,
            formation_data: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn point(drone_id: u32, x: f64) -> DronePoint {
        DronePoint {
            drone_id,
            x,
            y: 0.0,
            z: 0.0,
            color: None,
            brightness: None,
        }
    }

    #[test]
    fn sync_status_sql_roundtrip() {
        for s in [SyncStatus::Pending, SyncStatus::Synced, SyncStatus::Failed] {
            assert_eq!(SyncStatus::from_sql(s.as_sql()), s);
        }
    }

    #[test]
    fn sync_status_unknown_maps_to_pending() {
        assert_eq!(SyncStatus::from_sql("garbage"), SyncStatus::Pending);
    }

    #[test]
    fn drone_count_dedupes_across_frames() {
        let data = FormationData {
            frames: vec![
                Frame {
                    t: 0.0,
                    positions: vec![point(0, 0.0), point(1, 1.0)],
                },
                Frame {
                    t: 1.0,
                    positions: vec![point(1, 2.0), point(2, 3.0)],
                },
            ],
        };
        assert_eq!(data.drone_count(), 3);
    }

    #[test]
    fn duration_is_last_frame_time() {
        let data = FormationData {
            frames: vec![
                Frame {
                    t: 0.0,
                    positions: vec![],
                },
                Frame {
                    t: 12.5,
                    positions: vec![],
                },
            ],
        };
        assert!((data.duration_secs() - 12.5).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_data_has_zero_duration() {
        assert!(FormationData::default().duration_secs().abs() < f64::EPSILON);
        assert_eq!(FormationData::default().drone_count(), 0);
    }

    #[test]
    fn candidate_starts_pending() {
        let f = Formation::candidate("skybrush-market", "abc", "Heart");
        assert_eq!(f.sync_status, SyncStatus::Pending);
        assert_eq!(f.source_id.as_deref(), Some("abc"));
        assert!(f.formation_data.is_none());
    }

    #[test]
    fn formation_serde_camel_case() {
        let f = Formation::candidate("skybrush-market", "abc", "Heart");
        let json = serde_json::to_value(&f).unwrap();
        assert!(json.get("sourceId").is_some());
        assert!(json.get("droneCount").is_some());
        assert!(json.get("source_id").is_none());
    }

    #[test]
    fn formation_data_json_roundtrip() {
        let data = FormationData {
            frames: vec![Frame {
                t: 0.5,
                positions: vec![DronePoint {
                    drone_id: 7,
                    x: 1.0,
                    y: -2.0,
                    z: 3.5,
                    color: Some("#ff8800".into()),
                    brightness: Some(0.8),
                }],
            }],
        };
        let json = serde_json::to_string(&data).unwrap();
        let back: FormationData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data);
    }
}
