//! # lumen-export
//!
//! Pure, stateless export transformers for stored formations. The pipeline
//! is: optional coordinate-system conversion → optional uniform scale →
//! optional recentring around the bounding-box center, then format-specific
//! serialization (tabular CSV, per-drone trajectory JSON, or per-frame
//! JSON for show-control tooling).
//!
//! All transformations are deterministic and order-preserving; the identity
//! options reproduce the input numerically.

pub mod coords;
pub mod json;
pub mod tabular;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use lumen_core::formation::Formation;

pub use coords::{CoordinateSystem, transform_frames};

/// Errors that can occur during export.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The formation has no choreography payload to export.
    #[error("formation has no data: {0}")]
    NoData(String),

    /// Serialization failure in the chosen output format.
    #[error("serialization failed: {0}")]
    Serialize(String),
}

/// Convenience alias for export results.
pub type Result<T> = std::result::Result<T, ExportError>;

/// Supported output formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Tabular rows of `time,drone_id,x,y,z[,color,brightness]`.
    Csv,
    /// JSON grouped by per-drone trajectory.
    Trajectory,
    /// JSON grouped by per-frame position lists.
    Frames,
}

impl ExportFormat {
    /// Parse from the query-string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "csv" => Some(Self::Csv),
            "trajectory" => Some(Self::Trajectory),
            "frames" => Some(Self::Frames),
            _ => None,
        }
    }

    /// File extension for artifacts of this format.
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Trajectory | Self::Frames => "json",
        }
    }

    /// MIME type for artifacts of this format.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Trajectory | Self::Frames => "application/json",
        }
    }
}

/// Transformation options applied before serialization.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    /// Target coordinate convention (stored data is ENU).
    #[serde(default)]
    pub coordinate_system: CoordinateSystem,
    /// Uniform scale factor applied to all positions.
    #[serde(default = "default_scale")]
    pub scale_factor: f64,
    /// Recenter the bounding box across all frames on the origin.
    #[serde(default)]
    pub center_origin: bool,
    /// Include color/brightness columns in tabular output.
    #[serde(default = "default_true")]
    pub include_color: bool,
}

fn default_scale() -> f64 {
    1.0
}
fn default_true() -> bool {
    true
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            coordinate_system: CoordinateSystem::default(),
            scale_factor: 1.0,
            center_origin: false,
            include_color: true,
        }
    }
}

/// Export artifact metadata.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    /// Number of frames exported.
    pub frame_count: usize,
    /// Number of distinct drones.
    pub drone_count: usize,
    /// Show duration in seconds.
    pub duration_secs: f64,
}

/// A produced export artifact.
#[derive(Clone, Debug)]
pub struct ExportArtifact {
    /// Serialized output.
    pub bytes: Vec<u8>,
    /// MIME type.
    pub content_type: &'static str,
    /// Suggested download file name.
    pub file_name: String,
    /// Artifact metadata.
    pub metadata: ExportMetadata,
}

/// Transform and serialize a formation.
pub fn export_formation(
    formation: &Formation,
    format: ExportFormat,
    options: &ExportOptions,
) -> Result<ExportArtifact> {
    let data = formation
        .formation_data
        .as_ref()
        .filter(|d| !d.frames.is_empty())
        .ok_or_else(|| ExportError::NoData(formation.id.clone()))?;

    let frames = transform_frames(&data.frames, options);

    let bytes = match format {
        ExportFormat::Csv => tabular::to_csv(&frames, options.include_color)?,
        ExportFormat::Trajectory => json::to_trajectory_json(formation, &frames)?,
        ExportFormat::Frames => json::to_frame_json(formation, &frames)?,
    };

    let drone_count = lumen_core::formation::FormationData {
        frames: frames.clone(),
    }
    .drone_count();

    Ok(ExportArtifact {
        bytes,
        content_type: format.content_type(),
        file_name: format!(
            "{}.{}",
            sanitize_file_stem(&formation.name),
            format.extension()
        ),
        metadata: ExportMetadata {
            frame_count: frames.len(),
            drone_count,
            duration_secs: frames.last().map_or(0.0, |f| f.t),
        },
    })
}

/// Lowercase, dash-joined file stem from a formation name.
fn sanitize_file_stem(name: &str) -> String {
    let stem: String = name
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    let stem = stem.trim_matches('-').to_string();
    if stem.is_empty() {
        "formation".to_string()
    } else {
        stem
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
