//! Tabular (CSV) serialization.
//!
//! Rows of `time,drone_id,x,y,z[,color,brightness]`, one row per drone per
//! frame, frame order preserved. Missing color/brightness serialize as
//! empty cells.

use lumen_core::formation::Frame;

use crate::{ExportError, Result};

/// Serialize frames to CSV bytes, with a header row.
pub fn to_csv(frames: &[Frame], include_color: bool) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let header: &[&str] = if include_color {
        &["time", "drone_id", "x", "y", "z", "color", "brightness"]
    } else {
        &["time", "drone_id", "x", "y", "z"]
    };
    writer
        .write_record(header)
        .map_err(|e| ExportError::Serialize(e.to_string()))?;

    for frame in frames {
        for p in &frame.positions {
            let mut record = vec![
                frame.t.to_string(),
                p.drone_id.to_string(),
                p.x.to_string(),
                p.y.to_string(),
                p.z.to_string(),
            ];
            if include_color {
                record.push(p.color.clone().unwrap_or_default());
                record.push(p.brightness.map(|b| b.to_string()).unwrap_or_default());
            }
            writer
                .write_record(&record)
                .map_err(|e| ExportError::Serialize(e.to_string()))?;
        }
    }

    writer
        .into_inner()
        .map_err(|e| ExportError::Serialize(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
