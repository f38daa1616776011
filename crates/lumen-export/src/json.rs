//! Structured JSON export variants.
//!
//! Two groupings of the same transformed frame set:
//!
//! - **Trajectory**: per-drone point lists, the shape 3D tooling wants for
//!   path editing.
//! - **Frames**: per-frame position lists, the shape show-control systems
//!   consume for playback.

use serde::Serialize;

use lumen_core::formation::{Formation, Frame};

use crate::{ExportError, Result};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrajectoryDocument<'a> {
    formation_id: &'a str,
    name: &'a str,
    drones: Vec<DroneTrajectory>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DroneTrajectory {
    id: u32,
    points: Vec<TrajectoryPoint>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrajectoryPoint {
    t: f64,
    x: f64,
    y: f64,
    z: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    brightness: Option<f64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FrameDocument<'a> {
    formation_id: &'a str,
    name: &'a str,
    frames: &'a [Frame],
}

/// Serialize as per-drone trajectories.
///
/// Drones are ordered by id; points within a drone keep frame order.
pub fn to_trajectory_json(formation: &Formation, frames: &[Frame]) -> Result<Vec<u8>> {
    let mut ids: Vec<u32> = frames
        .iter()
        .flat_map(|f| f.positions.iter().map(|p| p.drone_id))
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let drones = ids
        .into_iter()
        .map(|id| DroneTrajectory {
            id,
            points: frames
                .iter()
                .flat_map(|frame| {
                    frame
                        .positions
                        .iter()
                        .filter(|p| p.drone_id == id)
                        .map(|p| TrajectoryPoint {
                            t: frame.t,
                            x: p.x,
                            y: p.y,
                            z: p.z,
                            color: p.color.clone(),
                            brightness: p.brightness,
                        })
                })
                .collect(),
        })
        .collect();

    let doc = TrajectoryDocument {
        formation_id: &formation.id,
        name: &formation.name,
        drones,
    };
    serde_json::to_vec_pretty(&doc).map_err(|e| ExportError::Serialize(e.to_string()))
}

/// Serialize as per-frame position lists.
pub fn to_frame_json(formation: &Formation, frames: &[Frame]) -> Result<Vec<u8>> {
    let doc = FrameDocument {
        formation_id: &formation.id,
        name: &formation.name,
        frames,
    };
    serde_json::to_vec_pretty(&doc).map_err(|e| ExportError::Serialize(e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
