//! Coordinate conversion, scaling, and recentring.
//!
//! Stored choreography uses ENU (x-east, y-north, z-up). Conversion to the
//! other conventions is a fixed axis permutation with sign flips:
//!
//! | target | x | y | z |
//! |--------|---|---|---|
//! | ENU    | e | n | u |
//! | NED    | n | e | -u |
//! | NWU    | n | -e | u |
//!
//! The transform pipeline is convert → scale → recenter, applied uniformly
//! to every position in every frame. Recentring computes the axis-aligned
//! bounding box across *all* frames and translates by the negative of its
//! center, so the formation as a whole is origin-centered rather than each
//! frame individually.

use serde::{Deserialize, Serialize};

use lumen_core::formation::{DronePoint, Frame};

use crate::ExportOptions;

/// Supported coordinate conventions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSystem {
    /// East-north-up (storage convention).
    #[default]
    Enu,
    /// North-east-down.
    Ned,
    /// North-west-up.
    Nwu,
}

impl CoordinateSystem {
    /// Parse from the query-string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "enu" => Some(Self::Enu),
            "ned" => Some(Self::Ned),
            "nwu" => Some(Self::Nwu),
            _ => None,
        }
    }

    /// Map an ENU triple into this convention.
    #[must_use]
    pub fn from_enu(self, e: f64, n: f64, u: f64) -> (f64, f64, f64) {
        match self {
            Self::Enu => (e, n, u),
            Self::Ned => (n, e, -u),
            Self::Nwu => (n, -e, u),
        }
    }
}

/// Axis-aligned bounding box across a set of frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Minimum corner.
    pub min: (f64, f64, f64),
    /// Maximum corner.
    pub max: (f64, f64, f64),
}

impl BoundingBox {
    /// Compute across all positions in all frames. `None` when empty.
    #[must_use]
    pub fn of_frames(frames: &[Frame]) -> Option<Self> {
        let mut points = frames.iter().flat_map(|f| f.positions.iter());
        let first = points.next()?;
        let mut bb = Self {
            min: (first.x, first.y, first.z),
            max: (first.x, first.y, first.z),
        };
        for p in points {
            bb.min.0 = bb.min.0.min(p.x);
            bb.min.1 = bb.min.1.min(p.y);
            bb.min.2 = bb.min.2.min(p.z);
            bb.max.0 = bb.max.0.max(p.x);
            bb.max.1 = bb.max.1.max(p.y);
            bb.max.2 = bb.max.2.max(p.z);
        }
        Some(bb)
    }

    /// Center point of the box.
    #[must_use]
    pub fn center(&self) -> (f64, f64, f64) {
        (
            (self.min.0 + self.max.0) / 2.0,
            (self.min.1 + self.max.1) / 2.0,
            (self.min.2 + self.max.2) / 2.0,
        )
    }
}

/// Apply the full transform pipeline to a frame set.
///
/// Order-preserving and deterministic; identity options return an exact
/// numeric copy of the input.
#[must_use]
pub fn transform_frames(frames: &[Frame], options: &ExportOptions) -> Vec<Frame> {
    let mut out: Vec<Frame> = frames
        .iter()
        .map(|frame| Frame {
            t: frame.t,
            positions: frame
                .positions
                .iter()
                .map(|p| convert_and_scale(p, options))
                .collect(),
        })
        .collect();

    if options.center_origin {
        if let Some(bb) = BoundingBox::of_frames(&out) {
            let (cx, cy, cz) = bb.center();
            for frame in &mut out {
                for p in &mut frame.positions {
                    p.x -= cx;
                    p.y -= cy;
                    p.z -= cz;
                }
            }
        }
    }

    out
}

fn convert_and_scale(p: &DronePoint, options: &ExportOptions) -> DronePoint {
    let (x, y, z) = options.coordinate_system.from_enu(p.x, p.y, p.z);
    let s = options.scale_factor;
    DronePoint {
        drone_id: p.drone_id,
        x: x * s,
        y: y * s,
        z: z * s,
        color: p.color.clone(),
        brightness: p.brightness,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn point(drone_id: u32, x: f64, y: f64, z: f64) -> DronePoint {
        DronePoint {
            drone_id,
            x,
            y,
            z,
            color: None,
            brightness: None,
        }
    }

    fn frames() -> Vec<Frame> {
        vec![
            Frame {
                t: 0.0,
                positions: vec![point(0, 0.0, 0.0, 0.0), point(1, 10.0, 4.0, 2.0)],
            },
            Frame {
                t: 1.0,
                positions: vec![point(0, 2.0, 6.0, 8.0)],
            },
        ]
    }

    #[test]
    fn identity_options_reproduce_input() {
        let input = frames();
        let out = transform_frames(&input, &ExportOptions::default());
        assert_eq!(out, input);
    }

    #[test]
    fn ned_conversion_swaps_and_flips() {
        assert_eq!(
            CoordinateSystem::Ned.from_enu(1.0, 2.0, 3.0),
            (2.0, 1.0, -3.0)
        );
    }

    #[test]
    fn nwu_conversion_negates_east() {
        assert_eq!(
            CoordinateSystem::Nwu.from_enu(1.0, 2.0, 3.0),
            (2.0, -1.0, 3.0)
        );
    }

    #[test]
    fn enu_is_identity() {
        assert_eq!(
            CoordinateSystem::Enu.from_enu(1.0, 2.0, 3.0),
            (1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn scale_applies_uniformly() {
        let opts = ExportOptions {
            scale_factor: 2.0,
            ..Default::default()
        };
        let out = transform_frames(&frames(), &opts);
        assert!((out[0].positions[1].x - 20.0).abs() < 1e-9);
        assert!((out[1].positions[0].z - 16.0).abs() < 1e-9);
    }

    #[test]
    fn bounding_box_spans_all_frames() {
        let bb = BoundingBox::of_frames(&frames()).unwrap();
        assert_eq!(bb.min, (0.0, 0.0, 0.0));
        assert_eq!(bb.max, (10.0, 6.0, 8.0));
        assert_eq!(bb.center(), (5.0, 3.0, 4.0));
    }

    #[test]
    fn bounding_box_empty_frames_is_none() {
        assert!(BoundingBox::of_frames(&[]).is_none());
        assert!(
            BoundingBox::of_frames(&[Frame {
                t: 0.0,
                positions: vec![]
            }])
            .is_none()
        );
    }

    #[test]
    fn recentring_puts_bbox_midpoint_at_origin() {
        let opts = ExportOptions {
            center_origin: true,
            ..Default::default()
        };
        let out = transform_frames(&frames(), &opts);
        let bb = BoundingBox::of_frames(&out).unwrap();
        let (cx, cy, cz) = bb.center();
        assert!(cx.abs() < 1e-9);
        assert!(cy.abs() < 1e-9);
        assert!(cz.abs() < 1e-9);
    }

    #[test]
    fn recentring_composes_after_scale() {
        let opts = ExportOptions {
            scale_factor: 3.0,
            center_origin: true,
            ..Default::default()
        };
        let out = transform_frames(&frames(), &opts);
        let bb = BoundingBox::of_frames(&out).unwrap();
        let (cx, cy, cz) = bb.center();
        assert!(cx.abs() < 1e-9 && cy.abs() < 1e-9 && cz.abs() < 1e-9);
        // Extent is scaled: original x-extent 10 → 30
        assert!((bb.max.0 - bb.min.0 - 30.0).abs() < 1e-9);
    }

    #[test]
    fn transform_preserves_order_and_metadata() {
        let mut input = frames();
        input[0].positions[0].color = Some("#00ff00".into());
        input[0].positions[0].brightness = Some(0.5);
        let opts = ExportOptions {
            coordinate_system: CoordinateSystem::Ned,
            ..Default::default()
        };
        let out = transform_frames(&input, &opts);
        assert_eq!(out[0].positions[0].drone_id, 0);
        assert_eq!(out[0].positions[0].color.as_deref(), Some("#00ff00"));
        assert_eq!(out[0].positions[0].brightness, Some(0.5));
        assert_eq!(out.len(), 2);
    }
}
