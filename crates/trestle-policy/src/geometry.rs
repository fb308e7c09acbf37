//! Decoding of action vectors into genes.
//!
//! The policy emits [`VALUES_PER_GENE`] values in `[-1, 1]` per gene:
//!
//! ```text
//! [ start-x, start-y, end-x | angle, end-y | length, type-logit ]
//! ```
//!
//! Two geometries interpret the middle pair differently:
//!
//! - [`GeneGeometry::Absolute`]: both endpoints are independent coordinates
//!   scaled into the world bounds. Bars longer than `max_length` are shortened
//!   along their own direction, the way the interactive builder caps a dragged
//!   bar. The cap defaults to [`DEFAULT_MAX_LENGTH`]; an explicit `null`
//!   disables it.
//! - [`GeneGeometry::Chained`]: gene `g > 0` starts where gene `g - 1` ended.
//!   The pair is read as `angle = angle_norm * π` and
//!   `length = |length_norm| * max_length`. The first gene starts at the
//!   supplied origin, or at its own scaled start coordinates when there is
//!   none.
//!
//! In both geometries the sign of the type logit chooses the [`BarKind`].

use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::gene::{BarKind, Gene, Point2};

/// Number of action values consumed per gene.
pub const VALUES_PER_GENE: usize = 5;

/// Default half-extent of the build area along x.
pub const DEFAULT_SCALE_X: f32 = 15.0;
/// Default half-extent of the build area along y.
pub const DEFAULT_SCALE_Y: f32 = 6.0;
/// Default maximum bar length.
pub const DEFAULT_MAX_LENGTH: f32 = 5.0;

/// Axis-aligned rectangle that normalized coordinates are mapped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub min: Point2,
    pub max: Point2,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min: Point2::new(-DEFAULT_SCALE_X, -DEFAULT_SCALE_Y),
            max: Point2::new(DEFAULT_SCALE_X, DEFAULT_SCALE_Y),
        }
    }
}

impl WorldBounds {
    /// Maps a normalized `[-1, 1]` pair into world coordinates.
    ///
    /// Inputs outside the range are clamped; a degenerate (zero-width) axis maps
    /// everything to its midpoint.
    #[must_use]
    pub fn map(&self, nx: f32, ny: f32) -> Point2 {
        Point2::new(
            lerp(self.min.x, self.max.x, nx),
            lerp(self.min.y, self.max.y, ny),
        )
    }

    #[must_use]
    pub fn center(&self) -> Point2 {
        self.min.midpoint(self.max)
    }
}

fn lerp(min: f32, max: f32, n: f32) -> f32 {
    let t = (sanitize(n).clamp(-1.0, 1.0) + 1.0) * 0.5;
    min + (max - min) * t
}

fn sanitize(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

/// How an action vector is turned into gene endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, derive_more::IsVariant)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum GeneGeometry {
    Absolute {
        #[serde(default)]
        bounds: WorldBounds,
        #[serde(default = "default_absolute_max_length")]
        max_length: Option<f32>,
    },
    Chained {
        #[serde(default)]
        bounds: WorldBounds,
        #[serde(default = "default_max_length")]
        max_length: f32,
    },
}

fn default_max_length() -> f32 {
    DEFAULT_MAX_LENGTH
}

#[expect(clippy::unnecessary_wraps)]
fn default_absolute_max_length() -> Option<f32> {
    Some(DEFAULT_MAX_LENGTH)
}

impl Default for GeneGeometry {
    fn default() -> Self {
        Self::Absolute {
            bounds: WorldBounds::default(),
            max_length: Some(DEFAULT_MAX_LENGTH),
        }
    }
}

impl GeneGeometry {
    /// Chained geometry with default bounds and bar length.
    #[must_use]
    pub fn chained() -> Self {
        Self::Chained {
            bounds: WorldBounds::default(),
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    /// Decodes an action vector into genes.
    ///
    /// `origin` is where the first chained gene starts (for example the end of
    /// the bar placed in the previous step). It is ignored by the absolute
    /// geometry. Trailing values that do not fill a whole gene are ignored.
    #[must_use]
    pub fn decode(&self, action: &[f32], origin: Option<Point2>) -> Vec<Gene> {
        let groups = action.chunks_exact(VALUES_PER_GENE);
        if !groups.remainder().is_empty() {
            log::warn!(
                "action length {} is not a multiple of {VALUES_PER_GENE}; ignoring {} trailing values",
                action.len(),
                groups.remainder().len()
            );
        }

        match *self {
            Self::Absolute { bounds, max_length } => groups
                .map(|v| {
                    let start = bounds.map(v[0], v[1]);
                    let mut end = bounds.map(v[2], v[3]);
                    if let Some(max_length) = max_length {
                        end = clamp_segment(start, end, max_length);
                    }
                    Gene::new(start, end, BarKind::from_logit(sanitize(v[4])))
                })
                .collect(),
            Self::Chained { bounds, max_length } => {
                let mut cursor = origin.filter(|p| p.is_finite());
                groups
                    .map(|v| {
                        let start = cursor.unwrap_or_else(|| bounds.map(v[0], v[1]));
                        let angle = sanitize(v[2]).clamp(-1.0, 1.0) * PI;
                        let length = sanitize(v[3]).clamp(-1.0, 1.0).abs() * max_length;
                        let end = start + Point2::from_angle(angle) * length;
                        cursor = Some(end);
                        Gene::new(start, end, BarKind::from_logit(sanitize(v[4])))
                    })
                    .collect()
            }
        }
    }
}

/// Shortens `start → end` to at most `max_length`, keeping its direction.
///
/// A zero-length segment keeps its endpoints; if only the direction is
/// undefined the segment is laid along +x.
#[must_use]
pub fn clamp_segment(start: Point2, end: Point2, max_length: f32) -> Point2 {
    let max_length = max_length.max(0.0);
    let delta = end - start;
    if delta.length() <= max_length {
        return end;
    }
    let dir = delta.normalized().unwrap_or(Point2::UNIT_X);
    start + dir * max_length
}
