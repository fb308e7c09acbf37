//! Structural placement instructions emitted by the policy.
//!
//! A [`Gene`] is one bar placement: a start point, an end point and the kind of
//! structural element to build between them. Genes are produced in fixed-size
//! batches per episode by [`PolicyNetwork`](crate::network::PolicyNetwork),
//! handed by value to the external builder, and annotated afterwards by the
//! simulator (the `broken` flag).

use std::ops::{Add, Mul, Sub};

use serde::{Deserialize, Serialize};

/// A point (or vector) in 2D world space.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    pub const ZERO: Self = Self::new(0.0, 0.0);
    pub const UNIT_X: Self = Self::new(1.0, 0.0);

    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing at `angle` radians from the +x axis.
    #[must_use]
    pub fn from_angle(angle: f32) -> Self {
        let (sin, cos) = angle.sin_cos();
        Self::new(cos, sin)
    }

    #[must_use]
    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Self) -> f32 {
        (other - self).length()
    }

    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        (self + other) * 0.5
    }

    /// Returns the unit vector in the same direction, or `None` for a
    /// zero-length (or non-finite) vector.
    #[must_use]
    pub fn normalized(self) -> Option<Self> {
        let len = self.length();
        (len.is_finite() && len > f32::EPSILON).then(|| self * len.recip())
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Point2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Point2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

/// The two structural element types a gene can place.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    derive_more::Display,
    derive_more::IsVariant,
)]
pub enum BarKind {
    /// Drivable deck element.
    #[display("road")]
    Road,
    /// Supporting element that vehicles do not ride on.
    #[display("beam")]
    Beam,
}

impl BarKind {
    /// Chooses the kind from the sign of a type logit: positive means road.
    #[must_use]
    pub fn from_logit(logit: f32) -> Self {
        if logit > 0.0 { Self::Road } else { Self::Beam }
    }
}

/// One structural placement instruction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub start: Point2,
    pub end: Point2,
    pub kind: BarKind,
    /// Set by the simulator when the bar built from this gene failed.
    #[serde(default)]
    pub broken: bool,
}

impl Gene {
    #[must_use]
    pub fn new(start: Point2, end: Point2, kind: BarKind) -> Self {
        Self {
            start,
            end,
            kind,
            broken: false,
        }
    }

    #[must_use]
    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}
