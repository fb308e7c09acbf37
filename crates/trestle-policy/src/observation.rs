//! Observation vectors fed to the policy.
//!
//! Two layouts exist, one per generation mode:
//!
//! - [`anchor_observation`]: the three anchor positions, [`ANCHOR_OBSERVATION_LEN`]
//!   values. Used when a single forward pass emits the whole bridge.
//! - [`StepObservation`]: [`STEP_OBSERVATION_LEN`] values describing the scene
//!   and the progress of the current build. Used when one gene is placed per
//!   forward pass.
//!
//! The network only checks the length of an observation; the meaning of each
//! slot is a contract between the observation source and the training setup.

use serde::{Deserialize, Serialize};

use crate::gene::Point2;

/// Number of anchors a bridge is built between.
pub const ANCHOR_COUNT: usize = 3;
/// Length of an [`anchor_observation`].
pub const ANCHOR_OBSERVATION_LEN: usize = ANCHOR_COUNT * 2;
/// Length of a [`StepObservation`] vector.
pub const STEP_OBSERVATION_LEN: usize = 20;

/// Builds the anchor-only observation.
///
/// Returns `None` when fewer than [`ANCHOR_COUNT`] anchors are available; the
/// caller should then produce no genes for the episode.
#[must_use]
pub fn anchor_observation(anchors: &[Point2]) -> Option<Vec<f32>> {
    let anchors = anchors.get(..ANCHOR_COUNT)?;
    Some(anchors.iter().flat_map(|p| [p.x, p.y]).collect())
}

/// Scene and progress summary for sequential (one gene per step) generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepObservation {
    pub anchors: [Point2; ANCHOR_COUNT],
    /// Left edge of the gap to span.
    pub left_x: f32,
    /// Right edge of the gap to span.
    pub right_x: f32,
    pub goal: Point2,
    /// End point of the most recently placed bar.
    pub last_end: Point2,
    /// Index of the bar about to be placed.
    pub bar_index: usize,
    pub total_bars: usize,
    /// How far the vehicle got across the span in the previous run, `[0, 1]`.
    pub vehicle_progress: f32,
    /// Fraction of placed bars that are broken, `[0, 1]`.
    pub broken_ratio: f32,
    /// Whether the previous placement produced a bar.
    pub prev_bar_success: bool,
}

impl StepObservation {
    /// Flattens the observation into the fixed network input order.
    #[expect(clippy::cast_precision_loss)]
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        let span_width = self.right_x - self.left_x;
        let span_mid = (self.left_x + self.right_x) * 0.5;
        let progress = self.bar_index as f32 / self.total_bars.max(1) as f32;

        let mut obs = Vec::with_capacity(STEP_OBSERVATION_LEN);
        obs.extend(self.anchors.iter().flat_map(|p| [p.x, p.y]));
        obs.extend([span_width, span_mid]);
        obs.push(self.goal.x);
        obs.extend([self.last_end.x, self.last_end.y]);
        obs.push(progress);
        obs.push(self.vehicle_progress);
        obs.push(self.broken_ratio);
        obs.push(if self.prev_bar_success { 1.0 } else { 0.0 });
        obs.extend([self.left_x, self.right_x]);
        obs.push(((self.last_end.y + 2.0) / 8.0).clamp(0.0, 1.0));
        obs.push(1.0);
        obs.push(self.goal.y);
        debug_assert_eq!(obs.len(), STEP_OBSERVATION_LEN);
        obs
    }
}
