//! Single-hidden-layer stochastic policy trained with REINFORCE.
//!
//! # Architecture
//!
//! ```text
//! observation (I) ──W1,b1──▶ ReLU (H) ──W2,b2──▶ tanh (O = genes × 5) = action mean
//! ```
//!
//! The action actually executed is the mean plus bounded uniform noise,
//! clamped to `[-1, 1]`:
//!
//! ```text
//! action[i] = clamp(mean[i] + σ · U(-1, 1), -1, 1)
//! ```
//!
//! Uniform rather than Gaussian noise keeps every sample inside a known
//! interval around the mean and needs a single draw per component. The
//! gradient still uses the Gaussian score `(action - mean) / σ²`, which is the
//! usual REINFORCE surrogate for this exploration model.
//!
//! # Parameter layout
//!
//! [`PolicyNetwork::flat_weights`] returns the parameters in this fixed order:
//!
//! 1. `W1`, row-major `H × I` (`w1[j * I + i]`)
//! 2. `b1`, `H` values
//! 3. `W2`, row-major `O × H` (`w2[o * H + j]`)
//! 4. `b2`, `O` values
//!
//! # Non-finite inputs
//!
//! Observation components that are NaN or infinite are replaced with `0.0`
//! before the forward pass, so the outputs are always finite.
//!
//! # Training
//!
//! [`PolicyNetwork::train`] consumes a [`RolloutTrace`] recorded while acting
//! and applies exactly one plain gradient-descent step. There is no momentum
//! or adaptive step size; a different optimizer would only replace the final
//! parameter update loop.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::geometry::VALUES_PER_GENE;

/// Initial weights are drawn from `U(-INIT_WEIGHT_RANGE, INIT_WEIGHT_RANGE)`.
pub const INIT_WEIGHT_RANGE: f32 = 0.1;
/// Smallest exploration noise used for sampling and training.
pub const SIGMA_EPSILON: f32 = 1e-3;
/// Largest exploration noise used for sampling and training.
pub const SIGMA_MAX: f32 = 1.0;
/// Decay of the running return baseline.
pub const BASELINE_DECAY: f32 = 0.9;
/// Returns are clamped to `±RETURN_CLAMP` by [`UpdateRule::PositiveOnly`].
pub const RETURN_CLAMP: f32 = 500.0;

const VARIANCE_EPSILON: f32 = 1e-6;

/// Dimensions of a [`PolicyNetwork`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[display("{input}-{hidden}-{genes}x5")]
pub struct NetworkShape {
    /// Observation length.
    pub input: usize,
    /// Hidden layer width.
    pub hidden: usize,
    /// Genes emitted per forward pass.
    pub genes: usize,
}

impl NetworkShape {
    #[must_use]
    pub const fn new(input: usize, hidden: usize, genes: usize) -> Self {
        Self {
            input,
            hidden,
            genes,
        }
    }

    /// Length of the action vector.
    #[must_use]
    pub const fn output(&self) -> usize {
        self.genes * VALUES_PER_GENE
    }

    /// Total number of weights and biases.
    #[must_use]
    pub const fn param_count(&self) -> usize {
        let output = self.output();
        self.hidden * self.input + self.hidden + output * self.hidden + output
    }
}

/// Shape errors. These point at a configuration bug and are not recoverable.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ShapeMismatchError {
    #[display("expected {expected} parameters, got {actual}")]
    ParamCount { expected: usize, actual: usize },
    #[display("network shape {actual} does not match {expected}")]
    Network {
        expected: NetworkShape,
        actual: NetworkShape,
    },
    #[display("expected observation of length {expected}, got {actual}")]
    Observation { expected: usize, actual: usize },
}

/// How returns are turned into an update signal.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateRule {
    /// Every episode updates, weighted by `return - baseline`, where the
    /// baseline is an exponential moving average of past returns.
    #[default]
    Baseline,
    /// Only episodes with a positive return update, weighted by the (clamped)
    /// return itself.
    PositiveOnly,
}

/// Result of a training call.
#[derive(Debug, Clone, Copy, PartialEq, derive_more::IsVariant)]
pub enum TrainOutcome {
    /// One gradient step was applied with this advantage.
    Updated { advantage: f32 },
    /// No parameter was touched.
    Skipped,
}

/// Hidden activations and action means of one forward pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Activations {
    pub hidden: Vec<f32>,
    pub mean: Vec<f32>,
}

/// Everything needed to compute the policy gradient for one action.
#[derive(Debug, Clone, PartialEq)]
pub struct RolloutStep {
    /// Observation as seen by the network (non-finite values zeroed).
    pub observation: Vec<f32>,
    pub hidden: Vec<f32>,
    pub mean: Vec<f32>,
    /// The sampled action that was executed.
    pub action: Vec<f32>,
}

/// The actions taken during one episode, in order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RolloutTrace {
    steps: Vec<RolloutStep>,
}

impl RolloutTrace {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, step: RolloutStep) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn steps(&self) -> &[RolloutStep] {
        &self.steps
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }
}

/// Clamps exploration noise into `[SIGMA_EPSILON, SIGMA_MAX]`.
#[must_use]
pub fn effective_sigma(noise: f32) -> f32 {
    if noise.is_nan() {
        SIGMA_EPSILON
    } else {
        noise.clamp(SIGMA_EPSILON, SIGMA_MAX)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PolicyNetwork {
    shape: NetworkShape,
    w1: Vec<f32>,
    b1: Vec<f32>,
    w2: Vec<f32>,
    b2: Vec<f32>,
    baseline: f32,
}

impl PolicyNetwork {
    /// Creates a network with every parameter set to zero.
    #[must_use]
    pub fn zeros(shape: NetworkShape) -> Self {
        let output = shape.output();
        Self {
            shape,
            w1: vec![0.0; shape.hidden * shape.input],
            b1: vec![0.0; shape.hidden],
            w2: vec![0.0; output * shape.hidden],
            b2: vec![0.0; output],
            baseline: 0.0,
        }
    }

    /// Creates a network with small uniform random weights and zero biases.
    pub fn random<R>(shape: NetworkShape, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut net = Self::zeros(shape);
        for w in net.w1.iter_mut().chain(&mut net.w2) {
            *w = rng.random_range(-INIT_WEIGHT_RANGE..=INIT_WEIGHT_RANGE);
        }
        net
    }

    #[must_use]
    pub fn shape(&self) -> NetworkShape {
        self.shape
    }

    #[must_use]
    pub fn param_count(&self) -> usize {
        self.shape.param_count()
    }

    /// Current running return baseline.
    #[must_use]
    pub fn baseline(&self) -> f32 {
        self.baseline
    }

    /// Computes hidden activations and action means.
    pub fn forward(&self, observation: &[f32]) -> Result<Activations, ShapeMismatchError> {
        let input = self.sanitize_observation(observation)?;
        Ok(self.forward_sanitized(&input))
    }

    fn sanitize_observation(&self, observation: &[f32]) -> Result<Vec<f32>, ShapeMismatchError> {
        if observation.len() != self.shape.input {
            return Err(ShapeMismatchError::Observation {
                expected: self.shape.input,
                actual: observation.len(),
            });
        }
        Ok(observation
            .iter()
            .map(|&x| {
                if x.is_finite() {
                    x
                } else {
                    log::debug!("non-finite observation value {x} replaced with 0");
                    0.0
                }
            })
            .collect())
    }

    fn forward_sanitized(&self, input: &[f32]) -> Activations {
        let NetworkShape { input: n_in, hidden: n_hidden, .. } = self.shape;

        let hidden = (0..n_hidden)
            .map(|j| (self.b1[j] + dot(&self.w1[j * n_in..(j + 1) * n_in], input)).max(0.0))
            .collect::<Vec<_>>();

        let mean = (0..self.shape.output())
            .map(|o| {
                let row = &self.w2[o * n_hidden..(o + 1) * n_hidden];
                (self.b2[o] + dot(row, &hidden)).tanh()
            })
            .collect();

        Activations { hidden, mean }
    }

    /// Samples an action around `mean` with uniform noise of half-width `sigma`.
    ///
    /// With `sigma == 0` the action equals the mean.
    pub fn sample_action<R>(mean: &[f32], sigma: f32, rng: &mut R) -> Vec<f32>
    where
        R: Rng + ?Sized,
    {
        mean.iter()
            .map(|&mu| {
                let eps: f32 = rng.random_range(-1.0..=1.0);
                (mu + sigma * eps).clamp(-1.0, 1.0)
            })
            .collect()
    }

    /// Runs the forward pass and samples an action, returning the full step
    /// record needed for training.
    pub fn act<R>(
        &self,
        observation: &[f32],
        sigma: f32,
        rng: &mut R,
    ) -> Result<RolloutStep, ShapeMismatchError>
    where
        R: Rng + ?Sized,
    {
        let input = self.sanitize_observation(observation)?;
        let Activations { hidden, mean } = self.forward_sanitized(&input);
        let action = Self::sample_action(&mean, sigma, rng);
        Ok(RolloutStep {
            observation: input,
            hidden,
            mean,
            action,
        })
    }

    /// Applies one REINFORCE gradient step for the actions in `trace`.
    ///
    /// Gradients are averaged over the steps of the trace. Steps whose vector
    /// lengths do not match this network are skipped with a warning.
    pub fn train(
        &mut self,
        trace: &RolloutTrace,
        return_value: f32,
        learning_rate: f32,
        sigma: f32,
        rule: UpdateRule,
    ) -> TrainOutcome {
        if trace.is_empty() || !return_value.is_finite() || !learning_rate.is_finite() {
            return TrainOutcome::Skipped;
        }

        let advantage = match rule {
            UpdateRule::Baseline => {
                let advantage = return_value - self.baseline;
                self.baseline =
                    BASELINE_DECAY * self.baseline + (1.0 - BASELINE_DECAY) * return_value;
                advantage
            }
            UpdateRule::PositiveOnly => {
                if return_value <= 0.0 {
                    return TrainOutcome::Skipped;
                }
                return_value.clamp(-RETURN_CLAMP, RETURN_CLAMP)
            }
        };

        let NetworkShape { input: n_in, hidden: n_hidden, .. } = self.shape;
        let n_out = self.shape.output();
        let inv_var = 1.0 / (sigma * sigma + VARIANCE_EPSILON);

        let mut gw1 = vec![0.0; self.w1.len()];
        let mut gb1 = vec![0.0; self.b1.len()];
        let mut gw2 = vec![0.0; self.w2.len()];
        let mut gb2 = vec![0.0; self.b2.len()];
        let mut used_steps = 0_usize;

        for step in trace.steps() {
            if step.observation.len() != n_in
                || step.hidden.len() != n_hidden
                || step.mean.len() != n_out
                || step.action.len() != n_out
            {
                log::warn!(
                    "skipping rollout step that does not match network shape {}",
                    self.shape
                );
                continue;
            }
            used_steps += 1;

            let mut d_hidden = vec![0.0; n_hidden];
            for o in 0..n_out {
                let mu = step.mean[o];
                let grad_log_prob = (step.action[o] - mu) * inv_var;
                let d_mean = -advantage * grad_log_prob;
                let d_pre = d_mean * (1.0 - mu * mu);

                gb2[o] += d_pre;
                let row = o * n_hidden;
                for j in 0..n_hidden {
                    gw2[row + j] += d_pre * step.hidden[j];
                    d_hidden[j] += d_pre * self.w2[row + j];
                }
            }

            for j in 0..n_hidden {
                // ReLU passes gradient only where the unit was active
                if step.hidden[j] <= 0.0 {
                    continue;
                }
                gb1[j] += d_hidden[j];
                let row = j * n_in;
                for i in 0..n_in {
                    gw1[row + i] += d_hidden[j] * step.observation[i];
                }
            }
        }

        if used_steps == 0 {
            return TrainOutcome::Skipped;
        }

        #[expect(clippy::cast_precision_loss)]
        let step_size = learning_rate / used_steps as f32;
        for (params, grads) in [
            (&mut self.w1, &gw1),
            (&mut self.b1, &gb1),
            (&mut self.w2, &gw2),
            (&mut self.b2, &gb2),
        ] {
            for (p, g) in params.iter_mut().zip(grads) {
                *p -= step_size * g;
            }
        }

        TrainOutcome::Updated { advantage }
    }

    /// Adds independent `U(-scale, scale)` noise to every parameter.
    ///
    /// Does nothing when `scale <= 0` (or is not finite).
    pub fn mutate_weights<R>(&mut self, scale: f32, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        if !(scale.is_finite() && scale > 0.0) {
            return;
        }
        for p in self.params_mut() {
            *p += rng.random_range(-scale..=scale);
        }
    }

    /// Copies all four parameter tensors from `other`.
    pub fn copy_weights_from(&mut self, other: &Self) -> Result<(), ShapeMismatchError> {
        if self.shape != other.shape {
            return Err(ShapeMismatchError::Network {
                expected: self.shape,
                actual: other.shape,
            });
        }
        self.w1.copy_from_slice(&other.w1);
        self.b1.copy_from_slice(&other.b1);
        self.w2.copy_from_slice(&other.w2);
        self.b2.copy_from_slice(&other.b2);
        Ok(())
    }

    /// Returns every parameter in the documented flat order.
    #[must_use]
    pub fn flat_weights(&self) -> Vec<f32> {
        let mut flat = Vec::with_capacity(self.param_count());
        flat.extend_from_slice(&self.w1);
        flat.extend_from_slice(&self.b1);
        flat.extend_from_slice(&self.w2);
        flat.extend_from_slice(&self.b2);
        flat
    }

    /// Replaces every parameter from a flat vector in the documented order.
    pub fn set_flat_weights(&mut self, flat: &[f32]) -> Result<(), ShapeMismatchError> {
        if flat.len() != self.param_count() {
            return Err(ShapeMismatchError::ParamCount {
                expected: self.param_count(),
                actual: flat.len(),
            });
        }
        for (p, v) in self.params_mut().zip(flat) {
            *p = *v;
        }
        Ok(())
    }

    fn params_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.w1
            .iter_mut()
            .chain(&mut self.b1)
            .chain(&mut self.w2)
            .chain(&mut self.b2)
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;

    fn rng() -> Pcg64 {
        Pcg64::seed_from_u64(7)
    }

    fn single_step_trace(
        net: &PolicyNetwork,
        observation: &[f32],
        action: Vec<f32>,
    ) -> RolloutTrace {
        let Activations { hidden, mean } = net.forward(observation).unwrap();
        let mut trace = RolloutTrace::new();
        trace.push(RolloutStep {
            observation: observation.to_vec(),
            hidden,
            mean,
            action,
        });
        trace
    }

    #[test]
    fn test_param_count() {
        let shape = NetworkShape::new(6, 48, 16);
        assert_eq!(shape.output(), 80);
        assert_eq!(shape.param_count(), 48 * 6 + 48 + 80 * 48 + 80);
        assert_eq!(PolicyNetwork::zeros(shape).flat_weights().len(), shape.param_count());
    }

    #[test]
    fn test_forward_is_deterministic() {
        let mut rng = rng();
        let net = PolicyNetwork::random(NetworkShape::new(6, 8, 2), &mut rng);
        let obs = [0.3, -1.2, 4.0, 0.0, -7.5, 2.2];
        let a = net.forward(&obs).unwrap();
        let b = net.forward(&obs).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hidden.len(), 8);
        assert_eq!(a.mean.len(), 10);
        assert!(a.hidden.iter().all(|h| *h >= 0.0));
        assert!(a.mean.iter().all(|m| (-1.0..=1.0).contains(m)));
    }

    #[test]
    fn test_forward_zero_fills_non_finite_inputs() {
        let mut rng = rng();
        let net = PolicyNetwork::random(NetworkShape::new(3, 4, 1), &mut rng);
        let dirty = net.forward(&[f32::NAN, 1.0, f32::NEG_INFINITY]).unwrap();
        let clean = net.forward(&[0.0, 1.0, 0.0]).unwrap();
        assert_eq!(dirty, clean);
    }

    #[test]
    fn test_forward_rejects_wrong_observation_length() {
        let net = PolicyNetwork::zeros(NetworkShape::new(6, 4, 1));
        let err = net.forward(&[0.0; 20]).unwrap_err();
        assert_eq!(
            err,
            ShapeMismatchError::Observation {
                expected: 6,
                actual: 20
            }
        );
    }

    #[test]
    fn test_sample_with_zero_sigma_is_mean() {
        let mut rng = rng();
        let mean = [0.25, -0.5, 0.999, -1.0, 0.0];
        let action = PolicyNetwork::sample_action(&mean, 0.0, &mut rng);
        assert_eq!(action, mean.to_vec());
    }

    #[test]
    fn test_sampled_actions_stay_in_range() {
        let mut rng = rng();
        let net = PolicyNetwork::random(NetworkShape::new(6, 16, 4), &mut rng);
        for _ in 0..200 {
            let obs: Vec<f32> = (0..6).map(|_| rng.random_range(-20.0..20.0)).collect();
            let step = net.act(&obs, SIGMA_MAX, &mut rng).unwrap();
            assert!(step.action.iter().all(|a| (-1.0..=1.0).contains(a)));
            for (a, m) in step.action.iter().zip(&step.mean) {
                assert!((a - m).abs() <= SIGMA_MAX + 1e-6);
            }
        }
    }

    #[test]
    fn test_effective_sigma_bounds() {
        assert_eq!(effective_sigma(0.0), SIGMA_EPSILON);
        assert_eq!(effective_sigma(-3.0), SIGMA_EPSILON);
        assert_eq!(effective_sigma(f32::NAN), SIGMA_EPSILON);
        assert_eq!(effective_sigma(7.0), SIGMA_MAX);
        assert_eq!(effective_sigma(0.3), 0.3);
    }

    #[test]
    fn test_flat_weights_roundtrip_preserves_outputs() {
        let mut rng = rng();
        let shape = NetworkShape::new(6, 12, 3);
        let source = PolicyNetwork::random(shape, &mut rng);
        let mut target = PolicyNetwork::random(shape, &mut rng);
        target.set_flat_weights(&source.flat_weights()).unwrap();
        assert_eq!(target.flat_weights(), source.flat_weights());

        for _ in 0..20 {
            let obs: Vec<f32> = (0..6).map(|_| rng.random_range(-10.0..10.0)).collect();
            assert_eq!(source.forward(&obs).unwrap(), target.forward(&obs).unwrap());
        }
    }

    #[test]
    fn test_flat_weights_order() {
        let shape = NetworkShape::new(2, 1, 1);
        let mut net = PolicyNetwork::zeros(shape);
        #[expect(clippy::cast_precision_loss)]
        let flat: Vec<f32> = (0..shape.param_count()).map(|i| i as f32).collect();
        net.set_flat_weights(&flat).unwrap();
        // W1 = [0, 1], b1 = [2], W2 = [3..8) (5x1), b2 = [8..13)
        assert_eq!(net.w1, vec![0.0, 1.0]);
        assert_eq!(net.b1, vec![2.0]);
        assert_eq!(net.w2, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(net.b2, vec![8.0, 9.0, 10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_set_flat_weights_rejects_wrong_length() {
        let mut net = PolicyNetwork::zeros(NetworkShape::new(2, 4, 1));
        let before = net.clone();
        let err = net.set_flat_weights(&[1.0; 10]).unwrap_err();
        assert_eq!(
            err,
            ShapeMismatchError::ParamCount {
                expected: 37,
                actual: 10
            }
        );
        assert_eq!(net, before);
    }

    #[test]
    fn test_copy_weights_from() {
        let mut rng = rng();
        let shape = NetworkShape::new(6, 8, 2);
        let source = PolicyNetwork::random(shape, &mut rng);
        let mut target = PolicyNetwork::zeros(shape);
        target.copy_weights_from(&source).unwrap();
        assert_eq!(target.flat_weights(), source.flat_weights());

        let mut other = PolicyNetwork::zeros(NetworkShape::new(6, 9, 2));
        assert!(matches!(
            other.copy_weights_from(&source),
            Err(ShapeMismatchError::Network { .. })
        ));
    }

    #[test]
    fn test_mutate_weights() {
        let mut rng = rng();
        let shape = NetworkShape::new(6, 8, 2);
        let mut net = PolicyNetwork::zeros(shape);

        net.mutate_weights(0.0, &mut rng);
        net.mutate_weights(-1.0, &mut rng);
        assert!(net.flat_weights().iter().all(|w| *w == 0.0));

        net.mutate_weights(0.05, &mut rng);
        let flat = net.flat_weights();
        assert!(flat.iter().all(|w| w.abs() <= 0.05));
        assert!(flat.iter().any(|w| *w != 0.0));
    }

    mod train {
        use super::*;

        #[test]
        fn test_single_step_moves_mean_toward_action() {
            // zero weights: ReLU hidden is 0, so only the output bias receives gradient
            let shape = NetworkShape::new(2, 4, 1);
            let mut net = PolicyNetwork::zeros(shape);
            let obs = [1.0, 1.0];
            let trace = single_step_trace(&net, &obs, vec![0.5; 5]);

            let outcome = net.train(&trace, 10.0, 0.001, 0.3, UpdateRule::Baseline);
            assert_eq!(outcome, TrainOutcome::Updated { advantage: 10.0 });

            assert!(net.b2.iter().all(|b| *b > 0.0));
            assert!(net.w2.iter().all(|w| *w == 0.0));
            let mean = net.forward(&obs).unwrap().mean;
            assert!(mean.iter().all(|m| *m > 0.0 && *m < 0.5));
        }

        #[test]
        fn test_single_step_updates_output_weights_when_hidden_active() {
            let shape = NetworkShape::new(2, 4, 1);
            let mut net = PolicyNetwork::zeros(shape);
            net.b1.fill(1.0);
            let obs = [1.0, 1.0];
            let trace = single_step_trace(&net, &obs, vec![0.5; 5]);

            net.train(&trace, 10.0, 0.01, 0.3, UpdateRule::Baseline);
            assert!(net.w2.iter().all(|w| *w > 0.0));
        }

        #[test]
        fn test_long_rollout_averages_over_every_step() {
            let shape = NetworkShape::new(2, 4, 1);
            let obs = [1.0, 1.0];
            let mut single = PolicyNetwork::zeros(shape);
            let step = single_step_trace(&single, &obs, vec![0.5; 5]).steps()[0].clone();
            let mut long_trace = RolloutTrace::new();
            for _ in 0..70_000 {
                long_trace.push(step.clone());
            }
            let mut long = single.clone();

            single.train(
                &single_step_trace(&single, &obs, vec![0.5; 5]),
                10.0,
                0.001,
                0.3,
                UpdateRule::Baseline,
            );
            long.train(&long_trace, 10.0, 0.001, 0.3, UpdateRule::Baseline);

            for (a, b) in single.b2.iter().zip(&long.b2) {
                assert!((a - b).abs() <= a.abs() * 1e-2, "{a} vs {b}");
            }
        }

        #[test]
        fn test_negative_advantage_moves_mean_away() {
            let shape = NetworkShape::new(2, 4, 1);
            let mut net = PolicyNetwork::zeros(shape);
            let obs = [1.0, 1.0];
            let trace = single_step_trace(&net, &obs, vec![0.5; 5]);

            net.train(&trace, -10.0, 0.01, 0.3, UpdateRule::Baseline);
            assert!(net.forward(&obs).unwrap().mean.iter().all(|m| *m < 0.0));
        }

        #[test]
        fn test_baseline_tracks_returns() {
            let shape = NetworkShape::new(2, 4, 1);
            let mut net = PolicyNetwork::zeros(shape);
            let trace = single_step_trace(&net, &[1.0, 1.0], vec![0.0; 5]);

            let first = net.train(&trace, 10.0, 0.0, 0.3, UpdateRule::Baseline);
            assert_eq!(first, TrainOutcome::Updated { advantage: 10.0 });
            assert!((net.baseline() - 1.0).abs() < 1e-6);

            let second = net.train(&trace, 10.0, 0.0, 0.3, UpdateRule::Baseline);
            let TrainOutcome::Updated { advantage } = second else {
                panic!("expected an update");
            };
            assert!((advantage - 9.0).abs() < 1e-5);
            assert!((net.baseline() - 1.9).abs() < 1e-5);
        }

        #[test]
        fn test_positive_only_skips_non_positive_returns() {
            let shape = NetworkShape::new(2, 4, 1);
            let mut net = PolicyNetwork::zeros(shape);
            let trace = single_step_trace(&net, &[1.0, 1.0], vec![0.5; 5]);
            let before = net.clone();

            assert!(net.train(&trace, 0.0, 0.01, 0.3, UpdateRule::PositiveOnly).is_skipped());
            assert!(net.train(&trace, -4.0, 0.01, 0.3, UpdateRule::PositiveOnly).is_skipped());
            assert_eq!(net, before);

            let outcome = net.train(&trace, 900.0, 0.01, 0.3, UpdateRule::PositiveOnly);
            assert_eq!(outcome, TrainOutcome::Updated { advantage: RETURN_CLAMP });
            assert_eq!(net.baseline(), 0.0);
        }

        #[test]
        fn test_empty_trace_and_non_finite_return_are_skipped() {
            let mut net = PolicyNetwork::zeros(NetworkShape::new(2, 4, 1));
            let empty = RolloutTrace::new();
            assert!(net.train(&empty, 5.0, 0.01, 0.3, UpdateRule::Baseline).is_skipped());

            let trace = single_step_trace(&net, &[1.0, 1.0], vec![0.5; 5]);
            assert!(net.train(&trace, f32::NAN, 0.01, 0.3, UpdateRule::Baseline).is_skipped());
            assert_eq!(net.baseline(), 0.0);
        }

        #[test]
        fn test_mismatched_steps_are_ignored() {
            let mut net = PolicyNetwork::zeros(NetworkShape::new(2, 4, 1));
            let mut trace = RolloutTrace::new();
            trace.push(RolloutStep {
                observation: vec![1.0; 3],
                hidden: vec![0.0; 4],
                mean: vec![0.0; 5],
                action: vec![0.5; 5],
            });
            let before = net.flat_weights();
            assert!(net.train(&trace, 5.0, 0.01, 0.3, UpdateRule::Baseline).is_skipped());
            assert_eq!(net.flat_weights(), before);
        }

        #[test]
        fn test_repeated_training_improves_likelihood_of_rewarded_action() {
            let mut rng = rng();
            let shape = NetworkShape::new(2, 8, 1);
            let mut net = PolicyNetwork::random(shape, &mut rng);
            let obs = [0.5, -0.5];
            let target = vec![0.8, -0.6, 0.4, 0.0, 0.9];

            let distance = |net: &PolicyNetwork| {
                let mean = net.forward(&obs).unwrap().mean;
                mean.iter().zip(&target).map(|(m, t)| (m - t).powi(2)).sum::<f32>()
            };
            let before = distance(&net);
            for _ in 0..50 {
                let trace = single_step_trace(&net, &obs, target.clone());
                net.train(&trace, 1.0, 0.001, 0.3, UpdateRule::PositiveOnly);
            }
            assert!(distance(&net) < before);
        }
    }
}
