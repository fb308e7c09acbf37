//! A single member of the population.
//!
//! A [`Model`] bundles a [`PolicyNetwork`] with its own evolved learning rate
//! and exploration noise, the fitness of its last evaluation, and the rollout
//! of the episode currently being played.

use rand::Rng;
use trestle_policy::{
    DecodeWeightsError, Gene, GeneGeometry, PolicyNetwork, Point2, RolloutTrace,
    ShapeMismatchError, TrainOutcome, UpdateRule, decode_weights, effective_sigma, encode_weights,
};

use crate::params::{HyperparamBounds, PbtParams};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum ImportWeightsError {
    #[display("failed to decode weights: {_0}")]
    Decode(DecodeWeightsError),
    #[display("weights do not fit the network: {_0}")]
    Shape(ShapeMismatchError),
}

#[derive(Debug, Clone)]
pub struct Model {
    network: PolicyNetwork,
    geometry: GeneGeometry,
    update_rule: UpdateRule,
    use_backprop: bool,
    learning_rate: f32,
    exploration_noise: f32,
    last_fitness: f32,
    rollout: RolloutTrace,
}

impl Model {
    /// Creates a model with random weights and hyperparameters drawn from the
    /// initial ranges.
    pub fn new<R>(params: &PbtParams, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut network = PolicyNetwork::random(params.network_shape(), rng);
        network.mutate_weights(params.initial_weight_mutation, rng);
        let bounds = &params.bounds;
        let learning_rate = bounds
            .learning_rate
            .clamp(bounds.initial_learning_rate.sample(rng));
        let exploration_noise = bounds
            .exploration_noise
            .clamp(bounds.initial_exploration_noise.sample(rng));
        Self {
            network,
            geometry: params.geometry(),
            update_rule: params.update_rule,
            use_backprop: params.use_backprop,
            learning_rate,
            exploration_noise,
            last_fitness: 0.0,
            rollout: RolloutTrace::new(),
        }
    }

    /// Wraps an existing network.
    #[must_use]
    pub fn from_network(
        network: PolicyNetwork,
        params: &PbtParams,
        learning_rate: f32,
        exploration_noise: f32,
    ) -> Self {
        Self {
            network,
            geometry: params.geometry(),
            update_rule: params.update_rule,
            use_backprop: params.use_backprop,
            learning_rate: params.bounds.learning_rate.clamp(learning_rate),
            exploration_noise: params.bounds.exploration_noise.clamp(exploration_noise),
            last_fitness: 0.0,
            rollout: RolloutTrace::new(),
        }
    }

    #[must_use]
    pub fn network(&self) -> &PolicyNetwork {
        &self.network
    }

    #[must_use]
    pub fn geometry(&self) -> GeneGeometry {
        self.geometry
    }

    #[must_use]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }

    #[must_use]
    pub fn exploration_noise(&self) -> f32 {
        self.exploration_noise
    }

    /// Standard deviation actually used for sampling and scoring.
    #[must_use]
    pub fn sigma(&self) -> f32 {
        effective_sigma(self.exploration_noise)
    }

    #[must_use]
    pub fn last_fitness(&self) -> f32 {
        self.last_fitness
    }

    pub fn set_last_fitness(&mut self, fitness: f32) {
        self.last_fitness = if fitness.is_finite() { fitness } else { 0.0 };
    }

    /// Sets both hyperparameters, clamped into `bounds`.
    pub fn set_hyperparameters(
        &mut self,
        learning_rate: f32,
        exploration_noise: f32,
        bounds: &HyperparamBounds,
    ) {
        self.learning_rate = bounds.learning_rate.clamp(learning_rate);
        self.exploration_noise = bounds.exploration_noise.clamp(exploration_noise);
    }

    #[must_use]
    pub fn use_backprop(&self) -> bool {
        self.use_backprop
    }

    /// Steps recorded since the episode began.
    #[must_use]
    pub fn rollout(&self) -> &RolloutTrace {
        &self.rollout
    }

    /// Forgets any rollout left over from an earlier episode.
    pub fn begin_episode(&mut self) {
        self.rollout.clear();
    }

    /// Drops the pending rollout without training on it.
    pub fn discard_rollout(&mut self) {
        if !self.rollout.is_empty() {
            log::debug!("discarding rollout of {} steps", self.rollout.len());
        }
        self.rollout.clear();
    }

    /// Runs one forward pass, samples an action and decodes it into genes.
    ///
    /// The step is appended to the pending rollout so the next
    /// [`train`](Self::train) call can credit it.
    pub fn generate<R>(
        &mut self,
        observation: &[f32],
        origin: Option<Point2>,
        rng: &mut R,
    ) -> Result<Vec<Gene>, ShapeMismatchError>
    where
        R: Rng + ?Sized,
    {
        let step = self.network.act(observation, self.sigma(), rng)?;
        let genes = self.geometry.decode(&step.action, origin);
        self.rollout.push(step);
        Ok(genes)
    }

    /// Records `fitness` and, if backprop is enabled, trains on the pending
    /// rollout. The rollout is consumed either way.
    pub fn train(&mut self, fitness: f32) -> TrainOutcome {
        self.set_last_fitness(fitness);
        let outcome = if self.use_backprop {
            self.network.train(
                &self.rollout,
                self.last_fitness,
                self.learning_rate,
                self.sigma(),
                self.update_rule,
            )
        } else {
            TrainOutcome::Skipped
        };
        self.rollout.clear();
        outcome
    }

    /// Scales both hyperparameters by independent jitter factors and clamps
    /// them back into bounds.
    pub fn mutate_hyperparameters<R>(&mut self, bounds: &HyperparamBounds, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        let lr = self.learning_rate * bounds.jitter.sample(rng);
        let noise = self.exploration_noise * bounds.jitter.sample(rng);
        self.set_hyperparameters(lr, noise, bounds);
    }

    pub fn mutate_weights<R>(&mut self, scale: f32, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        self.network.mutate_weights(scale, rng);
    }

    /// Copies weights and hyperparameters from `other`.
    ///
    /// Fitness and the pending rollout are not copied.
    pub fn copy_from(&mut self, other: &Self) -> Result<(), ShapeMismatchError> {
        self.network.copy_weights_from(&other.network)?;
        self.learning_rate = other.learning_rate;
        self.exploration_noise = other.exploration_noise;
        self.use_backprop = other.use_backprop;
        Ok(())
    }

    /// Fresh copy of this model for the next generation: same weights and
    /// hyperparameters, zero fitness, empty rollout.
    #[must_use]
    pub fn offspring(&self) -> Self {
        Self {
            network: self.network.clone(),
            geometry: self.geometry,
            update_rule: self.update_rule,
            use_backprop: self.use_backprop,
            learning_rate: self.learning_rate,
            exploration_noise: self.exploration_noise,
            last_fitness: 0.0,
            rollout: RolloutTrace::new(),
        }
    }

    #[must_use]
    pub fn export_weights(&self) -> String {
        encode_weights(&self.network.flat_weights())
    }

    /// Replaces the weights from a transport string. On error the model is
    /// left untouched.
    pub fn import_weights(&mut self, text: &str) -> Result<(), ImportWeightsError> {
        let flat = decode_weights(text).map_err(ImportWeightsError::Decode)?;
        self.network
            .set_flat_weights(&flat)
            .map_err(ImportWeightsError::Shape)
    }
}
