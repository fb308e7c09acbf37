//! Training configuration.
//!
//! [`PbtParams`] gathers every knob of population-based training. The defaults
//! reproduce the settings the bridge trainer has been run with: 12 models,
//! 16 genes per bridge, 48 hidden units, two elites and offspring drawn from the
//! top half of the ranking.
//!
//! All types deserialize with `#[serde(default)]`, so a configuration file only
//! needs to name the values it changes.

use rand::Rng;
use serde::{Deserialize, Serialize};
use trestle_policy::{
    ANCHOR_OBSERVATION_LEN, GeneGeometry, NetworkShape, STEP_OBSERVATION_LEN, UpdateRule,
};

/// Closed interval used for hyperparameter sampling and clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HyperparamRange {
    pub min: f32,
    pub max: f32,
}

impl HyperparamRange {
    #[must_use]
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamps `value` into the range. NaN maps to `min`.
    #[must_use]
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            self.min
        } else {
            value.clamp(self.min, self.max)
        }
    }

    #[must_use]
    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Draws a value uniformly from the range.
    pub fn sample<R>(&self, rng: &mut R) -> f32
    where
        R: Rng + ?Sized,
    {
        rng.random_range(self.min..=self.max)
    }

    fn is_positive(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && 0.0 < self.min && self.min <= self.max
    }
}

/// Valid ranges for the evolved hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperparamBounds {
    /// Learning rate is always clamped into this range.
    pub learning_rate: HyperparamRange,
    /// Exploration noise is always clamped into this range.
    pub exploration_noise: HyperparamRange,
    /// Learning rate of a freshly created model.
    pub initial_learning_rate: HyperparamRange,
    /// Exploration noise of a freshly created model.
    pub initial_exploration_noise: HyperparamRange,
    /// Multiplicative jitter applied by hyperparameter mutation.
    pub jitter: HyperparamRange,
}

impl Default for HyperparamBounds {
    fn default() -> Self {
        Self {
            learning_rate: HyperparamRange::new(1e-5, 1.5e-3),
            exploration_noise: HyperparamRange::new(0.05, 1.0),
            initial_learning_rate: HyperparamRange::new(1e-4, 1e-3),
            initial_exploration_noise: HyperparamRange::new(0.1, 0.5),
            jitter: HyperparamRange::new(0.8, 1.2),
        }
    }
}

/// How an episode's genes are produced.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::IsVariant,
)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// One forward pass on the anchor observation emits every gene.
    #[default]
    SingleShot,
    /// One forward pass per gene on a step observation; each gene continues
    /// from the end of the previous one.
    Sequential,
}

impl GenerationMode {
    /// Observation length expected by the network.
    #[must_use]
    pub const fn observation_len(self) -> usize {
        match self {
            Self::SingleShot => ANCHOR_OBSERVATION_LEN,
            Self::Sequential => STEP_OBSERVATION_LEN,
        }
    }

    /// Genes emitted by a single forward pass.
    #[must_use]
    pub const fn genes_per_pass(self, genes_per_episode: usize) -> usize {
        match self {
            Self::SingleShot => genes_per_episode,
            Self::Sequential => 1,
        }
    }

    /// Geometry used when the configuration does not name one.
    #[must_use]
    pub fn default_geometry(self) -> GeneGeometry {
        match self {
            Self::SingleShot => GeneGeometry::default(),
            Self::Sequential => GeneGeometry::chained(),
        }
    }
}

/// Where offspring parents are drawn from during evolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParentPool {
    /// Only the unmutated elites.
    Elites,
    /// The better half of the ranked population.
    #[default]
    TopHalf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PbtParams {
    pub population_size: usize,
    pub genes_per_episode: usize,
    pub hidden_size: usize,
    pub mode: GenerationMode,
    /// Overrides the mode's default geometry.
    pub geometry: Option<GeneGeometry>,
    /// Models copied unmutated into the next generation.
    pub elite_count: usize,
    pub parent_pool: ParentPool,
    /// Offspring weights are perturbed by `U(±noise × factor)`.
    pub weight_mutation_factor: f32,
    /// Weight perturbation applied to every freshly created model.
    pub initial_weight_mutation: f32,
    pub update_rule: UpdateRule,
    /// When false, models only record fitness and evolution does all the work.
    pub use_backprop: bool,
    pub bounds: HyperparamBounds,
}

impl Default for PbtParams {
    fn default() -> Self {
        Self {
            population_size: 12,
            genes_per_episode: 16,
            hidden_size: 48,
            mode: GenerationMode::default(),
            geometry: None,
            elite_count: 2,
            parent_pool: ParentPool::default(),
            weight_mutation_factor: 0.02,
            initial_weight_mutation: 0.01,
            update_rule: UpdateRule::default(),
            use_backprop: true,
            bounds: HyperparamBounds::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ConfigError {
    #[display("population size must be at least 1")]
    EmptyPopulation,
    #[display("elite count {elite_count} exceeds population size {population_size}")]
    TooManyElites {
        elite_count: usize,
        population_size: usize,
    },
    #[display("{name} must be at least 1")]
    ZeroDimension { name: &'static str },
    #[display("{name} range must be finite, positive and ordered (got {min}..={max})")]
    InvalidRange {
        name: &'static str,
        min: f32,
        max: f32,
    },
    #[display("{name} must be finite and non-negative (got {value})")]
    InvalidScale { name: &'static str, value: f32 },
}

impl PbtParams {
    /// Shape of every network in the population.
    #[must_use]
    pub fn network_shape(&self) -> NetworkShape {
        NetworkShape::new(
            self.mode.observation_len(),
            self.hidden_size,
            self.mode.genes_per_pass(self.genes_per_episode),
        )
    }

    /// Geometry used to decode actions.
    #[must_use]
    pub fn geometry(&self) -> GeneGeometry {
        self.geometry
            .unwrap_or_else(|| self.mode.default_geometry())
    }

    /// Number of forward passes in one episode.
    #[must_use]
    pub fn steps_per_episode(&self) -> usize {
        match self.mode {
            GenerationMode::SingleShot => 1,
            GenerationMode::Sequential => self.genes_per_episode,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(ConfigError::EmptyPopulation);
        }
        if self.elite_count > self.population_size {
            return Err(ConfigError::TooManyElites {
                elite_count: self.elite_count,
                population_size: self.population_size,
            });
        }
        for (name, value) in [
            ("genes_per_episode", self.genes_per_episode),
            ("hidden_size", self.hidden_size),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDimension { name });
            }
        }
        let bounds = &self.bounds;
        for (name, range) in [
            ("learning_rate", bounds.learning_rate),
            ("exploration_noise", bounds.exploration_noise),
            ("initial_learning_rate", bounds.initial_learning_rate),
            ("initial_exploration_noise", bounds.initial_exploration_noise),
            ("jitter", bounds.jitter),
        ] {
            if !range.is_positive() {
                return Err(ConfigError::InvalidRange {
                    name,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        for (name, value) in [
            ("weight_mutation_factor", self.weight_mutation_factor),
            ("initial_weight_mutation", self.initial_weight_mutation),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidScale { name, value });
            }
        }
        Ok(())
    }
}
