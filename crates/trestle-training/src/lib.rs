//! Population-based training of bridge-building policies.
//!
//! This crate trains a population of [`PolicyNetwork`](trestle_policy::PolicyNetwork)s
//! by combining two loops:
//!
//! - an **inner loop** where each model learns from its own episodes with
//!   REINFORCE, using its own learning rate and exploration noise, and
//! - an **outer loop** where the population is ranked by fitness and the
//!   weakest models are replaced by mutated copies of the strongest, so
//!   hyperparameters evolve along with the weights.
//!
//! # How Training Works
//!
//! 1. **Population** - Create `population_size` models with random weights and
//!    hyperparameters drawn from the initial ranges
//! 2. **Episode** - The current model observes the scene and emits genes; the
//!    genes are built, driven across and scored
//! 3. **Learning** - The model trains on its episode using the fitness as the
//!    return
//! 4. **Sweep** - Steps 2-3 repeat for each model in turn
//! 5. **Evolution** - Elites survive unchanged; the other slots are refilled
//!    with mutated copies of good parents
//! 6. **Repeat** - Continue until stopped or a limit is reached
//!
//! # Architecture
//!
//! ```text
//! ObservationSource
//!     ↓ observation
//! PopulationController (current Model)
//!     ↓ genes
//! EpisodeExecutor (Simulator + FitnessOracle)
//!     ↓ fitness
//! PopulationController::report_fitness
//!     ↓ end of sweep
//! evolve + CheckpointStore
//! ```
//!
//! # Modules
//!
//! - [`params`] - configuration and validation
//! - [`model`] - a single population member
//! - [`population`] - the controller, ranking and evolution
//! - [`checkpoint`] - persisted rows, lenient parsing and the storage trait
//! - [`episode`] - simulator, oracle and observation seams
//! - [`runner`] - episode and training loops
//! - [`stats`] - fitness summaries
//!
//! # Current Limitations
//!
//! - **One model at a time**: Episodes are evaluated sequentially. The
//!   controller owns its random number generator and is not shared between
//!   threads; only the [`StopHandle`] is.
//! - **Single-sample gradient**: Each training call uses exactly one episode,
//!   so updates are noisy. The baseline reduces, but does not remove, that
//!   noise.
//! - **Best-effort persistence**: Storage failures are logged and training
//!   continues. A crash between generations loses at most the generation in
//!   progress.

pub use self::{
    checkpoint::{CheckpointRecord, CheckpointStore, MemoryStore, RawRow},
    episode::{
        Bar, BarBody, BarKey, EpisodeExecutor, ExecutedEpisode, FitnessOracle, ObservationSource,
        ScoredSimulator, SimulatedEpisode, Simulator, StepContext,
    },
    model::{ImportWeightsError, Model},
    params::{ConfigError, GenerationMode, HyperparamBounds, HyperparamRange, ParentPool, PbtParams},
    population::{
        Advance, GenerationReport, MergeSummary, Phase, PopulationController, RankedModel,
        StopHandle,
    },
    runner::{
        ActionChoice, EpisodeOutcome, EpisodeReport, RunError, TrainingLimits, TrainingSummary,
        collect_genes, persist_generation, policy_genes, restore_population, run_episode,
        run_training,
    },
    stats::FitnessSummary,
};

pub mod checkpoint;
pub mod episode;
pub mod model;
pub mod params;
pub mod population;
pub mod runner;
pub mod stats;
