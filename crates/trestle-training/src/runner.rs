//! Driving the controller through episodes.
//!
//! [`run_episode`] plays exactly one episode for the current model;
//! [`run_training`] repeats it until a limit is hit or a stop is requested,
//! persisting every finished generation to a [`CheckpointStore`].
//!
//! A stop request is honoured at three points: before genes are generated,
//! after the episode has executed, and between episodes. An interrupted
//! episode never trains its model.

use rand::Rng;
use trestle_policy::{Gene, Point2, PolicyNetwork, ShapeMismatchError, effective_sigma};

use crate::{
    checkpoint::{CheckpointStore, weight_file_name},
    episode::{EpisodeExecutor, ObservationSource, StepContext},
    params::{GenerationMode, PbtParams},
    population::{Advance, GenerationReport, MergeSummary, PopulationController},
};

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RunError<E> {
    #[display("policy network rejected its input: {_0}")]
    Shape(ShapeMismatchError),
    #[display("episode execution failed: {_0}")]
    Executor(E),
}

/// Result of one finished episode.
#[derive(Debug, Clone)]
pub struct EpisodeReport {
    pub model_index: usize,
    pub genes: Vec<Gene>,
    pub fitness: f32,
    pub advance: Advance,
}

#[derive(Debug, Clone, derive_more::IsVariant)]
pub enum EpisodeOutcome {
    Completed(EpisodeReport),
    /// A stop was requested; nothing was trained.
    Stopped,
}

/// Upper bounds for [`run_training`]. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingLimits {
    pub max_generations: Option<u64>,
    pub max_episodes: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrainingSummary {
    pub episodes: u64,
    pub generations: u64,
    pub stopped: bool,
}

/// Restores the population from `store`: checkpoint rows first, then weight
/// files for the restored generation. Storage errors are logged and skipped.
pub fn restore_population<R, S>(
    controller: &mut PopulationController<R>,
    store: &mut S,
) -> MergeSummary
where
    R: Rng,
    S: CheckpointStore + ?Sized,
{
    let rows = store.load_rows().unwrap_or_else(|e| {
        log::warn!("failed to load checkpoint rows: {e}");
        vec![]
    });
    let mut summary = controller.merge_checkpoint(&rows);
    summary.weights_loaded += controller.load_weight_files(store);
    summary
}

/// Writes every record of a finished generation, plus one weight file per
/// model. Failures are logged; the number of records written is returned.
pub fn persist_generation<S>(store: &mut S, report: &GenerationReport) -> usize
where
    S: CheckpointStore + ?Sized,
{
    let mut saved = 0;
    for record in &report.records {
        match store.save_record(record) {
            Ok(()) => saved += 1,
            Err(e) => log::warn!(
                "failed to save checkpoint of model {}: {e}",
                record.model_index
            ),
        }
        let name = weight_file_name(record.model_index, record.global_generation);
        if let Err(e) = store.save_weight_file(&name, &record.weights) {
            log::warn!("failed to save weight file {name}: {e}");
        }
    }
    saved
}

/// Plays one episode with the current model and reports its fitness.
///
/// Starts the controller if it has never been started. Returns
/// [`EpisodeOutcome::Stopped`] without touching any weights when a stop is
/// requested before or during the episode. If the executor fails, the
/// pending rollout is discarded and the model stays current.
pub fn run_episode<R, O, E>(
    controller: &mut PopulationController<R>,
    observations: &mut O,
    executor: &mut E,
) -> Result<EpisodeOutcome, RunError<E::Error>>
where
    R: Rng,
    O: ObservationSource + ?Sized,
    E: EpisodeExecutor + ?Sized,
{
    if controller.is_stop_requested() {
        controller.stop();
        return Ok(EpisodeOutcome::Stopped);
    }
    if !controller.phase().is_evaluating() {
        controller.start();
    }

    let model_index = controller.current_index();
    controller.begin_episode();
    let genes = match generate_genes(controller, observations) {
        Ok(genes) => genes,
        Err(e) => {
            controller.discard_episode();
            return Err(RunError::Shape(e));
        }
    };
    if genes.is_empty() {
        log::warn!("model {model_index} produced no genes; executing an empty episode");
    }

    let executed = match executor.execute(genes) {
        Ok(executed) => executed,
        Err(e) => {
            controller.discard_episode();
            return Err(RunError::Executor(e));
        }
    };
    if controller.is_stop_requested() {
        controller.stop();
        return Ok(EpisodeOutcome::Stopped);
    }

    let advance = controller.report_fitness(executed.fitness);
    Ok(EpisodeOutcome::Completed(EpisodeReport {
        model_index,
        genes: executed.genes,
        fitness: executed.fitness,
        advance,
    }))
}

fn generate_genes<R, O>(
    controller: &mut PopulationController<R>,
    observations: &mut O,
) -> Result<Vec<Gene>, ShapeMismatchError>
where
    R: Rng,
    O: ObservationSource + ?Sized,
{
    let mode = controller.params().mode;
    let total_steps = controller.params().steps_per_episode();
    collect_genes(mode, total_steps, observations, |observation, origin| {
        controller.generate(observation, origin)
    })
}

/// How a standalone policy picks its actions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActionChoice {
    /// The action means, without exploration noise.
    Greedy,
    /// Means perturbed with the given exploration noise.
    Explore { noise: f32 },
}

/// Runs the observation loop of one episode.
///
/// `step` turns each observation into genes. In sequential mode it also
/// receives the end of the last placed gene as the chain origin. The loop ends
/// early when the source has no observation for a step.
pub fn collect_genes<O, F>(
    mode: GenerationMode,
    total_steps: usize,
    observations: &mut O,
    mut step: F,
) -> Result<Vec<Gene>, ShapeMismatchError>
where
    O: ObservationSource + ?Sized,
    F: FnMut(&[f32], Option<Point2>) -> Result<Vec<Gene>, ShapeMismatchError>,
{
    let mut genes = vec![];
    for index in 0..total_steps {
        let context = StepContext {
            step: index,
            total_steps,
            placed: &genes,
        };
        let Some(observation) = observations.observe(&context) else {
            log::warn!("no observation available at step {index}; ending generation early");
            break;
        };
        let origin = match mode {
            GenerationMode::SingleShot => None,
            GenerationMode::Sequential => genes.last().map(|gene| gene.end),
        };
        let new_genes = step(&observation, origin)?;
        genes.extend(new_genes);
    }
    Ok(genes)
}

/// Generates one episode of genes with a bare network, outside any
/// population. Nothing is recorded for training.
pub fn policy_genes<O, R>(
    network: &PolicyNetwork,
    params: &PbtParams,
    choice: ActionChoice,
    observations: &mut O,
    rng: &mut R,
) -> Result<Vec<Gene>, ShapeMismatchError>
where
    O: ObservationSource + ?Sized,
    R: Rng + ?Sized,
{
    let geometry = params.geometry();
    collect_genes(
        params.mode,
        params.steps_per_episode(),
        observations,
        |observation, origin| {
            let action = match choice {
                ActionChoice::Greedy => network.forward(observation)?.mean,
                ActionChoice::Explore { noise } => {
                    network.act(observation, effective_sigma(noise), rng)?.action
                }
            };
            Ok(geometry.decode(&action, origin))
        },
    )
}

/// Runs episodes until a limit is reached or a stop is requested.
///
/// `on_generation` is called after each finished generation has been
/// persisted.
pub fn run_training<R, O, E, S, F>(
    controller: &mut PopulationController<R>,
    observations: &mut O,
    executor: &mut E,
    store: &mut S,
    limits: TrainingLimits,
    mut on_generation: F,
) -> Result<TrainingSummary, RunError<E::Error>>
where
    R: Rng,
    O: ObservationSource + ?Sized,
    E: EpisodeExecutor + ?Sized,
    S: CheckpointStore + ?Sized,
    F: FnMut(&GenerationReport),
{
    let mut summary = TrainingSummary::default();
    loop {
        if limits.max_generations.is_some_and(|n| summary.generations >= n)
            || limits.max_episodes.is_some_and(|n| summary.episodes >= n)
        {
            break;
        }
        let report = match run_episode(controller, observations, executor)? {
            EpisodeOutcome::Stopped => {
                summary.stopped = true;
                break;
            }
            EpisodeOutcome::Completed(report) => report,
        };
        summary.episodes += 1;
        if let Advance::GenerationComplete(generation) = &report.advance {
            let generation = generation.as_ref();
            persist_generation(store, generation);
            on_generation(generation);
            summary.generations += 1;
        }
    }
    log::info!(
        "training finished after {} episodes and {} generations",
        summary.episodes,
        summary.generations
    );
    Ok(summary)
}
