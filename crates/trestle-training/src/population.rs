//! Population-based training controller.
//!
//! [`PopulationController`] owns the models, evaluates them one at a time and
//! evolves the population after every full sweep.
//!
//! # Lifecycle
//!
//! ```text
//!          start()                    report_fitness() for the last model
//!  Idle ───────────▶ Evaluating ─────────────────────────────────▶ Evolving
//!   ▲                 ▲     │                                         │
//!   │      stop()     │     └─ report_fitness(): next model           │
//!   └─────────────────┤                                               │
//!                     └───────────────────────────────────────────────┘
//!                                  new generation ready
//! ```
//!
//! # Evolution
//!
//! Models are ranked by their last fitness (descending, ties broken by slot
//! index). The top `elite_count` are copied unchanged. The remaining slots are
//! filled with copies of random parents from the configured [`ParentPool`],
//! whose hyperparameters are jittered and whose weights are perturbed by
//! `U(±noise × weight_mutation_factor)`.
//!
//! Models are copied before any mutation is applied, so a parent that is
//! picked several times is never seen half-mutated.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rand::Rng;
use serde::{Deserialize, Serialize};
use trestle_policy::{Gene, Point2, ShapeMismatchError, TrainOutcome};

use crate::{
    checkpoint::{CheckpointRecord, CheckpointStore, ParsedRow, RawRow, weight_file_name},
    model::Model,
    params::{ConfigError, ParentPool, PbtParams},
    stats::FitnessSummary,
};

/// Shared cancellation flag.
///
/// Clones observe the same flag, so a handle can be moved into a signal
/// handler or another thread while the controller keeps running.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn request_stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub enum Phase {
    Idle,
    Evaluating,
    Evolving,
}

/// Ranking entry of a finished generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankedModel {
    pub index: usize,
    pub fitness: f32,
    pub learning_rate: f32,
    pub exploration_noise: f32,
}

/// Everything known about a generation at the moment it finished.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    /// Global generation number of the evaluated population.
    pub generation: u64,
    /// Models ordered best first.
    pub ranking: Vec<RankedModel>,
    pub fitness: FitnessSummary,
    /// Checkpoint records in slot order, taken before evolution.
    pub records: Vec<CheckpointRecord>,
}

impl GenerationReport {
    #[must_use]
    pub fn best(&self) -> Option<&RankedModel> {
        self.ranking.first()
    }
}

/// What happened after a fitness report.
#[derive(Debug, Clone, derive_more::IsVariant)]
pub enum Advance {
    /// The next model in the sweep is now current.
    NextModel { index: usize },
    /// The sweep finished and the population evolved.
    GenerationComplete(Box<GenerationReport>),
    /// The report was dropped because the controller was not evaluating.
    Ignored,
}

/// Result of merging checkpoint data into the population.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    pub applied_rows: usize,
    pub skipped_rows: usize,
    pub weights_loaded: usize,
    pub global_generation: u64,
}

#[derive(Debug)]
pub struct PopulationController<R> {
    params: PbtParams,
    rng: R,
    models: Vec<Model>,
    current_index: usize,
    generation_index: u64,
    global_generation: u64,
    phase: Phase,
    stop: StopHandle,
}

impl<R> PopulationController<R>
where
    R: Rng,
{
    /// Validates `params` and creates an idle controller with an empty
    /// population.
    pub fn new(params: PbtParams, rng: R) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            rng,
            models: vec![],
            current_index: 0,
            generation_index: 0,
            global_generation: 0,
            phase: Phase::Idle,
            stop: StopHandle::default(),
        })
    }

    #[must_use]
    pub fn params(&self) -> &PbtParams {
        &self.params
    }

    #[must_use]
    pub fn models(&self) -> &[Model] {
        &self.models
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Generations completed since this controller was created.
    #[must_use]
    pub fn generation_index(&self) -> u64 {
        self.generation_index
    }

    /// Generation number shared with persisted checkpoints.
    #[must_use]
    pub fn global_generation(&self) -> u64 {
        self.global_generation
    }

    /// Slot of the model being evaluated.
    #[must_use]
    pub fn current_index(&self) -> usize {
        if self.current_index < self.models.len() {
            self.current_index
        } else {
            0
        }
    }

    #[must_use]
    pub fn current_model(&self) -> Option<&Model> {
        self.models.get(self.current_index())
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    #[must_use]
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_stop_requested()
    }

    /// Replaces the population with freshly initialized models.
    pub fn init_population(&mut self) {
        let size = self.params.population_size;
        self.models = (0..size)
            .map(|_| Model::new(&self.params, &mut self.rng))
            .collect();
        self.current_index = 0;
        log::info!(
            "initialized population of {size} models (network {})",
            self.params.network_shape()
        );
    }

    /// Begins or resumes evaluation.
    ///
    /// The population is created on first start; later starts continue with
    /// the existing models at the current slot.
    pub fn start(&mut self) {
        if self.models.is_empty() {
            self.init_population();
        }
        self.stop.reset();
        self.phase = Phase::Evaluating;
        log::info!(
            "evaluating generation {} from model {}",
            self.global_generation,
            self.current_index()
        );
    }

    /// Stops evaluation and drops the current model's pending rollout.
    ///
    /// Safe to call at any time, any number of times.
    pub fn stop(&mut self) {
        self.stop.request_stop();
        let index = self.current_index();
        if let Some(model) = self.models.get_mut(index) {
            model.discard_rollout();
        }
        if !self.phase.is_idle() {
            log::info!("training stopped at model {index}");
        }
        self.phase = Phase::Idle;
    }

    /// Prepares the current model for a new episode.
    pub fn begin_episode(&mut self) {
        let index = self.current_index();
        if let Some(model) = self.models.get_mut(index) {
            model.begin_episode();
        }
    }

    /// Drops the current model's pending rollout without training.
    pub fn discard_episode(&mut self) {
        let index = self.current_index();
        if let Some(model) = self.models.get_mut(index) {
            model.discard_rollout();
        }
    }

    /// Lets the current model generate genes for `observation`.
    ///
    /// Returns no genes when the population is empty.
    pub fn generate(
        &mut self,
        observation: &[f32],
        origin: Option<Point2>,
    ) -> Result<Vec<Gene>, ShapeMismatchError> {
        let index = self.current_index();
        let Some(model) = self.models.get_mut(index) else {
            log::warn!("generate called with an empty population");
            return Ok(vec![]);
        };
        model.generate(observation, origin, &mut self.rng)
    }

    /// Credits the current model with `fitness`, trains it and moves on.
    pub fn report_fitness(&mut self, fitness: f32) -> Advance {
        if !self.phase.is_evaluating() || self.stop.is_stop_requested() {
            log::debug!("ignoring fitness report while {}", self.phase);
            self.discard_episode();
            return Advance::Ignored;
        }
        let index = self.current_index();
        let Some(model) = self.models.get_mut(index) else {
            return Advance::Ignored;
        };
        let fitness = if fitness.is_finite() {
            fitness
        } else {
            log::warn!("model {index} reported non-finite fitness {fitness}; using 0");
            0.0
        };
        match model.train(fitness) {
            TrainOutcome::Updated { advantage } => {
                log::debug!("model {index}: fitness {fitness:.3}, advantage {advantage:.3}");
            }
            TrainOutcome::Skipped => {
                log::debug!("model {index}: fitness {fitness:.3}, no update");
            }
        }
        self.current_index = index;
        self.advance()
    }

    /// Moves to the next model, evolving after the last one.
    pub fn advance(&mut self) -> Advance {
        if self.models.is_empty() {
            return Advance::Ignored;
        }
        let next = self.current_index() + 1;
        if next < self.models.len() {
            self.current_index = next;
            return Advance::NextModel { index: next };
        }
        let report = self.generation_report();
        self.evolve();
        Advance::GenerationComplete(Box::new(report))
    }

    /// Slot indices ordered best first. Ties keep slot order.
    #[must_use]
    pub fn ranking(&self) -> Vec<usize> {
        let mut order = (0..self.models.len()).collect::<Vec<_>>();
        order.sort_by(|&a, &b| {
            self.models[b]
                .last_fitness()
                .total_cmp(&self.models[a].last_fitness())
        });
        order
    }

    #[must_use]
    pub fn checkpoint_records(&self) -> Vec<CheckpointRecord> {
        self.models
            .iter()
            .enumerate()
            .map(|(index, model)| {
                CheckpointRecord::from_model(self.global_generation, index, model)
            })
            .collect()
    }

    fn generation_report(&self) -> GenerationReport {
        let ranking = self
            .ranking()
            .into_iter()
            .map(|index| {
                let model = &self.models[index];
                RankedModel {
                    index,
                    fitness: model.last_fitness(),
                    learning_rate: model.learning_rate(),
                    exploration_noise: model.exploration_noise(),
                }
            })
            .collect::<Vec<_>>();
        let fitness = FitnessSummary::from_values(ranking.iter().map(|r| r.fitness))
            .unwrap_or_default();
        GenerationReport {
            generation: self.global_generation,
            ranking,
            fitness,
            records: self.checkpoint_records(),
        }
    }

    /// Replaces the population with the next generation.
    pub fn evolve(&mut self) {
        self.phase = Phase::Evolving;
        let ranking = self.ranking();
        let size = self.models.len();
        let elite_count = self.params.elite_count.min(size);
        let pool_len = match self.params.parent_pool {
            ParentPool::Elites => elite_count,
            ParentPool::TopHalf => size / 2,
        }
        .max(1)
        .min(size);

        let mut next = ranking[..elite_count]
            .iter()
            .map(|&i| self.models[i].offspring())
            .collect::<Vec<_>>();
        while next.len() < size {
            let parent = ranking[self.rng.random_range(0..pool_len)];
            let mut child = self.models[parent].offspring();
            child.mutate_hyperparameters(&self.params.bounds, &mut self.rng);
            let scale = child.exploration_noise() * self.params.weight_mutation_factor;
            child.mutate_weights(scale, &mut self.rng);
            next.push(child);
        }

        if let Some(&best) = ranking.first() {
            log::info!(
                "generation {} done: best model {best} with fitness {:.3}",
                self.global_generation,
                self.models[best].last_fitness()
            );
        }
        self.models = next;
        self.current_index = 0;
        self.generation_index += 1;
        self.global_generation += 1;
        self.phase = if self.stop.is_stop_requested() {
            Phase::Idle
        } else {
            Phase::Evaluating
        };
    }

    /// Applies checkpoint rows to the population.
    ///
    /// The global generation becomes the largest one seen. For each row with a
    /// valid in-range model index, the model takes the row's hyperparameters
    /// (clamped into bounds), fitness and, if present and decodable, weights.
    /// Later rows win over earlier ones. The population is created first if
    /// it does not exist yet.
    pub fn merge_checkpoint(&mut self, rows: &[RawRow]) -> MergeSummary {
        if self.models.is_empty() {
            self.init_population();
        }
        let mut summary = MergeSummary::default();
        for row in rows {
            let parsed = ParsedRow::parse(row);
            self.global_generation = self.global_generation.max(parsed.global_generation);

            let Some(index) = parsed.model_index else {
                summary.skipped_rows += 1;
                continue;
            };
            let Some(model) = self.models.get_mut(index) else {
                log::warn!(
                    "skipping checkpoint row for model {index}; population has {} models",
                    self.params.population_size
                );
                summary.skipped_rows += 1;
                continue;
            };
            model.set_hyperparameters(parsed.learning_rate, parsed.noise, &self.params.bounds);
            model.set_last_fitness(parsed.fitness);
            if let Some(weights) = &parsed.weights {
                match model.import_weights(weights) {
                    Ok(()) => summary.weights_loaded += 1,
                    Err(e) => log::warn!("keeping current weights of model {index}: {e}"),
                }
            }
            summary.applied_rows += 1;
        }
        summary.global_generation = self.global_generation;
        log::info!(
            "merged {} checkpoint rows ({} skipped), resuming at generation {}",
            summary.applied_rows,
            summary.skipped_rows,
            self.global_generation
        );
        summary
    }

    /// Loads weight files saved for the current global generation.
    ///
    /// Missing files are ignored; unreadable or mismatched files are logged
    /// and the model keeps its weights. Returns the number of models updated.
    pub fn load_weight_files<S>(&mut self, store: &mut S) -> usize
    where
        S: CheckpointStore + ?Sized,
    {
        let generation = self.global_generation;
        let mut loaded = 0;
        for (index, model) in self.models.iter_mut().enumerate() {
            let name = weight_file_name(index, generation);
            match store.load_weight_file(&name) {
                Ok(Some(text)) => match model.import_weights(&text) {
                    Ok(()) => loaded += 1,
                    Err(e) => log::warn!("ignoring weight file {name}: {e}"),
                },
                Ok(None) => {}
                Err(e) => log::warn!("failed to read weight file {name}: {e}"),
            }
        }
        if loaded > 0 {
            log::info!("loaded {loaded} weight files for generation {generation}");
        }
        loaded
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng as _;
    use rand_pcg::Pcg64;

    use super::*;
    use crate::{
        checkpoint::MemoryStore,
        params::HyperparamRange,
    };

    const ANCHORS: [f32; 6] = [-8.0, 0.0, 0.0, -2.0, 8.0, 0.0];

    fn small_params(population_size: usize) -> PbtParams {
        PbtParams {
            population_size,
            genes_per_episode: 2,
            hidden_size: 4,
            elite_count: 2.min(population_size),
            ..PbtParams::default()
        }
    }

    fn controller(population_size: usize, seed: u64) -> PopulationController<Pcg64> {
        let mut c =
            PopulationController::new(small_params(population_size), Pcg64::seed_from_u64(seed))
                .unwrap();
        c.start();
        c
    }

    fn run_episode(c: &mut PopulationController<Pcg64>, fitness: f32) -> Advance {
        c.begin_episode();
        c.generate(&ANCHORS, None).unwrap();
        c.report_fitness(fitness)
    }

    fn row(fields: &[(&str, &str)]) -> RawRow {
        fields
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_new_rejects_invalid_params() {
        let err = PopulationController::new(small_params(0), Pcg64::seed_from_u64(0)).unwrap_err();
        assert_eq!(err, ConfigError::EmptyPopulation);
    }

    #[test]
    fn test_start_initializes_once() {
        let mut c = controller(4, 1);
        assert!(c.phase().is_evaluating());
        assert_eq!(c.models().len(), 4);
        let weights = c.models()[0].network().flat_weights();
        c.stop();
        c.start();
        assert_eq!(c.models()[0].network().flat_weights(), weights);
    }

    #[test]
    fn test_sweep_advances_through_models() {
        let mut c = controller(3, 2);
        assert!(matches!(run_episode(&mut c, 1.0), Advance::NextModel { index: 1 }));
        assert!(matches!(run_episode(&mut c, 2.0), Advance::NextModel { index: 2 }));
        assert_eq!(c.current_index(), 2);
        let advance = run_episode(&mut c, 3.0);
        let Advance::GenerationComplete(report) = advance else {
            panic!("expected generation to complete");
        };
        assert_eq!(report.generation, 0);
        assert_eq!(report.best().unwrap().index, 2);
        assert_eq!(report.ranking.iter().map(|r| r.index).collect::<Vec<_>>(), [2, 1, 0]);
        assert_eq!(report.fitness.max, 3.0);
        assert_eq!(report.records.len(), 3);
        assert_eq!(report.records[1].fitness, 2.0);
        assert_eq!(c.current_index(), 0);
        assert!(c.phase().is_evaluating());
    }

    #[test]
    fn test_generation_increments_once_per_sweep() {
        let n = 5;
        let mut c = controller(n, 3);
        for sweep in 1..=3_u64 {
            for k in 0..n {
                assert_eq!(c.generation_index(), sweep - 1);
                #[expect(clippy::cast_precision_loss)]
                let advance = run_episode(&mut c, k as f32);
                assert_eq!(advance.is_generation_complete(), k == n - 1);
            }
            assert_eq!(c.generation_index(), sweep);
            assert_eq!(c.global_generation(), sweep);
            assert_eq!(c.current_index(), 0);
        }
    }

    #[test]
    fn test_ranking_is_stable_on_ties() {
        let mut c = controller(4, 4);
        for (model, fitness) in c.models.iter_mut().zip([1.0, 5.0, 1.0, 5.0]) {
            model.set_last_fitness(fitness);
        }
        assert_eq!(c.ranking(), vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_elites_survive_unchanged() {
        let mut c = controller(6, 5);
        let fitness = [3.0, 9.0, -1.0, 7.0, 0.5, 2.0];
        let mut snapshots = vec![];
        for f in fitness {
            // weights after training, before evolution
            c.begin_episode();
            c.generate(&ANCHORS, None).unwrap();
            let index = c.current_index();
            let advance = c.report_fitness(f);
            snapshots.push(reported_weights(&c, &advance, index));
        }
        assert_eq!(c.models()[0].network().flat_weights(), snapshots[1]);
        assert_eq!(c.models()[1].network().flat_weights(), snapshots[3]);
        for model in c.models() {
            assert_eq!(model.last_fitness(), 0.0);
        }
    }

    /// Weights of the model that just reported, read from the report when the
    /// population has already evolved.
    fn reported_weights(
        c: &PopulationController<Pcg64>,
        advance: &Advance,
        index: usize,
    ) -> Vec<f32> {
        match advance {
            Advance::GenerationComplete(report) => {
                trestle_policy::decode_weights(&report.records[index].weights).unwrap()
            }
            _ => c.models()[index].network().flat_weights(),
        }
    }

    #[test]
    fn test_offspring_hyperparameters_stay_in_bounds() {
        let mut params = small_params(8);
        params.bounds.jitter = HyperparamRange::new(0.1, 10.0);
        let mut c = PopulationController::new(params, Pcg64::seed_from_u64(6)).unwrap();
        c.start();
        let bounds = c.params().bounds;
        for _ in 0..20 {
            for k in 0..8_u8 {
                run_episode(&mut c, f32::from(k));
            }
            for model in c.models() {
                assert!(bounds.learning_rate.contains(model.learning_rate()));
                assert!(bounds.exploration_noise.contains(model.exploration_noise()));
            }
        }
    }

    #[test]
    fn test_single_model_population() {
        let params = PbtParams {
            elite_count: 0,
            ..small_params(1)
        };
        let mut c = PopulationController::new(params, Pcg64::seed_from_u64(7)).unwrap();
        c.start();
        assert!(run_episode(&mut c, 1.0).is_generation_complete());
        assert_eq!(c.models().len(), 1);
        assert_eq!(c.global_generation(), 1);
    }

    #[test]
    fn test_elite_only_parent_pool() {
        let params = PbtParams {
            parent_pool: ParentPool::Elites,
            elite_count: 1,
            weight_mutation_factor: 0.0,
            ..small_params(4)
        };
        let mut c = PopulationController::new(params, Pcg64::seed_from_u64(8)).unwrap();
        c.start();
        let mut records = vec![];
        for f in [0.0, 4.0, 1.0, 2.0] {
            if let Advance::GenerationComplete(report) = run_episode(&mut c, f) {
                records = report.records;
            }
        }
        // without weight noise every slot is a copy of the single elite
        let best = trestle_policy::decode_weights(&records[1].weights).unwrap();
        for model in c.models() {
            assert_eq!(model.network().flat_weights(), best);
        }
    }

    #[test]
    fn test_stop_discards_pending_rollout() {
        let mut c = controller(3, 9);
        c.begin_episode();
        c.generate(&ANCHORS, None).unwrap();
        let before = c.models()[0].network().flat_weights();
        c.stop();
        c.stop();
        assert!(c.phase().is_idle());
        assert!(c.is_stop_requested());
        assert!(c.models()[0].rollout().is_empty());
        assert!(c.report_fitness(100.0).is_ignored());
        assert_eq!(c.models()[0].network().flat_weights(), before);
        assert_eq!(c.current_index(), 0);
    }

    #[test]
    fn test_stop_handle_is_shared() {
        let mut c = controller(2, 10);
        let handle = c.stop_handle();
        handle.request_stop();
        assert!(c.is_stop_requested());
        assert!(run_episode(&mut c, 1.0).is_ignored());
        c.start();
        assert!(!handle.is_stop_requested());
    }

    #[test]
    fn test_generate_rejects_wrong_observation() {
        let mut c = controller(2, 11);
        assert!(c.generate(&[0.0; 3], None).is_err());
    }

    #[test]
    fn test_non_finite_fitness_is_zero() {
        let mut c = controller(2, 12);
        run_episode(&mut c, f32::INFINITY);
        assert_eq!(c.models()[0].last_fitness(), 0.0);
    }

    #[test]
    fn test_merge_checkpoint_updates_listed_models_only() {
        let mut c = controller(12, 13);
        let before = c
            .models()
            .iter()
            .map(|m| (m.learning_rate(), m.exploration_noise(), m.network().flat_weights()))
            .collect::<Vec<_>>();
        let donor = c.models()[7].export_weights();
        let rows = vec![
            row(&[
                ("globalGeneration", "3"),
                ("modelIndex", "0"),
                ("fitness", "4.5"),
                ("learningRate", "0.0005"),
                ("noise", "0.2"),
            ]),
            row(&[
                ("globalGeneration", "5"),
                ("modelIndex", "5"),
                ("fitness", "1.5"),
                ("learningRate", "0.0008"),
                ("noise", "0.4"),
                ("weights", &donor),
            ]),
        ];
        let summary = c.merge_checkpoint(&rows);
        assert_eq!(
            summary,
            MergeSummary {
                applied_rows: 2,
                skipped_rows: 0,
                weights_loaded: 1,
                global_generation: 5,
            }
        );
        assert_eq!(c.global_generation(), 5);

        let m0 = &c.models()[0];
        assert_eq!((m0.learning_rate(), m0.exploration_noise()), (0.0005, 0.2));
        assert_eq!(m0.last_fitness(), 4.5);
        assert_eq!(m0.network().flat_weights(), before[0].2);

        let m5 = &c.models()[5];
        assert_eq!((m5.learning_rate(), m5.exploration_noise()), (0.0008, 0.4));
        assert_eq!(m5.network().flat_weights(), before[7].2);

        for (i, model) in c.models().iter().enumerate() {
            if i == 0 || i == 5 {
                continue;
            }
            assert_eq!(model.learning_rate(), before[i].0);
            assert_eq!(model.exploration_noise(), before[i].1);
            assert_eq!(model.network().flat_weights(), before[i].2);
        }
    }

    #[test]
    fn test_merge_checkpoint_is_lenient() {
        let mut c = controller(4, 14);
        let rows = vec![
            row(&[("modelIndex", "1"), ("fitness", "not a number")]),
            row(&[("modelIndex", "99"), ("fitness", "3")]),
            row(&[("fitness", "3")]),
            row(&[("modelIndex", "2"), ("weights", "!!!"), ("noise", "50")]),
        ];
        let summary = c.merge_checkpoint(&rows);
        assert_eq!(summary.applied_rows, 2);
        assert_eq!(summary.skipped_rows, 2);
        assert_eq!(summary.weights_loaded, 0);
        assert_eq!(c.models()[1].last_fitness(), 0.0);
        assert_eq!(c.models()[1].learning_rate(), 0.0003);
        assert_eq!(c.models()[1].exploration_noise(), 0.3);
        assert_eq!(
            c.models()[2].exploration_noise(),
            c.params().bounds.exploration_noise.max
        );
    }

    #[test]
    fn test_merge_keeps_larger_generation() {
        let mut c = controller(2, 15);
        c.merge_checkpoint(&[row(&[("globalGeneration", "9"), ("modelIndex", "0")])]);
        c.merge_checkpoint(&[row(&[("globalGeneration", "4"), ("modelIndex", "0")])]);
        assert_eq!(c.global_generation(), 9);
    }

    #[test]
    fn test_merge_initializes_population() {
        let mut c =
            PopulationController::new(small_params(3), Pcg64::seed_from_u64(16)).unwrap();
        c.merge_checkpoint(&[]);
        assert_eq!(c.models().len(), 3);
        assert!(c.phase().is_idle());
    }

    #[test]
    fn test_load_weight_files() {
        let mut c = controller(3, 17);
        c.merge_checkpoint(&[row(&[("globalGeneration", "2"), ("modelIndex", "0")])]);
        let donor = c.models()[2].export_weights();
        let mut store = MemoryStore::default();
        store
            .weight_files
            .insert(weight_file_name(0, 2), donor.clone());
        store
            .weight_files
            .insert(weight_file_name(1, 2), "garbage".to_owned());
        store.weight_files.insert(weight_file_name(2, 1), donor);
        assert_eq!(c.load_weight_files(&mut store), 1);
        assert_eq!(
            c.models()[0].network().flat_weights(),
            c.models()[2].network().flat_weights()
        );
    }

    #[test]
    fn test_checkpoint_records_roundtrip_through_merge() {
        let mut a = controller(3, 18);
        for f in [1.0, 2.0] {
            run_episode(&mut a, f);
        }
        let rows = a
            .checkpoint_records()
            .iter()
            .map(CheckpointRecord::to_row)
            .collect::<Vec<_>>();
        let mut b = controller(3, 19);
        b.merge_checkpoint(&rows);
        for (ma, mb) in a.models().iter().zip(b.models()) {
            assert_eq!(ma.network().flat_weights(), mb.network().flat_weights());
            assert_eq!(ma.learning_rate(), mb.learning_rate());
            assert_eq!(ma.last_fitness(), mb.last_fitness());
        }
    }
}
