use std::path::PathBuf;

use anyhow::Context as _;
use chrono::Utc;
use rand::SeedableRng as _;
use rand_pcg::Pcg64;
use trestle_training::{
    CheckpointRecord, FitnessSummary, GenerationMode, GenerationReport, PbtParams,
    PopulationController, TrainingLimits, restore_population, run_training,
};

use crate::{
    schema::policy_model::PolicyModel,
    store::FileCheckpointStore,
    surrogate::{self, Scene},
    util::{self, read_json_file},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::FromStr)]
pub enum ModeArg {
    SingleShot,
    Sequential,
}

impl From<ModeArg> for GenerationMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::SingleShot => Self::SingleShot,
            ModeArg::Sequential => Self::Sequential,
        }
    }
}

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Training configuration (JSON); omitted fields use defaults
    #[arg(long)]
    config: Option<PathBuf>,
    /// Scene description (JSON); defaults to a three-anchor gap
    #[arg(long)]
    scene: Option<PathBuf>,
    /// Gene generation mode (`singleshot` or `sequential`)
    #[arg(long)]
    mode: Option<ModeArg>,
    /// Number of models in the population
    #[arg(long)]
    population_size: Option<usize>,
    /// Number of generations to run
    #[arg(long, default_value_t = 20)]
    generations: u64,
    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
    /// Checkpoint rows file (JSON lines)
    #[arg(long, default_value = "checkpoints/checkpoint.jsonl")]
    checkpoint: PathBuf,
    /// Directory for per-model weight files
    #[arg(long, default_value = "checkpoints/weights")]
    weights_dir: PathBuf,
    /// Ignore existing checkpoints and start from a fresh population
    #[arg(long)]
    fresh: bool,
    /// Name recorded in the exported model
    #[arg(long, default_value = "bridge")]
    name: String,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

fn load_params(arg: &TrainArg) -> anyhow::Result<PbtParams> {
    let mut params = match &arg.config {
        Some(path) => read_json_file("training config", path)?,
        None => PbtParams::default(),
    };
    if let Some(mode) = arg.mode {
        params.mode = mode.into();
    }
    if let Some(size) = arg.population_size {
        params.population_size = size;
    }
    Ok(params)
}

fn log_report(report: &GenerationReport) {
    log::info!("Generation #{}:", report.generation);
    log::info!("  Models:");
    for ranked in &report.ranking {
        log::info!(
            "  {:2}: lr {:.2e}, noise {:.3} => {:.3}",
            ranked.index,
            ranked.learning_rate,
            ranked.exploration_noise,
            ranked.fitness
        );
    }

    let fitness = &report.fitness;
    log::info!("  Fitness Stats:");
    log::info!("    Min:    {:.3}", fitness.min);
    log::info!("    Max:    {:.3}", fitness.max);
    log::info!("    Mean:   {:.3}", fitness.mean);
    log::info!("    Stddev: {:.3}", fitness.std_dev);

    let learning_rate = FitnessSummary::from_values(report.ranking.iter().map(|r| r.learning_rate))
        .unwrap_or_default();
    let noise = FitnessSummary::from_values(report.ranking.iter().map(|r| r.exploration_noise))
        .unwrap_or_default();
    log::info!("  Hyperparameter Stats:");
    log::info!(
        "    Learning rate: mean {:.2e}, range {:.2e}..{:.2e}",
        learning_rate.mean,
        learning_rate.min,
        learning_rate.max
    );
    log::info!(
        "    Noise:         mean {:.3}, range {:.3}..{:.3}",
        noise.mean,
        noise.min,
        noise.max
    );
}

/// Keeps the best record seen so far.
fn keep_best(best: &mut Option<CheckpointRecord>, report: &GenerationReport) {
    let Some(top) = report.best() else {
        return;
    };
    let Some(record) = report.records.get(top.index) else {
        return;
    };
    if best.as_ref().is_none_or(|b| record.fitness > b.fitness) {
        *best = Some(record.clone());
    }
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let params = load_params(arg)?;
    let scene = match &arg.scene {
        Some(path) => read_json_file("scene", path)?,
        None => Scene::default(),
    };
    let rng = match arg.seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_rng(&mut rand::rng()),
    };
    let mut controller = PopulationController::new(params.clone(), rng)
        .context("Invalid training configuration")?;

    let mut store = FileCheckpointStore::new(&arg.checkpoint, &arg.weights_dir);
    if arg.fresh {
        let removed = store.clear()?;
        log::info!(
            "Starting fresh: cleared {} and {removed} weight files",
            store.rows_path().display()
        );
        controller.init_population();
    } else {
        let merged = restore_population(&mut controller, &mut store);
        log::info!(
            "Resumed from {}: {} rows applied, {} skipped, {} weights loaded",
            store.rows_path().display(),
            merged.applied_rows,
            merged.skipped_rows,
            merged.weights_loaded
        );
    }

    let (mut observations, mut executor) = surrogate::surrogate_world(scene, params.mode);
    let mut best = None;
    let summary = run_training(
        &mut controller,
        &mut observations,
        &mut executor,
        &mut store,
        TrainingLimits {
            max_generations: Some(arg.generations),
            max_episodes: None,
        },
        |report| {
            log_report(report);
            keep_best(&mut best, report);
        },
    )?;

    eprintln!(
        "Training finished: {} episodes, {} generations",
        summary.episodes, summary.generations
    );
    let Some(best) = best else {
        log::warn!("No generation completed; nothing to export");
        return Ok(());
    };

    let model = PolicyModel::from_record(arg.name.clone(), Utc::now(), params, &best);
    util::save_json(&model, arg.output.as_deref())?;

    eprintln!();
    eprintln!("Model saved successfully");
    if let Some(path) = &arg.output {
        eprintln!("  Path: {}", path.display());
    }
    eprintln!("  Name: {}", model.name);
    eprintln!("  Trained at: {}", model.trained_at);
    eprintln!("  Generation: {}", model.generation);
    eprintln!("  Final fitness: {:.3}", model.final_fitness);

    Ok(())
}
