use std::path::PathBuf;

use rand::SeedableRng as _;
use rand_pcg::Pcg64;
use serde::Serialize;
use trestle_policy::Gene;
use trestle_training::{ActionChoice, EpisodeExecutor as _, policy_genes};

use crate::{
    surrogate::{self, Scene},
    util,
};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct SampleArg {
    /// Exported policy model (JSON)
    model: PathBuf,
    /// Scene description (JSON); defaults to a three-anchor gap
    #[arg(long)]
    scene: Option<PathBuf>,
    /// Use the action means instead of sampling exploration noise
    #[arg(long)]
    greedy: bool,
    /// Random seed for reproducible sampling
    #[arg(long)]
    seed: Option<u64>,
    /// Output file path
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SampleOutput {
    model: String,
    fitness: f32,
    genes: Vec<Gene>,
}

pub(crate) fn run(arg: &SampleArg) -> anyhow::Result<()> {
    let model = util::read_policy_model_file(&arg.model)?;
    let network = model.to_network()?;
    let scene = match &arg.scene {
        Some(path) => util::read_json_file("scene", path)?,
        None => Scene::default(),
    };
    let mut rng = match arg.seed {
        Some(seed) => Pcg64::seed_from_u64(seed),
        None => Pcg64::from_rng(&mut rand::rng()),
    };

    let (mut observations, mut executor) = surrogate::surrogate_world(scene, model.params.mode);
    let choice = if arg.greedy {
        ActionChoice::Greedy
    } else {
        ActionChoice::Explore {
            noise: model.exploration_noise,
        }
    };
    let genes = policy_genes(&network, &model.params, choice, &mut observations, &mut rng)?;
    let executed = executor.execute(genes).unwrap_or_else(|never| match never {});
    log::info!(
        "model {} placed {} bars, fitness {:.3}",
        model.name,
        executed.genes.len(),
        executed.fitness
    );

    util::save_json(
        &SampleOutput {
            model: model.name,
            fitness: executed.fitness,
            genes: executed.genes,
        },
        arg.output.as_deref(),
    )
}
