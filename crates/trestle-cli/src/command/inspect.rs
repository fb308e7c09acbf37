use std::{collections::BTreeMap, path::PathBuf};

use trestle_training::{CheckpointRecord, CheckpointStore as _, FitnessSummary};

use crate::store::FileCheckpointStore;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct InspectArg {
    /// Checkpoint rows file (JSON lines)
    checkpoint: PathBuf,
    /// Only show rows of this generation
    #[arg(long)]
    generation: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
struct GenerationSummary {
    rows: usize,
    best_model: usize,
    fitness: FitnessSummary,
}

fn weight_column(record: &CheckpointRecord) -> String {
    if record.weights.is_empty() {
        return "-".to_owned();
    }
    match trestle_policy::decode_weights(&record.weights) {
        Ok(weights) => weights.len().to_string(),
        Err(_) => "invalid".to_owned(),
    }
}

/// Later rows of the same generation and model replace earlier ones.
fn summarize(records: &[CheckpointRecord]) -> BTreeMap<u64, GenerationSummary> {
    let mut latest = BTreeMap::<u64, BTreeMap<usize, &CheckpointRecord>>::new();
    for record in records {
        latest
            .entry(record.global_generation)
            .or_default()
            .insert(record.model_index, record);
    }
    latest
        .into_iter()
        .filter_map(|(generation, models)| {
            let fitness = FitnessSummary::from_values(models.values().map(|r| r.fitness))?;
            let best = models
                .values()
                .max_by(|a, b| a.fitness.total_cmp(&b.fitness))?;
            Some((
                generation,
                GenerationSummary {
                    rows: models.len(),
                    best_model: best.model_index,
                    fitness,
                },
            ))
        })
        .collect()
}

pub(crate) fn run(arg: &InspectArg) -> anyhow::Result<()> {
    let weights_dir = arg
        .checkpoint
        .parent()
        .map(PathBuf::from)
        .unwrap_or_default();
    let mut store = FileCheckpointStore::new(&arg.checkpoint, weights_dir);
    let rows = store.load_rows()?;
    let parsed = rows
        .iter()
        .filter_map(CheckpointRecord::from_row)
        .collect::<Vec<_>>();
    eprintln!(
        "{}: {} rows, {} without a model index",
        store.rows_path().display(),
        rows.len(),
        rows.len() - parsed.len()
    );
    let records = parsed
        .into_iter()
        .filter(|r| arg.generation.is_none_or(|g| r.global_generation == g))
        .collect::<Vec<_>>();

    println!(
        "{:>5} {:>5} {:>10} {:>10} {:>7} {:>8}",
        "gen", "model", "fitness", "lr", "noise", "weights"
    );
    for record in &records {
        println!(
            "{:>5} {:>5} {:>10.3} {:>10.2e} {:>7.3} {:>8}",
            record.global_generation,
            record.model_index,
            record.fitness,
            record.learning_rate,
            record.noise,
            weight_column(record)
        );
    }

    println!();
    println!(
        "{:>5} {:>6} {:>5} {:>10} {:>10} {:>10}",
        "gen", "models", "best", "max", "mean", "stddev"
    );
    for (generation, summary) in summarize(&records) {
        println!(
            "{:>5} {:>6} {:>5} {:>10.3} {:>10.3} {:>10.3}",
            generation,
            summary.rows,
            summary.best_model,
            summary.fitness.max,
            summary.fitness.mean,
            summary.fitness.std_dev
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;
    use trestle_policy::encode_weights;

    use super::*;

    fn record(global_generation: u64, model_index: usize, fitness: f32) -> CheckpointRecord {
        CheckpointRecord {
            global_generation,
            model_index,
            fitness,
            learning_rate: 0.0003,
            noise: 0.3,
            weights: String::new(),
        }
    }

    #[test]
    fn test_summary_per_generation() {
        let records = [
            record(0, 0, 1.0),
            record(0, 1, 5.0),
            record(1, 0, -2.0),
            record(1, 1, -4.0),
        ];
        let summary = summarize(&records);
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[&0].best_model, 1);
        assert_eq!(summary[&0].fitness.max, 5.0);
        assert_eq!(summary[&1].best_model, 0);
        assert_eq!(summary[&1].fitness.mean, -3.0);
    }

    #[test]
    fn test_later_rows_replace_earlier() {
        let records = [record(2, 0, 1.0), record(2, 0, 9.0)];
        let summary = summarize(&records);
        assert_eq!(summary[&2].rows, 1);
        assert_eq!(summary[&2].fitness.max, 9.0);
    }

    #[test]
    fn test_weight_column() {
        let mut r = record(0, 0, 0.0);
        assert_eq!(weight_column(&r), "-");
        r.weights = encode_weights(&[1.0, 2.0]);
        assert_eq!(weight_column(&r), "2");
        r.weights = "%%%".to_owned();
        assert_eq!(weight_column(&r), "invalid");
    }

    #[test]
    fn test_inspect_reads_checkpoint_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ckpt.jsonl");
        fs::write(
            &path,
            "{\"globalGeneration\": 0, \"modelIndex\": 0, \"fitness\": 3}\n{\"fitness\": 1}\n",
        )
        .unwrap();
        run(&InspectArg {
            checkpoint: path,
            generation: Some(0),
        })
        .unwrap();
    }
}
