//! Checkpoint rows and the storage seam.
//!
//! A checkpoint is a list of loosely typed rows, one per evaluated model, as
//! a spreadsheet or log service would hand them back. Rows are parsed
//! leniently: a missing or malformed field falls back to its default instead
//! of failing the whole load. Only `modelIndex` is required; rows without a
//! usable index are skipped.
//!
//! Weight files store the same base64 payload as the `weights` field and are
//! named by [`weight_file_name`].

use std::{collections::BTreeMap, convert::Infallible, fmt};

use serde::{Deserialize, Serialize};

use crate::model::Model;

/// One checkpoint row as handed back by storage.
pub type RawRow = BTreeMap<String, String>;

pub const GLOBAL_GENERATION_KEY: &str = "globalGeneration";
pub const MODEL_INDEX_KEY: &str = "modelIndex";
pub const FITNESS_KEY: &str = "fitness";
pub const LEARNING_RATE_KEY: &str = "learningRate";
pub const NOISE_KEY: &str = "noise";
pub const WEIGHTS_KEY: &str = "weights";

pub const DEFAULT_FITNESS: f32 = 0.0;
pub const DEFAULT_LEARNING_RATE: f32 = 0.0003;
pub const DEFAULT_NOISE: f32 = 0.3;

/// Name of the local weight file of `model_index` at `generation`.
#[must_use]
pub fn weight_file_name(model_index: usize, generation: u64) -> String {
    format!("model_{model_index}_gen_{generation}.txt")
}

/// Everything persisted about one evaluated model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointRecord {
    pub global_generation: u64,
    pub model_index: usize,
    pub fitness: f32,
    pub learning_rate: f32,
    pub noise: f32,
    /// Base64 weight payload.
    pub weights: String,
}

impl CheckpointRecord {
    #[must_use]
    pub fn from_model(global_generation: u64, model_index: usize, model: &Model) -> Self {
        Self {
            global_generation,
            model_index,
            fitness: model.last_fitness(),
            learning_rate: model.learning_rate(),
            noise: model.exploration_noise(),
            weights: model.export_weights(),
        }
    }

    /// Parses a row leniently. Returns `None` if it has no usable model index.
    #[must_use]
    pub fn from_row(row: &RawRow) -> Option<Self> {
        let parsed = ParsedRow::parse(row);
        Some(Self {
            global_generation: parsed.global_generation,
            model_index: parsed.model_index?,
            fitness: parsed.fitness,
            learning_rate: parsed.learning_rate,
            noise: parsed.noise,
            weights: parsed.weights.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn to_row(&self) -> RawRow {
        [
            (GLOBAL_GENERATION_KEY, self.global_generation.to_string()),
            (MODEL_INDEX_KEY, self.model_index.to_string()),
            (FITNESS_KEY, self.fitness.to_string()),
            (LEARNING_RATE_KEY, self.learning_rate.to_string()),
            (NOISE_KEY, self.noise.to_string()),
            (WEIGHTS_KEY, self.weights.clone()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v))
        .collect()
    }
}

/// A leniently parsed checkpoint row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    pub global_generation: u64,
    /// `None` when the index is missing or malformed. Such rows are skipped
    /// rather than applied to model 0, so one bad row cannot overwrite slot 0.
    pub model_index: Option<usize>,
    pub fitness: f32,
    pub learning_rate: f32,
    pub noise: f32,
    /// `None` when the field is missing or blank.
    pub weights: Option<String>,
}

impl ParsedRow {
    #[must_use]
    pub fn parse(row: &RawRow) -> Self {
        let field = |key: &str| row.get(key).map(|s| s.trim()).filter(|s| !s.is_empty());

        let global_generation = match field(GLOBAL_GENERATION_KEY) {
            None => 0,
            Some(text) => parse_count(text).unwrap_or_else(|| {
                log::warn!("ignoring malformed {GLOBAL_GENERATION_KEY} {text:?}");
                0
            }),
        };
        let model_index = field(MODEL_INDEX_KEY).and_then(|text| {
            let index = parse_count(text).and_then(|n| usize::try_from(n).ok());
            if index.is_none() {
                log::warn!("malformed {MODEL_INDEX_KEY} {text:?}");
            }
            index
        });
        let number = |key: &str, default: f32| match field(key) {
            None => default,
            Some(text) => match text.parse::<f32>() {
                Ok(value) if value.is_finite() => value,
                _ => {
                    log::warn!("malformed {key} {text:?}; using {default}");
                    default
                }
            },
        };

        Self {
            global_generation,
            model_index,
            fitness: number(FITNESS_KEY, DEFAULT_FITNESS),
            learning_rate: number(LEARNING_RATE_KEY, DEFAULT_LEARNING_RATE),
            noise: number(NOISE_KEY, DEFAULT_NOISE),
            weights: field(WEIGHTS_KEY).map(str::to_owned),
        }
    }
}

/// Parses a non-negative integer, accepting integral floats like `"3.0"`.
#[expect(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn parse_count(text: &str) -> Option<u64> {
    if let Ok(n) = text.parse::<u64>() {
        return Some(n);
    }
    let value = text.parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u64::MAX as f64)
        .then_some(value as u64)
}

/// Persistent storage for checkpoint rows and weight files.
///
/// Every method is best effort from the trainer's point of view: errors are
/// logged and training continues.
pub trait CheckpointStore {
    type Error: fmt::Display;

    /// Returns every stored row in the order it was written.
    fn load_rows(&mut self) -> Result<Vec<RawRow>, Self::Error>;

    fn save_record(&mut self, record: &CheckpointRecord) -> Result<(), Self::Error>;

    /// Returns `Ok(None)` when no file with that name exists.
    fn load_weight_file(&mut self, name: &str) -> Result<Option<String>, Self::Error>;

    fn save_weight_file(&mut self, name: &str, contents: &str) -> Result<(), Self::Error>;
}

/// In-memory store, used when nothing should touch the disk.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    pub rows: Vec<RawRow>,
    pub weight_files: BTreeMap<String, String>,
}

impl CheckpointStore for MemoryStore {
    type Error = Infallible;

    fn load_rows(&mut self) -> Result<Vec<RawRow>, Self::Error> {
        Ok(self.rows.clone())
    }

    fn save_record(&mut self, record: &CheckpointRecord) -> Result<(), Self::Error> {
        self.rows.push(record.to_row());
        Ok(())
    }

    fn load_weight_file(&mut self, name: &str) -> Result<Option<String>, Self::Error> {
        Ok(self.weight_files.get(name).cloned())
    }

    fn save_weight_file(&mut self, name: &str, contents: &str) -> Result<(), Self::Error> {
        self.weight_files.insert(name.to_owned(), contents.to_owned());
        Ok(())
    }
}
