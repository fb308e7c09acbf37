//! File-backed checkpoint storage.
//!
//! Checkpoint rows are appended to a JSON-lines file, one object per line.
//! Values may be strings or numbers; both are read back as text so the
//! trainer's lenient parsing applies. Weight files live in a separate
//! directory.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufRead as _, BufReader, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;
use trestle_training::{CheckpointRecord, CheckpointStore, RawRow};

use crate::util;

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    rows_path: PathBuf,
    weights_dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(rows_path: impl Into<PathBuf>, weights_dir: impl Into<PathBuf>) -> Self {
        Self {
            rows_path: rows_path.into(),
            weights_dir: weights_dir.into(),
        }
    }

    pub fn rows_path(&self) -> &Path {
        &self.rows_path
    }

    /// Removes the rows file and every weight file in the weights directory.
    ///
    /// Other files in the weights directory are left alone. Returns the number
    /// of weight files removed.
    pub fn clear(&self) -> anyhow::Result<usize> {
        match fs::remove_file(&self.rows_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to remove checkpoint file: {}", self.rows_path.display())
                });
            }
        }

        let entries = match fs::read_dir(&self.weights_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read directory: {}", self.weights_dir.display())
                });
            }
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("Failed to read directory: {}", self.weights_dir.display())
            })?;
            let path = entry.path();
            if !path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(is_weight_file_name)
            {
                continue;
            }
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove weight file: {}", path.display()))?;
            removed += 1;
        }
        Ok(removed)
    }

    fn parse_line(line: &str) -> Option<RawRow> {
        let object = match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(line)
        {
            Ok(object) => object,
            Err(e) => {
                log::warn!("skipping malformed checkpoint line: {e}");
                return None;
            }
        };
        Some(
            object
                .into_iter()
                .filter_map(|(key, value)| {
                    let text = match value {
                        serde_json::Value::Null => return None,
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    Some((key, text))
                })
                .collect(),
        )
    }
}

/// Matches names of the form `model_{index}_gen_{generation}.txt`.
fn is_weight_file_name(name: &str) -> bool {
    let Some(stem) = name
        .strip_prefix("model_")
        .and_then(|rest| rest.strip_suffix(".txt"))
    else {
        return false;
    };
    stem.split_once("_gen_").is_some_and(|(index, generation)| {
        [index, generation]
            .iter()
            .all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()))
    })
}

impl CheckpointStore for FileCheckpointStore {
    type Error = anyhow::Error;

    fn load_rows(&mut self) -> anyhow::Result<Vec<RawRow>> {
        let file = match File::open(&self.rows_path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to open checkpoint file: {}", self.rows_path.display())
                });
            }
        };
        let mut rows = vec![];
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| {
                format!("Failed to read checkpoint file: {}", self.rows_path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            rows.extend(Self::parse_line(&line));
        }
        Ok(rows)
    }

    fn save_record(&mut self, record: &CheckpointRecord) -> anyhow::Result<()> {
        util::create_parent_dir(&self.rows_path)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.rows_path)
            .with_context(|| {
                format!("Failed to open checkpoint file: {}", self.rows_path.display())
            })?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}").with_context(|| {
            format!("Failed to append to checkpoint file: {}", self.rows_path.display())
        })?;
        Ok(())
    }

    fn load_weight_file(&mut self, name: &str) -> anyhow::Result<Option<String>> {
        let path = self.weights_dir.join(name);
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read weight file: {}", path.display()))
            }
        }
    }

    fn save_weight_file(&mut self, name: &str, contents: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.weights_dir).with_context(|| {
            format!("Failed to create directory: {}", self.weights_dir.display())
        })?;
        let path = self.weights_dir.join(name);
        fs::write(&path, contents)
            .with_context(|| format!("Failed to write weight file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    fn record(model_index: usize, fitness: f32) -> CheckpointRecord {
        CheckpointRecord {
            global_generation: 4,
            model_index,
            fitness,
            learning_rate: 0.0005,
            noise: 0.25,
            weights: "AACAPw==".to_owned(),
        }
    }

    #[test]
    fn test_missing_file_loads_no_rows() {
        let dir = tempdir().unwrap();
        let mut store = FileCheckpointStore::new(dir.path().join("rows.jsonl"), dir.path());
        assert!(store.load_rows().unwrap().is_empty());
    }

    #[test]
    fn test_saved_records_load_back_in_order() {
        let dir = tempdir().unwrap();
        let mut store = FileCheckpointStore::new(
            dir.path().join("ckpt").join("rows.jsonl"),
            dir.path().join("weights"),
        );
        store.save_record(&record(0, 1.5)).unwrap();
        store.save_record(&record(1, -2.0)).unwrap();

        let rows = store.load_rows().unwrap();
        assert_eq!(rows.len(), 2);
        let parsed = rows
            .iter()
            .map(|row| CheckpointRecord::from_row(row).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(parsed, [record(0, 1.5), record(1, -2.0)]);
    }

    #[test]
    fn test_load_tolerates_bad_lines_and_string_values() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rows.jsonl");
        fs::write(
            &path,
            "{\"modelIndex\": \"2\", \"fitness\": \"3.5\"}\n\nnot json\n{\"modelIndex\": 5, \"weights\": null}\n",
        )
        .unwrap();
        let mut store = FileCheckpointStore::new(&path, dir.path());
        let rows = store.load_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["modelIndex"], "2");
        assert_eq!(rows[0]["fitness"], "3.5");
        assert_eq!(rows[1]["modelIndex"], "5");
        assert!(!rows[1].contains_key("weights"));
    }

    #[test]
    fn test_weight_files() {
        let dir = tempdir().unwrap();
        let mut store =
            FileCheckpointStore::new(dir.path().join("rows.jsonl"), dir.path().join("w"));
        assert_eq!(store.load_weight_file("model_0_gen_0.txt").unwrap(), None);
        store
            .save_weight_file("model_0_gen_0.txt", "AACAPw==")
            .unwrap();
        assert_eq!(
            store.load_weight_file("model_0_gen_0.txt").unwrap().as_deref(),
            Some("AACAPw==")
        );
    }

    #[test]
    fn test_weight_file_names() {
        assert!(is_weight_file_name("model_0_gen_0.txt"));
        assert!(is_weight_file_name("model_12_gen_305.txt"));
        assert!(!is_weight_file_name("model_a_gen_1.txt"));
        assert!(!is_weight_file_name("model_1_gen_.txt"));
        assert!(!is_weight_file_name("notes.txt"));
    }

    #[test]
    fn test_clear_removes_rows_and_weights_only() {
        let dir = tempdir().unwrap();
        let weights = dir.path().join("w");
        let mut store = FileCheckpointStore::new(dir.path().join("rows.jsonl"), &weights);
        store.save_record(&record(0, 1.0)).unwrap();
        store.save_weight_file("model_0_gen_4.txt", "AACAPw==").unwrap();
        store.save_weight_file("model_1_gen_4.txt", "AACAPw==").unwrap();
        fs::write(weights.join("notes.txt"), "keep").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.load_rows().unwrap().is_empty());
        assert_eq!(store.load_weight_file("model_0_gen_4.txt").unwrap(), None);
        assert!(weights.join("notes.txt").exists());

        // nothing left to clear
        assert_eq!(store.clear().unwrap(), 0);
    }
}
