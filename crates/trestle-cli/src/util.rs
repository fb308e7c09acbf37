use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use serde::{Serialize, de::DeserializeOwned};

use crate::schema::policy_model::PolicyModel;

/// Where a command's JSON result goes: the given file, or stdout.
struct JsonSink {
    writer: Box<dyn Write>,
    label: String,
}

impl JsonSink {
    fn create(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self {
                writer: Box::new(io::stdout().lock()),
                label: "stdout".to_owned(),
            });
        };
        create_parent_dir(path)?;
        let file = File::create(path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Self {
            writer: Box::new(BufWriter::new(file)),
            label: path.display().to_string(),
        })
    }

    fn write<T>(mut self, value: &T) -> anyhow::Result<()>
    where
        T: Serialize + ?Sized,
    {
        serde_json::to_writer_pretty(&mut self.writer, value)
            .with_context(|| format!("Failed to write JSON to {}", self.label))?;
        writeln!(self.writer)
            .and_then(|()| self.writer.flush())
            .with_context(|| format!("Failed to finish writing {}", self.label))
    }
}

/// Pretty-prints `value` as JSON into `path`, or to stdout if `path` is `None`.
pub fn save_json<T>(value: &T, path: Option<&Path>) -> anyhow::Result<()>
where
    T: Serialize + ?Sized,
{
    JsonSink::create(path)?.write(value)
}

/// Creates the directory `path` will live in, if it has one.
pub fn create_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {file_kind} file: {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("Invalid {file_kind} JSON in {}", path.display()))
}

pub fn read_policy_model_file<P>(path: P) -> anyhow::Result<PolicyModel>
where
    P: AsRef<Path>,
{
    read_json_file("policy model", path)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_save_json_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");
        let value = BTreeMap::from([("a", 1), ("b", 2)]);
        save_json(&value, Some(&path)).unwrap();

        let read: BTreeMap<String, i32> = read_json_file("test", &path).unwrap();
        assert_eq!(read["a"], 1);
        assert_eq!(read["b"], 2);
        assert!(fs::read_to_string(&path).unwrap().ends_with("}\n"));
    }

    #[test]
    fn test_read_errors_mention_kind() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        let err = read_json_file::<i32, _>("policy model", &missing).unwrap_err();
        assert!(err.to_string().contains("policy model"));

        let broken = dir.path().join("broken.json");
        fs::write(&broken, "{").unwrap();
        let err = read_json_file::<i32, _>("scene", &broken).unwrap_err();
        assert!(err.to_string().contains("Invalid scene JSON"));
    }
}
