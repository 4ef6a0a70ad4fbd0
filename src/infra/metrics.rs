// ============================================================
// Layer 6 — Scalar Telemetry
// ============================================================
// Records training scalars (loss, accuracy, learning rate) to a
// CSV file, one row per (tag, step):
//
//   tag,step,value
//   train_loss,1,1.873214
//   val_loss,1,1.912001
//   train_acc,1,0.125000
//   ...
//
// Long format keeps the file valid whatever tags a trainer emits;
// pivot by tag to plot learning curves.
//
// Output file: {log_dir}/scalars.csv
//
// Also writes the resolved run configuration next to it so a
// run directory is self-describing.
//
// Reference: Rust Book §12 (I/O and File Handling)

use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::traits::ScalarSink;

pub const SCALARS_FILE: &str = "scalars.csv";
pub const CONFIG_FILE: &str = "train_config.json";

/// Appends scalars to `{dir}/scalars.csv`.
pub struct ScalarCsvLogger {
    csv_path: PathBuf,
}

impl ScalarCsvLogger {
    /// Create the log directory and write the CSV header if the file is new.
    /// An existing file is appended to.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;

        let csv_path = dir.join(SCALARS_FILE);
        if !csv_path.exists() {
            let mut f = fs::File::create(&csv_path)
                .with_context(|| format!("Cannot create '{}'", csv_path.display()))?;
            writeln!(f, "tag,step,value")?;
            tracing::debug!("Created scalars CSV: '{}'", csv_path.display());
        }

        Ok(Self { csv_path })
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl ScalarSink for ScalarCsvLogger {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let mut f = OpenOptions::new()
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;
        writeln!(f, "{tag},{step},{value:.6}")?;
        Ok(())
    }
}

/// Keeps every scalar in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub rows: Vec<(String, usize, f64)>,
}

impl MemorySink {
    /// Values recorded under `tag`, in step order of arrival.
    pub fn values(&self, tag: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, _, v)| *v)
            .collect()
    }
}

impl ScalarSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        self.rows.push((tag.to_string(), step, value));
        Ok(())
    }
}

/// Write `cfg` as pretty JSON to `{dir}/train_config.json`.
pub fn save_config<T: Serialize>(dir: impl AsRef<Path>, cfg: &T) -> Result<PathBuf> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)
        .with_context(|| format!("Cannot create log directory '{}'", dir.display()))?;
    let path = dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(cfg)?;
    fs::write(&path, json).with_context(|| format!("Cannot write config to '{}'", path.display()))?;
    tracing::debug!("Saved run config to '{}'", path.display());
    Ok(path)
}
