// ============================================================
// Layer 4 — Split Manifest
// ============================================================
// Reads the JSON file that partitions sample ids into splits:
//
//   {
//     "train":      { "spk01_t03": [1.2, 4.8], "spk01_t04": [-1, -1] },
//     "validation": { ... },
//     "test":       { ... }
//   }
//
// Each id refers to one `{id}.h5` event tensor; the interval is
// the ground-truth event segment in seconds.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt, fs, path::Path};

use crate::domain::label::EventLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub train: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub validation: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub test: BTreeMap<String, [f64; 2]>,
}

/// One manifest row with its interval already interpreted
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry<'a> {
    pub split: Split,
    pub sample_id: &'a str,
    pub label: EventLabel,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("Cannot read manifest '{}'", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&json)
            .with_context(|| format!("Malformed manifest '{}'", path.display()))?;
        tracing::info!(
            "Manifest: {} train, {} validation, {} test",
            manifest.train.len(),
            manifest.validation.len(),
            manifest.test.len()
        );
        Ok(manifest)
    }

    /// All entries in train → validation → test order
    pub fn entries(&self) -> impl Iterator<Item = ManifestEntry<'_>> {
        tagged(Split::Train, &self.train)
            .chain(tagged(Split::Validation, &self.validation))
            .chain(tagged(Split::Test, &self.test))
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn tagged(
    split: Split,
    map: &BTreeMap<String, [f64; 2]>,
) -> impl Iterator<Item = ManifestEntry<'_>> + '_ {
    map.iter().map(move |(id, interval)| ManifestEntry {
        split,
        sample_id: id.as_str(),
        label: EventLabel::from_interval(*interval),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "train": { "a": [1.0, 4.0], "b": [-1, -1] },
        "validation": { "c": [2.5, 3.5] },
        "test": { "d": [-1, -1] }
    }"#;

    #[test]
    fn test_parses_all_splits() {
        let m: Manifest = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(m.len(), 4);
        let entries: Vec<_> = m.entries().collect();
        assert_eq!(entries[0].split, Split::Train);
        assert_eq!(entries[0].label.code(), "14");
        assert_eq!(entries[1].label, EventLabel::NoEvent);
        assert_eq!(entries[2].split, Split::Validation);
        assert_eq!(entries[3].split, Split::Test);
    }

    #[test]
    fn test_missing_split_defaults_to_empty() {
        let m: Manifest = serde_json::from_str(r#"{ "train": { "a": [0, 1] } }"#).unwrap();
        assert_eq!(m.len(), 1);
        assert!(m.test.is_empty());
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Manifest::load("/definitely/not/here/sets.json").unwrap_err();
        assert!(err.to_string().contains("Cannot read manifest"));
    }
}
