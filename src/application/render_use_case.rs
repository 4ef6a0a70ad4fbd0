// ============================================================
// Layer 2 — RenderUseCase
// ============================================================
// Builds the image dataset the trainers read:
//
//   Step 1: Skip if the output directory already exists
//   Step 2: Load the split manifest        (Layer 4 - data)
//   Step 3: Open the event tensor source   (Layer 4 - data)
//   Step 4: Render one PNG per sample      (Layer 4 - data)
//
// Rendering is all-or-nothing per directory: an existing output
// directory is taken as a finished dataset and left untouched.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{manifest::Manifest, render::render_manifest};
use crate::domain::traits::EventTensorSource;

// ─── Render Configuration ────────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// JSON manifest with train / validation / test intervals
    pub manifest: String,
    /// Directory holding one `{id}.h5` per sample
    pub events_dir: String,
    /// Where the `{id}&{code}.png` images are written
    pub out_dir: String,
    /// Duration of one event frame in milliseconds
    pub frame_ms: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            manifest: "sets.json".to_string(),
            events_dir: "roi_mouth".to_string(),
            out_dir: "samples".to_string(),
            frame_ms: 10.0,
        }
    }
}

// ─── RenderUseCase ───────────────────────────────────────────────────────────
pub struct RenderUseCase {
    config: RenderConfig,
}

impl RenderUseCase {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Render from HDF5 event files. Returns the number of images written.
    #[cfg(feature = "hdf5")]
    pub fn execute(&self) -> Result<usize> {
        let source = crate::data::render::H5EventSource::new(&self.config.events_dir);
        self.execute_with(&source)
    }

    #[cfg(not(feature = "hdf5"))]
    pub fn execute(&self) -> Result<usize> {
        anyhow::bail!(
            "cannot read '{}': this build has no HDF5 support (rebuild with `--features hdf5`)",
            self.config.events_dir
        )
    }

    /// Render using any event source.
    pub fn execute_with(&self, source: &dyn EventTensorSource) -> Result<usize> {
        let cfg = &self.config;
        let out_dir = Path::new(&cfg.out_dir);

        // ── Step 1: Existing output means the dataset is already built ───────
        if out_dir.exists() {
            tracing::info!("'{}' already exists, skipping rendering", out_dir.display());
            return Ok(0);
        }

        // ── Step 2: Load the manifest ─────────────────────────────────────────
        let manifest = Manifest::load(&cfg.manifest)?;

        // ── Steps 3-4: Render every sample of every split ─────────────────────
        let written = render_manifest(&manifest, source, out_dir, cfg.frame_ms)?;
        tracing::info!("Rendered {} images into '{}'", written, out_dir.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::fs;

    struct Ramp;

    impl EventTensorSource for Ramp {
        fn frame_activation(&self, sample_id: &str) -> Result<Vec<f32>> {
            if sample_id == "broken" {
                return Err(anyhow!("no events"));
            }
            Ok((0..40).map(|i| i as f32).collect())
        }
    }

    fn config(dir: &Path, manifest: &str) -> RenderConfig {
        let manifest_path = dir.join("sets.json");
        fs::write(&manifest_path, manifest).unwrap();
        RenderConfig {
            manifest: manifest_path.to_string_lossy().into_owned(),
            out_dir: dir.join("samples").to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn test_renders_every_split() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(
            dir.path(),
            r#"{"train": {"a": [1.2, 3.9]}, "validation": {"b": [-1, -1]}, "test": {"c": [0.1, 0.3]}}"#,
        );
        let written = RenderUseCase::new(cfg.clone()).execute_with(&Ramp).unwrap();
        assert_eq!(written, 3);

        let mut names: Vec<String> = fs::read_dir(&cfg.out_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["a&13.png", "b&no.png", "c&00.png"]);
    }

    #[test]
    fn test_existing_output_dir_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), r#"{"train": {"a": [1, 2]}}"#);
        fs::create_dir_all(&cfg.out_dir).unwrap();
        assert_eq!(RenderUseCase::new(cfg).execute_with(&Ramp).unwrap(), 0);
    }

    #[test]
    fn test_source_error_names_the_sample() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path(), r#"{"train": {"broken": [1, 2]}}"#);
        let err = RenderUseCase::new(cfg).execute_with(&Ramp).unwrap_err();
        assert!(format!("{err:#}").contains("broken"));
    }
}
