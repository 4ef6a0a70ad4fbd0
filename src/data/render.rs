// ============================================================
// Layer 4 — Activation Plot Renderer
// ============================================================
// Turns one event tensor into the image the CRNN reads.
//
//   event tensor [frames, ...]      (HDF5, one file per sample)
//       │  sum every axis but the first
//       ▼
//   activation series [frames]
//       │  plot against frame centre times
//       ▼
//   200×50 PNG, "{id}&{code}.png"
//
// Frame i covers [i·step, (i+1)·step) seconds and is plotted at
// its centre step/2 + i·step. Segment bounds, when present, are
// drawn as vertical black lines.

use anyhow::{anyhow, bail, Context, Result};
use ndarray::{ArrayViewD, Axis};
use plotters::prelude::*;
use std::{fs, path::Path};

use crate::data::manifest::Manifest;
use crate::domain::traits::EventTensorSource;

/// Rendered plot size in pixels (width, height)
pub const PLOT_SIZE: (u32, u32) = (200, 50);

/// Reduce an event tensor to one activation value per frame.
pub fn frame_activation(events: ArrayViewD<'_, f32>) -> Vec<f32> {
    if events.ndim() == 0 {
        return vec![events.sum()];
    }
    events.axis_iter(Axis(0)).map(|frame| frame.sum()).collect()
}

/// Centre time of every frame, in seconds.
pub fn frame_times(frames: usize, frame_ms: f32) -> Vec<f32> {
    let step = frame_ms * 1e-3;
    (0..frames).map(|i| step / 2.0 + step * i as f32).collect()
}

/// Draw the activation series to a PNG at `path`.
pub fn render_activation_plot(
    path: &Path,
    activation: &[f32],
    frame_ms: f32,
    segment: Option<(f64, f64)>,
) -> Result<()> {
    if activation.is_empty() {
        bail!("cannot plot an empty activation series for '{}'", path.display());
    }

    let times = frame_times(activation.len(), frame_ms);
    let x0 = times[0];
    let mut x1 = times[times.len() - 1];
    if x1 <= x0 {
        x1 = x0 + frame_ms * 1e-3;
    }
    let max_y = activation.iter().copied().fold(0.0f32, f32::max).max(1e-6);

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("plot fill: {e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .margin(2)
        .build_cartesian_2d(x0..x1, 0.0f32..max_y)
        .map_err(|e| anyhow!("plot axes: {e}"))?;

    chart
        .draw_series(LineSeries::new(
            times.iter().copied().zip(activation.iter().copied()),
            &BLUE,
        ))
        .map_err(|e| anyhow!("plot series: {e}"))?;

    if let Some((start, end)) = segment {
        if start >= 0.0 && end >= 0.0 {
            for x in [start as f32, end as f32] {
                chart
                    .draw_series(LineSeries::new([(x, 0.0), (x, max_y)], &BLACK))
                    .map_err(|e| anyhow!("plot segment: {e}"))?;
            }
        }
    }

    root.present().map_err(|e| anyhow!("plot write: {e}"))?;
    Ok(())
}

/// Render every manifest entry into `out_dir`. Returns the image count.
pub fn render_manifest(
    manifest: &Manifest,
    source: &dyn EventTensorSource,
    out_dir: &Path,
    frame_ms: f32,
) -> Result<usize> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Cannot create '{}'", out_dir.display()))?;

    let mut written = 0usize;
    for entry in manifest.entries() {
        let activation = source
            .frame_activation(entry.sample_id)
            .with_context(|| format!("Cannot load events for '{}'", entry.sample_id))?;
        let path = out_dir.join(entry.label.file_name(entry.sample_id));
        render_activation_plot(&path, &activation, frame_ms, entry.label.segment())?;
        tracing::debug!("[{}] rendered '{}'", entry.split, path.display());
        written += 1;
    }
    Ok(written)
}

// ─── HDF5 source ─────────────────────────────────────────────────────────────
/// Reads `{dir}/{id}.h5` and reduces its first dataset.
#[cfg(feature = "hdf5")]
pub struct H5EventSource {
    dir: std::path::PathBuf,
}

#[cfg(feature = "hdf5")]
impl H5EventSource {
    pub fn new(dir: impl Into<std::path::PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[cfg(feature = "hdf5")]
impl EventTensorSource for H5EventSource {
    fn frame_activation(&self, sample_id: &str) -> Result<Vec<f32>> {
        let path = self.dir.join(format!("{sample_id}.h5"));
        let file = hdf5::File::open(&path)
            .with_context(|| format!("Cannot open '{}'", path.display()))?;
        let key = file
            .member_names()?
            .into_iter()
            .next()
            .with_context(|| format!("'{}' holds no dataset", path.display()))?;
        let events = file.dataset(&key)?.read_dyn::<f32>()?;
        Ok(frame_activation(events.view()))
    }
}
