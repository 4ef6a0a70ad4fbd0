// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// Seams between the pipeline and the outside world.
//
//   EventTensorSource → where per-sample event tensors come from
//                       (HDF5 files in production)
//   ScalarSink        → where epoch metrics go
//                       (CSV file in production, memory in tests)

use anyhow::Result;

// ─── EventTensorSource ───────────────────────────────────────────────────────
/// Anything that can produce the per-frame activation series of a sample.
///
/// Implementations:
///   - H5EventSource      → reads `{dir}/{id}.h5` (feature `hdf5`)
///   - MemoryEventSource  → fixed series, used by tests
pub trait EventTensorSource {
    /// Return one activation value per time frame for `sample_id`.
    fn frame_activation(&self, sample_id: &str) -> Result<Vec<f32>>;
}

// ─── ScalarSink ──────────────────────────────────────────────────────────────
/// A telemetry sink accepting named scalars tagged with a step.
///
/// Implementations:
///   - ScalarCsvLogger → appends rows to `{log_dir}/scalars.csv`
///   - MemorySink      → keeps rows in a Vec
pub trait ScalarSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}
