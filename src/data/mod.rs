// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from the split manifest to device-ready batches:
//
//   sets.json + {id}.h5
//       │
//       ▼
//   Manifest / renderer   → one PNG plot per sample, "{id}&{code}.png"
//       │
//       ▼
//   splitter              → seeded train / held-out split of file names
//       │
//       ▼
//   EventImageDataset     → Burn Dataset: decode + transform + label
//       │
//       ▼
//   CrnnBatcher / HeadsBatcher → Burn Batcher: stacked tensors
//       │
//       ▼
//   DataLoader            → feeds batches to the training loops

/// JSON split manifest
pub mod manifest;

/// Activation series extraction and PNG plotting
pub mod render;

/// Resize / flip / normalise pipeline
pub mod transform;

/// Burn Dataset over rendered images
pub mod dataset;

/// Burn Batchers for the CTC and multi-head trainers
pub mod batcher;

/// Seeded train / held-out split
pub mod splitter;
