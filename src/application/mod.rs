// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal each:
//
//   render_use_case  manifest + event tensors → PNG dataset
//   train_use_case   PNG dataset → CRNN trained with CTC
//   heads_use_case   PNG dataset → multi-head frame classifier
//
// Rules for this layer:
//   - No ML math or model code here
//   - No argument parsing here (that's Layer 1)
//   - Only workflow coordination and run configuration
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

/// Dataset rendering workflow
pub mod render_use_case;

/// CTC training workflow
pub mod train_use_case;

/// Multi-head training workflow
pub mod heads_use_case;
