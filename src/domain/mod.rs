// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust types describing what the system is about:
// characters, labels, and the seams to the outside world.
//
// Rules for this layer:
//   - NO Burn framework types
//   - NO file I/O
//   - Only plain structs, enums, and traits

/// The CTC character set with its reserved blank
pub mod vocabulary;

/// Event labels, label codes and image file names
pub mod label;

/// Core abstractions (traits) that other layers implement
pub mod traits;
