// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// Model code, losses and training loops live here, together
// with the only Burn tensor code outside the data batchers.
//
// What's in this layer:
//
//   init.rs          Xavier / constant-bias / N(1, 0.02) BN init
//   backbone.rs      ResNet-50 trunk up to layer3
//   model.rs         CRNN: trunk → conv head → BiLSTM/BiGRU → logits
//   classifier.rs    trunk → pool → linear, for the multi-head trainer
//
//   ctc.rs           label encoding, greedy decoding, cleanup,
//                    differentiable CTC loss
//   clip.rs          global gradient-norm clipping
//   scheduler.rs     reduce-on-plateau learning rate
//   results.rs       prediction tables, cumulative accuracy,
//                    finite-loss accumulator
//
//   trainer.rs       CTC training state machine + final test pass
//   heads_trainer.rs multi-head cross-entropy trainer
//
// Reference: Burn Book §3 (Building Blocks)
//            Burn Book §5 (Training)
//            Shi et al. (2016) CRNN
//            Graves et al. (2006) CTC

pub mod init;

/// ResNet-50 trunk through layer3
pub mod backbone;

/// CRNN sequence reader
pub mod model;

/// Pooled image classifier
pub mod classifier;

/// CTC codec and loss
pub mod ctc;

pub mod clip;

pub mod scheduler;

/// Result tables and loss accumulation
pub mod results;

/// CTC training loop with validation and final test
pub mod trainer;

/// Multi-head training loop
pub mod heads_trainer;
