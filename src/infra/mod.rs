// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns that don't belong in any one layer:
//
//   metrics.rs         Scalar telemetry
//                      ScalarSink implementations: a CSV file
//                      under the run's log directory, and an
//                      in-memory sink. Also writes the resolved
//                      run configuration as JSON.
//
//   backbone_store.rs  Pretrained weights for the ResNet trunk
//                      Reads torchvision .pt/.pth state dicts
//                      through burn-import, or Burn records
//                      through CompactRecorder.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Records)

/// Scalar telemetry sinks and run config persistence
pub mod metrics;

/// Pretrained backbone loading
pub mod backbone_store;
