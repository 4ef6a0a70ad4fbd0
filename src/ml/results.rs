// ============================================================
// Layer 5 — Prediction Tables and Loss Accumulators
// ============================================================
// ResultsTable collects (actual, prediction, corrected) rows.
// Accuracy is always computed over every row in the table, so it
// is cumulative over all batches appended so far, not an average
// of per-batch accuracies.
//
// How long a table lives is chosen by AccumulationScope:
//   Run   → one table per split for the whole run (tables keep
//           growing across epochs)
//   Epoch → a fresh table per split every epoch

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ml::ctc::correct_prediction;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AccumulationScope {
    #[default]
    Run,
    Epoch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRow {
    pub actual: String,
    pub prediction: String,
    pub prediction_corrected: String,
}

impl ResultRow {
    pub fn is_correct(&self) -> bool {
        self.actual == self.prediction_corrected
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResultsTable {
    rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch of raw predictions, cleaning each with `blank`.
    pub fn extend_batch<S: AsRef<str>>(&mut self, actual: &[S], predictions: Vec<String>, blank: char) {
        self.rows.extend(actual.iter().zip(predictions).map(|(a, p)| ResultRow {
            actual: a.as_ref().to_string(),
            prediction_corrected: correct_prediction(&p, blank),
            prediction: p,
        }));
    }

    /// Fraction of rows whose corrected prediction equals the label.
    /// `None` while the table is empty.
    pub fn accuracy(&self) -> Option<f64> {
        if self.rows.is_empty() {
            return None;
        }
        let correct = self.rows.iter().filter(|r| r.is_correct()).count();
        Some(correct as f64 / self.rows.len() as f64)
    }

    pub fn mistakes(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| !r.is_correct())
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Running mean over finite batch losses.
#[derive(Debug, Clone, Default)]
pub struct LossAccumulator {
    sum: f64,
    finite: usize,
    skipped: usize,
}

impl LossAccumulator {
    /// Record a batch loss. Returns false (and ignores it) when the
    /// loss is NaN or infinite.
    pub fn record(&mut self, loss: f64) -> bool {
        if loss.is_finite() {
            self.sum += loss;
            self.finite += 1;
            true
        } else {
            self.skipped += 1;
            false
        }
    }

    /// Mean over finite losses; NaN when there were none.
    pub fn mean(&self) -> f64 {
        if self.finite == 0 {
            f64::NAN
        } else {
            self.sum / self.finite as f64
        }
    }

    pub fn finite_batches(&self) -> usize {
        self.finite
    }

    pub fn skipped_batches(&self) -> usize {
        self.skipped
    }
}

/// Accuracy formatted like the console expects: `0.8125` or `n/a`.
pub struct DisplayAccuracy(pub Option<f64>);

impl fmt::Display for DisplayAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(acc) => write!(f, "{acc:.4}"),
            None => f.write_str("n/a"),
        }
    }
}
