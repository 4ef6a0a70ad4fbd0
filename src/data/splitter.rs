// ============================================================
// Layer 4 — Train/Test Splitter
// ============================================================
// Shuffles rendered image names with a seeded RNG and splits
// them into a training set and a held-out set.
//
// The held-out share is rounded UP, so with the default 0.75
// training fraction 10 items split 7 / 3. The same seed always
// gives the same split.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Shuffle `samples` with `seed` and split into (train, held_out).
pub fn split_train_test<T>(mut samples: Vec<T>, train_fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    samples.shuffle(&mut rng);

    let total = samples.len();
    let held_out = ((total as f64) * (1.0 - train_fraction)).ceil() as usize;
    let split_at = total.saturating_sub(held_out.min(total));

    let held = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} held out",
        samples.len(),
        held.len(),
    );

    (samples, held)
}
