// ============================================================
// Layer 5 — CTC Codec and Loss
// ============================================================
// Connects label strings with the CRNN's per-frame logits.
//
//   encode_batch   labels  → flat target indices + lengths
//   ctc_loss       logits  → negative log-likelihood (autodiff)
//   greedy_decode  logits  → one char per frame ("33-77-")
//   correct_prediction     → "37"
//
// Cleanup order: split on blank FIRST, then collapse repeats
// inside each segment. "a-ab" therefore becomes "aab", not the
// "ab" standard CTC collapsing would give. Kept as-is so
// accuracy numbers stay comparable with earlier runs.

use anyhow::{anyhow, bail, Result};
use burn::{
    prelude::*,
    tensor::activation::softmax,
};

use crate::domain::vocabulary::Vocabulary;

/// Log-space stand-in for log(0); keeps the recursion finite.
const LOG_ZERO: f32 = -1.0e5;

// ─── Encoding ────────────────────────────────────────────────────────────────

/// Flattened CTC targets for one batch.
/// Invariant: `lengths.iter().sum() == targets.len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetEncoding {
    pub targets: Vec<usize>,
    pub lengths: Vec<usize>,
}

impl TargetEncoding {
    /// Split the flat targets back into per-sample strings.
    pub fn decode(&self, vocab: &Vocabulary) -> Result<Vec<String>> {
        let mut offset = 0usize;
        let mut out = Vec::with_capacity(self.lengths.len());
        for &len in &self.lengths {
            let Some(slice) = self.targets.get(offset..offset + len) else {
                bail!("target lengths exceed the {} encoded indices", self.targets.len());
            };
            out.push(
                slice
                    .iter()
                    .map(|&i| vocab.char_at(i).ok_or_else(|| anyhow!("index {i} outside vocabulary")))
                    .collect::<Result<String>>()?,
            );
            offset += len;
        }
        Ok(out)
    }
}

/// Concatenate every label's character indices, in batch order.
pub fn encode_batch<S: AsRef<str>>(labels: &[S], vocab: &Vocabulary) -> Result<TargetEncoding> {
    let mut targets = Vec::new();
    let mut lengths = Vec::with_capacity(labels.len());
    for label in labels {
        let label = label.as_ref();
        let before = targets.len();
        for c in label.chars() {
            let idx = vocab
                .index_of(c)
                .ok_or_else(|| anyhow!("character '{c}' of label '{label}' is not in the vocabulary"))?;
            targets.push(idx);
        }
        lengths.push(targets.len() - before);
    }
    Ok(TargetEncoding { targets, lengths })
}

// ─── Decoding ────────────────────────────────────────────────────────────────

/// Map per-sample frame indices to raw strings, one char per frame.
pub fn decode_indices(frames: &[Vec<usize>], vocab: &Vocabulary) -> Vec<String> {
    frames
        .iter()
        .map(|sample| {
            sample
                .iter()
                .map(|&i| vocab.char_at(i).unwrap_or(vocab.blank()))
                .collect()
        })
        .collect()
}

/// Greedy decoding of time-major logits [T, N, C].
pub fn greedy_decode<B: Backend>(logits: Tensor<B, 3>, vocab: &Vocabulary) -> Result<Vec<String>> {
    let [steps, batch, _] = logits.dims();
    let tokens = softmax(logits, 2).argmax(2); // [T, N, 1]
    let flat: Vec<i64> = tokens
        .into_data()
        .convert::<i64>()
        .to_vec()
        .map_err(|e| anyhow!("argmax readback: {e:?}"))?;

    let frames: Vec<Vec<usize>> = (0..batch)
        .map(|n| (0..steps).map(|t| flat[t * batch + n] as usize).collect())
        .collect();
    Ok(decode_indices(&frames, vocab))
}

/// Keep the first char of every run of identical chars.
pub fn remove_duplicates(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev = None;
    for c in text.chars() {
        if prev != Some(c) {
            out.push(c);
        }
        prev = Some(c);
    }
    out
}

/// Split on blank, collapse each segment, concatenate.
pub fn correct_prediction(word: &str, blank: char) -> String {
    word.split(blank).map(remove_duplicates).collect()
}

// ─── Loss ────────────────────────────────────────────────────────────────────

/// CTC negative log-likelihood, blank = 0, every input length = T.
///
/// `log_probs` is [T, N, C] after log-softmax. Each sample's loss is
/// divided by its target length (at least 1) and the batch is averaged.
/// A target that cannot fit in T frames gives +inf.
pub fn ctc_loss<B: Backend>(log_probs: Tensor<B, 3>, encoding: &TargetEncoding) -> Tensor<B, 1> {
    let [steps, batch, classes] = log_probs.dims();
    let device = log_probs.device();

    // Extended label per sample: blank, l1, blank, l2, ..., blank
    let max_len = encoding.lengths.iter().copied().max().unwrap_or(0);
    let states = 2 * max_len + 1;

    let mut extended = vec![0i64; batch * states];
    let mut no_skip = vec![true; batch * states];
    let mut late_start = vec![false; batch * states];
    let mut ends = vec![0i64; batch * 2];
    let mut single_end = vec![false; batch * 2];
    let mut infeasible = vec![false; batch];
    let mut denominators = vec![1.0f32; batch];

    let mut offset = 0usize;
    for (n, &len) in encoding.lengths.iter().enumerate().take(batch) {
        let label = &encoding.targets[offset..offset + len];
        offset += len;

        let row = n * states;
        for (k, &c) in label.iter().enumerate() {
            extended[row + 2 * k + 1] = c as i64;
        }
        for s in 0..states {
            // s - 2 → s is allowed between two different labels only
            no_skip[row + s] = !(s % 2 == 1 && s >= 3 && extended[row + s] != extended[row + s - 2]);
            late_start[row + s] = s >= 2;
        }

        ends[2 * n] = (2 * len) as i64;
        ends[2 * n + 1] = (2 * len).saturating_sub(1) as i64;
        single_end[2 * n + 1] = len == 0;

        let repeats = label.windows(2).filter(|w| w[0] == w[1]).count();
        infeasible[n] = len + repeats > steps;
        denominators[n] = len.max(1) as f32;
    }

    let extended = Tensor::<B, 2, Int>::from_data(TensorData::new(extended, [batch, states]), &device);
    let no_skip = Tensor::<B, 2, Bool>::from_data(TensorData::new(no_skip, [batch, states]), &device);
    let late_start = Tensor::<B, 2, Bool>::from_data(TensorData::new(late_start, [batch, states]), &device);

    let emit = |t: usize| {
        log_probs
            .clone()
            .slice([t..t + 1, 0..batch, 0..classes])
            .reshape([batch, classes])
            .gather(1, extended.clone())
    };

    // alpha[n, s] = log P(prefix of extended label up to s | frames 0..=t)
    let mut alpha = emit(0).mask_fill(late_start, LOG_ZERO);
    for t in 1..steps {
        let stay = alpha.clone();
        let step = shift_states(alpha.clone(), 1);
        let skip = shift_states(alpha, 2).mask_fill(no_skip.clone(), LOG_ZERO);
        alpha = log_sum_exp3(stay, step, skip) + emit(t);
    }

    let ends = Tensor::<B, 2, Int>::from_data(TensorData::new(ends, [batch, 2]), &device);
    let single_end = Tensor::<B, 2, Bool>::from_data(TensorData::new(single_end, [batch, 2]), &device);
    let finals = alpha.gather(1, ends).mask_fill(single_end, LOG_ZERO); // [N, 2]

    let max = finals.clone().max_dim(1).detach();
    let log_likelihood = (max.clone() + (finals - max).exp().sum_dim(1).log()).reshape([batch]);

    let denominators = Tensor::<B, 1>::from_data(TensorData::new(denominators, [batch]), &device);
    let infeasible = Tensor::<B, 1, Bool>::from_data(TensorData::new(infeasible, [batch]), &device);

    log_likelihood
        .neg()
        .div(denominators)
        .mask_fill(infeasible, f32::INFINITY)
        .mean()
}

/// Shift along the state axis by `k`, filling the front with LOG_ZERO.
fn shift_states<B: Backend>(alpha: Tensor<B, 2>, k: usize) -> Tensor<B, 2> {
    let [batch, states] = alpha.dims();
    let device = alpha.device();
    if k >= states {
        return Tensor::full([batch, states], LOG_ZERO, &device);
    }
    Tensor::cat(
        vec![
            Tensor::full([batch, k], LOG_ZERO, &device),
            alpha.slice([0..batch, 0..states - k]),
        ],
        1,
    )
}

fn log_sum_exp3<B: Backend>(a: Tensor<B, 2>, b: Tensor<B, 2>, c: Tensor<B, 2>) -> Tensor<B, 2> {
    let max = a.clone().max_pair(b.clone()).max_pair(c.clone()).detach();
    let sum = (a - max.clone()).exp() + (b - max.clone()).exp() + (c - max.clone()).exp();
    max + sum.log()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{
        backend::{Autodiff, NdArray},
        tensor::activation::log_softmax,
    };

    type TestBackend = NdArray;

    fn vocab_ab() -> Vocabulary {
        Vocabulary::from_labels(["AB"]).unwrap()
    }

    fn uniform_log_probs(steps: usize, batch: usize, classes: usize) -> Tensor<TestBackend, 3> {
        log_softmax(Tensor::zeros([steps, batch, classes], &Default::default()), 2)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f32 {
        t.into_scalar()
    }

    #[test]
    fn test_remove_duplicates() {
        assert_eq!(remove_duplicates("aabbba"), "aba");
        assert_eq!(remove_duplicates(""), "");
        assert_eq!(remove_duplicates("a"), "a");
    }

    #[test]
    fn test_split_then_collapse_order() {
        assert_eq!(correct_prediction("a-ab", '-'), "aab");
        assert_eq!(correct_prediction("--33-77--", '-'), "37");
        assert_eq!(correct_prediction("", '-'), "");
    }

    #[test]
    fn test_encode_lengths_and_order() {
        let vocab = Vocabulary::from_labels(["37", "no"]).unwrap();
        let enc = encode_batch(&["37", "no", "3"], &vocab).unwrap();
        assert_eq!(enc.lengths, vec![2, 2, 1]);
        assert_eq!(enc.lengths.iter().sum::<usize>(), enc.targets.len());
        assert_eq!(enc.targets[0], vocab.index_of('3').unwrap());
        assert_eq!(enc.targets[2], vocab.index_of('n').unwrap());
    }

    #[test]
    fn test_encode_round_trip() {
        let vocab = Vocabulary::from_labels(["12", "no", "90"]).unwrap();
        let labels = vec!["12".to_string(), "no".to_string(), "90".to_string(), String::new()];
        let enc = encode_batch(&labels, &vocab).unwrap();
        assert_eq!(enc.decode(&vocab).unwrap(), labels);
        assert_eq!(enc.decode(&vocab).unwrap().concat(), labels.concat());
    }

    #[test]
    fn test_encode_unknown_char_fails() {
        let vocab = Vocabulary::from_labels(["12"]).unwrap();
        assert!(encode_batch(&["1x"], &vocab).is_err());
    }

    #[test]
    fn test_decode_then_clean_end_to_end() {
        let vocab = vocab_ab();
        // A A A - B B
        let path = [1usize, 1, 1, 0, 2, 2];
        let mut logits = vec![0.0f32; path.len() * 3];
        for (t, &c) in path.iter().enumerate() {
            logits[t * 3 + c] = 5.0;
        }
        let logits = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(logits, [path.len(), 1, 3]),
            &Default::default(),
        );

        let raw = greedy_decode(logits, &vocab).unwrap();
        assert_eq!(raw, vec!["AAA-BB".to_string()]);
        assert_eq!(correct_prediction(&raw[0], vocab.blank()), "AB");
    }

    #[test]
    fn test_greedy_decode_is_per_sample() {
        let vocab = vocab_ab();
        // T = 2, N = 2: sample 0 reads "AB", sample 1 reads "B-"
        let mut logits = vec![0.0f32; 2 * 2 * 3];
        let set = |v: &mut Vec<f32>, t: usize, n: usize, c: usize| v[(t * 2 + n) * 3 + c] = 4.0;
        set(&mut logits, 0, 0, 1);
        set(&mut logits, 1, 0, 2);
        set(&mut logits, 0, 1, 2);
        set(&mut logits, 1, 1, 0);
        let logits = Tensor::<TestBackend, 3>::from_data(
            TensorData::new(logits, [2, 2, 3]),
            &Default::default(),
        );
        assert_eq!(greedy_decode(logits, &vocab).unwrap(), vec!["AB", "B-"]);
    }

    #[test]
    fn test_ctc_single_frame() {
        let enc = TargetEncoding { targets: vec![1], lengths: vec![1] };
        let loss = scalar(ctc_loss(uniform_log_probs(1, 1, 2), &enc));
        assert!((loss - 2.0f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_ctc_sums_alignments() {
        // "A-", "-A", "AA" each 1/4
        let enc = TargetEncoding { targets: vec![1], lengths: vec![1] };
        let loss = scalar(ctc_loss(uniform_log_probs(2, 1, 2), &enc));
        assert!((loss - (-(0.75f32).ln())).abs() < 1e-4);
    }

    #[test]
    fn test_ctc_repeated_label_needs_blank() {
        // only "A-A" fits three frames; normalised by length 2
        let enc = TargetEncoding { targets: vec![1, 1], lengths: vec![2] };
        let loss = scalar(ctc_loss(uniform_log_probs(3, 1, 2), &enc));
        assert!((loss - 8.0f32.ln() / 2.0).abs() < 1e-4);

        let too_short = scalar(ctc_loss(uniform_log_probs(2, 1, 2), &enc));
        assert!(too_short.is_infinite());
    }

    #[test]
    fn test_ctc_empty_target() {
        let enc = TargetEncoding { targets: vec![], lengths: vec![0] };
        let loss = scalar(ctc_loss(uniform_log_probs(2, 1, 2), &enc));
        assert!((loss - 4.0f32.ln()).abs() < 1e-4);
    }

    #[test]
    fn test_ctc_batch_mean() {
        // sample 0: "A" in 1 frame (ln 2); sample 1: "AB" in 2 frames, C = 3
        let enc = TargetEncoding { targets: vec![1, 1, 2], lengths: vec![1, 2] };
        let log_probs = uniform_log_probs(2, 2, 3);
        let loss = scalar(ctc_loss(log_probs, &enc));
        // sample 0, T = 2, C = 3: "A-", "-A", "AA" → 3/9
        let s0 = -(3.0f32 / 9.0).ln();
        // sample 1: only "AB" → 1/9, divided by 2
        let s1 = 9.0f32.ln() / 2.0;
        assert!((loss - (s0 + s1) / 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_ctc_is_differentiable() {
        type Ad = Autodiff<NdArray>;
        let logits = Tensor::<Ad, 3>::zeros([3, 1, 3], &Default::default()).require_grad();
        let enc = TargetEncoding { targets: vec![1, 2], lengths: vec![2] };
        let loss = ctc_loss(log_softmax(logits.clone(), 2), &enc);
        let grads = loss.backward();
        let g = logits.grad(&grads).unwrap();
        let g: Vec<f32> = g.into_data().to_vec().unwrap();
        assert!(g.iter().all(|v| v.is_finite()));
        assert!(g.iter().any(|v| v.abs() > 1e-6));
    }
}
