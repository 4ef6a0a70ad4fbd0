// ============================================================
// Layer 5 — Multi-Head Training Loop
// ============================================================
// Trains any ImageClassifier where each sample carries several
// independent labels ("heads") that are all scored against the
// SAME prediction [N, classes].
//
// Per batch:
//   one forward pass
//   one cross-entropy term per head
//   the head losses are summed and backpropagated once, which
//   accumulates exactly the gradients a separate backward per
//   head would
//   batch loss = Σ head losses / heads
//
// Accuracy counts correct (sample, head) pairs and divides by
// dataset size × heads.
//
// Validation mirrors training on model.valid() without updates.
// After each epoch the plateau scheduler steps on the TRAINING
// loss and train/val loss and accuracy go to the scalar sink.

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    nn::loss::CrossEntropyLossConfig,
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::application::heads_use_case::HeadsConfig;
use crate::data::{
    batcher::{HeadsBatch, HeadsBatcher},
    dataset::EventSample,
};
use crate::domain::traits::ScalarSink;
use crate::ml::{
    classifier::ImageClassifier,
    scheduler::{PlateauConfig, ReduceLrOnPlateau},
};

#[derive(Debug, Clone, PartialEq)]
pub struct HeadsEpoch {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: f64,
    pub val_accuracy: f64,
}

/// Fraction of correct (sample, head) pairs.
pub fn head_accuracy(correct: usize, items: usize, heads: usize) -> f64 {
    let total = items * heads;
    if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    }
}

/// Loss and correct-count of one batch, summed over heads.
struct BatchOutcome<B: Backend> {
    loss: Tensor<B, 1>,
    heads: usize,
    correct: usize,
}

fn score_heads<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> Option<BatchOutcome<B>> {
    let [n, heads] = targets.dims();
    let ce = CrossEntropyLossConfig::new().init(&logits.device());
    let predicted = logits.clone().argmax(1).reshape([n]);

    let mut correct = 0usize;
    let mut total: Option<Tensor<B, 1>> = None;
    for h in 0..heads {
        let target = targets.clone().slice([0..n, h..h + 1]).reshape([n]);
        correct += predicted
            .clone()
            .equal(target.clone())
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>() as usize;
        let loss = ce.forward(logits.clone(), target);
        total = Some(match total {
            Some(sum) => sum + loss,
            None => loss,
        });
    }

    total.map(|loss| BatchOutcome { loss, heads, correct })
}

pub struct HeadsTrainer<'a> {
    cfg: &'a HeadsConfig,
    sink: &'a mut dyn ScalarSink,
}

impl<'a> HeadsTrainer<'a> {
    pub fn new(cfg: &'a HeadsConfig, sink: &'a mut dyn ScalarSink) -> Self {
        Self { cfg, sink }
    }

    /// Run `cfg.epochs` epochs and return the trained model.
    pub fn fit<B, M, O, DTrain, DVal>(
        &mut self,
        mut model: M,
        mut optim: O,
        train_dataset: DTrain,
        val_dataset: DVal,
        device: &B::Device,
    ) -> Result<(M, Vec<HeadsEpoch>)>
    where
        B: AutodiffBackend,
        M: AutodiffModule<B> + ImageClassifier<B>,
        M::InnerModule: ImageClassifier<B::InnerBackend>,
        O: Optimizer<M, B>,
        DTrain: Dataset<EventSample> + 'static,
        DVal: Dataset<EventSample> + 'static,
    {
        let cfg = self.cfg;
        let mut scheduler = ReduceLrOnPlateau::new(
            cfg.lr,
            PlateauConfig { patience: cfg.patience, ..Default::default() },
        );

        let train_loader = DataLoaderBuilder::new(HeadsBatcher::<B>::new(
            device.clone(),
            cfg.image_height,
            cfg.image_width,
            cfg.heads,
        ))
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

        let val_loader = DataLoaderBuilder::new(HeadsBatcher::<B::InnerBackend>::new(
            device.clone(),
            cfg.image_height,
            cfg.image_width,
            cfg.heads,
        ))
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(val_dataset);

        let mut history = Vec::with_capacity(cfg.epochs);

        for epoch in 1..=cfg.epochs {
            let lr = scheduler.lr();

            // ── Training phase ────────────────────────────────────────────────
            let mut loss_sum = 0.0f64;
            let mut batches = 0usize;
            let mut correct = 0usize;

            for batch in train_loader.iter() {
                let HeadsBatch { images, targets } = batch;
                let logits = model.classify(images);
                let Some(outcome) = score_heads(logits, targets) else {
                    continue;
                };

                loss_sum += outcome.loss.clone().into_scalar().elem::<f64>() / outcome.heads as f64;
                batches += 1;
                correct += outcome.correct;

                let grads = GradientsParams::from_grads(outcome.loss.backward(), &model);
                model = optim.step(lr, model, grads);
            }

            let train_loss = if batches > 0 { loss_sum / batches as f64 } else { f64::NAN };
            let train_accuracy = head_accuracy(correct, train_loader.num_items(), cfg.heads);

            // ── Validation phase ──────────────────────────────────────────────
            let model_valid = model.valid();
            let mut val_loss_sum = 0.0f64;
            let mut val_batches = 0usize;
            let mut val_correct = 0usize;

            for batch in val_loader.iter() {
                let logits = model_valid.classify(batch.images);
                let Some(outcome) = score_heads(logits, batch.targets) else {
                    continue;
                };
                val_loss_sum += outcome.loss.into_scalar().elem::<f64>() / outcome.heads as f64;
                val_batches += 1;
                val_correct += outcome.correct;
            }

            let val_loss = if val_batches > 0 { val_loss_sum / val_batches as f64 } else { f64::NAN };
            let val_accuracy = head_accuracy(val_correct, val_loader.num_items(), cfg.heads);

            scheduler.step(train_loss);

            println!(
                "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | train_acc={:.1}% | val_acc={:.1}%",
                epoch,
                cfg.epochs,
                train_loss,
                val_loss,
                train_accuracy * 100.0,
                val_accuracy * 100.0,
            );

            self.sink.add_scalar("train_loss", train_loss, epoch)?;
            self.sink.add_scalar("val_loss", val_loss, epoch)?;
            self.sink.add_scalar("train_acc", train_accuracy, epoch)?;
            self.sink.add_scalar("val_acc", val_accuracy, epoch)?;

            history.push(HeadsEpoch { epoch, train_loss, val_loss, train_accuracy, val_accuracy });
        }

        tracing::info!("Multi-head training complete!");
        Ok((model, history))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::metrics::MemorySink;
    use crate::ml::{
        backbone::ResNetTrunkConfig,
        classifier::{FrameClassifier, FrameClassifierConfig},
    };
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataset::InMemDataset;
    use burn::optim::AdamConfig;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_accuracy_normalised_by_items_times_heads() {
        assert_eq!(head_accuracy(3, 2, 2), 0.75);
        assert_eq!(head_accuracy(0, 0, 2), 0.0);
    }

    #[test]
    fn test_score_heads_counts_each_head() {
        let device = Default::default();
        // Both samples predict class 1
        let logits = Tensor::<NdArray, 2>::from_floats([[0.0, 5.0, 0.0], [0.0, 5.0, 0.0]], &device);
        let targets = Tensor::<NdArray, 2, Int>::from_ints([[1, 2], [1, 1]], &device);
        let outcome = score_heads(logits, targets).unwrap();
        assert_eq!(outcome.heads, 2);
        assert_eq!(outcome.correct, 3);
        assert!(outcome.loss.into_scalar() > 0.0);
    }

    #[test]
    fn test_fit_logs_four_scalars_per_epoch() {
        let device = Default::default();
        let cfg = HeadsConfig { epochs: 2, batch_size: 2, num_workers: 1, ..Default::default() };
        let sample = |label: &str| EventSample { image: vec![0.5; 3 * 50 * 200], label: label.into() };
        let train = InMemDataset::new(vec![sample("12"), sample("no"), sample("37")]);
        let val = InMemDataset::new(vec![sample("no"), sample("12")]);

        let model = FrameClassifierConfig::new()
            .with_trunk(ResNetTrunkConfig::new().with_blocks([1, 1, 1]).with_base_width(4))
            .init::<TestBackend>(&device);
        let optim = AdamConfig::new().init::<TestBackend, FrameClassifier<TestBackend>>();

        let mut sink = MemorySink::default();
        let (_, history) = HeadsTrainer::new(&cfg, &mut sink)
            .fit::<TestBackend, _, _, _, _>(model, optim, train, val, &device)
            .unwrap();

        assert_eq!(history.len(), 2);
        for e in &history {
            assert!((0.0..=1.0).contains(&e.train_accuracy));
            assert!((0.0..=1.0).contains(&e.val_accuracy));
            assert!(e.train_loss.is_finite());
        }
        for tag in ["train_loss", "val_loss", "train_acc", "val_acc"] {
            assert_eq!(sink.values(tag).len(), 2);
        }
    }
}
