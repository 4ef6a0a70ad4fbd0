// ============================================================
// Layer 5 — CTC Training Loop
// ============================================================
// Train + validation loop for the CRNN using Burn's DataLoader,
// Adam (L2 weight decay), global gradient clipping and a
// reduce-on-plateau learning rate.
//
// Per epoch:
//   train  forward → CTC loss → decode into the train table
//          non-finite loss → batch consumed, no update
//          otherwise backward → clip ‖g‖ ≤ clip_norm → Adam step
//   valid  model.valid() (inner backend, no autodiff, dropout off)
//          accuracy is read BEFORE the batch joins the table
//   end    mean finite loss → scheduler → console + scalars
//
// After the last epoch the held-out split is decoded once more
// into a fresh table; its accuracy and every mispredicted row
// are printed.
//
// Key Burn insight:
//   - Training uses B (Autodiff<_>) for gradients
//   - model.valid() returns the model on B::InnerBackend
//   - Validation batcher must also use B::InnerBackend
//
// Reference: Burn Book §5, Kingma & Ba (2015) Adam

use anyhow::Result;
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    optim::{decay::WeightDecayConfig, AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::{activation::log_softmax, backend::AutodiffBackend},
};
use std::sync::Arc;

use crate::application::train_use_case::TrainConfig;
use crate::data::{
    batcher::{CrnnBatch, CrnnBatcher},
    dataset::EventSample,
};
use crate::domain::{traits::ScalarSink, vocabulary::Vocabulary};
use crate::ml::{
    clip::clip_global_norm,
    ctc::{ctc_loss, encode_batch, greedy_decode},
    model::Crnn,
    results::{AccumulationScope, DisplayAccuracy, LossAccumulator, ResultsTable},
    scheduler::{PlateauConfig, ReduceLrOnPlateau},
};

/// What one epoch produced.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub train_accuracy: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Learning rate used during this epoch
    pub lr: f64,
    pub updates: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct TrainReport {
    pub epochs: Vec<EpochSummary>,
    pub test_results: ResultsTable,
}

impl TrainReport {
    pub fn test_accuracy(&self) -> Option<f64> {
        self.test_results.accuracy()
    }
}

/// Tables that survive across epochs under `AccumulationScope::Run`.
struct RunTables {
    train: ResultsTable,
    valid: ResultsTable,
}

pub fn run_training<B, DTrain, DTest>(
    cfg: &TrainConfig,
    vocab: &Vocabulary,
    mut model: Crnn<B>,
    train_dataset: DTrain,
    test_dataset: DTest,
    sink: &mut dyn ScalarSink,
    device: &B::Device,
) -> Result<TrainReport>
where
    B: AutodiffBackend,
    DTrain: Dataset<EventSample> + 'static,
    DTest: Dataset<EventSample> + 'static,
{
    let blank = vocab.blank();
    let test_dataset = Arc::new(test_dataset);

    // ── Adam optimiser ────────────────────────────────────────────────────────
    // Weight decay is added to the gradient (L2), not decoupled.
    let mut optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
        .init();
    let mut scheduler = ReduceLrOnPlateau::new(
        cfg.lr,
        PlateauConfig { patience: cfg.patience, ..Default::default() },
    );

    // ── Training data loader (AutodiffBackend) ────────────────────────────────
    let train_batcher = CrnnBatcher::<B>::new(device.clone(), cfg.image_height, cfg.image_width);
    let train_loader = DataLoaderBuilder::new(train_batcher)
        .batch_size(cfg.batch_size)
        .shuffle(cfg.seed)
        .num_workers(cfg.num_workers)
        .build(train_dataset);

    // ── Held-out data loader (InnerBackend, no autodiff overhead) ─ ────────────
    let valid_batcher = CrnnBatcher::<B::InnerBackend>::new(device.clone(), cfg.image_height, cfg.image_width);
    let valid_loader = DataLoaderBuilder::new(valid_batcher)
        .batch_size(cfg.batch_size)
        .num_workers(cfg.num_workers)
        .build(test_dataset);

    tracing::info!(
        "Training on {} samples, validating on {} samples",
        train_loader.num_items(),
        valid_loader.num_items(),
    );

    let mut tables = RunTables { train: ResultsTable::new(), valid: ResultsTable::new() };
    let mut epochs = Vec::with_capacity(cfg.epochs);

    // ── Epoch loop ────────────────────────────────────────────────────────────
    for epoch in 1..=cfg.epochs {
        if cfg.accumulation == AccumulationScope::Epoch {
            tables = RunTables { train: ResultsTable::new(), valid: ResultsTable::new() };
        }
        let lr = scheduler.lr();

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_losses = LossAccumulator::default();
        let mut train_accuracy = None;

        for batch in train_loader.iter() {
            let CrnnBatch { images, labels } = batch;
            let logits = model.forward(images); // [T, N, C]

            let predictions = greedy_decode(logits.clone().inner(), vocab)?;
            tables.train.extend_batch(&labels, predictions, blank);
            train_accuracy = tables.train.accuracy();

            let encoding = encode_batch(&labels, vocab)?;
            let loss = ctc_loss(log_softmax(logits, 2), &encoding);
            let loss_val: f64 = loss.clone().into_scalar().elem::<f64>();

            if !train_losses.record(loss_val) {
                tracing::warn!("Epoch {epoch}: non-finite loss ({loss_val}), batch skipped");
                continue;
            }

            // Backward pass + clipping + Adam update
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            let (grads, norm) = clip_global_norm::<B, _>(&model, grads, cfg.clip_norm);
            tracing::debug!("loss={loss_val:.4} grad_norm={norm:.4}");
            model = optim.step(lr, model, grads);
        }

        let avg_train_loss = train_losses.mean();

        // ── Validation phase ──────────────────────────────────────────────────
        // model.valid() → Crnn<B::InnerBackend>
        let model_valid = model.valid();
        let mut val_losses = LossAccumulator::default();
        let mut val_accuracy = None;

        for batch in valid_loader.iter() {
            let CrnnBatch { images, labels } = batch;
            let logits = model_valid.forward(images);
            let predictions = greedy_decode(logits.clone(), vocab)?;

            let encoding = encode_batch(&labels, vocab)?;
            let loss = ctc_loss(log_softmax(logits, 2), &encoding);
            val_losses.record(loss.into_scalar().elem::<f64>());

            // Read first, append second: the first batch sees an empty table.
            val_accuracy = tables.valid.accuracy();
            tables.valid.extend_batch(&labels, predictions, blank);
        }

        let avg_val_loss = val_losses.mean();
        let next_lr = scheduler.step(avg_train_loss);

        println!(
            "Epoch {:>3}/{} | train_loss={:.4} | val_loss={:.4} | train_acc={} | val_acc={} | lr={:.1e}",
            epoch,
            cfg.epochs,
            avg_train_loss,
            avg_val_loss,
            DisplayAccuracy(train_accuracy),
            DisplayAccuracy(val_accuracy),
            lr,
        );

        sink.add_scalar("train_loss", avg_train_loss, epoch)?;
        sink.add_scalar("val_loss", avg_val_loss, epoch)?;
        if let Some(acc) = train_accuracy {
            sink.add_scalar("train_acc", acc, epoch)?;
        }
        if let Some(acc) = val_accuracy {
            sink.add_scalar("val_acc", acc, epoch)?;
        }
        sink.add_scalar("lr", next_lr, epoch)?;

        epochs.push(EpochSummary {
            epoch,
            train_loss: avg_train_loss,
            val_loss: avg_val_loss,
            train_accuracy,
            val_accuracy,
            lr,
            updates: train_losses.finite_batches(),
            skipped: train_losses.skipped_batches(),
        });
    }

    // ── Test phase ────────────────────────────────────────────────────────────
    let model_valid = model.valid();
    let mut test_results = ResultsTable::new();
    for batch in valid_loader.iter() {
        let logits = model_valid.forward(batch.images);
        let predictions = greedy_decode(logits, vocab)?;
        test_results.extend_batch(&batch.labels, predictions, blank);
    }

    println!("Test accuracy: {}", DisplayAccuracy(test_results.accuracy()));
    print_mistakes(&test_results);

    tracing::info!("Training complete!");
    Ok(TrainReport { epochs, test_results })
}

/// Console listing of the rows whose corrected prediction is wrong.
fn print_mistakes(results: &ResultsTable) {
    let mut mistakes = results.mistakes().peekable();
    if mistakes.peek().is_none() {
        return;
    }
    println!("{:<8} {:<16} {}", "actual", "prediction", "corrected");
    for row in mistakes {
        println!("{:<8} {:<16} {}", row.actual, row.prediction, row.prediction_corrected);
    }
}
