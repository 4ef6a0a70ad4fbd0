// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the CTC training pipeline in order:
//
//   Step 1: List rendered images          (Layer 4 - data)
//   Step 2: Split train / held-out        (Layer 4 - data)
//   Step 3: Build the vocabulary          (Layer 3 - domain)
//   Step 4: Build datasets                (Layer 4 - data)
//   Step 5: Save config, open scalar log  (Layer 6 - infra)
//   Step 6: Build model (+ backbone)      (Layer 5 - ml, Layer 6 - infra)
//   Step 7: Run training loop             (Layer 5 - ml)
//
// The held-out split is used both for per-epoch validation and
// for the final test pass.
//
// Reference: Burn Book §5 (Training)

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::data::{
    dataset::{list_image_names, EventImageDataset},
    splitter::split_train_test,
    transform::{ImageTransform, TransformMode},
};
use crate::domain::{label::parse_file_name, vocabulary::Vocabulary};
use crate::infra::{
    backbone_store::import_trunk,
    metrics::{save_config, ScalarCsvLogger},
};
use crate::ml::{
    backbone::ResNetTrunkConfig,
    model::{CrnnConfig, RnnKind},
    results::AccumulationScope,
    trainer::{run_training, TrainReport},
};

/// Where the tensors live for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// GPU through WGPU (Vulkan / Metal / DX12)
    Wgpu,
    /// CPU through ndarray
    Cpu,
}

// ─── Training Configuration ──────────────────────────────────────────────────
// All hyperparameters for a training run.
// Serialisable so it can be saved next to the run's scalars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir: String,
    pub log_dir: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub clip_norm: f64,
    pub patience: usize,
    pub rnn_hidden: usize,
    pub rnn: RnnKind,
    pub dropout: f64,
    pub seed: u64,
    pub train_fraction: f64,
    pub image_height: usize,
    pub image_width: usize,
    pub device: DeviceKind,
    /// Optional ImageNet trunk weights (.pt/.pth or Burn record)
    pub backbone_weights: Option<String>,
    pub accumulation: AccumulationScope,
    pub num_workers: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: "samples".to_string(),
            log_dir: "runs".to_string(),
            epochs: 50,
            batch_size: 16,
            lr: 1e-3,
            weight_decay: 1e-3,
            clip_norm: 5.0,
            patience: 5,
            rnn_hidden: 256,
            rnn: RnnKind::Lstm,
            dropout: 0.2,
            seed: 0,
            train_fraction: 0.75,
            image_height: 50,
            image_width: 200,
            device: DeviceKind::Wgpu,
            backbone_weights: None,
            accumulation: AccumulationScope::Run,
            num_workers: 1,
        }
    }
}

/// Rendered image names split into (train, held-out).
pub fn split_image_names(data_dir: &str, train_fraction: f64, seed: u64) -> Result<(Vec<String>, Vec<String>)> {
    let names = list_image_names(data_dir)?;
    if names.is_empty() {
        bail!("no .png images found in '{data_dir}'; run `render` first");
    }
    tracing::info!("Found {} images in '{}'", names.len(), data_dir);

    let (train, held_out) = split_train_test(names, train_fraction, seed);
    tracing::info!("Split: {} train, {} held out", train.len(), held_out.len());
    Ok((train, held_out))
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<TrainReport> {
        match self.config.device {
            DeviceKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.execute_on::<Autodiff<Wgpu>>(&device)
            }
            DeviceKind::Cpu => {
                let device = NdArrayDevice::Cpu;
                tracing::info!("Using CPU device");
                self.execute_on::<Autodiff<NdArray>>(&device)
            }
        }
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainReport> {
        let cfg = &self.config;

        // ── Steps 1-2: List and split the rendered images ─────────────────────
        let (train_names, test_names) = split_image_names(&cfg.data_dir, cfg.train_fraction, cfg.seed)?;

        // ── Step 3: Vocabulary over every label in the dataset ───────────────
        let labels = train_names
            .iter()
            .chain(&test_names)
            .map(|name| parse_file_name(name).map(|(_, code)| code))
            .collect::<Result<Vec<_>>>()?;
        let vocab = Vocabulary::from_labels(labels.iter().map(String::as_str))?;
        tracing::info!("Vocabulary: {} classes {:?}", vocab.len(), vocab.chars());

        // ── Step 4: Build Burn datasets ───────────────────────────────────────
        let train_dataset = EventImageDataset::open(
            &cfg.data_dir,
            &train_names,
            ImageTransform::new(TransformMode::Train, cfg.image_height, cfg.image_width),
        )?;
        let test_dataset = EventImageDataset::open(
            &cfg.data_dir,
            &test_names,
            ImageTransform::new(TransformMode::Eval, cfg.image_height, cfg.image_width),
        )?;

        // ── Step 5: Persist config, open telemetry ────────────────────────────
        save_config(&cfg.log_dir, cfg)?;
        let mut sink = ScalarCsvLogger::new(&cfg.log_dir)?;

        // ── Step 6: Model with injected backbone ──────────────────────────────
        let model_cfg = CrnnConfig::new(vocab.len())
            .with_rnn_hidden(cfg.rnn_hidden)
            .with_rnn(cfg.rnn)
            .with_dropout(cfg.dropout)
            .with_image_height(cfg.image_height)
            .with_image_width(cfg.image_width)
            .with_trunk(ResNetTrunkConfig::new());
        let mut trunk = model_cfg.trunk.init::<B>(device);
        if let Some(weights) = &cfg.backbone_weights {
            trunk = import_trunk(trunk, Path::new(weights), Path::new(&cfg.log_dir), device)?.0;
        }
        let model = model_cfg.init_with_backbone(trunk, device);
        tracing::info!(
            "Model ready: {:?} hidden={} time_steps={}",
            cfg.rnn,
            cfg.rnn_hidden,
            model_cfg.time_steps(),
        );

        // ── Step 7: Run training loop (Layer 5) ───────────────────────────────
        run_training(cfg, &vocab, model, train_dataset, test_dataset, &mut sink, device)
    }
}
