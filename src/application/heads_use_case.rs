// ============================================================
// Layer 2 — HeadsUseCase
// ============================================================
// Trains the FrameClassifier with the multi-head trainer on the
// same rendered images as the CTC reader:
//
//   Step 1: List and split rendered images    (Layer 4 - data)
//   Step 2: Keep images with a per-head label (Layer 3 - domain)
//   Step 3: Build datasets                    (Layer 4 - data)
//   Step 4: Save config, open scalar log      (Layer 6 - infra)
//   Step 5: Build classifier (+ backbone)     (Layer 5 - ml)
//   Step 6: Fit                               (Layer 5 - ml)
//
// Head h of a numeric label "37" is its h-th digit; "no" puts
// every head on the no-event class.

use anyhow::{bail, Result};
use burn::{
    backend::{ndarray::NdArrayDevice, wgpu::WgpuDevice, Autodiff, NdArray, Wgpu},
    optim::{decay::WeightDecayConfig, AdamConfig},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::application::train_use_case::{split_image_names, DeviceKind};
use crate::data::{
    dataset::EventImageDataset,
    transform::{ImageTransform, TransformMode},
};
use crate::domain::label::{head_targets, parse_file_name, HEAD_CLASSES};
use crate::infra::{
    backbone_store::import_trunk,
    metrics::{save_config, ScalarCsvLogger},
};
use crate::ml::{
    backbone::ResNetTrunkConfig,
    classifier::FrameClassifierConfig,
    heads_trainer::{HeadsEpoch, HeadsTrainer},
};

// ─── Multi-Head Configuration ────────────────────────────────────────────────
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadsConfig {
    pub data_dir: String,
    pub log_dir: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub lr: f64,
    pub weight_decay: f64,
    pub patience: usize,
    /// Labels per sample (digits of the interval code)
    pub heads: usize,
    pub seed: u64,
    pub train_fraction: f64,
    pub image_height: usize,
    pub image_width: usize,
    pub device: DeviceKind,
    pub backbone_weights: Option<String>,
    pub num_workers: usize,
}

impl Default for HeadsConfig {
    fn default() -> Self {
        Self {
            data_dir: "samples".to_string(),
            log_dir: "runs/heads".to_string(),
            epochs: 50,
            batch_size: 16,
            lr: 1e-3,
            weight_decay: 1e-3,
            patience: 5,
            heads: 2,
            seed: 0,
            train_fraction: 0.75,
            image_height: 50,
            image_width: 200,
            device: DeviceKind::Wgpu,
            backbone_weights: None,
            num_workers: 1,
        }
    }
}

/// Drop names whose label cannot be split into `heads` targets.
pub fn keep_head_labelled(names: Vec<String>, heads: usize) -> Vec<String> {
    names
        .into_iter()
        .filter(|name| match parse_file_name(name).and_then(|(_, code)| head_targets(&code, heads)) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!("Skipping '{name}': {e:#}");
                false
            }
        })
        .collect()
}

pub struct HeadsUseCase {
    config: HeadsConfig,
}

impl HeadsUseCase {
    pub fn new(config: HeadsConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<HeadsEpoch>> {
        match self.config.device {
            DeviceKind::Wgpu => {
                let device = WgpuDevice::default();
                tracing::info!("Using WGPU device: {:?}", device);
                self.execute_on::<Autodiff<Wgpu>>(&device)
            }
            DeviceKind::Cpu => self.execute_on::<Autodiff<NdArray>>(&NdArrayDevice::Cpu),
        }
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Vec<HeadsEpoch>> {
        let cfg = &self.config;

        // ── Steps 1-2: Split, then keep head-compatible labels ────────────────
        let (train_names, val_names) = split_image_names(&cfg.data_dir, cfg.train_fraction, cfg.seed)?;
        let train_names = keep_head_labelled(train_names, cfg.heads);
        let val_names = keep_head_labelled(val_names, cfg.heads);
        if train_names.is_empty() {
            bail!("no training image has a {}-digit or 'no' label", cfg.heads);
        }

        // ── Step 3: Datasets ──────────────────────────────────────────────────
        let train_dataset = EventImageDataset::open(
            &cfg.data_dir,
            &train_names,
            ImageTransform::new(TransformMode::Train, cfg.image_height, cfg.image_width),
        )?;
        let val_dataset = EventImageDataset::open(
            &cfg.data_dir,
            &val_names,
            ImageTransform::new(TransformMode::Eval, cfg.image_height, cfg.image_width),
        )?;

        // ── Step 4: Config + telemetry ────────────────────────────────────────
        save_config(&cfg.log_dir, cfg)?;
        let mut sink = ScalarCsvLogger::new(&cfg.log_dir)?;

        // ── Step 5: Classifier ────────────────────────────────────────────────
        let model_cfg = FrameClassifierConfig::new()
            .with_num_classes(HEAD_CLASSES)
            .with_trunk(ResNetTrunkConfig::new());
        let mut trunk = model_cfg.trunk.init::<B>(device);
        if let Some(weights) = &cfg.backbone_weights {
            trunk = import_trunk(trunk, Path::new(weights), Path::new(&cfg.log_dir), device)?.0;
        }
        let model = model_cfg.init_with_backbone(trunk, device);
        let optim = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(cfg.weight_decay as f32)))
            .init();

        // ── Step 6: Fit ───────────────────────────────────────────────────────
        let (_, history) = HeadsTrainer::new(cfg, &mut sink)
            .fit::<B, _, _, _, _>(model, optim, train_dataset, val_dataset, device)?;
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_head_compatible_labels() {
        let names = vec![
            "a&37.png".to_string(),
            "b&no.png".to_string(),
            "c&112.png".to_string(),
            "broken.png".to_string(),
        ];
        assert_eq!(keep_head_labelled(names, 2), ["a&37.png", "b&no.png"]);
    }

    #[test]
    fn test_defaults() {
        let cfg = HeadsConfig::default();
        assert_eq!(cfg.heads, 2);
        assert_eq!(cfg.patience, 5);
    }
}
