// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands: `render`, `train` and
// `train-heads`, and all their configurable flags. Defaults are
// the reference run's settings.
//
// clap's derive macros automatically generate:
//   - help text (--help)
//   - error messages for bad values
//   - type conversion (string → usize, f64, enums, ...)
//
// Reference: Rust Book §12 (Building a CLI Program)

use clap::{Args, Subcommand, ValueEnum};

use crate::application::{
    heads_use_case::HeadsConfig,
    render_use_case::RenderConfig,
    train_use_case::{DeviceKind, TrainConfig},
};
use crate::ml::{model::RnnKind, results::AccumulationScope};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render event tensors listed in the manifest into PNG plots
    Render(RenderArgs),

    /// Train the CRNN reader with CTC loss on rendered plots
    Train(TrainArgs),

    /// Train a multi-head frame classifier on rendered plots
    TrainHeads(HeadsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum DeviceArg {
    Wgpu,
    Cpu,
}

impl From<DeviceArg> for DeviceKind {
    fn from(d: DeviceArg) -> Self {
        match d {
            DeviceArg::Wgpu => DeviceKind::Wgpu,
            DeviceArg::Cpu => DeviceKind::Cpu,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum RnnArg {
    Lstm,
    Gru,
}

impl From<RnnArg> for RnnKind {
    fn from(r: RnnArg) -> Self {
        match r {
            RnnArg::Lstm => RnnKind::Lstm,
            RnnArg::Gru => RnnKind::Gru,
        }
    }
}

// ─── render ──────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct RenderArgs {
    /// JSON manifest of train / validation / test intervals
    #[arg(long, default_value = "sets.json")]
    pub manifest: String,

    /// Directory of per-sample `{id}.h5` event tensors
    #[arg(long, default_value = "roi_mouth")]
    pub events_dir: String,

    /// Output directory for `{id}&{label}.png`; skipped if it exists
    #[arg(long, default_value = "samples")]
    pub out_dir: String,

    /// Event frame duration in milliseconds
    #[arg(long, default_value_t = 10.0)]
    pub frame_ms: f32,
}

impl From<RenderArgs> for RenderConfig {
    fn from(a: RenderArgs) -> Self {
        RenderConfig {
            manifest: a.manifest,
            events_dir: a.events_dir,
            out_dir: a.out_dir,
            frame_ms: a.frame_ms,
        }
    }
}

// ─── train ───────────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Directory of rendered `{id}&{label}.png` plots
    #[arg(long, default_value = "samples")]
    pub data_dir: String,

    /// Where scalars.csv and train_config.json are written
    #[arg(long, default_value = "runs")]
    pub log_dir: String,

    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    /// Initial learning rate (reduced ×0.1 on plateau)
    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    /// L2 penalty added to the gradients by Adam
    #[arg(long, default_value_t = 1e-3)]
    pub weight_decay: f64,

    /// Maximum global L2 norm of the gradients
    #[arg(long, default_value_t = 5.0)]
    pub clip_norm: f64,

    /// Epochs without improvement before the learning rate drops
    #[arg(long, default_value_t = 5)]
    pub patience: usize,

    #[arg(long, default_value_t = 256)]
    pub rnn_hidden: usize,

    #[arg(long, value_enum, default_value_t = RnnArg::Lstm)]
    pub rnn: RnnArg,

    #[arg(long, default_value_t = 0.2)]
    pub dropout: f64,

    /// Seed for the train / held-out split and batch shuffling
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value_t = 0.75)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 50)]
    pub image_height: usize,

    #[arg(long, default_value_t = 200)]
    pub image_width: usize,

    #[arg(long, value_enum, default_value_t = DeviceArg::Wgpu)]
    pub device: DeviceArg,

    /// ResNet-50 weights (.pt/.pth state dict or Burn record)
    #[arg(long)]
    pub backbone_weights: Option<String>,

    /// Start fresh result tables every epoch instead of once per run
    #[arg(long)]
    pub reset_results_each_epoch: bool,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

/// Convert CLI TrainArgs into the application-layer TrainConfig.
/// The application layer never sees clap types.
impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        TrainConfig {
            data_dir: a.data_dir,
            log_dir: a.log_dir,
            epochs: a.epochs,
            batch_size: a.batch_size,
            lr: a.lr,
            weight_decay: a.weight_decay,
            clip_norm: a.clip_norm,
            patience: a.patience,
            rnn_hidden: a.rnn_hidden,
            rnn: a.rnn.into(),
            dropout: a.dropout,
            seed: a.seed,
            train_fraction: a.train_fraction,
            image_height: a.image_height,
            image_width: a.image_width,
            device: a.device.into(),
            backbone_weights: a.backbone_weights,
            accumulation: if a.reset_results_each_epoch {
                AccumulationScope::Epoch
            } else {
                AccumulationScope::Run
            },
            num_workers: a.num_workers,
        }
    }
}

// ─── train-heads ─────────────────────────────────────────────────────────────
#[derive(Args, Debug)]
pub struct HeadsArgs {
    #[arg(long, default_value = "samples")]
    pub data_dir: String,

    #[arg(long, default_value = "runs/heads")]
    pub log_dir: String,

    #[arg(long, default_value_t = 50)]
    pub epochs: usize,

    #[arg(long, default_value_t = 16)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1e-3)]
    pub lr: f64,

    #[arg(long, default_value_t = 1e-3)]
    pub weight_decay: f64,

    #[arg(long, default_value_t = 5)]
    pub patience: usize,

    /// Labels per sample: one per digit of the interval code
    #[arg(long, default_value_t = 2)]
    pub heads: usize,

    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    #[arg(long, default_value_t = 0.75)]
    pub train_fraction: f64,

    #[arg(long, default_value_t = 50)]
    pub image_height: usize,

    #[arg(long, default_value_t = 200)]
    pub image_width: usize,

    #[arg(long, value_enum, default_value_t = DeviceArg::Wgpu)]
    pub device: DeviceArg,

    #[arg(long)]
    pub backbone_weights: Option<String>,

    #[arg(long, default_value_t = 1)]
    pub num_workers: usize,
}

impl From<HeadsArgs> for HeadsConfig {
    fn from(a: HeadsArgs) -> Self {
        HeadsConfig {
            data_dir: a.data_dir,
            log_dir: a.log_dir,
            epochs: a.epochs,
            batch_size: a.batch_size,
            lr: a.lr,
            weight_decay: a.weight_decay,
            patience: a.patience,
            heads: a.heads,
            seed: a.seed,
            train_fraction: a.train_fraction,
            image_height: a.image_height,
            image_width: a.image_width,
            device: a.device.into(),
            backbone_weights: a.backbone_weights,
            num_workers: a.num_workers,
        }
    }
}
