// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction, parsed with `clap`.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `render`       event tensors → PNG activation plots
//   2. `train`        CRNN + CTC on the plots
//   3. `train-heads`  multi-head classifier on the plots
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, HeadsArgs, RenderArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "lipspike",
    version = "0.1.0",
    about = "Read event-camera mouth activity with a CRNN trained by CTC."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Match on the subcommand and dispatch to the correct use case.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Render(args) => run_render(args),
            Commands::Train(args) => run_train(args),
            Commands::TrainHeads(args) => run_train_heads(args),
        }
    }
}

fn run_render(args: RenderArgs) -> Result<()> {
    use crate::application::render_use_case::RenderUseCase;

    let written = RenderUseCase::new(args.into()).execute()?;
    if written > 0 {
        println!("Rendered {written} images.");
    }
    Ok(())
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting CTC training on images in: {}", args.data_dir);
    let report = TrainUseCase::new(args.into()).execute()?;
    tracing::info!("{} epochs trained", report.epochs.len());
    Ok(())
}

fn run_train_heads(args: HeadsArgs) -> Result<()> {
    use crate::application::heads_use_case::HeadsUseCase;

    tracing::info!("Starting multi-head training on images in: {}", args.data_dir);
    let history = HeadsUseCase::new(args.into()).execute()?;
    if let Some(last) = history.last() {
        println!(
            "Final: train_acc={:.1}% val_acc={:.1}%",
            last.train_accuracy * 100.0,
            last.val_accuracy * 100.0
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::train_use_case::TrainConfig;
    use crate::ml::results::AccumulationScope;

    #[test]
    fn test_train_defaults_parse() {
        let cli = Cli::try_parse_from(["lipspike", "train"]).unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        let defaults = TrainConfig::default();
        assert_eq!(cfg.epochs, defaults.epochs);
        assert_eq!(cfg.lr, defaults.lr);
        assert_eq!(cfg.rnn, defaults.rnn);
        assert_eq!(cfg.device, defaults.device);
        assert_eq!(cfg.accumulation, AccumulationScope::Run);
    }

    #[test]
    fn test_train_flags() {
        let cli = Cli::try_parse_from([
            "lipspike",
            "train",
            "--rnn",
            "gru",
            "--device",
            "cpu",
            "--reset-results-each-epoch",
            "--backbone-weights",
            "resnet50.pth",
        ])
        .unwrap();
        let Commands::Train(args) = cli.command else {
            panic!("expected train");
        };
        let cfg: TrainConfig = args.into();
        assert_eq!(cfg.accumulation, AccumulationScope::Epoch);
        assert_eq!(cfg.backbone_weights.as_deref(), Some("resnet50.pth"));
    }

    #[test]
    fn test_train_heads_subcommand_name() {
        assert!(Cli::try_parse_from(["lipspike", "train-heads", "--heads", "2"]).is_ok());
        assert!(Cli::try_parse_from(["lipspike", "render", "--frame-ms", "5"]).is_ok());
    }
}
