// ============================================================
// Layer 6 — Pretrained Backbone Store
// ============================================================
// Loads ImageNet weights into the ResNet trunk before training.
//
// Two formats are accepted, picked by file extension:
//
//   .pt / .pth   PyTorch state dict (torchvision resnet50), read
//                with burn-import's PyTorchFileRecorder. Keys
//                past layer3 (layer4.*, fc.*) are ignored; the
//                two downsample keys are remapped:
//                  layer1.0.downsample.0.weight → layer1.0.downsample.conv.weight
//                  layer1.0.downsample.1.*      → layer1.0.downsample.bn.*
//                BatchNorm weight/bias become gamma/beta inside
//                the recorder.
//
//   anything else  Burn record written by save_trunk
//                  (CompactRecorder, MessagePack + half precision)
//
// After a PyTorch import the converted trunk is saved next to the
// run logs as `{log_dir}/backbone.mpk`; pass that file to
// `--backbone-weights` to skip the conversion on later runs.
//
// The architecture must match: a trunk built with a different
// block count or base width fails to load.
//
// Reference: Burn Book §5 (Records), burn-import PyTorch guide

use anyhow::{Context, Result};
use burn::{
    prelude::*,
    record::{CompactRecorder, FullPrecisionSettings, Recorder},
};
use burn_import::pytorch::{LoadArgs, PyTorchFileRecorder};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::ml::backbone::ResNetTrunk;

const CACHE_NAME: &str = "backbone";

fn is_pytorch(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("pt") | Some("pth")
    )
}

/// Replace the weights of `trunk` with the ones stored at `path`.
pub fn load_trunk<B: Backend>(trunk: ResNetTrunk<B>, path: &Path, device: &B::Device) -> Result<ResNetTrunk<B>> {
    tracing::info!("Loading backbone weights from '{}'", path.display());

    let record = if is_pytorch(path) {
        let args = LoadArgs::new(path.to_path_buf())
            .with_key_remap(r"downsample\.0\.(.+)", "downsample.conv.$1")
            .with_key_remap(r"downsample\.1\.(.+)", "downsample.bn.$1");
        PyTorchFileRecorder::<FullPrecisionSettings>::default()
            .load(args, device)
            .with_context(|| format!("Cannot read PyTorch weights '{}'", path.display()))?
    } else {
        CompactRecorder::new()
            .load(path.to_path_buf(), device)
            .with_context(|| format!("Cannot read backbone record '{}'", path.display()))?
    };

    Ok(trunk.load_record(record))
}

/// Load `weights` into `trunk`. A PyTorch import is cached as a Burn
/// record under `cache_dir`; the record path is returned when written.
pub fn import_trunk<B: Backend>(
    trunk: ResNetTrunk<B>,
    weights: &Path,
    cache_dir: &Path,
    device: &B::Device,
) -> Result<(ResNetTrunk<B>, Option<PathBuf>)> {
    let trunk = load_trunk(trunk, weights, device)?;
    if !is_pytorch(weights) {
        return Ok((trunk, None));
    }
    fs::create_dir_all(cache_dir)
        .with_context(|| format!("Cannot create '{}'", cache_dir.display()))?;
    let base = cache_dir.join(CACHE_NAME);
    save_trunk(&trunk, &base)?;
    let cached = base.with_extension("mpk");
    tracing::info!("Converted backbone saved to '{}'", cached.display());
    Ok((trunk, Some(cached)))
}

/// Save `trunk` as a Burn record at `path` (extension added by the recorder).
pub fn save_trunk<B: Backend>(trunk: &ResNetTrunk<B>, path: &Path) -> Result<()> {
    CompactRecorder::new()
        .record(trunk.clone().into_record(), path.to_path_buf())
        .with_context(|| format!("Failed to save backbone to '{}'", path.display()))?;
    tracing::debug!("Saved backbone record to '{}'", path.display());
    Ok(())
}
