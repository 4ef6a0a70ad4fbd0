// ============================================================
// Layer 5 — Frame Classifier
// ============================================================
// A plain image classifier used by the multi-head trainer:
// ResNet trunk → global average pool → linear → [N, classes].
//
// Every label head of a sample is scored against this one
// prediction, so the classifier itself knows nothing about heads.

use burn::{
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Linear,
    },
    prelude::*,
};

use crate::domain::label::HEAD_CLASSES;
use crate::ml::backbone::{ResNetTrunk, ResNetTrunkConfig};
use crate::ml::init;

/// Any model mapping an image batch to class logits.
pub trait ImageClassifier<B: Backend> {
    /// images: [N, 3, H, W] → logits: [N, classes]
    fn classify(&self, images: Tensor<B, 4>) -> Tensor<B, 2>;
}

#[derive(Config, Debug)]
pub struct FrameClassifierConfig {
    #[config(default = "HEAD_CLASSES")]
    pub num_classes: usize,
    #[config(default = "ResNetTrunkConfig::new()")]
    pub trunk: ResNetTrunkConfig,
}

impl FrameClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> FrameClassifier<B> {
        self.init_with_backbone(self.trunk.init(device), device)
    }

    pub fn init_with_backbone<B: Backend>(&self, trunk: ResNetTrunk<B>, device: &B::Device) -> FrameClassifier<B> {
        FrameClassifier {
            trunk,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: init::linear(self.trunk.out_channels(), self.num_classes, device),
        }
    }
}

#[derive(Module, Debug)]
pub struct FrameClassifier<B: Backend> {
    pub trunk: ResNetTrunk<B>,
    pub pool: AdaptiveAvgPool2d,
    pub fc: Linear<B>,
}

impl<B: Backend> FrameClassifier<B> {
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.pool.forward(self.trunk.forward(images)); // [N, C, 1, 1]
        let [n, c, _, _] = x.dims();
        self.fc.forward(x.reshape([n, c]))
    }
}

impl<B: Backend> ImageClassifier<B> for FrameClassifier<B> {
    fn classify(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.forward(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_logits_shape() {
        let device = Default::default();
        let model = FrameClassifierConfig::new()
            .with_trunk(ResNetTrunkConfig::new().with_blocks([1, 1, 1]).with_base_width(4))
            .init::<NdArray>(&device);
        let logits = model.classify(Tensor::zeros([2, 3, 50, 200], &device));
        assert_eq!(logits.dims(), [2, HEAD_CLASSES]);
    }
}
