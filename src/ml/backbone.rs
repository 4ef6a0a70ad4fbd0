// ============================================================
// Layer 5 — ResNet-50 Trunk
// ============================================================
// The convolutional feature extractor of the reader: a ResNet-50
// cut after its third stage, i.e. everything up to and including
// layer3 (the classifier, global pool and layer4 are dropped).
//
//   stem    conv 7×7/2 → BN → ReLU → maxpool 3×3/2
//   layer1  3 × Bottleneck(64)    →  256 ch, stride 4
//   layer2  4 × Bottleneck(128)   →  512 ch, stride 8
//   layer3  6 × Bottleneck(256)   → 1024 ch, stride 16
//
// Each Bottleneck is 1×1 reduce → 3×3 (stride here) → 1×1 expand
// (×4), plus an identity or a 1×1 projection shortcut.
//
// Field names follow the torchvision layout (conv1, bn1,
// layer1.0.conv1, ...) so ImageNet weights can be loaded by
// infra::backbone_store with only the downsample keys remapped.
//
// Reference: He et al. (2016) Deep Residual Learning

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};

use crate::ml::init;

pub const EXPANSION: usize = 4;

#[derive(Config, Debug)]
pub struct ResNetTrunkConfig {
    /// Bottleneck count per stage (ResNet-50: 3, 4, 6)
    #[config(default = "[3, 4, 6]")]
    pub blocks: [usize; 3],
    /// Width of the stem and the first stage
    #[config(default = 64)]
    pub base_width: usize,
}

impl ResNetTrunkConfig {
    /// Channels leaving layer3
    pub fn out_channels(&self) -> usize {
        self.base_width * 4 * EXPANSION
    }

    /// Spatial size leaving layer3 for a `[height, width]` input.
    /// The stem conv, the maxpool and the first block of layer2 and
    /// layer3 each halve the size, rounding up.
    pub fn output_size(&self, [height, width]: [usize; 2]) -> [usize; 2] {
        let halve = |x: usize| (x.max(1) - 1) / 2 + 1;
        let (mut h, mut w) = (height, width);
        for _ in 0..4 {
            h = halve(h);
            w = halve(w);
        }
        [h, w]
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNetTrunk<B> {
        let base = self.base_width;
        let conv1 = init::conv2d(
            Conv2dConfig::new([3, base], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false),
            device,
        );
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut in_channels = base;
        let mut stage = |planes: usize, count: usize, stride: usize| {
            let blocks: Vec<Bottleneck<B>> = (0..count)
                .map(|i| {
                    let block = Bottleneck::new(in_channels, planes, if i == 0 { stride } else { 1 }, device);
                    in_channels = planes * EXPANSION;
                    block
                })
                .collect();
            blocks
        };
        let layer1 = stage(base, self.blocks[0], 1);
        let layer2 = stage(base * 2, self.blocks[1], 2);
        let layer3 = stage(base * 4, self.blocks[2], 2);

        ResNetTrunk {
            conv1,
            bn1: init::batch_norm(base, device),
            maxpool,
            layer1,
            layer2,
            layer3,
        }
    }
}

#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

#[derive(Module, Debug)]
pub struct Bottleneck<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub conv3: Conv2d<B>,
    pub bn3: BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
}

impl<B: Backend> Bottleneck<B> {
    fn new(in_channels: usize, planes: usize, stride: usize, device: &B::Device) -> Self {
        let out_channels = planes * EXPANSION;
        let conv = |cin: usize, cout: usize, k: usize, s: usize, p: usize| {
            init::conv2d(
                Conv2dConfig::new([cin, cout], [k, k])
                    .with_stride([s, s])
                    .with_padding(PaddingConfig2d::Explicit(p, p))
                    .with_bias(false),
                device,
            )
        };

        let downsample = (stride != 1 || in_channels != out_channels).then(|| Downsample {
            conv: conv(in_channels, out_channels, 1, stride, 0),
            bn: init::batch_norm(out_channels, device),
        });

        Self {
            conv1: conv(in_channels, planes, 1, 1, 0),
            bn1: init::batch_norm(planes, device),
            conv2: conv(planes, planes, 3, stride, 1),
            bn2: init::batch_norm(planes, device),
            conv3: conv(planes, out_channels, 1, 1, 0),
            bn3: init::batch_norm(out_channels, device),
            downsample,
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(ds) => ds.bn.forward(ds.conv.forward(x.clone())),
            None => x.clone(),
        };

        let out = relu(self.bn1.forward(self.conv1.forward(x)));
        let out = relu(self.bn2.forward(self.conv2.forward(out)));
        let out = self.bn3.forward(self.conv3.forward(out));
        relu(out + identity)
    }
}

#[derive(Module, Debug)]
pub struct ResNetTrunk<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub maxpool: MaxPool2d,
    pub layer1: Vec<Bottleneck<B>>,
    pub layer2: Vec<Bottleneck<B>>,
    pub layer3: Vec<Bottleneck<B>>,
}

impl<B: Backend> ResNetTrunk<B> {
    /// images: [N, 3, H, W] → features: [N, 16·base, ⌈H/16⌉, ⌈W/16⌉]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = relu(self.bn1.forward(self.conv1.forward(images)));
        let mut x = self.maxpool.forward(x);
        for block in self.layer1.iter().chain(&self.layer2).chain(&self.layer3) {
            x = block.forward(x);
        }
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn tiny() -> ResNetTrunkConfig {
        ResNetTrunkConfig::new().with_blocks([1, 1, 1]).with_base_width(4)
    }

    #[test]
    fn test_resnet50_defaults() {
        let cfg = ResNetTrunkConfig::new();
        assert_eq!(cfg.blocks, [3, 4, 6]);
        assert_eq!(cfg.out_channels(), 1024);
        assert_eq!(cfg.output_size([50, 200]), [4, 13]);
    }

    #[test]
    fn test_forward_shape_matches_output_size() {
        let device = Default::default();
        let cfg = tiny();
        let trunk = cfg.init::<B>(&device);
        let x = Tensor::<B, 4>::zeros([2, 3, 50, 200], &device);
        let out = trunk.forward(x);
        let [h, w] = cfg.output_size([50, 200]);
        assert_eq!(out.dims(), [2, cfg.out_channels(), h, w]);
    }

    #[test]
    fn test_first_block_of_each_stage_projects() {
        let device = Default::default();
        let trunk = ResNetTrunkConfig::new()
            .with_blocks([2, 1, 1])
            .with_base_width(4)
            .init::<B>(&device);
        assert!(trunk.layer1[0].downsample.is_some());
        assert!(trunk.layer1[1].downsample.is_none());
        assert!(trunk.layer2[0].downsample.is_some());
    }
}
