// ============================================================
// Layer 5 — CRNN Model
// ============================================================
// Reads a rendered activation plot as a sequence of columns:
//
//   images [N, 3, H, W]
//     │ ResNet trunk (through layer3)       [N, 1024, h', w']
//     │ conv 3×6 pad 1 → BN → dropout → ReLU [N, 256, h, w]
//     │ permute → [N, w, 256, h], reshape    [N, T = w, 256·h]
//     │ linear1                               [N, T, hidden]
//     │ bidirectional LSTM / GRU, halves summed
//     │ linear2                               [N, T, classes]
//     ▼ swap to time-major                    [T, N, classes]
//
// The trunk is built (or loaded) outside and handed to
// init_with_backbone, so the same construction works for
// randomly initialised, ImageNet-initialised and tiny test trunks.
//
// Reference: Shi et al. (2016) CRNN, Graves et al. (2006) CTC

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        gru::{Gru, GruConfig},
        lstm::{BiLstm, BiLstmConfig},
        BatchNorm, Dropout, DropoutConfig, Linear, PaddingConfig2d,
    },
    prelude::*,
    tensor::activation::relu,
};
use serde::{Deserialize, Serialize};

use crate::ml::backbone::{ResNetTrunk, ResNetTrunkConfig};
use crate::ml::init;

pub const HEAD_KERNEL: [usize; 2] = [3, 6];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RnnKind {
    Lstm,
    Gru,
}

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize.
#[derive(Config, Debug)]
pub struct CrnnConfig {
    /// Vocabulary size including the blank
    pub num_chars: usize,
    #[config(default = 256)]
    pub rnn_hidden: usize,
    #[config(default = "RnnKind::Lstm")]
    pub rnn: RnnKind,
    #[config(default = 0.2)]
    pub dropout: f64,
    #[config(default = 50)]
    pub image_height: usize,
    #[config(default = 200)]
    pub image_width: usize,
    #[config(default = 256)]
    pub head_channels: usize,
    #[config(default = "ResNetTrunkConfig::new()")]
    pub trunk: ResNetTrunkConfig,
}

impl CrnnConfig {
    /// `(h, w)` of the head output; `w` is the number of CTC time steps.
    pub fn feature_dims(&self) -> (usize, usize) {
        let [h, w] = self.trunk.output_size([self.image_height, self.image_width]);
        // kernel (3, 6), padding 1, stride 1
        let h = (h + 2).saturating_sub(HEAD_KERNEL[0]) + 1;
        let w = (w + 2).saturating_sub(HEAD_KERNEL[1]) + 1;
        (h, w)
    }

    pub fn time_steps(&self) -> usize {
        self.feature_dims().1
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Crnn<B> {
        self.init_with_backbone(self.trunk.init(device), device)
    }

    /// Custom init covers the head and RNN only; `trunk` keeps its weights.
    pub fn init_with_backbone<B: Backend>(&self, trunk: ResNetTrunk<B>, device: &B::Device) -> Crnn<B> {
        let (h, _) = self.feature_dims();
        let head_conv = init::conv2d(
            Conv2dConfig::new([self.trunk.out_channels(), self.head_channels], HEAD_KERNEL)
                .with_padding(PaddingConfig2d::Explicit(1, 1)),
            device,
        );
        let rnn = match self.rnn {
            RnnKind::Lstm => SequenceRnn {
                lstm: Some(BiLstmConfig::new(self.rnn_hidden, self.rnn_hidden, true).init(device)),
                gru: None,
            },
            RnnKind::Gru => SequenceRnn {
                lstm: None,
                gru: Some(BiGru {
                    forward_gru: GruConfig::new(self.rnn_hidden, self.rnn_hidden, true).init(device),
                    backward_gru: GruConfig::new(self.rnn_hidden, self.rnn_hidden, true).init(device),
                }),
            },
        };

        Crnn {
            trunk,
            head_conv,
            head_bn: init::batch_norm(self.head_channels, device),
            dropout: DropoutConfig::new(self.dropout).init(),
            linear1: init::linear(self.head_channels * h, self.rnn_hidden, device),
            rnn,
            linear2: init::linear(self.rnn_hidden, self.num_chars, device),
        }
    }
}

/// Burn only ships a unidirectional GRU; the backward direction runs
/// a second GRU over the time-reversed sequence.
#[derive(Module, Debug)]
pub struct BiGru<B: Backend> {
    pub forward_gru: Gru<B>,
    pub backward_gru: Gru<B>,
}

#[derive(Module, Debug)]
pub struct SequenceRnn<B: Backend> {
    pub lstm: Option<BiLstm<B>>,
    pub gru: Option<BiGru<B>>,
}

impl<B: Backend> SequenceRnn<B> {
    /// x: [N, T, hidden] → [N, T, hidden], forward + backward summed
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        match (&self.lstm, &self.gru) {
            (Some(lstm), _) => {
                let (out, _) = lstm.forward(x, None);
                let [n, t, two_h] = out.dims();
                let h = two_h / 2;
                out.clone().slice([0..n, 0..t, 0..h]) + out.slice([0..n, 0..t, h..two_h])
            }
            (None, Some(gru)) => {
                let fwd = gru.forward_gru.forward(x.clone(), None);
                let bwd = gru.backward_gru.forward(x.flip([1]), None).flip([1]);
                fwd + bwd
            }
            (None, None) => x,
        }
    }
}

#[derive(Module, Debug)]
pub struct Crnn<B: Backend> {
    pub trunk: ResNetTrunk<B>,
    pub head_conv: Conv2d<B>,
    pub head_bn: BatchNorm<B, 2>,
    pub dropout: Dropout,
    pub linear1: Linear<B>,
    pub rnn: SequenceRnn<B>,
    pub linear2: Linear<B>,
}

impl<B: Backend> Crnn<B> {
    /// images: [N, 3, H, W] → logits: [T, N, num_chars]
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 3> {
        let x = self.trunk.forward(images);

        let x = self.head_conv.forward(x);
        let x = self.head_bn.forward(x);
        let x = relu(self.dropout.forward(x));

        // Columns become time steps: [N, C, h, w] → [N, w, C·h]
        let [n, c, h, w] = x.dims();
        let x = x.permute([0, 3, 1, 2]).reshape([n, w, c * h]);

        let x = self.linear1.forward(x);
        let x = self.rnn.forward(x);
        let x = self.linear2.forward(x); // [N, T, classes]

        x.swap_dims(0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray;

    fn tiny(rnn: RnnKind) -> CrnnConfig {
        CrnnConfig::new(5)
            .with_rnn(rnn)
            .with_rnn_hidden(8)
            .with_head_channels(6)
            .with_trunk(ResNetTrunkConfig::new().with_blocks([1, 1, 1]).with_base_width(4))
    }

    #[test]
    fn test_default_feature_dims() {
        let cfg = CrnnConfig::new(12);
        assert_eq!(cfg.feature_dims(), (4, 10));
        assert_eq!(cfg.time_steps(), 10);
        // 256 channels × 4 rows feed linear1
        assert_eq!(cfg.head_channels * cfg.feature_dims().0, 1024);
    }

    #[test]
    fn test_lstm_output_is_time_major() {
        let device = Default::default();
        let cfg = tiny(RnnKind::Lstm);
        let model = cfg.init::<B>(&device);
        let logits = model.forward(Tensor::zeros([2, 3, 50, 200], &device));
        assert_eq!(logits.dims(), [cfg.time_steps(), 2, 5]);
    }

    #[test]
    fn test_gru_output_is_time_major() {
        let device = Default::default();
        let cfg = tiny(RnnKind::Gru);
        let model = cfg.init::<B>(&device);
        let logits = model.forward(Tensor::zeros([3, 3, 50, 200], &device));
        assert_eq!(logits.dims(), [10, 3, 5]);
    }

    #[test]
    fn test_injected_backbone_is_used() {
        let device = Default::default();
        let cfg = tiny(RnnKind::Lstm);
        let trunk = cfg.trunk.init::<B>(&device);
        let model = cfg.init_with_backbone(trunk, &device);
        assert_eq!(model.linear1.weight.dims(), [6 * 4, 8]);
    }

    #[test]
    fn test_injected_backbone_weights_are_untouched() {
        let device = Default::default();
        let cfg = tiny(RnnKind::Lstm);
        let trunk = cfg.trunk.init::<B>(&device);
        let before: Vec<f32> = trunk.conv1.weight.val().into_data().to_vec().unwrap();
        let model = cfg.init_with_backbone(trunk, &device);
        let after: Vec<f32> = model.trunk.conv1.weight.val().into_data().to_vec().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_rnn_kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RnnKind::Gru).unwrap(), "\"gru\"");
    }
}
