// ============================================================
// Layer 5 — Weight Initialisation
// ============================================================
// Every conv / linear layer in the reader starts from
// Xavier-uniform weights and a constant 0.01 bias. Batch norms
// start with gamma ~ N(1.0, 0.02) and beta = 0.
//
// Burn configures initialisers per layer config, but applies
// the same initialiser to the bias; the bias is overwritten
// after init.

use burn::{
    module::Param,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig,
    },
    prelude::*,
    tensor::Distribution,
};

pub const BIAS_FILL: f64 = 0.01;
pub const BN_GAMMA_MEAN: f64 = 1.0;
pub const BN_GAMMA_STD: f64 = 0.02;

fn xavier() -> Initializer {
    Initializer::XavierUniform { gain: 1.0 }
}

fn constant_bias<B: Backend>(bias: Option<Param<Tensor<B, 1>>>, device: &B::Device) -> Option<Param<Tensor<B, 1>>> {
    bias.map(|b| {
        let [n] = b.dims();
        Param::from_tensor(Tensor::full([n], BIAS_FILL, device))
    })
}

pub fn conv2d<B: Backend>(config: Conv2dConfig, device: &B::Device) -> Conv2d<B> {
    let mut conv = config.with_initializer(xavier()).init(device);
    conv.bias = constant_bias(conv.bias, device);
    conv
}

pub fn linear<B: Backend>(d_input: usize, d_output: usize, device: &B::Device) -> Linear<B> {
    let mut layer = LinearConfig::new(d_input, d_output)
        .with_initializer(xavier())
        .init(device);
    layer.bias = constant_bias(layer.bias, device);
    layer
}

pub fn batch_norm<B: Backend>(channels: usize, device: &B::Device) -> BatchNorm<B, 2> {
    let mut bn: BatchNorm<B, 2> = BatchNormConfig::new(channels).init(device);
    bn.gamma = Param::from_tensor(Tensor::random(
        [channels],
        Distribution::Normal(BN_GAMMA_MEAN, BN_GAMMA_STD),
        device,
    ));
    bn.beta = Param::from_tensor(Tensor::zeros([channels], device));
    bn
}
