use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::weights::WeightLoader;

/// 1×1 convolution + batch norm on the shortcut when the residual changes shape.
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_channels).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }

    pub(crate) fn load_weights(self, loader: &mut WeightLoader<'_>, prefix: &str) -> Self {
        Self {
            conv: loader.conv2d(self.conv, &format!("{prefix}.0")),
            bn: loader.batch_norm(self.bn, &format!("{prefix}.1")),
        }
    }
}

/// Two 3×3 convolutions with an identity (or projected) shortcut.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    downsample: Option<Downsample<B>>,
    activation: Relu,
}

#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    in_channels: usize,
    out_channels: usize,
    #[config(default = "1")]
    stride: usize,
}

impl BasicBlockConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BasicBlock<B> {
        let downsample = (self.stride != 1 || self.in_channels != self.out_channels)
            .then(|| Downsample::new(self.in_channels, self.out_channels, self.stride, device));

        BasicBlock {
            conv1: conv3x3(self.in_channels, self.out_channels, self.stride, device),
            bn1: BatchNormConfig::new(self.out_channels).init(device),
            conv2: conv3x3(self.out_channels, self.out_channels, 1, device),
            bn2: BatchNormConfig::new(self.out_channels).init(device),
            downsample,
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> BasicBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.conv1.forward(x);
        let out = self.bn1.forward(out);
        let out = self.activation.forward(out);

        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        self.activation.forward(out + identity)
    }

    pub(crate) fn load_weights(self, loader: &mut WeightLoader<'_>, prefix: &str) -> Self {
        Self {
            conv1: loader.conv2d(self.conv1, &format!("{prefix}.conv1")),
            bn1: loader.batch_norm(self.bn1, &format!("{prefix}.bn1")),
            conv2: loader.conv2d(self.conv2, &format!("{prefix}.conv2")),
            bn2: loader.batch_norm(self.bn2, &format!("{prefix}.bn2")),
            downsample: self
                .downsample
                .map(|d| d.load_weights(loader, &format!("{prefix}.downsample"))),
            activation: self.activation,
        }
    }
}

/// 3×3 convolution with padding 1 and no bias.
pub fn conv3x3<B: Backend>(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_channels, out_channels], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::tensor::Distribution;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_strided_block_halves_resolution() {
        let device = Default::default();
        let block = BasicBlockConfig::new(8, 16).with_stride(2).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random([2, 8, 10, 10], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [2, 16, 5, 5]);
    }

    #[test]
    fn test_identity_block_keeps_shape() {
        let device = Default::default();
        let block = BasicBlockConfig::new(8, 8).init::<TestBackend>(&device);
        let x = Tensor::<TestBackend, 4>::random([1, 8, 7, 7], Distribution::Normal(0.0, 1.0), &device);
        assert_eq!(block.forward(x).dims(), [1, 8, 7, 7]);
    }
}
