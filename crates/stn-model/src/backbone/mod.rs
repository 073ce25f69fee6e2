//! Residual backbone feeding the cascade.
//!
//! A ResNet-18 style stem followed by three residual layers. Layer `i`
//! outputs `base_width * 2^(i-1)` channels; the first layer keeps the
//! post-stem resolution and the next two halve it.
//!
//! ```text
//! input [B, 3, S, S]
//!   stem: conv7x7/2 -> BN -> ReLU -> maxpool3x3/2   [B, 64, S/4, S/4]
//!   layer1 (stride 1)                               [B, 64, S/4, S/4]
//!   layer2 (stride 2)                               [B, 128, S/8, S/8]
//!   layer3 (stride 2)                               [B, 256, S/16, S/16]
//! ```

pub mod block;

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

use crate::weights::WeightLoader;
pub use block::{BasicBlock, BasicBlockConfig, Downsample};

/// Number of residual layers paired with a transformer stage.
pub const NUM_STAGES: usize = 3;

#[derive(Config, Debug, PartialEq)]
pub struct BackboneConfig {
    /// Basic blocks per residual layer.
    #[config(default = "vec![2, 2, 2]")]
    pub blocks: Vec<usize>,
    /// Channel width of the stem and the first layer.
    #[config(default = "64")]
    pub base_width: usize,
}

impl BackboneConfig {
    /// Output channels of residual layer `index` (0-based).
    pub fn stage_channels(&self, index: usize) -> usize {
        self.base_width << index
    }

    /// Stride of residual layer `index` (0-based).
    pub fn stage_stride(&self, index: usize) -> usize {
        if index == 0 {
            1
        } else {
            2
        }
    }

    /// Spatial size after the stem for a square input of side `input_size`.
    pub fn stem_output_size(&self, input_size: usize) -> usize {
        let after_conv = conv_output_size(input_size, 7, 2, 3);
        conv_output_size(after_conv, 3, 2, 1)
    }

    /// Spatial size after each residual layer.
    pub fn stage_sizes(&self, input_size: usize) -> [usize; NUM_STAGES] {
        let mut size = self.stem_output_size(input_size);
        let mut sizes = [0; NUM_STAGES];
        for (index, slot) in sizes.iter_mut().enumerate() {
            size = conv_output_size(size, 3, self.stage_stride(index), 1);
            *slot = size;
        }
        sizes
    }
}

/// Output length of a convolution or pooling window along one axis.
pub fn conv_output_size(size: usize, kernel: usize, stride: usize, padding: usize) -> usize {
    (size + 2 * padding).saturating_sub(kernel) / stride + 1
}

/// conv7x7/2 -> BN -> ReLU -> maxpool3x3/2
#[derive(Module, Debug)]
pub struct Stem<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    pool: MaxPool2d,
    activation: Relu,
}

impl<B: Backend> Stem<B> {
    pub fn new(in_channels: usize, width: usize, device: &B::Device) -> Self {
        Self {
            conv1: Conv2dConfig::new([in_channels, width], [7, 7])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(3, 3))
                .with_bias(false)
                .init(device),
            bn1: BatchNormConfig::new(width).init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            activation: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        self.pool.forward(x)
    }

    pub(crate) fn load_weights(self, loader: &mut WeightLoader<'_>) -> Self {
        Self {
            conv1: loader.conv2d(self.conv1, "conv1"),
            bn1: loader.batch_norm(self.bn1, "bn1"),
            pool: self.pool,
            activation: self.activation,
        }
    }
}

/// A sequence of basic blocks; only the first one may change shape.
#[derive(Module, Debug)]
pub struct ResidualLayer<B: Backend> {
    blocks: Vec<BasicBlock<B>>,
}

impl<B: Backend> ResidualLayer<B> {
    pub fn new(in_channels: usize, out_channels: usize, blocks: usize, stride: usize, device: &B::Device) -> Self {
        let blocks = (0..blocks.max(1))
            .map(|i| {
                if i == 0 {
                    BasicBlockConfig::new(in_channels, out_channels)
                        .with_stride(stride)
                        .init(device)
                } else {
                    BasicBlockConfig::new(out_channels, out_channels).init(device)
                }
            })
            .collect();
        Self { blocks }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.blocks.iter().fold(x, |x, block| block.forward(x))
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    pub(crate) fn load_weights(self, loader: &mut WeightLoader<'_>, prefix: &str) -> Self {
        let blocks = self
            .blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| block.load_weights(loader, &format!("{prefix}.{i}")))
            .collect();
        Self { blocks }
    }
}
