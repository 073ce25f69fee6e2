//! Localisation network of one transformer stage.
//!
//! Two conv/BN/ReLU/max-pool blocks shrink the feature map, a two-layer
//! head regresses the raw parameters of a [`TransformFamily`]. The last
//! layer starts with zero weights and the family's identity encoding as
//! bias, so an untrained predictor always outputs the identity transform.

use burn::{
    module::{Ignored, Param},
    nn::{
        conv::Conv2d,
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Initializer, Linear, LinearConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};
use stn_core::{StnError, TransformFamily};

use crate::backbone::block::conv3x3;
use crate::backbone::conv_output_size;

#[derive(Config, Debug)]
pub struct StagePredictorConfig {
    /// Channels of the incoming feature map.
    pub in_channels: usize,
    /// Side length of the (square) incoming feature map.
    pub input_size: usize,
    /// Transform family whose parameters are regressed.
    pub family: TransformFamily,
    /// Width of the hidden fully-connected layer.
    #[config(default = "1024")]
    pub hidden: usize,
    /// Channels after the first convolution.
    #[config(default = "64")]
    pub channels: usize,
    /// Channels after the second convolution.
    #[config(default = "16")]
    pub reduced_channels: usize,
}

impl StagePredictorConfig {
    /// Side length of the map after both pooling layers.
    pub fn pooled_size(&self) -> usize {
        let once = conv_output_size(self.input_size, 3, 2, 1);
        conv_output_size(once, 3, 2, 1)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> stn_core::Result<StagePredictor<B>> {
        let sizes = [
            self.in_channels,
            self.input_size,
            self.hidden,
            self.channels,
            self.reduced_channels,
        ];
        if sizes.contains(&0) {
            return Err(StnError::invalid_configuration(format!(
                "stage predictor needs non-zero sizes, got in_channels={} input_size={} hidden={} channels={} reduced_channels={}",
                self.in_channels, self.input_size, self.hidden, self.channels, self.reduced_channels
            )));
        }

        let pooled = self.pooled_size();
        let flattened = self.reduced_channels * pooled * pooled;
        let n_params = self.family.n_params();

        let mut fc2 = LinearConfig::new(self.hidden, n_params)
            .with_initializer(Initializer::Zeros)
            .init(device);
        fc2.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(self.family.identity_params(), [n_params]),
            device,
        )));

        Ok(StagePredictor {
            conv1: conv3x3(self.in_channels, self.channels, 1, device),
            bn1: BatchNormConfig::new(self.channels).init(device),
            conv2: conv3x3(self.channels, self.reduced_channels, 1, device),
            bn2: BatchNormConfig::new(self.reduced_channels).init(device),
            pool: MaxPool2dConfig::new([3, 3])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(),
            fc1: LinearConfig::new(flattened, self.hidden).init(device),
            fc2,
            activation: Relu::new(),
            family: Ignored(self.family),
            in_channels: self.in_channels,
            input_size: self.input_size,
        })
    }
}

#[derive(Module, Debug)]
pub struct StagePredictor<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    conv2: Conv2d<B>,
    bn2: BatchNorm<B, 2>,
    pool: MaxPool2d,
    fc1: Linear<B>,
    fc2: Linear<B>,
    activation: Relu,
    family: Ignored<TransformFamily>,
    in_channels: usize,
    input_size: usize,
}

impl<B: Backend> StagePredictor<B> {
    /// Raw parameters `[B, k]` for a feature map `[B, C, S, S]`.
    pub fn forward(&self, x: Tensor<B, 4>) -> stn_core::Result<Tensor<B, 2>> {
        let [batch, channels, h, w] = x.dims();
        if channels != self.in_channels || h != self.input_size || w != self.input_size {
            return Err(StnError::shape_mismatch(
                [batch, self.in_channels, self.input_size, self.input_size],
                [batch, channels, h, w],
            ));
        }

        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);
        let x = self.activation.forward(x);
        let x = self.pool.forward(x);

        let x = x.flatten::<2>(1, 3);
        let x = self.fc1.forward(x);
        let x = self.activation.forward(x);

        Ok(self.fc2.forward(x))
    }

    /// Affine matrices `[B, 2, 3]` for a feature map `[B, C, S, S]`.
    pub fn predict_theta(&self, x: Tensor<B, 4>) -> stn_core::Result<Tensor<B, 3>> {
        let raw = self.forward(x)?;
        self.family.build_theta(raw)
    }

    pub fn family(&self) -> TransformFamily {
        *self.family
    }

    /// Spatial size the predictor was built for.
    pub fn input_size(&self) -> usize {
        self.input_size
    }

    #[cfg(test)]
    pub(crate) fn output_layer(&self) -> &Linear<B> {
        &self.fc2
    }

    #[cfg(test)]
    pub(crate) fn with_output_bias(mut self, values: Vec<f32>) -> Self {
        let device = self.fc2.weight.val().device();
        let len = values.len();
        self.fc2.bias = Some(Param::from_tensor(Tensor::from_data(
            TensorData::new(values, [len]),
            &device,
        )));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_pooled_size() {
        let config = StagePredictorConfig::new(64, 56, TransformFamily::Affine);
        assert_eq!(config.pooled_size(), 14);
        let config = StagePredictorConfig::new(256, 14, TransformFamily::Affine);
        assert_eq!(config.pooled_size(), 4);
        let config = StagePredictorConfig::new(8, 1, TransformFamily::Affine);
        assert_eq!(config.pooled_size(), 1);
    }

    #[test]
    fn test_final_layer_initialised_to_identity_encoding() {
        let device = Default::default();
        let predictor = StagePredictorConfig::new(4, 8, TransformFamily::RotationScale)
            .with_hidden(32)
            .init::<TestBackend>(&device)
            .unwrap();

        let weight = predictor.fc2.weight.val().into_data().to_vec::<f32>().unwrap();
        assert!(weight.iter().all(|w| *w == 0.0));
        let bias = predictor.fc2.bias.as_ref().unwrap().val().into_data().to_vec::<f32>().unwrap();
        assert_eq!(bias, vec![0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_zero_sized_config_rejected() {
        let device = Default::default();
        let configs = [
            StagePredictorConfig::new(0, 8, TransformFamily::Scale),
            StagePredictorConfig::new(4, 8, TransformFamily::Scale).with_channels(0),
            StagePredictorConfig::new(4, 8, TransformFamily::Scale).with_reduced_channels(0),
        ];
        for config in configs {
            let result = config.init::<TestBackend>(&device);
            assert!(matches!(result, Err(StnError::InvalidConfiguration(_))), "{config}");
        }
    }

    #[test]
    fn test_config_file_round_trip() {
        let path = std::env::temp_dir().join(format!("stn_predictor_config_{}.json", std::process::id()));
        let config = StagePredictorConfig::new(32, 14, TransformFamily::RotationTranslation).with_hidden(128);

        config.save(&path).unwrap();
        let loaded = StagePredictorConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.family, TransformFamily::RotationTranslation);
        assert_eq!((loaded.in_channels, loaded.input_size, loaded.hidden), (32, 14, 128));
        assert_eq!(loaded.reduced_channels, 16);
    }
}
