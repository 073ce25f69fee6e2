use burn::{module::Ignored, prelude::*};
use stn_core::{GridSamplerConfig, StnError, TransformFamily};

use crate::backbone::{BackboneConfig, ResidualLayer, Stem, NUM_STAGES};
use crate::cascade::{Cascade, CascadeOutput, CascadeStage};
use crate::context::ExecutionContext;
use crate::predictor::StagePredictorConfig;
use crate::weights::{LoadReport, WeightLoader, WeightSet};

/// Output of [`StnResNet::forward`]; `features` feeds a classification head.
pub type StnResNetOutput<B> = CascadeOutput<B>;

#[derive(Config, Debug)]
pub struct StnResNetConfig {
    /// Transform family used by every stage.
    #[config(default = "String::from(\"affine\")")]
    pub stn_mode: String,
    /// Per-stage families; overrides `stn_mode` when set.
    #[config(default = "None")]
    pub stage_modes: Option<Vec<String>>,
    #[config(default = "224")]
    pub input_size: usize,
    #[config(default = "3")]
    pub in_channels: usize,
    #[config(default = "BackboneConfig::new()")]
    pub backbone: BackboneConfig,
    #[config(default = "1024")]
    pub predictor_hidden: usize,
    #[config(default = "64")]
    pub predictor_channels: usize,
    #[config(default = "16")]
    pub predictor_reduced_channels: usize,
    #[config(default = "GridSamplerConfig::default()")]
    pub sampler: GridSamplerConfig,
}

impl StnResNetConfig {
    /// Parse the transform family of every stage.
    pub fn resolve_modes(&self) -> stn_core::Result<[TransformFamily; NUM_STAGES]> {
        match &self.stage_modes {
            None => {
                let family: TransformFamily = self.stn_mode.parse()?;
                Ok([family; NUM_STAGES])
            }
            Some(names) if names.len() != NUM_STAGES => Err(StnError::invalid_configuration(format!(
                "expected {} stage modes, got {}",
                NUM_STAGES,
                names.len()
            ))),
            Some(names) => {
                let mut modes = [TransformFamily::Affine; NUM_STAGES];
                for (slot, name) in modes.iter_mut().zip(names) {
                    *slot = name.parse()?;
                }
                Ok(modes)
            }
        }
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> stn_core::Result<StnResNet<B>> {
        let modes = self.resolve_modes()?;

        if self.backbone.blocks.len() != NUM_STAGES {
            return Err(StnError::invalid_configuration(format!(
                "backbone needs {} block counts, got {:?}",
                NUM_STAGES, self.backbone.blocks
            )));
        }
        if self.input_size == 0 || self.in_channels == 0 || self.backbone.base_width == 0 {
            return Err(StnError::invalid_configuration(format!(
                "input size, input channels and base width must be non-zero, got {}, {}, {}",
                self.input_size, self.in_channels, self.backbone.base_width
            )));
        }

        let sizes = self.backbone.stage_sizes(self.input_size);
        let stem = Stem::new(self.in_channels, self.backbone.base_width, device);

        let mut stages = Vec::with_capacity(NUM_STAGES);
        let mut in_channels = self.backbone.base_width;
        for (index, family) in modes.iter().enumerate() {
            let out_channels = self.backbone.stage_channels(index);
            let layer = ResidualLayer::new(
                in_channels,
                out_channels,
                self.backbone.blocks[index],
                self.backbone.stage_stride(index),
                device,
            );
            let predictor = StagePredictorConfig::new(out_channels, sizes[index], *family)
                .with_hidden(self.predictor_hidden)
                .with_channels(self.predictor_channels)
                .with_reduced_channels(self.predictor_reduced_channels)
                .init(device)?;
            stages.push(CascadeStage::new(layer, predictor));
            in_channels = out_channels;
        }

        tracing::info!(
            "Built StnResNet: input {}x{}, stage modes {:?}, stage sizes {:?}",
            self.input_size,
            self.input_size,
            modes.map(|m| m.name()),
            sizes
        );

        Ok(StnResNet {
            stem,
            cascade: Cascade::new(stages, self.sampler),
            modes: Ignored(modes),
            in_channels: self.in_channels,
            input_size: self.input_size,
        })
    }
}

/// ResNet backbone with a spatial transformer after each of its three
/// residual layers.
#[derive(Module, Debug)]
pub struct StnResNet<B: Backend> {
    stem: Stem<B>,
    cascade: Cascade<B>,
    modes: Ignored<[TransformFamily; NUM_STAGES]>,
    in_channels: usize,
    input_size: usize,
}

impl<B: Backend> StnResNet<B> {
    /// Run the stem and the cascade on a batch `[B, C, S, S]`.
    pub fn forward(&self, x: Tensor<B, 4>, ctx: &ExecutionContext<B>) -> stn_core::Result<StnResNetOutput<B>> {
        let [batch, channels, h, w] = x.dims();
        if channels != self.in_channels || h != self.input_size || w != self.input_size {
            return Err(StnError::shape_mismatch(
                [batch, self.in_channels, self.input_size, self.input_size],
                [batch, channels, h, w],
            ));
        }

        let x = self.stem.forward(x);
        self.cascade.forward(x, ctx)
    }

    pub fn stage_modes(&self) -> [TransformFamily; NUM_STAGES] {
        *self.modes
    }

    pub fn cascade(&self) -> &Cascade<B> {
        &self.cascade
    }

    /// Copy matching backbone parameters from `weights`.
    ///
    /// Predictor weights are never touched. Keys without a matching
    /// parameter, or with a different shape, end up in
    /// [`LoadReport::skipped`].
    pub fn load_pretrained(self, weights: &WeightSet) -> (Self, LoadReport) {
        let mut loader = WeightLoader::new(weights);
        let stem = self.stem.load_weights(&mut loader);
        let cascade = self.cascade.load_weights(&mut loader);
        let report = loader.finish();

        tracing::info!(
            "Loaded pretrained weights: {} applied, {} skipped",
            report.applied.len(),
            report.skipped.len()
        );

        let model = Self {
            stem,
            cascade,
            modes: self.modes,
            in_channels: self.in_channels,
            input_size: self.input_size,
        };
        (model, report)
    }
}
