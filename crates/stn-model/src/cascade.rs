//! Three residual layers, each followed by a spatial transformer.
//!
//! After layer `i` the predictor estimates `theta_i`, the feature map is
//! warped by it and handed to layer `i + 1`. When diagnostics are enabled,
//! `theta_i` is also inverted and the warped map is pulled back through
//! `theta_i^-1, ..., theta_1^-1` into the post-stem reference frame. That
//! path is detached and never feeds the classification features.

use std::collections::BTreeSet;

use burn::{module::Ignored, prelude::*};
use stn_core::{invert_theta, GridSamplerConfig, InverseTheta, Resampler, Result};

use crate::backbone::ResidualLayer;
use crate::context::ExecutionContext;
use crate::predictor::StagePredictor;
use crate::weights::WeightLoader;

/// Inverse reconstruction of one stage.
#[derive(Debug, Clone)]
pub struct StageReconstruction<B: Backend> {
    /// 1-based stage index.
    pub stage: usize,
    /// Warped map of this stage mapped back by every inverse up to stage 1.
    pub features: Tensor<B, 4>,
    /// Samples whose chain contains a singular matrix; their values are NaN.
    pub singular_samples: Vec<usize>,
}

/// Result of a cascade forward pass.
#[derive(Debug, Clone)]
pub struct CascadeOutput<B: Backend> {
    /// Warped output of the last stage.
    pub features: Tensor<B, 4>,
    /// Predicted `[B, 2, 3]` matrix of every stage.
    pub thetas: Vec<Tensor<B, 3>>,
    /// Diagnostic reconstructions, one per stage, when enabled.
    pub reconstructions: Option<Vec<StageReconstruction<B>>>,
}

#[derive(Module, Debug)]
pub struct CascadeStage<B: Backend> {
    layer: ResidualLayer<B>,
    predictor: StagePredictor<B>,
}

impl<B: Backend> CascadeStage<B> {
    pub fn new(layer: ResidualLayer<B>, predictor: StagePredictor<B>) -> Self {
        Self { layer, predictor }
    }

    pub fn predictor(&self) -> &StagePredictor<B> {
        &self.predictor
    }
}

#[derive(Module, Debug)]
pub struct Cascade<B: Backend> {
    stages: Vec<CascadeStage<B>>,
    sampler: Ignored<GridSamplerConfig>,
}

impl<B: Backend> Cascade<B> {
    pub fn new(stages: Vec<CascadeStage<B>>, sampler: GridSamplerConfig) -> Self {
        Self {
            stages,
            sampler: Ignored(sampler),
        }
    }

    pub fn stages(&self) -> &[CascadeStage<B>] {
        &self.stages
    }

    pub fn forward(&self, x: Tensor<B, 4>, ctx: &ExecutionContext<B>) -> Result<CascadeOutput<B>> {
        let resampler = Resampler::new(*self.sampler);
        let diagnostic_device = ctx.diagnostic_device(&x.device());

        let mut x = x;
        let mut thetas = Vec::with_capacity(self.stages.len());
        let mut inverses: Vec<InverseTheta<B>> = Vec::with_capacity(self.stages.len());
        let mut reconstructions = Vec::with_capacity(self.stages.len());

        for (index, stage) in self.stages.iter().enumerate() {
            let features = stage.layer.forward(x);
            let theta = stage.predictor.predict_theta(features.clone())?;
            let warped = resampler.apply(features, theta.clone())?;
            tracing::debug!(
                "Stage {} ({}): warped features {:?}",
                index + 1,
                stage.predictor.family(),
                warped.dims()
            );

            if ctx.diagnostics {
                inverses.push(invert_theta(theta.clone(), &diagnostic_device)?);
                reconstructions.push(reconstruct(
                    &resampler,
                    warped.clone(),
                    &inverses,
                    &diagnostic_device,
                )?);
            }

            thetas.push(theta);
            x = warped;
        }

        Ok(CascadeOutput {
            features: x,
            thetas,
            reconstructions: ctx.diagnostics.then_some(reconstructions),
        })
    }

    pub(crate) fn load_weights(self, loader: &mut WeightLoader<'_>) -> Self {
        let stages = self
            .stages
            .into_iter()
            .enumerate()
            .map(|(i, stage)| CascadeStage {
                layer: stage.layer.load_weights(loader, &format!("layer{}", i + 1)),
                predictor: stage.predictor,
            })
            .collect();
        Self {
            stages,
            sampler: self.sampler,
        }
    }
}

/// Undo the most recent transform first, then every earlier one.
fn reconstruct<B: Backend>(
    resampler: &Resampler,
    warped: Tensor<B, 4>,
    inverses: &[InverseTheta<B>],
    device: &B::Device,
) -> Result<StageReconstruction<B>> {
    let mut features = warped.detach().to_device(device);
    let mut singular = BTreeSet::new();

    for inverse in inverses.iter().rev() {
        features = resampler.apply(features, inverse.theta.clone())?;
        singular.extend(inverse.singular.iter().copied());
    }

    if !singular.is_empty() {
        let batch = features.dims()[0];
        let offsets: Vec<f32> = (0..batch)
            .map(|i| if singular.contains(&i) { f32::NAN } else { 0.0 })
            .collect();
        let offsets = Tensor::<B, 1>::from_data(TensorData::new(offsets, [batch]), device)
            .reshape([batch, 1, 1, 1]);
        features = features + offsets;
    }

    Ok(StageReconstruction {
        stage: inverses.len(),
        features,
        singular_samples: singular.into_iter().collect(),
    })
}
