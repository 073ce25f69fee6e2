//! Cascaded spatial-transformer ResNet built on burn.
//!
//! A ResNet stem and three residual layers, each followed by a learned
//! spatial transformer that realigns the feature map before the next layer.
//! Forward passes can optionally return inverse reconstructions of every
//! stage in the post-stem frame.

pub mod backbone;
pub mod cascade;
pub mod context;
pub mod model;
pub mod predictor;
pub mod weights;

pub use backbone::{BackboneConfig, NUM_STAGES};
pub use cascade::{Cascade, CascadeOutput, CascadeStage, StageReconstruction};
pub use context::{DevicePolicy, ExecutionContext, ExecutionMode};
pub use model::{StnResNet, StnResNetConfig, StnResNetOutput};
pub use predictor::{StagePredictor, StagePredictorConfig};
pub use weights::{LoadReport, WeightSet};

pub use stn_core::{GridPaddingMode, GridSamplerConfig, Result, StnError, TransformFamily};
