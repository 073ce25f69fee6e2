#![allow(dead_code)]

use burn_ndarray::NdArray;
use stn_model::{BackboneConfig, StnResNetConfig};

pub type TestBackend = NdArray<f32>;

/// 32x32 inputs, one block per layer and narrow predictors.
pub fn small_config(mode: &str) -> StnResNetConfig {
    StnResNetConfig::new()
        .with_stn_mode(mode.to_string())
        .with_input_size(32)
        .with_backbone(BackboneConfig::new().with_blocks(vec![1, 1, 1]).with_base_width(8))
        .with_predictor_hidden(16)
        .with_predictor_channels(8)
        .with_predictor_reduced_channels(4)
}

pub fn assert_close(actual: &[f32], expected: &[f32], tolerance: f32) {
    assert_eq!(actual.len(), expected.len());
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tolerance, "index {i}: {a} vs {e}");
    }
}
