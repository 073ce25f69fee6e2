mod common;

use burn::tensor::{Distribution, Tensor};
use common::{assert_close, TestBackend};
use stn_model::{StagePredictorConfig, StnError, TransformFamily};

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

#[test]
fn test_untrained_predictor_outputs_identity_for_every_family() {
    let device = Default::default();
    for family in TransformFamily::ALL {
        let predictor = StagePredictorConfig::new(8, 14, family)
            .with_hidden(32)
            .init::<TestBackend>(&device)
            .unwrap();
        let x = Tensor::<TestBackend, 4>::random([3, 8, 14, 14], Distribution::Normal(0.0, 1.0), &device);

        let raw = predictor.forward(x.clone()).unwrap();
        assert_eq!(raw.dims(), [3, family.n_params()]);

        let theta = predictor.predict_theta(x).unwrap();
        assert_eq!(theta.dims(), [3, 2, 3]);
        let values = theta.into_data().to_vec::<f32>().unwrap();
        for sample in values.chunks(6) {
            assert_close(sample, &IDENTITY, 1e-6);
        }
    }
}

#[test]
fn test_wrong_spatial_size_is_a_shape_error() {
    let device = Default::default();
    let predictor = StagePredictorConfig::new(8, 14, TransformFamily::Affine)
        .with_hidden(16)
        .init::<TestBackend>(&device)
        .unwrap();
    let x = Tensor::<TestBackend, 4>::zeros([1, 8, 12, 12], &device);

    match predictor.forward(x) {
        Err(StnError::ShapeMismatch { expected, actual }) => {
            assert_eq!(expected, vec![1, 8, 14, 14]);
            assert_eq!(actual, vec![1, 8, 12, 12]);
        }
        other => panic!("expected shape mismatch, got {other:?}"),
    }
}

#[test]
fn test_wrong_channel_count_is_a_shape_error() {
    let device = Default::default();
    let predictor = StagePredictorConfig::new(8, 7, TransformFamily::Translation)
        .with_hidden(16)
        .init::<TestBackend>(&device)
        .unwrap();
    let x = Tensor::<TestBackend, 4>::zeros([2, 4, 7, 7], &device);

    assert!(matches!(predictor.predict_theta(x), Err(StnError::ShapeMismatch { .. })));
}
