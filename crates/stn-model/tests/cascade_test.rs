mod common;

use burn::tensor::{Distribution, Tensor};
use common::{assert_close, small_config, TestBackend};
use stn_model::{DevicePolicy, ExecutionContext, StnError};

#[test]
fn test_forward_shapes_and_identity_thetas_at_init() {
    let device = Default::default();
    let model = small_config("rotation_translation_scale").init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);

    let output = model.forward(x, &ExecutionContext::eval()).unwrap();

    assert_eq!(output.features.dims(), [2, 32, 2, 2]);
    assert_eq!(output.thetas.len(), 3);
    for theta in &output.thetas {
        assert_eq!(theta.dims(), [2, 2, 3]);
        let values = theta.clone().into_data().to_vec::<f32>().unwrap();
        assert_close(&values, &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0].repeat(2), 1e-6);
    }

    let reconstructions = output.reconstructions.unwrap();
    let shapes: Vec<[usize; 4]> = reconstructions.iter().map(|r| r.features.dims()).collect();
    assert_eq!(shapes, vec![[2, 8, 8, 8], [2, 16, 4, 4], [2, 32, 2, 2]]);
    assert!(reconstructions.iter().all(|r| r.singular_samples.is_empty()));
}

#[test]
fn test_identity_cascade_reconstruction_matches_output() {
    let device = Default::default();
    let model = small_config("affine").init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);

    let output = model.forward(x, &ExecutionContext::train()).unwrap();
    let features = output.features.into_data().to_vec::<f32>().unwrap();
    let last = output.reconstructions.unwrap().remove(2);
    let reconstructed = last.features.into_data().to_vec::<f32>().unwrap();

    assert_eq!(last.stage, 3);
    assert_eq!(reconstructed, features);
}

#[test]
fn test_diagnostics_can_be_disabled() {
    let device = Default::default();
    let model = small_config("translation").init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::random([2, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);

    let output = model
        .forward(x, &ExecutionContext::train().without_diagnostics())
        .unwrap();

    assert!(output.reconstructions.is_none());
    assert_eq!(output.thetas.len(), 3);
}

#[test]
fn test_fixed_diagnostic_device_in_eval() {
    let device = Default::default();
    let model = small_config("shear").init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);
    let ctx = ExecutionContext::eval().with_eval_diagnostics(DevicePolicy::Fixed(device));

    let output = model.forward(x, &ctx).unwrap();

    for reconstruction in output.reconstructions.unwrap() {
        assert_eq!(reconstruction.features.device(), device);
    }
}

#[test]
fn test_input_of_wrong_size_is_rejected() {
    let device = Default::default();
    let model = small_config("scale").init::<TestBackend>(&device).unwrap();
    let x = Tensor::<TestBackend, 4>::zeros([1, 3, 30, 30], &device);

    assert!(matches!(
        model.forward(x, &ExecutionContext::eval()),
        Err(StnError::ShapeMismatch { .. })
    ));
}
