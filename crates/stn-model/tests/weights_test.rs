mod common;

use burn::tensor::{Distribution, Tensor};
use common::{small_config, TestBackend};
use stn_model::{ExecutionContext, WeightSet};

#[test]
fn test_pretrained_backbone_weights_applied_and_rest_skipped() {
    let device = Default::default();
    let model = small_config("affine").init::<TestBackend>(&device).unwrap();

    let mut weights = WeightSet::new();
    weights.insert_floats("conv1.weight", vec![0.01; 8 * 3 * 7 * 7], [8, 3, 7, 7]).unwrap();
    weights.insert_floats("layer1.0.conv1.weight", vec![0.02; 8 * 8 * 3 * 3], [8, 8, 3, 3]).unwrap();
    weights.insert_floats("layer2.0.downsample.0.weight", vec![0.03; 16 * 8], [16, 8, 1, 1]).unwrap();
    weights.insert_floats("bn1.weight", vec![1.0; 4], [4]).unwrap();
    weights.insert_floats("layer4.0.conv1.weight", vec![0.0; 9], [1, 1, 3, 3]).unwrap();
    weights.insert_floats("fc.weight", vec![0.0; 320], [10, 32]).unwrap();

    let (model, report) = model.load_pretrained(&weights);

    assert_eq!(
        report.applied,
        vec!["conv1.weight", "layer1.0.conv1.weight", "layer2.0.downsample.0.weight"]
    );
    assert_eq!(report.skipped, vec!["bn1.weight", "fc.weight", "layer4.0.conv1.weight"]);

    let x = Tensor::<TestBackend, 4>::random([1, 3, 32, 32], Distribution::Normal(0.0, 1.0), &device);
    let output = model.forward(x, &ExecutionContext::eval()).unwrap();
    let theta = output.thetas[0].clone().into_data().to_vec::<f32>().unwrap();
    assert_eq!(theta, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
}

#[test]
fn test_empty_weight_set_changes_nothing() {
    let device = Default::default();
    let model = small_config("scale").init::<TestBackend>(&device).unwrap();

    let (_, report) = model.load_pretrained(&WeightSet::new());

    assert!(report.applied.is_empty());
    assert!(report.skipped.is_empty());
}
