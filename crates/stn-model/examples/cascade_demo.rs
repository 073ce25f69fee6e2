//! Cascade Demo
//!
//! Builds an STN-ResNet with a different transform family per stage, runs a
//! random batch through it and prints the predicted matrices together with
//! the shapes of the inverse reconstructions.
//!
//! Usage:
//!   cargo run -p stn-model --example cascade_demo

use burn::tensor::{Distribution, Tensor};
use burn_ndarray::NdArray;
use stn_model::{ExecutionContext, StnResNetConfig, WeightSet};

type Backend = NdArray<f32>;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let device = Default::default();

    let config = StnResNetConfig::new().with_input_size(112).with_stage_modes(Some(vec![
        "translation".to_string(),
        "rotation_scale".to_string(),
        "affine".to_string(),
    ]));
    let model = config.init::<Backend>(&device)?;
    println!("Stage modes: {:?}", model.stage_modes());

    // The stem from a torchvision checkpoint would go here; a single
    // unrelated key shows up as skipped.
    let mut weights = WeightSet::new();
    weights.insert_floats("fc.bias", vec![0.0; 1000], [1000])?;
    let (model, report) = model.load_pretrained(&weights);
    println!("Applied {} weights, skipped {:?}", report.applied.len(), report.skipped);

    let x = Tensor::<Backend, 4>::random([2, 3, 112, 112], Distribution::Normal(0.0, 1.0), &device);
    let output = model.forward(x, &ExecutionContext::eval())?;

    println!("Features: {:?}", output.features.dims());
    for (stage, theta) in output.thetas.iter().enumerate() {
        let values = theta.clone().into_data().to_vec::<f32>().map_err(|e| anyhow::anyhow!("{e:?}"))?;
        println!("  theta {}: {:?}", stage + 1, &values[..6]);
    }

    if let Some(reconstructions) = output.reconstructions {
        for reconstruction in reconstructions {
            println!(
                "  reconstruction {}: {:?}, singular samples {:?}",
                reconstruction.stage,
                reconstruction.features.dims(),
                reconstruction.singular_samples
            );
        }
    }

    Ok(())
}
