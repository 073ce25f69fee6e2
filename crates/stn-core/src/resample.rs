//! Affine resampling of feature maps.
//!
//! [`Resampler`] maps the identity grid of the output through a batch of
//! 2×3 matrices and samples the input at the resulting coordinates.
//! The matrix maps output coordinates to input coordinates, both normalized
//! to `[-1, 1]`.

use burn::prelude::*;

use crate::error::{Result, StnError};
use crate::sampling::{GridSampler, GridSamplerConfig};

/// Build the sampling grid `[B, H, W, 2]` for affine matrices `[B, 2, 3]`.
///
/// The last axis holds `(x, y)`; `x` runs along the width.
pub fn affine_grid<B: Backend>(theta: Tensor<B, 3>, size: [usize; 4], align_corners: bool) -> Tensor<B, 4> {
    let [batch, _channels, h, w] = size;
    let device = theta.device();

    // Identity grid in homogeneous coordinates: [1, 3, H*W]
    let xs = normalized_linspace::<B>(w, align_corners, &device)
        .reshape([1, w])
        .repeat(&[h, 1]);
    let ys = normalized_linspace::<B>(h, align_corners, &device)
        .reshape([h, 1])
        .repeat(&[1, w]);
    let ones = Tensor::<B, 2>::ones([h, w], &device);
    let base = Tensor::stack::<3>(vec![xs, ys, ones], 0)
        .reshape([1, 3, h * w])
        .repeat(&[batch, 1, 1]);

    // [B, 2, 3] x [B, 3, H*W] -> [B, 2, H*W]
    let warped = theta.matmul(base);

    warped.swap_dims(1, 2).reshape([batch, h, w, 2])
}

/// Pixel positions of an axis of length `n` in normalized coordinates.
fn normalized_linspace<B: Backend>(n: usize, align_corners: bool, device: &B::Device) -> Tensor<B, 1> {
    let range = Tensor::<B, 1, Int>::arange(0..n as i64, device).float();
    if align_corners {
        if n == 1 {
            return range;
        }
        range.mul_scalar(2.0 / (n as f32 - 1.0)).sub_scalar(1.0)
    } else {
        range
            .mul_scalar(2.0)
            .add_scalar(1.0)
            .div_scalar(n as f32)
            .sub_scalar(1.0)
    }
}

/// Differentiable affine warp with configurable boundary handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct Resampler {
    sampler: GridSampler,
}

impl Resampler {
    /// Create a resampler using the given sampling configuration.
    pub fn new(config: GridSamplerConfig) -> Self {
        Self {
            sampler: GridSampler::new(config),
        }
    }

    /// Sampling configuration.
    pub fn config(&self) -> &GridSamplerConfig {
        self.sampler.config()
    }

    /// Warp `features` `[B, C, H, W]` by `theta` `[B, 2, 3]`.
    ///
    /// The output has exactly the shape of the input.
    pub fn apply<B: Backend>(&self, features: Tensor<B, 4>, theta: Tensor<B, 3>) -> Result<Tensor<B, 4>> {
        let dims = features.dims();
        let theta_dims = theta.dims();
        if theta_dims != [dims[0], 2, 3] {
            return Err(StnError::shape_mismatch([dims[0], 2, 3], theta_dims));
        }

        let grid = affine_grid(theta, dims, self.config().align_corners);
        Ok(self.sampler.sample(features, grid))
    }
}
