//! Grid Sampling - Bilinear interpolation at normalized coordinates
//!
//! Samples `[B, C, H, W]` feature maps at a `[B, Ho, Wo, 2]` grid of
//! normalized `(x, y)` coordinates in `[-1, 1]`, following the
//! `grid_sample` conventions of the common deep learning frameworks.

use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Padding mode for grid sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridPaddingMode {
    /// Use zeros for out-of-bounds samples
    Zero,
    /// Use border values for out-of-bounds samples
    Border,
    /// Reflect coordinates at the border
    #[default]
    Reflection,
}

/// Configuration for grid sampling operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSamplerConfig {
    /// Padding mode for out-of-bounds coordinates
    pub padding_mode: GridPaddingMode,
    /// Align corners (true: -1/1 align to corner pixel centers, false: to pixel edges)
    pub align_corners: bool,
}

impl Default for GridSamplerConfig {
    fn default() -> Self {
        Self {
            padding_mode: GridPaddingMode::Reflection,
            align_corners: false,
        }
    }
}

impl GridSamplerConfig {
    /// Set the padding mode.
    pub fn with_padding_mode(mut self, padding_mode: GridPaddingMode) -> Self {
        self.padding_mode = padding_mode;
        self
    }

    /// Set the corner alignment convention.
    pub fn with_align_corners(mut self, align_corners: bool) -> Self {
        self.align_corners = align_corners;
        self
    }
}

/// 2D grid sampler with bilinear interpolation
#[derive(Debug, Clone, Copy, Default)]
pub struct GridSampler {
    config: GridSamplerConfig,
}

impl GridSampler {
    /// Create grid sampler with custom configuration
    pub fn new(config: GridSamplerConfig) -> Self {
        Self { config }
    }

    /// Sampler configuration.
    pub fn config(&self) -> &GridSamplerConfig {
        &self.config
    }

    /// Sample `input` `[B, C, H, W]` at `grid` `[B, Ho, Wo, 2]`.
    ///
    /// Returns `[B, C, Ho, Wo]`. Differentiable with respect to both the
    /// input values and the grid coordinates.
    pub fn sample<B: Backend>(&self, input: Tensor<B, 4>, grid: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_batch, _channels, h_in, w_in] = input.dims();
        let [batch, h_out, w_out, _] = grid.dims();

        let x = grid
            .clone()
            .slice([0..batch, 0..h_out, 0..w_out, 0..1])
            .squeeze::<3>(3);
        let y = grid.slice([0..batch, 0..h_out, 0..w_out, 1..2]).squeeze::<3>(3);

        let ix = self.source_index(x, w_in);
        let iy = self.source_index(y, h_in);

        // Zero padding leaves coordinates unclamped and drops each
        // out-of-range corner from the bilinear sum
        let zero_padding = self.config.padding_mode == GridPaddingMode::Zero;
        let (ix, iy) = if zero_padding {
            (ix, iy)
        } else {
            (ix.clamp(0.0, (w_in - 1) as f32), iy.clamp(0.0, (h_in - 1) as f32))
        };

        let ix0 = ix.clone().floor();
        let iy0 = iy.clone().floor();
        let ix1 = ix0.clone().add_scalar(1.0);
        let iy1 = iy0.clone().add_scalar(1.0);

        let mut wx1 = ix - ix0.clone();
        let mut wy1 = iy - iy0.clone();
        let mut wx0 = wx1.clone().neg().add_scalar(1.0);
        let mut wy0 = wy1.clone().neg().add_scalar(1.0);

        if zero_padding {
            wx0 = wx0 * in_range(&ix0, w_in);
            wx1 = wx1 * in_range(&ix1, w_in);
            wy0 = wy0 * in_range(&iy0, h_in);
            wy1 = wy1 * in_range(&iy1, h_in);
        }

        let ix0 = ix0.clamp(0.0, (w_in - 1) as f32).int();
        let iy0 = iy0.clamp(0.0, (h_in - 1) as f32).int();
        let ix1 = ix1.clamp(0.0, (w_in - 1) as f32).int();
        let iy1 = iy1.clamp(0.0, (h_in - 1) as f32).int();

        let v00 = gather(&input, &iy0, &ix0, h_out, w_out);
        let v01 = gather(&input, &iy0, &ix1, h_out, w_out);
        let v10 = gather(&input, &iy1, &ix0, h_out, w_out);
        let v11 = gather(&input, &iy1, &ix1, h_out, w_out);

        // [B, Ho, Wo] -> [B, 1, Ho, Wo] for broadcasting over channels
        let wx0 = wx0.unsqueeze_dim::<4>(1);
        let wx1 = wx1.unsqueeze_dim::<4>(1);
        let wy0 = wy0.unsqueeze_dim::<4>(1);
        let wy1 = wy1.unsqueeze_dim::<4>(1);

        let top = v00 * wx0.clone() + v01 * wx1.clone();
        let bottom = v10 * wx0 + v11 * wx1;
        top * wy0 + bottom * wy1
    }

    /// Map normalized coordinates to continuous pixel indices, applying the
    /// reflection policy when configured.
    fn source_index<B: Backend>(&self, coord: Tensor<B, 3>, size: usize) -> Tensor<B, 3> {
        let index = unnormalize(coord, size, self.config.align_corners);
        let index = match (self.config.padding_mode, self.config.align_corners) {
            (GridPaddingMode::Reflection, true) => reflect_coordinates(index, 0.0, 2.0 * (size as f32 - 1.0)),
            (GridPaddingMode::Reflection, false) => reflect_coordinates(index, -1.0, 2.0 * size as f32 - 1.0),
            _ => index,
        };
        snap_to_pixel(index)
    }
}

/// Distance in pixels below which an index is treated as lying on a pixel.
pub const PIXEL_SNAP_TOLERANCE: f32 = 1e-4;

/// Move indices within [`PIXEL_SNAP_TOLERANCE`] of an integer onto it.
///
/// The normalize/unnormalize round trip can land a hair below a pixel, which
/// would make `floor` pick the previous pixel and blend in a neighbour. The
/// correction is detached, so gradients with respect to the grid pass
/// through unchanged.
fn snap_to_pixel<B: Backend>(index: Tensor<B, 3>) -> Tensor<B, 3> {
    let correction = (index.clone().round() - index.clone()).detach();
    let far = correction.clone().abs().greater_elem(PIXEL_SNAP_TOLERANCE);
    index + correction.mask_fill(far, 0.0)
}

/// 1.0 where `index` addresses a pixel of an axis of length `size`, else 0.0.
fn in_range<B: Backend>(index: &Tensor<B, 3>, size: usize) -> Tensor<B, 3> {
    let low = index.clone().greater_equal_elem(0.0).float();
    let high = index.clone().lower_equal_elem((size - 1) as f32).float();
    low * high
}

/// Denormalize coordinates from `[-1, 1]` to pixel indices.
fn unnormalize<B: Backend>(coord: Tensor<B, 3>, size: usize, align_corners: bool) -> Tensor<B, 3> {
    if align_corners {
        (coord + 1.0) * ((size as f32 - 1.0) / 2.0)
    } else {
        ((coord + 1.0) * size as f32 - 1.0) / 2.0
    }
}

/// Reflect coordinates into `[twice_low / 2, twice_high / 2]`.
///
/// Bounds are passed doubled so half-pixel edges stay exact.
fn reflect_coordinates<B: Backend>(coord: Tensor<B, 3>, twice_low: f32, twice_high: f32) -> Tensor<B, 3> {
    if twice_low == twice_high {
        return coord.zeros_like();
    }
    let min = twice_low / 2.0;
    let span = (twice_high - twice_low) / 2.0;

    let offset = coord.sub_scalar(min).abs();
    let flips = offset.clone().div_scalar(span).floor();
    let extra = offset - flips.clone().mul_scalar(span);
    // 0 for an even number of flips, 1 for odd
    let odd = flips.clone() - flips.div_scalar(2.0).floor().mul_scalar(2.0);

    // even: min + extra, odd: min + span - extra
    let flipped = extra.clone().mul_scalar(-2.0).add_scalar(span);
    (extra + odd * flipped).add_scalar(min)
}

/// Gather values from `input` at integer pixel coordinates.
fn gather<B: Backend>(
    input: &Tensor<B, 4>,
    iy: &Tensor<B, 3, Int>,
    ix: &Tensor<B, 3, Int>,
    h_out: usize,
    w_out: usize,
) -> Tensor<B, 4> {
    let [batch, channels, h_in, w_in] = input.dims();

    let input_flat = input.clone().reshape([batch, channels, h_in * w_in]);
    let idx = iy.clone().mul_scalar(w_in as i32) + ix.clone();

    let idx_flat = idx.reshape([batch, 1, h_out * w_out]);
    let idx_rep = idx_flat.repeat(&[1, channels, 1]);

    input_flat
        .gather(2, idx_rep)
        .reshape([batch, channels, h_out, w_out])
}
