//! Core building blocks of cascaded spatial transformers.
//!
//! - [`transform`]: reduced-rank affine families and batched inversion
//! - [`sampling`]: bilinear grid sampling with zero, border or reflection padding
//! - [`resample`]: affine grids and the [`Resampler`] that warps feature maps

pub mod error;
pub mod transform;
pub mod sampling;
pub mod resample;

pub use error::{Result, StnError};
pub use transform::{identity_theta, invert_theta, InverseTheta, TransformFamily};
pub use sampling::{GridPaddingMode, GridSampler, GridSamplerConfig};
pub use resample::{affine_grid, Resampler};
