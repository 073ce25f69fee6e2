//! Affine transform families and their inversion.
//!
//! - [`family`]: parameter-space definitions mapping raw predictor output to
//!   `[batch, 2, 3]` matrices
//! - [`homogeneous`]: batched inversion through the 3×3 homogeneous form

pub mod family;
pub mod homogeneous;

pub use family::{identity_theta, TransformFamily};
pub use homogeneous::{invert_theta, InverseTheta, SINGULARITY_TOLERANCE};
