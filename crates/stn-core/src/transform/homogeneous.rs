//! Batched inversion of 2×3 affine matrices.
//!
//! Each matrix is lifted to its 3×3 homogeneous form, inverted on the host
//! with `nalgebra`, and truncated back to 2×3. The computation is detached
//! from the autodiff graph: its only consumer is diagnostic reconstruction.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use nalgebra::Matrix3;

use crate::error::{Result, StnError};

/// Determinant magnitude below which a matrix is treated as singular.
pub const SINGULARITY_TOLERANCE: f64 = 1e-6;

/// Inverse affine matrices for a batch.
#[derive(Debug, Clone)]
pub struct InverseTheta<B: Backend> {
    /// `[batch, 2, 3]` inverses. Singular samples carry the identity.
    pub theta: Tensor<B, 3>,
    /// Batch indices whose matrix could not be inverted.
    pub singular: Vec<usize>,
}

impl<B: Backend> InverseTheta<B> {
    /// Whether every sample was invertible.
    pub fn is_regular(&self) -> bool {
        self.singular.is_empty()
    }

    /// Fail with [`StnError::NumericalInstability`] if any sample was singular.
    pub fn into_regular(self) -> Result<Self> {
        if self.is_regular() {
            Ok(self)
        } else {
            Err(StnError::numerical_instability(format!(
                "singular affine matrices at batch indices {:?}",
                self.singular
            )))
        }
    }
}

fn homogeneous(entries: &[f32]) -> Matrix3<f64> {
    Matrix3::new(
        entries[0] as f64, entries[1] as f64, entries[2] as f64,
        entries[3] as f64, entries[4] as f64, entries[5] as f64,
        0.0, 0.0, 1.0,
    )
}

/// Invert a batch of affine matrices `[batch, 2, 3]`.
///
/// The result lives on `device`. A sample whose linear part has
/// `|det| < SINGULARITY_TOLERANCE` is flagged in [`InverseTheta::singular`]
/// and replaced by the identity; no error is raised for it.
pub fn invert_theta<B: Backend>(theta: Tensor<B, 3>, device: &B::Device) -> Result<InverseTheta<B>> {
    let [batch, rows, cols] = theta.dims();
    if rows != 2 || cols != 3 {
        return Err(StnError::shape_mismatch([batch, 2, 3], [batch, rows, cols]));
    }

    let values = theta
        .detach()
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| StnError::data_conversion(format!("{e:?}")))?;

    let mut inverted = Vec::with_capacity(batch * 6);
    let mut singular = Vec::new();

    for (index, entries) in values.chunks_exact(6).enumerate() {
        let matrix = homogeneous(entries);
        let det = matrix.determinant();

        let inverse = if det.is_finite() && det.abs() >= SINGULARITY_TOLERANCE {
            matrix.try_inverse()
        } else {
            None
        };

        match inverse {
            Some(inv) => {
                for r in 0..2 {
                    for c in 0..3 {
                        inverted.push(inv[(r, c)] as f32);
                    }
                }
            }
            None => {
                tracing::warn!(
                    "Affine matrix {} is singular (det = {:e}); reconstruction for it is undefined",
                    index,
                    det
                );
                singular.push(index);
                inverted.extend_from_slice(&[1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
            }
        }
    }

    let theta = Tensor::from_data(TensorData::new(inverted, [batch, 2, 3]), device);
    Ok(InverseTheta { theta, singular })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray<f32>;

    fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < tol, "{actual:?} vs {expected:?}");
        }
    }

    #[test]
    fn test_invert_identity() {
        let device = Default::default();
        let theta = Tensor::<TestBackend, 3>::from_floats([[[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]], &device);
        let inverse = invert_theta(theta, &device).unwrap();

        assert!(inverse.is_regular());
        let values = inverse.theta.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_invert_scale_translation() {
        // x' = 2x + 0.5, y' = 0.5y - 0.25
        let device = Default::default();
        let theta = Tensor::<TestBackend, 3>::from_floats([[[2.0, 0.0, 0.5], [0.0, 0.5, -0.25]]], &device);
        let inverse = invert_theta(theta, &device).unwrap();

        let values = inverse.theta.into_data().to_vec::<f32>().unwrap();
        assert_close(&values, &[0.5, 0.0, -0.25, 0.0, 2.0, 0.5], 1e-6);
    }

    #[test]
    fn test_singular_sample_is_flagged() {
        let device = Default::default();
        let theta = Tensor::<TestBackend, 3>::from_floats(
            [
                [[0.0, 0.0, 0.0], [0.0, 0.0, 0.0]],
                [[0.0, -1.0, 0.0], [1.0, 0.0, 0.0]],
            ],
            &device,
        );
        let inverse = invert_theta(theta, &device).unwrap();

        assert_eq!(inverse.singular, vec![0]);
        assert!(matches!(
            inverse.clone().into_regular(),
            Err(StnError::NumericalInstability(_))
        ));
        let values = inverse.theta.into_data().to_vec::<f32>().unwrap();
        assert_close(
            &values,
            &[1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, -1.0, 0.0, 0.0],
            1e-6,
        );
    }

    #[test]
    fn test_rejects_non_affine_shape() {
        let device = Default::default();
        let theta = Tensor::<TestBackend, 3>::zeros([1, 3, 3], &device);
        assert!(matches!(
            invert_theta(theta, &device),
            Err(StnError::ShapeMismatch { .. })
        ));
    }
}
