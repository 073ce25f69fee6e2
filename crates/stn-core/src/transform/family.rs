//! Reduced-rank affine transform families.
//!
//! Each family restricts the six degrees of freedom of a 2×3 affine matrix
//! to a smaller parameter vector. A predictor network only ever emits the raw
//! parameters; the family turns them into the matrix consumed by the
//! resampler.

use std::fmt;
use std::str::FromStr;

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StnError};

/// Parameterisation of the affine matrix predicted at one cascade stage.
///
/// Matrices act on normalized coordinates in `[-1, 1]`; angles are radians.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformFamily {
    /// Full 2×3 matrix, row-major.
    Affine,
    /// `[tx, ty]`
    Translation,
    /// `[angle]`
    Rotation,
    /// `[sx, sy]`
    Scale,
    /// `[shx, shy]` on the off-diagonal.
    Shear,
    /// `[angle, sx, sy]`
    RotationScale,
    /// `[tx, ty, sx, sy]`
    TranslationScale,
    /// `[angle, tx, ty]`
    RotationTranslation,
    /// `[angle, tx, ty, sx, sy]`
    RotationTranslationScale,
}

impl TransformFamily {
    /// Every supported family.
    pub const ALL: [TransformFamily; 9] = [
        TransformFamily::Affine,
        TransformFamily::Translation,
        TransformFamily::Rotation,
        TransformFamily::Scale,
        TransformFamily::Shear,
        TransformFamily::RotationScale,
        TransformFamily::TranslationScale,
        TransformFamily::RotationTranslation,
        TransformFamily::RotationTranslationScale,
    ];

    /// Identifier used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Affine => "affine",
            Self::Translation => "translation",
            Self::Rotation => "rotation",
            Self::Scale => "scale",
            Self::Shear => "shear",
            Self::RotationScale => "rotation_scale",
            Self::TranslationScale => "translation_scale",
            Self::RotationTranslation => "rotation_translation",
            Self::RotationTranslationScale => "rotation_translation_scale",
        }
    }

    /// Number of raw parameters a predictor must emit for this family.
    pub fn n_params(&self) -> usize {
        match self {
            Self::Affine => 6,
            Self::Translation | Self::Scale | Self::Shear => 2,
            Self::Rotation => 1,
            Self::RotationScale | Self::RotationTranslation => 3,
            Self::TranslationScale => 4,
            Self::RotationTranslationScale => 5,
        }
    }

    /// Raw parameter vector that encodes the identity transform.
    ///
    /// Used as the bias of the predictor's final layer so every stage starts
    /// as a no-op.
    pub fn identity_params(&self) -> Vec<f32> {
        match self {
            Self::Affine => vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            Self::Translation | Self::Shear => vec![0.0, 0.0],
            Self::Scale => vec![1.0, 1.0],
            Self::Rotation => vec![0.0],
            Self::RotationScale => vec![0.0, 1.0, 1.0],
            Self::TranslationScale => vec![0.0, 0.0, 1.0, 1.0],
            Self::RotationTranslation => vec![0.0, 0.0, 0.0],
            Self::RotationTranslationScale => vec![0.0, 0.0, 0.0, 1.0, 1.0],
        }
    }

    /// Build the `[batch, 2, 3]` affine matrix from raw parameters `[batch, k]`.
    ///
    /// Every entry is a closed-form expression of the raw parameters, so the
    /// result stays differentiable with respect to them.
    pub fn build_theta<B: Backend>(&self, raw: Tensor<B, 2>) -> Result<Tensor<B, 3>> {
        let [batch, width] = raw.dims();
        let expected = self.n_params();
        if width != expected {
            return Err(StnError::shape_mismatch([batch, expected], [batch, width]));
        }

        let device = raw.device();
        let param = |i: usize| raw.clone().slice([0..batch, i..i + 1]);
        let one = || Tensor::<B, 2>::ones([batch, 1], &device);
        let zero = || Tensor::<B, 2>::zeros([batch, 1], &device);
        let rotation = |angle: Tensor<B, 2>| (angle.clone().cos(), angle.sin());

        // Row-major entries [a, b, tx, c, d, ty] of [[a, b, tx], [c, d, ty]]
        let entries = match self {
            Self::Affine => [param(0), param(1), param(2), param(3), param(4), param(5)],
            Self::Translation => [one(), zero(), param(0), zero(), one(), param(1)],
            Self::Rotation => {
                let (cos, sin) = rotation(param(0));
                [cos.clone(), sin.clone().neg(), zero(), sin, cos, zero()]
            }
            Self::Scale => [param(0), zero(), zero(), zero(), param(1), zero()],
            Self::Shear => [one(), param(0), zero(), param(1), one(), zero()],
            Self::RotationScale => {
                let (cos, sin) = rotation(param(0));
                [
                    cos.clone() * param(1),
                    sin.clone().neg(),
                    zero(),
                    sin,
                    cos * param(2),
                    zero(),
                ]
            }
            Self::TranslationScale => [param(2), zero(), param(0), zero(), param(3), param(1)],
            Self::RotationTranslation => {
                let (cos, sin) = rotation(param(0));
                [cos.clone(), sin.clone().neg(), param(1), sin, cos, param(2)]
            }
            Self::RotationTranslationScale => {
                let (cos, sin) = rotation(param(0));
                [
                    cos.clone() * param(3),
                    sin.clone().neg(),
                    param(1),
                    sin,
                    cos * param(4),
                    param(2),
                ]
            }
        };

        Ok(Tensor::cat(Vec::from(entries), 1).reshape([batch, 2, 3]))
    }
}

/// Identity matrices `[[1, 0, 0], [0, 1, 0]]` for a batch.
pub fn identity_theta<B: Backend>(batch: usize, device: &B::Device) -> Tensor<B, 3> {
    let values: Vec<f32> = (0..batch)
        .flat_map(|_| [1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
        .collect();
    Tensor::from_data(TensorData::new(values, [batch, 2, 3]), device)
}

impl fmt::Display for TransformFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TransformFamily {
    type Err = StnError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|family| family.name() == s)
            .ok_or_else(|| {
                StnError::invalid_configuration(format!("unknown transform mode '{s}'"))
            })
    }
}
