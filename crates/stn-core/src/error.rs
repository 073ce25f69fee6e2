//! Error types for spatial-transformer operations.
//!
//! Configuration problems are reported when a model or transform family is
//! built, shape problems when a forward pass receives tensors it was not
//! sized for.

use thiserror::Error;

/// Main error type for the spatial-transformer crates.
#[derive(Error, Debug)]
pub enum StnError {
    /// Invalid configuration (unknown transform mode, wrong stage count, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Shape mismatch.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Numerical instability detected.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Tensor data could not be read back from the device.
    #[error("Data conversion error: {0}")]
    DataConversion(String),
}

/// Result type for spatial-transformer operations.
pub type Result<T> = std::result::Result<T, StnError>;

impl StnError {
    /// Create an invalid configuration error.
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Create a shape mismatch error.
    pub fn shape_mismatch(expected: impl Into<Vec<usize>>, actual: impl Into<Vec<usize>>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Create a numerical instability error.
    pub fn numerical_instability(msg: impl Into<String>) -> Self {
        Self::NumericalInstability(msg.into())
    }

    /// Create a data conversion error.
    pub fn data_conversion(msg: impl Into<String>) -> Self {
        Self::DataConversion(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = StnError::invalid_configuration("unknown mode");
        assert!(matches!(err, StnError::InvalidConfiguration(_)));
    }

    #[test]
    fn test_error_display() {
        let err = StnError::invalid_configuration("unknown mode 'warp'");
        assert_eq!(err.to_string(), "Invalid configuration: unknown mode 'warp'");
    }

    #[test]
    fn test_shape_mismatch() {
        let err = StnError::shape_mismatch([56, 56], [28, 28]);
        let err_str = err.to_string();
        assert!(err_str.contains("expected [56, 56]"));
        assert!(err_str.contains("got [28, 28]"));
    }
}
