use thiserror::Error;

pub type Result<T> = core::result::Result<T, LinalgError>;

/// Errors surfaced to callers of a compute provider.
///
/// Shape and singularity errors are contract violations and always reach the
/// caller. Device failures never do; see [`BackendError`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Matrix must be square (dims: {rows}x{cols})")]
    NotSquare { rows: usize, cols: usize },

    #[error("Matrix is singular")]
    SingularMatrix,

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid storage: {0}")]
    InvalidStorage(String),
}

impl LinalgError {
    /// `true` when a lower-priority provider should be tried instead.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, LinalgError::UnsupportedOperation(_))
    }
}

/// Failures of the device backend.
///
/// Internal to the engine: the GPU provider absorbs every variant and re-runs
/// the operation on the CPU.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Device runtime not available: {0}")]
    Unavailable(String),

    #[error("Device initialization failed: {0}")]
    InitError(String),

    #[error("Kernel compilation error: {0}")]
    ShaderError(String),

    #[error("Device allocation failed: {0}")]
    AllocationFailed(String),

    #[error("Device error: {0}")]
    DeviceError(String),

    #[error("Self-test failed: expected {expected}, got {actual}")]
    SelfTestFailed { expected: f64, actual: f64 },

    #[error("Scalar type cannot be represented on the device")]
    UnsupportedScalar,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_is_recognized() {
        assert!(LinalgError::UnsupportedOperation("norm".to_string()).is_unsupported());
        assert!(!LinalgError::SingularMatrix.is_unsupported());
    }

    #[test]
    fn test_error_messages() {
        let err = LinalgError::NotSquare { rows: 2, cols: 3 };
        assert_eq!(err.to_string(), "Matrix must be square (dims: 2x3)");
        let err = BackendError::SelfTestFailed {
            expected: 3.0,
            actual: 0.0,
        };
        assert_eq!(err.to_string(), "Self-test failed: expected 3, got 0");
    }
}
