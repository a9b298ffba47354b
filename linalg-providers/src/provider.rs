//! The compute provider contract.

use linalg_core::{Field, LinalgError, Matrix, Result, Vector};

/// Priority reported by a provider that must not be selected.
pub const PRIORITY_UNAVAILABLE: i32 = i32::MIN;
pub const PRIORITY_CPU_DENSE: i32 = 0;
pub const PRIORITY_CPU_SPARSE: i32 = 5;
pub const PRIORITY_GPU: i32 = 10;

/// Builds the error a provider returns for an operation it does not implement.
pub fn unsupported(provider: &str, operation: &str) -> LinalgError {
    LinalgError::UnsupportedOperation(format!("{} does not implement {}", provider, operation))
}

/// An execution strategy for vector and matrix operations over `E`.
///
/// Every operation defaults to [`LinalgError::UnsupportedOperation`], so an
/// adapter only overrides what it actually implements and the caller moves
/// on to the next provider for the rest. Shape errors are reported before any
/// work starts. Providers are built once and shared across calls and threads.
pub trait ComputeProvider<E: Field>: Send + Sync {
    /// Stable short identifier, e.g. `cpu-dense`.
    fn id(&self) -> &'static str;

    fn name(&self) -> String {
        self.id().to_string()
    }

    fn is_available(&self) -> bool;

    /// Higher wins among available providers.
    fn priority(&self) -> i32;

    fn vector_add(&self, _a: &Vector<E>, _b: &Vector<E>) -> Result<Vector<E>> {
        Err(unsupported(self.id(), "vector_add"))
    }

    fn vector_subtract(&self, _a: &Vector<E>, _b: &Vector<E>) -> Result<Vector<E>> {
        Err(unsupported(self.id(), "vector_subtract"))
    }

    fn vector_scale(&self, _v: &Vector<E>, _scalar: &E) -> Result<Vector<E>> {
        Err(unsupported(self.id(), "vector_scale"))
    }

    fn dot(&self, _a: &Vector<E>, _b: &Vector<E>) -> Result<E> {
        Err(unsupported(self.id(), "dot"))
    }

    /// Euclidean norm, `sqrt(dot(v, v))`.
    fn norm(&self, _v: &Vector<E>) -> Result<E> {
        Err(unsupported(self.id(), "norm"))
    }

    fn matrix_add(&self, _a: &Matrix<E>, _b: &Matrix<E>) -> Result<Matrix<E>> {
        Err(unsupported(self.id(), "matrix_add"))
    }

    fn matrix_subtract(&self, _a: &Matrix<E>, _b: &Matrix<E>) -> Result<Matrix<E>> {
        Err(unsupported(self.id(), "matrix_subtract"))
    }

    fn matrix_scale(&self, _a: &Matrix<E>, _scalar: &E) -> Result<Matrix<E>> {
        Err(unsupported(self.id(), "matrix_scale"))
    }

    /// `A (m x k) * B (k x n)`.
    fn matrix_multiply(&self, _a: &Matrix<E>, _b: &Matrix<E>) -> Result<Matrix<E>> {
        Err(unsupported(self.id(), "matrix_multiply"))
    }

    fn matrix_vector_multiply(&self, _a: &Matrix<E>, _v: &Vector<E>) -> Result<Vector<E>> {
        Err(unsupported(self.id(), "matrix_vector_multiply"))
    }

    fn transpose(&self, _a: &Matrix<E>) -> Result<Matrix<E>> {
        Err(unsupported(self.id(), "transpose"))
    }

    fn inverse(&self, _a: &Matrix<E>) -> Result<Matrix<E>> {
        Err(unsupported(self.id(), "inverse"))
    }

    fn determinant(&self, _a: &Matrix<E>) -> Result<E> {
        Err(unsupported(self.id(), "determinant"))
    }

    /// Solves `A x = b`.
    fn solve(&self, _a: &Matrix<E>, _b: &Vector<E>) -> Result<Vector<E>> {
        Err(unsupported(self.id(), "solve"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddOnly;

    impl ComputeProvider<f64> for AddOnly {
        fn id(&self) -> &'static str {
            "add-only"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn priority(&self) -> i32 {
            1
        }

        fn vector_add(&self, a: &Vector<f64>, b: &Vector<f64>) -> Result<Vector<f64>> {
            Ok(a.iter().zip(b.iter()).map(|(x, y)| x + y).collect())
        }
    }

    #[test]
    fn test_unimplemented_operations_signal_unsupported() {
        let provider = AddOnly;
        let v = Vector::from_vec(vec![1.0, 2.0]);
        assert!(provider.vector_add(&v, &v).is_ok());
        let err = provider.dot(&v, &v).unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "Unsupported operation: add-only does not implement dot"
        );
        assert_eq!(provider.name(), "add-only");
    }
}
