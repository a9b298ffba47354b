//! Storage-polymorphic matrix operand.

use crate::dense_matrix::DenseMatrix;
use crate::error::Result;
use crate::field::Field;
use crate::sparse_matrix::SparseMatrix;
use crate::traits::MatrixLike;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// Density below which [`StorageKind::Auto`] picks CSR storage.
pub const AUTO_SPARSE_DENSITY: f64 = 0.2;

/// Requested backing store when building a [`Matrix`] from rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Sparse when fewer than 20% of the cells are non-zero, dense otherwise.
    #[default]
    Auto,
    Dense,
    Sparse,
}

/// A matrix operand, either dense or CSR.
#[derive(Debug, Clone, PartialEq)]
pub enum Matrix<E: Field> {
    Dense(DenseMatrix<E>),
    Sparse(SparseMatrix<E>),
}

impl<E: Field> Matrix<E> {
    /// Builds a matrix from rows using the requested storage.
    pub fn from_rows_with(rows: &[Vec<E>], storage: StorageKind) -> Result<Self> {
        let dense = DenseMatrix::from_rows(rows)?;
        Ok(match storage {
            StorageKind::Dense => Matrix::Dense(dense),
            StorageKind::Sparse => Matrix::Sparse(SparseMatrix::from_dense(&dense)),
            StorageKind::Auto => {
                let total = dense.data().len();
                let non_zero = dense.data().iter().filter(|v| !v.is_zero()).count();
                if total > 0 && (non_zero as f64) / (total as f64) < AUTO_SPARSE_DENSITY {
                    Matrix::Sparse(SparseMatrix::from_dense(&dense))
                } else {
                    Matrix::Dense(dense)
                }
            }
        })
    }

    pub fn dense(rows: &[Vec<E>]) -> Result<Self> {
        Self::from_rows_with(rows, StorageKind::Dense)
    }

    pub fn sparse(rows: &[Vec<E>]) -> Result<Self> {
        Self::from_rows_with(rows, StorageKind::Sparse)
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Matrix::Sparse(_))
    }

    pub fn as_sparse(&self) -> Option<&SparseMatrix<E>> {
        match self {
            Matrix::Sparse(s) => Some(s),
            Matrix::Dense(_) => None,
        }
    }

    pub fn as_dense(&self) -> Option<&DenseMatrix<E>> {
        match self {
            Matrix::Dense(d) => Some(d),
            Matrix::Sparse(_) => None,
        }
    }

    /// Dense view; borrows when already dense.
    pub fn to_dense(&self) -> Cow<'_, DenseMatrix<E>> {
        match self {
            Matrix::Dense(d) => Cow::Borrowed(d),
            Matrix::Sparse(s) => Cow::Owned(s.to_dense()),
        }
    }

    /// Number of stored entries (all cells for dense storage).
    pub fn stored_entries(&self) -> usize {
        match self {
            Matrix::Dense(d) => d.data().len(),
            Matrix::Sparse(s) => s.nnz(),
        }
    }
}

impl<E: Field> From<DenseMatrix<E>> for Matrix<E> {
    fn from(m: DenseMatrix<E>) -> Self {
        Matrix::Dense(m)
    }
}

impl<E: Field> From<SparseMatrix<E>> for Matrix<E> {
    fn from(m: SparseMatrix<E>) -> Self {
        Matrix::Sparse(m)
    }
}

impl<E: Field> MatrixLike for Matrix<E> {
    type Value = E;

    fn dims(&self) -> (usize, usize) {
        match self {
            Matrix::Dense(d) => d.dims(),
            Matrix::Sparse(s) => s.dims(),
        }
    }

    fn element(&self, row: usize, col: usize) -> Option<E> {
        match self {
            Matrix::Dense(d) => d.element(row, col),
            Matrix::Sparse(s) => s.element(row, col),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_storage_picks_sparse_for_low_density() {
        let mut rows = vec![vec![0.0; 10]; 10];
        rows[3][4] = 1.0;
        let m = Matrix::from_rows_with(&rows, StorageKind::Auto).unwrap();
        assert!(m.is_sparse());
        assert_eq!(m.stored_entries(), 1);
        assert_eq!(m.element(3, 4), Some(1.0));
    }

    #[test]
    fn test_auto_storage_picks_dense_for_high_density() {
        let rows = vec![vec![1.0, 2.0], vec![0.0, 4.0]];
        let m = Matrix::from_rows_with(&rows, StorageKind::Auto).unwrap();
        assert!(m.as_dense().is_some());
        assert_eq!(m.dims(), (2, 2));
    }

    #[test]
    fn test_to_dense_borrows_dense_storage() {
        let m = Matrix::dense(&[vec![1.0, 0.0]]).unwrap();
        assert!(matches!(m.to_dense(), Cow::Borrowed(_)));
        let s = Matrix::sparse(&[vec![1.0, 0.0]]).unwrap();
        assert!(matches!(s.to_dense(), Cow::Owned(_)));
        assert_eq!(s.to_dense().as_ref(), m.as_dense().unwrap());
    }

    #[test]
    fn test_storage_kind_deserializes_lowercase() {
        let kind: StorageKind = serde_json::from_str("\"sparse\"").unwrap();
        assert_eq!(kind, StorageKind::Sparse);
    }
}
