use crate::error::{LinalgError, Result};
use crate::field::Field;
use crate::traits::MatrixLike;

/// Represents a dense matrix stored in row-major order on the CPU.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<E: Field> {
    rows: usize,
    cols: usize,
    data: Vec<E>, // Data stored row-major: data[row * cols + col]
}

impl<E: Field> DenseMatrix<E> {
    /// Creates a new DenseMatrix from raw data, dimensions, assuming row-major order.
    pub fn new(rows: usize, cols: usize, data: Vec<E>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(LinalgError::InvalidStorage(format!(
                "Data length ({}) does not match dimensions ({}x{})",
                data.len(),
                rows,
                cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Creates a new DenseMatrix filled with zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![E::zero(); rows * cols],
        }
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.data[i * n + i] = E::one();
        }
        m
    }

    /// Builds a matrix from a slice of rows. All rows must have the same length.
    pub fn from_rows(rows: &[Vec<E>]) -> Result<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map_or(0, |r| r.len());
        if let Some((i, r)) = rows.iter().enumerate().find(|(_, r)| r.len() != n_cols) {
            return Err(LinalgError::InvalidStorage(format!(
                "Row {} has length {}, expected {}",
                i,
                r.len(),
                n_cols
            )));
        }
        let data = rows.iter().flat_map(|r| r.iter().cloned()).collect();
        Ok(Self {
            rows: n_rows,
            cols: n_cols,
            data,
        })
    }

    /// Builds a matrix by evaluating `f(row, col)` for every cell.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> E) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Returns a slice view of the underlying data vector.
    pub fn data(&self) -> &[E] {
        &self.data
    }

    pub fn into_data(self) -> Vec<E> {
        self.data
    }

    /// Gets the element at the specified row and column (immutable).
    /// Returns None if indices are out of bounds.
    pub fn get(&self, row: usize, col: usize) -> Option<&E> {
        if row < self.rows && col < self.cols {
            self.data.get(row * self.cols + col)
        } else {
            None
        }
    }

    /// Gets the element at the specified row and column (mutable).
    /// Returns None if indices are out of bounds.
    pub fn get_mut(&mut self, row: usize, col: usize) -> Option<&mut E> {
        if row < self.rows && col < self.cols {
            self.data.get_mut(row * self.cols + col)
        } else {
            None
        }
    }

    /// Returns row `row` as a slice. Panics when out of bounds.
    pub fn row(&self, row: usize) -> &[E] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Copies the block `[row_start, row_end) x [col_start, col_end)`.
    pub fn sub_matrix(
        &self,
        row_start: usize,
        row_end: usize,
        col_start: usize,
        col_end: usize,
    ) -> Result<Self> {
        if row_start > row_end || col_start > col_end || row_end > self.rows || col_end > self.cols
        {
            return Err(LinalgError::DimensionMismatch(format!(
                "Block [{}..{}) x [{}..{}) outside {}x{} matrix",
                row_start, row_end, col_start, col_end, self.rows, self.cols
            )));
        }
        Ok(Self::from_fn(row_end - row_start, col_end - col_start, |i, j| {
            self.data[(row_start + i) * self.cols + col_start + j].clone()
        }))
    }

    /// Zero-copy view in device format, when the scalar allows it.
    pub fn as_real_slice(&self) -> Option<&[f64]> {
        E::as_real_slice(&self.data)
    }
}

// Implement the generic matrix trait
impl<E: Field> MatrixLike for DenseMatrix<E> {
    type Value = E;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn element(&self, row: usize, col: usize) -> Option<E> {
        self.get(row, col).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_new_rejects_bad_length() {
        let m = DenseMatrix::new(2, 2, vec![1.0, 2.0, 3.0]);
        match m {
            Err(LinalgError::InvalidStorage(msg)) => assert!(msg.contains("Data length (3)")),
            other => panic!("Expected InvalidStorage error, got {:?}", other),
        }
    }

    #[test]
    fn test_dense_row_major_access() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(m.dims(), (2, 3));
        assert_eq!(m.get(1, 0), Some(&4.0));
        assert_eq!(m.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(m.get(2, 0), None);
        assert_eq!(m.element(0, 2), Some(3.0));
    }

    #[test]
    fn test_dense_from_rows_ragged() {
        let m = DenseMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0]]);
        assert!(matches!(m, Err(LinalgError::InvalidStorage(_))));
    }

    #[test]
    fn test_identity_and_sub_matrix() {
        let id: DenseMatrix<f64> = DenseMatrix::identity(4);
        let block = id.sub_matrix(1, 3, 1, 3).unwrap();
        assert_eq!(block, DenseMatrix::identity(2));
        assert!(id.sub_matrix(0, 5, 0, 1).is_err());
    }
}
