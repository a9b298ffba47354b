use crate::field::Field;
use std::fmt::Debug;

/// Generic trait representing a matrix shape.
/// Implementations can be sparse or dense.
pub trait MatrixLike: Debug {
    /// The scalar type of the matrix elements.
    type Value: Field;

    /// Returns the dimensions of the matrix as (rows, columns).
    fn dims(&self) -> (usize, usize);

    /// Returns the element at `(row, col)`, `None` when out of bounds.
    /// Entries not stored by a sparse matrix read as zero.
    fn element(&self, row: usize, col: usize) -> Option<Self::Value>;

    /// Returns the number of rows.
    fn rows(&self) -> usize {
        self.dims().0
    }

    /// Returns the number of columns.
    fn cols(&self) -> usize {
        self.dims().1
    }

    /// Checks if the matrix is square.
    fn is_square(&self) -> bool {
        let (rows, cols) = self.dims();
        rows == cols
    }
}

/// Generic trait representing a vector.
pub trait VectorLike: Debug {
    type Value: Field;

    /// Returns the number of elements in the vector.
    fn len(&self) -> usize;

    /// Checks if the vector is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
