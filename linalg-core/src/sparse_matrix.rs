use crate::dense_matrix::DenseMatrix;
use crate::error::{LinalgError, Result};
use crate::field::Field;
use crate::traits::MatrixLike;

/// Represents a sparse matrix in Compressed Sparse Row (CSR) format on the CPU.
///
/// Canonical form is enforced by every constructor: column indices strictly
/// increase inside a row and no stored value equals zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix<E: Field> {
    /// Number of rows.
    rows: usize,
    /// Number of columns.
    cols: usize,
    /// Vector containing the non-zero values of the matrix.
    values: Vec<E>,
    /// Vector containing the column indices corresponding to the values.
    col_indices: Vec<usize>,
    /// Pointers to the start of each row in `values` and `col_indices`.
    /// The length of this vector is `rows + 1`. `row_ptr[i]` gives the index in `values`
    /// where row `i` starts, and `row_ptr[rows]` gives the total number of non-zero elements (nnz).
    row_ptr: Vec<usize>,
}

/// Flattens per-row entry lists into CSR arrays without checking them.
fn concat_rows<E>(row_entries: Vec<Vec<(usize, E)>>) -> (Vec<E>, Vec<usize>, Vec<usize>) {
    let nnz = row_entries.iter().map(Vec::len).sum();
    let mut values = Vec::with_capacity(nnz);
    let mut col_indices = Vec::with_capacity(nnz);
    let mut row_ptr = Vec::with_capacity(row_entries.len() + 1);
    row_ptr.push(0);
    for entries in row_entries {
        for (col, value) in entries {
            col_indices.push(col);
            values.push(value);
        }
        row_ptr.push(values.len());
    }
    (values, col_indices, row_ptr)
}

impl<E: Field> SparseMatrix<E> {
    /// Creates a new empty SparseMatrix with given dimensions.
    pub fn new(rows: usize, cols: usize) -> Self {
        SparseMatrix {
            rows,
            cols,
            values: Vec::new(),
            col_indices: Vec::new(),
            row_ptr: vec![0; rows + 1], // Initialize row_ptr with zeros
        }
    }

    /// Builds a matrix from coordinate triplets.
    /// Duplicate coordinates are summed; entries that end up zero are dropped.
    pub fn from_triplets(rows: usize, cols: usize, triplets: Vec<Triplet<E>>) -> Result<Self> {
        if let Some(t) = triplets.iter().find(|t| t.row >= rows || t.col >= cols) {
            return Err(LinalgError::InvalidStorage(format!(
                "Triplet ({}, {}) out of bounds for {}x{} matrix",
                t.row, t.col, rows, cols
            )));
        }

        // Sort the triplets by row and then by column
        let mut coords = triplets;
        coords.sort_by_key(|t| (t.row, t.col));

        let mut values: Vec<E> = Vec::with_capacity(coords.len());
        let mut col_indices = Vec::with_capacity(coords.len());
        let mut row_ptr = vec![0usize; rows + 1];
        let mut last: Option<(usize, usize)> = None;

        for Triplet { row, col, value } in coords {
            if last == Some((row, col)) {
                // Same coordinate as the previous entry: accumulate in place.
                if let Some(v) = values.last_mut() {
                    *v = v.add(&value);
                }
                continue;
            }
            values.push(value);
            col_indices.push(col);
            row_ptr[row + 1] += 1;
            last = Some((row, col));
        }
        // Convert counts to cumulative row pointers
        for i in 1..=rows {
            row_ptr[i] += row_ptr[i - 1];
        }

        let mut matrix = SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        };
        matrix.prune_zeros();
        Ok(matrix)
    }

    /// Creates a SparseMatrix from CSR components, validating canonical form.
    pub fn from_csr(
        rows: usize,
        cols: usize,
        values: Vec<E>,
        col_indices: Vec<usize>,
        row_ptr: Vec<usize>,
    ) -> Result<Self> {
        if row_ptr.len() != rows + 1 {
            return Err(LinalgError::InvalidStorage(
                "row_ptr length must be rows + 1".to_string(),
            ));
        }
        if values.len() != col_indices.len() {
            return Err(LinalgError::InvalidStorage(
                "values and col_indices must have the same length".to_string(),
            ));
        }
        if row_ptr[0] != 0 {
            return Err(LinalgError::InvalidStorage(
                "First element of row_ptr must be 0".to_string(),
            ));
        }
        if row_ptr[rows] != values.len() {
            return Err(LinalgError::InvalidStorage(
                "Last element of row_ptr must equal the number of non-zero values".to_string(),
            ));
        }
        if row_ptr.windows(2).any(|w| w[0] > w[1]) {
            return Err(LinalgError::InvalidStorage(
                "row_ptr must be non-decreasing".to_string(),
            ));
        }
        if col_indices.iter().any(|&c| c >= cols) {
            return Err(LinalgError::InvalidStorage(
                "Column index out of bounds".to_string(),
            ));
        }
        for r in 0..rows {
            let row_cols = &col_indices[row_ptr[r]..row_ptr[r + 1]];
            if row_cols.windows(2).any(|w| w[0] >= w[1]) {
                return Err(LinalgError::InvalidStorage(format!(
                    "Column indices in row {} must be strictly increasing",
                    r
                )));
            }
        }
        if values.iter().any(|v| v.is_zero()) {
            return Err(LinalgError::InvalidStorage(
                "Explicit zero entries are not allowed".to_string(),
            ));
        }

        Ok(SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        })
    }

    /// Assembles a matrix from per-row `(col, value)` lists.
    ///
    /// Each row must already be sorted by strictly increasing column and free
    /// of zeros; this is what the sparse kernels produce. The result goes
    /// through the same validation as [`SparseMatrix::from_csr`].
    pub fn from_sorted_rows(
        rows: usize,
        cols: usize,
        row_entries: Vec<Vec<(usize, E)>>,
    ) -> Result<Self> {
        if row_entries.len() != rows {
            return Err(LinalgError::InvalidStorage(format!(
                "Expected {} rows of entries, got {}",
                rows,
                row_entries.len()
            )));
        }
        let (values, col_indices, row_ptr) = concat_rows(row_entries);
        Self::from_csr(rows, cols, values, col_indices, row_ptr)
    }

    /// Creates a SparseMatrix from a dense matrix, keeping only non-zero entries.
    pub fn from_dense(dense: &DenseMatrix<E>) -> Self {
        let (rows, cols) = dense.dims();
        let row_entries = (0..rows)
            .map(|r| {
                dense
                    .row(r)
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| !v.is_zero())
                    .map(|(c, v)| (c, v.clone()))
                    .collect()
            })
            .collect();
        // Zero-filtered in column order, so already canonical.
        let (values, col_indices, row_ptr) = concat_rows(row_entries);
        SparseMatrix {
            rows,
            cols,
            values,
            col_indices,
            row_ptr,
        }
    }

    /// Expands into row-major dense storage.
    pub fn to_dense(&self) -> DenseMatrix<E> {
        let mut dense = DenseMatrix::zeros(self.rows, self.cols);
        for t in self.iter() {
            if let Some(cell) = dense.get_mut(t.row, t.col) {
                *cell = t.value;
            }
        }
        dense
    }

    /// Returns the transpose, still in canonical CSR form.
    pub fn transpose(&self) -> Self {
        // Counting sort by column keeps each output row sorted by original row.
        let mut counts = vec![0usize; self.cols + 1];
        for &c in &self.col_indices {
            counts[c + 1] += 1;
        }
        for i in 1..=self.cols {
            counts[i] += counts[i - 1];
        }
        let row_ptr = counts.clone();
        let mut next = counts;
        let mut slots: Vec<Option<(usize, E)>> = vec![None; self.nnz()];
        for r in 0..self.rows {
            for (c, v) in self.row(r) {
                slots[next[c]] = Some((r, v.clone()));
                next[c] += 1;
            }
        }
        let (col_indices, values) = slots.into_iter().flatten().unzip();
        SparseMatrix {
            rows: self.cols,
            cols: self.rows,
            values,
            col_indices,
            row_ptr,
        }
    }

    /// Returns the dimensions of the matrix (rows, cols).
    pub fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Returns the number of non-zero elements.
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    /// Fraction of cells holding a non-zero value.
    pub fn density(&self) -> f64 {
        let total = self.rows * self.cols;
        if total == 0 {
            0.0
        } else {
            self.nnz() as f64 / total as f64
        }
    }

    /// Gets the value at a specific row and column.
    /// Returns `None` for unstored (zero) entries and out-of-bounds indices.
    pub fn get(&self, row: usize, col: usize) -> Option<&E> {
        if row >= self.rows || col >= self.cols {
            return None; // Out of bounds
        }
        let range = self.row_ptr[row]..self.row_ptr[row + 1];
        // Columns are sorted within a row.
        self.col_indices[range.clone()]
            .binary_search(&col)
            .ok()
            .map(|offset| &self.values[range.start + offset])
    }

    /// Iterates the stored `(col, value)` pairs of one row in column order.
    pub fn row(&self, row: usize) -> RowIter<'_, E> {
        let (start, end) = if row < self.rows {
            (self.row_ptr[row], self.row_ptr[row + 1])
        } else {
            (0, 0)
        };
        RowIter {
            cols: &self.col_indices[start..end],
            values: &self.values[start..end],
            pos: 0,
        }
    }

    /// Number of stored entries in `row`.
    /// Zero for rows past the end, like [`SparseMatrix::row`].
    pub fn row_nnz(&self, row: usize) -> usize {
        if row < self.rows {
            self.row_ptr[row + 1] - self.row_ptr[row]
        } else {
            0
        }
    }

    /// Returns a slice containing the non-zero values.
    pub fn values(&self) -> &[E] {
        &self.values
    }

    /// Returns a slice containing the column indices.
    pub fn col_indices(&self) -> &[usize] {
        &self.col_indices
    }

    /// Returns a slice containing the row pointers.
    pub fn row_ptr(&self) -> &[usize] {
        &self.row_ptr
    }

    /// Decomposes into the CSR interchange arrays `(values, col_indices, row_ptr)`.
    pub fn into_csr(self) -> (Vec<E>, Vec<usize>, Vec<usize>) {
        (self.values, self.col_indices, self.row_ptr)
    }

    /// Iterates all stored entries as triplets, row by row.
    pub fn iter(&self) -> SparseMatrixIter<'_, E> {
        SparseMatrixIter {
            matrix: self,
            row: 0,
            index: 0,
        }
    }

    fn prune_zeros(&mut self) {
        if !self.values.iter().any(|v| v.is_zero()) {
            return;
        }
        let mut write = 0;
        let mut start = 0;
        for r in 0..self.rows {
            let end = self.row_ptr[r + 1];
            for read in start..end {
                if !self.values[read].is_zero() {
                    self.values.swap(write, read);
                    self.col_indices[write] = self.col_indices[read];
                    write += 1;
                }
            }
            start = end;
            self.row_ptr[r + 1] = write;
        }
        self.values.truncate(write);
        self.col_indices.truncate(write);
    }
}

/// A single stored entry in coordinate form.
#[derive(Debug, Clone, PartialEq)]
pub struct Triplet<E> {
    pub row: usize,
    pub col: usize,
    pub value: E,
}

impl<E> Triplet<E> {
    pub fn new(row: usize, col: usize, value: E) -> Self {
        Triplet { row, col, value }
    }
}

/// Iterator over the entries of one CSR row.
#[derive(Debug, Clone)]
pub struct RowIter<'a, E> {
    cols: &'a [usize],
    values: &'a [E],
    pos: usize,
}

impl<'a, E> Iterator for RowIter<'a, E> {
    type Item = (usize, &'a E);

    fn next(&mut self) -> Option<Self::Item> {
        let col = *self.cols.get(self.pos)?;
        let value = &self.values[self.pos];
        self.pos += 1;
        Some((col, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.cols.len() - self.pos;
        (left, Some(left))
    }
}

impl<E> ExactSizeIterator for RowIter<'_, E> {}

pub struct SparseMatrixIter<'a, E: Field> {
    matrix: &'a SparseMatrix<E>,
    row: usize,
    index: usize,
}

impl<E: Field> Iterator for SparseMatrixIter<'_, E> {
    type Item = Triplet<E>;

    fn next(&mut self) -> Option<Self::Item> {
        let m = self.matrix;
        if self.index >= m.nnz() {
            return None;
        }
        // Skip rows whose range ends at or before the current entry.
        while m.row_ptr[self.row + 1] <= self.index {
            self.row += 1;
        }
        let triplet = Triplet {
            row: self.row,
            col: m.col_indices[self.index],
            value: m.values[self.index].clone(),
        };
        self.index += 1;
        Some(triplet)
    }
}

// Implement the generic matrix trait for the CPU version
impl<E: Field> MatrixLike for SparseMatrix<E> {
    type Value = E;

    fn dims(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    fn element(&self, row: usize, col: usize) -> Option<E> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(self.get(row, col).cloned().unwrap_or_else(E::zero))
    }
}
