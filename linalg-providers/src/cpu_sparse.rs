//! CSR provider.
//!
//! Add, subtract, multiply, scale, transpose and matrix-vector products on
//! two sparse operands touch only stored entries. Every row owns its
//! accumulator, so rows are computed sequentially or fanned out over rayon
//! depending on the result row count, and assembled in row order either way.
//! Any other operation or operand combination goes to [`CpuDenseProvider`].

use crate::config::{DenseConfig, SparseConfig};
use crate::cpu_dense::CpuDenseProvider;
use crate::provider::{ComputeProvider, PRIORITY_CPU_SPARSE};
use linalg_core::{Field, LinalgError, Matrix, Result, SparseMatrix, Vector};
use rayon::prelude::*;
use std::collections::BTreeMap;

pub const CPU_SPARSE_ID: &str = "cpu-sparse";

type RowEntries<E> = Vec<(usize, E)>;

#[derive(Debug, Clone, Default)]
pub struct CpuSparseProvider {
    config: SparseConfig,
    dense: CpuDenseProvider,
}

fn check_same_shape<E: Field>(a: &SparseMatrix<E>, b: &SparseMatrix<E>, op: &str) -> Result<()> {
    if a.dims() != b.dims() {
        return Err(LinalgError::DimensionMismatch(format!(
            "{}: {:?} and {:?} differ",
            op,
            a.dims(),
            b.dims()
        )));
    }
    Ok(())
}

/// Merges row `r` of `b`, mapped through `f`, into row `r` of `a`.
fn merge_row<E: Field>(
    a: &SparseMatrix<E>,
    b: &SparseMatrix<E>,
    r: usize,
    f: impl Fn(&E) -> E,
) -> RowEntries<E> {
    let mut acc: BTreeMap<usize, E> = a.row(r).map(|(c, v)| (c, v.clone())).collect();
    for (c, v) in b.row(r) {
        let incoming = f(v);
        match acc.get_mut(&c) {
            Some(existing) => {
                let sum = existing.add(&incoming);
                if sum.is_zero() {
                    acc.remove(&c);
                } else {
                    *existing = sum;
                }
            }
            None => {
                if !incoming.is_zero() {
                    acc.insert(c, incoming);
                }
            }
        }
    }
    acc.into_iter().collect()
}

impl CpuSparseProvider {
    pub fn new(config: SparseConfig, dense: DenseConfig) -> Self {
        Self {
            config,
            dense: CpuDenseProvider::new(dense),
        }
    }

    pub fn config(&self) -> &SparseConfig {
        &self.config
    }

    /// Computes every row with `row_fn`, in parallel once `rows` reaches the
    /// threshold. The output is in row order regardless of completion order.
    fn map_rows<T: Send>(&self, rows: usize, row_fn: impl Fn(usize) -> T + Sync + Send) -> Vec<T> {
        if rows < self.config.parallel_threshold {
            (0..rows).map(row_fn).collect()
        } else {
            log::trace!("Parallel row dispatch over {} rows", rows);
            (0..rows).into_par_iter().map(row_fn).collect()
        }
    }

    pub fn sparse_add<E: Field>(
        &self,
        a: &SparseMatrix<E>,
        b: &SparseMatrix<E>,
    ) -> Result<SparseMatrix<E>> {
        check_same_shape(a, b, "matrix_add")?;
        let rows = self.map_rows(a.rows(), |r| merge_row(a, b, r, E::clone));
        SparseMatrix::from_sorted_rows(a.rows(), a.cols(), rows)
    }

    pub fn sparse_subtract<E: Field>(
        &self,
        a: &SparseMatrix<E>,
        b: &SparseMatrix<E>,
    ) -> Result<SparseMatrix<E>> {
        check_same_shape(a, b, "matrix_subtract")?;
        let rows = self.map_rows(a.rows(), |r| merge_row(a, b, r, E::negate));
        SparseMatrix::from_sorted_rows(a.rows(), a.cols(), rows)
    }

    /// Row-by-row sparse product (Gustavson).
    pub fn sparse_multiply<E: Field>(
        &self,
        a: &SparseMatrix<E>,
        b: &SparseMatrix<E>,
    ) -> Result<SparseMatrix<E>> {
        if a.cols() != b.rows() {
            return Err(LinalgError::DimensionMismatch(format!(
                "matrix_multiply: {}x{} times {}x{}",
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            )));
        }
        let rows = self.map_rows(a.rows(), |i| {
            let mut acc: BTreeMap<usize, E> = BTreeMap::new();
            for (k, a_ik) in a.row(i) {
                for (j, b_kj) in b.row(k) {
                    let product = a_ik.multiply(b_kj);
                    match acc.get_mut(&j) {
                        Some(existing) => *existing = existing.add(&product),
                        None => {
                            acc.insert(j, product);
                        }
                    }
                }
            }
            acc.into_iter()
                .filter(|(_, v)| !v.is_zero())
                .collect::<RowEntries<E>>()
        });
        SparseMatrix::from_sorted_rows(a.rows(), b.cols(), rows)
    }

    pub fn sparse_scale<E: Field>(
        &self,
        a: &SparseMatrix<E>,
        scalar: &E,
    ) -> Result<SparseMatrix<E>> {
        let rows = self.map_rows(a.rows(), |r| {
            a.row(r)
                .map(|(c, v)| (c, v.multiply(scalar)))
                .filter(|(_, v)| !v.is_zero())
                .collect::<RowEntries<E>>()
        });
        SparseMatrix::from_sorted_rows(a.rows(), a.cols(), rows)
    }

    pub fn sparse_multiply_vector<E: Field>(
        &self,
        a: &SparseMatrix<E>,
        v: &Vector<E>,
    ) -> Result<Vector<E>> {
        if a.cols() != v.dimension() {
            return Err(LinalgError::DimensionMismatch(format!(
                "matrix_vector_multiply: {}x{} matrix with vector of length {}",
                a.rows(),
                a.cols(),
                v.dimension()
            )));
        }
        let x = v.as_slice();
        let data = self.map_rows(a.rows(), |r| {
            a.row(r)
                .fold(E::zero(), |acc, (c, value)| acc.add(&value.multiply(&x[c])))
        });
        Ok(Vector::from_vec(data))
    }
}

impl<E: Field> ComputeProvider<E> for CpuSparseProvider {
    fn id(&self) -> &'static str {
        CPU_SPARSE_ID
    }

    fn name(&self) -> String {
        "CPU Sparse (CSR)".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        PRIORITY_CPU_SPARSE
    }

    fn vector_add(&self, a: &Vector<E>, b: &Vector<E>) -> Result<Vector<E>> {
        self.dense.vector_add(a, b)
    }

    fn vector_subtract(&self, a: &Vector<E>, b: &Vector<E>) -> Result<Vector<E>> {
        self.dense.vector_subtract(a, b)
    }

    fn vector_scale(&self, v: &Vector<E>, scalar: &E) -> Result<Vector<E>> {
        self.dense.vector_scale(v, scalar)
    }

    fn dot(&self, a: &Vector<E>, b: &Vector<E>) -> Result<E> {
        self.dense.dot(a, b)
    }

    fn norm(&self, v: &Vector<E>) -> Result<E> {
        self.dense.norm(v)
    }

    fn matrix_add(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        match (a, b) {
            (Matrix::Sparse(a), Matrix::Sparse(b)) => Ok(self.sparse_add(a, b)?.into()),
            _ => self.dense.matrix_add(a, b),
        }
    }

    fn matrix_subtract(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        match (a, b) {
            (Matrix::Sparse(a), Matrix::Sparse(b)) => Ok(self.sparse_subtract(a, b)?.into()),
            _ => self.dense.matrix_subtract(a, b),
        }
    }

    fn matrix_scale(&self, a: &Matrix<E>, scalar: &E) -> Result<Matrix<E>> {
        match a {
            Matrix::Sparse(s) => Ok(self.sparse_scale(s, scalar)?.into()),
            Matrix::Dense(_) => self.dense.matrix_scale(a, scalar),
        }
    }

    fn matrix_multiply(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        match (a, b) {
            (Matrix::Sparse(a), Matrix::Sparse(b)) => Ok(self.sparse_multiply(a, b)?.into()),
            _ => self.dense.matrix_multiply(a, b),
        }
    }

    fn matrix_vector_multiply(&self, a: &Matrix<E>, v: &Vector<E>) -> Result<Vector<E>> {
        match a {
            Matrix::Sparse(s) => self.sparse_multiply_vector(s, v),
            Matrix::Dense(_) => self.dense.matrix_vector_multiply(a, v),
        }
    }

    fn transpose(&self, a: &Matrix<E>) -> Result<Matrix<E>> {
        match a {
            Matrix::Sparse(s) => Ok(s.transpose().into()),
            Matrix::Dense(_) => self.dense.transpose(a),
        }
    }

    fn inverse(&self, a: &Matrix<E>) -> Result<Matrix<E>> {
        self.dense.inverse(a)
    }

    fn determinant(&self, a: &Matrix<E>) -> Result<E> {
        self.dense.determinant(a)
    }

    fn solve(&self, a: &Matrix<E>, b: &Vector<E>) -> Result<Vector<E>> {
        self.dense.solve(a, b)
    }
}
