//! Reference CPU provider.
//!
//! Implements every operation for any [`Field`]. Sparse operands are
//! expanded to dense storage first; results are always dense. Other
//! providers delegate here for anything they do not handle themselves.

use crate::config::DenseConfig;
use crate::provider::{unsupported, ComputeProvider, PRIORITY_CPU_DENSE};
use linalg_core::{DenseMatrix, Field, LinalgError, Matrix, MatrixLike, Result, Vector};
use rayon::prelude::*;

pub const CPU_DENSE_ID: &str = "cpu-dense";

#[derive(Debug, Clone, Default)]
pub struct CpuDenseProvider {
    config: DenseConfig,
}

fn check_same_len<E: Field>(a: &Vector<E>, b: &Vector<E>, op: &str) -> Result<()> {
    if a.dimension() != b.dimension() {
        return Err(LinalgError::DimensionMismatch(format!(
            "{}: vector lengths {} and {} differ",
            op,
            a.dimension(),
            b.dimension()
        )));
    }
    Ok(())
}

fn check_same_dims<E: Field>(a: &DenseMatrix<E>, b: &DenseMatrix<E>, op: &str) -> Result<()> {
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

fn check_square<E: Field>(a: &DenseMatrix<E>) -> Result<usize> {
    let (rows, cols) = a.dims();
    if rows != cols {
        return Err(LinalgError::NotSquare { rows, cols });
    }
    Ok(rows)
}

/// Pivot threshold for elimination: `None` for exact fields, otherwise a
/// magnitude relative to the largest entry of the input, in units of the
/// field's own machine epsilon.
fn pivot_tolerance<E: Field>(data: &[E], n: usize) -> Option<f64> {
    let epsilon = E::epsilon()?;
    let mut max_abs: Option<f64> = None;
    for v in data {
        let m = v.magnitude()?;
        max_abs = Some(max_abs.map_or(m, |acc| acc.max(m)));
    }
    Some(epsilon * n as f64 * max_abs.unwrap_or(0.0))
}

fn find_pivot<E: Field>(
    work: &[E],
    width: usize,
    n: usize,
    col: usize,
    tolerance: Option<f64>,
) -> Option<usize> {
    match tolerance {
        Some(tol) => (col..n)
            .filter_map(|r| work[r * width + col].magnitude().map(|m| (r, m)))
            .max_by(|x, y| x.1.total_cmp(&y.1))
            .filter(|&(_, m)| m > tol)
            .map(|(r, _)| r),
        None => (col..n).find(|&r| !work[r * width + col].is_zero()),
    }
}

/// Gauss-Jordan elimination with partial pivoting.
///
/// `work` holds `n` rows of `width` columns whose leading `n x n` block is
/// `A`. On success that block becomes the identity, the trailing columns hold
/// `A^-1` applied to them, and the determinant of `A` is returned. `None`
/// means `A` is singular; `work` is then left partially reduced.
fn gauss_jordan<E: Field>(work: &mut [E], n: usize, width: usize) -> Option<E> {
    let tolerance = {
        let a: Vec<E> = (0..n)
            .flat_map(|r| work[r * width..r * width + n].iter().cloned())
            .collect();
        pivot_tolerance(&a, n)
    };
    let mut det = E::one();

    for col in 0..n {
        let pivot_row = find_pivot(work, width, n, col, tolerance)?;
        if pivot_row != col {
            for j in 0..width {
                work.swap(col * width + j, pivot_row * width + j);
            }
            det = det.negate();
        }

        let pivot = work[col * width + col].clone();
        det = det.multiply(&pivot);
        let inv = pivot.reciprocal()?;
        for j in col..width {
            work[col * width + j] = work[col * width + j].multiply(&inv);
        }

        let pivot_tail: Vec<E> = work[col * width + col..(col + 1) * width].to_vec();
        for r in (0..n).filter(|&r| r != col) {
            let factor = work[r * width + col].clone();
            if factor.is_zero() {
                continue;
            }
            for (offset, p) in pivot_tail.iter().enumerate() {
                let idx = r * width + col + offset;
                work[idx] = work[idx].subtract(&factor.multiply(p));
            }
        }
    }
    Some(det)
}

fn is_power_of_two(n: usize) -> bool {
    n != 0 && n & (n - 1) == 0
}

impl CpuDenseProvider {
    pub fn new(config: DenseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DenseConfig {
        &self.config
    }

    fn parallel(&self, work: usize) -> bool {
        work >= self.config.parallel_threshold
    }

    fn zip_map<E: Field>(&self, a: &[E], b: &[E], f: impl Fn(&E, &E) -> E + Sync + Send) -> Vec<E> {
        if self.parallel(a.len()) {
            a.par_iter().zip(b.par_iter()).map(|(x, y)| f(x, y)).collect()
        } else {
            a.iter().zip(b.iter()).map(|(x, y)| f(x, y)).collect()
        }
    }

    fn map<E: Field>(&self, a: &[E], f: impl Fn(&E) -> E + Sync + Send) -> Vec<E> {
        if self.parallel(a.len()) {
            a.par_iter().map(f).collect()
        } else {
            a.iter().map(f).collect()
        }
    }

    pub fn add_dense<E: Field>(
        &self,
        a: &DenseMatrix<E>,
        b: &DenseMatrix<E>,
    ) -> Result<DenseMatrix<E>> {
        check_same_dims(a, b, "matrix_add")?;
        DenseMatrix::new(a.rows(), a.cols(), self.zip_map(a.data(), b.data(), |x, y| x.add(y)))
    }

    pub fn subtract_dense<E: Field>(
        &self,
        a: &DenseMatrix<E>,
        b: &DenseMatrix<E>,
    ) -> Result<DenseMatrix<E>> {
        check_same_dims(a, b, "matrix_subtract")?;
        DenseMatrix::new(
            a.rows(),
            a.cols(),
            self.zip_map(a.data(), b.data(), |x, y| x.subtract(y)),
        )
    }

    /// Dense product. Uses Strassen for square power-of-two operands at or
    /// above the configured cutoff, the row-wise triple loop otherwise.
    pub fn multiply_dense<E: Field>(
        &self,
        a: &DenseMatrix<E>,
        b: &DenseMatrix<E>,
    ) -> Result<DenseMatrix<E>> {
        if a.cols() != b.rows() {
            return Err(LinalgError::DimensionMismatch(format!(
                "matrix_multiply: {}x{} times {}x{}",
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            )));
        }
        let n = a.rows();
        if self.config.use_strassen
            && a.is_square()
            && b.is_square()
            && is_power_of_two(n)
            && n >= self.config.strassen_cutoff
        {
            log::debug!("Strassen multiply for {}x{} operands", n, n);
            return self.strassen(a, b);
        }
        self.multiply_standard(a, b)
    }

    fn multiply_standard<E: Field>(
        &self,
        a: &DenseMatrix<E>,
        b: &DenseMatrix<E>,
    ) -> Result<DenseMatrix<E>> {
        let m = a.rows();
        let n = b.cols();
        let row_product = |i: usize, out: &mut [E]| {
            for (p, a_ip) in a.row(i).iter().enumerate() {
                if a_ip.is_zero() {
                    continue;
                }
                for (cell, b_pj) in out.iter_mut().zip(b.row(p)) {
                    *cell = cell.add(&a_ip.multiply(b_pj));
                }
            }
        };

        let mut data = vec![E::zero(); m * n];
        if n > 0 {
            if self.parallel(m * n) {
                data.par_chunks_mut(n)
                    .enumerate()
                    .for_each(|(i, out)| row_product(i, out));
            } else {
                data.chunks_mut(n)
                    .enumerate()
                    .for_each(|(i, out)| row_product(i, out));
            }
        }
        DenseMatrix::new(m, n, data)
    }

    fn strassen<E: Field>(&self, a: &DenseMatrix<E>, b: &DenseMatrix<E>) -> Result<DenseMatrix<E>> {
        let n = a.rows();
        if n <= self.config.strassen_cutoff || n < 2 {
            return self.multiply_standard(a, b);
        }
        let h = n / 2;
        let quad = |m: &DenseMatrix<E>, r: usize, c: usize| m.sub_matrix(r, r + h, c, c + h);
        let (a11, a12, a21, a22) = (quad(a, 0, 0)?, quad(a, 0, h)?, quad(a, h, 0)?, quad(a, h, h)?);
        let (b11, b12, b21, b22) = (quad(b, 0, 0)?, quad(b, 0, h)?, quad(b, h, 0)?, quad(b, h, h)?);

        let m1 = self.strassen(&self.add_dense(&a11, &a22)?, &self.add_dense(&b11, &b22)?)?;
        let m2 = self.strassen(&self.add_dense(&a21, &a22)?, &b11)?;
        let m3 = self.strassen(&a11, &self.subtract_dense(&b12, &b22)?)?;
        let m4 = self.strassen(&a22, &self.subtract_dense(&b21, &b11)?)?;
        let m5 = self.strassen(&self.add_dense(&a11, &a12)?, &b22)?;
        let m6 = self.strassen(&self.subtract_dense(&a21, &a11)?, &self.add_dense(&b11, &b12)?)?;
        let m7 = self.strassen(&self.subtract_dense(&a12, &a22)?, &self.add_dense(&b21, &b22)?)?;

        let c11 = self.add_dense(&self.subtract_dense(&self.add_dense(&m1, &m4)?, &m5)?, &m7)?;
        let c12 = self.add_dense(&m3, &m5)?;
        let c21 = self.add_dense(&m2, &m4)?;
        let c22 = self.add_dense(&self.add_dense(&self.subtract_dense(&m1, &m2)?, &m3)?, &m6)?;

        Ok(DenseMatrix::from_fn(n, n, |i, j| {
            let block = match (i < h, j < h) {
                (true, true) => &c11,
                (true, false) => &c12,
                (false, true) => &c21,
                (false, false) => &c22,
            };
            block.row(i % h)[j % h].clone()
        }))
    }

    pub fn transpose_dense<E: Field>(&self, a: &DenseMatrix<E>) -> DenseMatrix<E> {
        DenseMatrix::from_fn(a.cols(), a.rows(), |i, j| a.row(j)[i].clone())
    }

    pub fn multiply_vector_dense<E: Field>(
        &self,
        a: &DenseMatrix<E>,
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
        let row_dot = |i: usize| {
            a.row(i)
                .iter()
                .zip(v.iter())
                .fold(E::zero(), |acc, (x, y)| acc.add(&x.multiply(y)))
        };
        let data: Vec<E> = if self.parallel(a.rows() * a.cols()) {
            (0..a.rows()).into_par_iter().map(row_dot).collect()
        } else {
            (0..a.rows()).map(row_dot).collect()
        };
        Ok(Vector::from_vec(data))
    }

    pub fn determinant_dense<E: Field>(&self, a: &DenseMatrix<E>) -> Result<E> {
        let n = check_square(a)?;
        let mut work = a.data().to_vec();
        // A singular matrix has determinant zero; only inverse/solve reject it.
        Ok(gauss_jordan(&mut work, n, n).unwrap_or_else(E::zero))
    }

    pub fn inverse_dense<E: Field>(&self, a: &DenseMatrix<E>) -> Result<DenseMatrix<E>> {
        let n = check_square(a)?;
        let width = 2 * n;
        let mut work = Vec::with_capacity(n * width);
        for i in 0..n {
            work.extend(a.row(i).iter().cloned());
            work.extend((0..n).map(|j| if i == j { E::one() } else { E::zero() }));
        }
        gauss_jordan(&mut work, n, width).ok_or(LinalgError::SingularMatrix)?;
        Ok(DenseMatrix::from_fn(n, n, |i, j| work[i * width + n + j].clone()))
    }

    pub fn solve_dense<E: Field>(&self, a: &DenseMatrix<E>, b: &Vector<E>) -> Result<Vector<E>> {
        let n = check_square(a)?;
        if b.dimension() != n {
            return Err(LinalgError::DimensionMismatch(format!(
                "solve: {}x{} matrix with right-hand side of length {}",
                n,
                n,
                b.dimension()
            )));
        }
        let width = n + 1;
        let mut work = Vec::with_capacity(n * width);
        for (i, rhs) in b.iter().enumerate() {
            work.extend(a.row(i).iter().cloned());
            work.push(rhs.clone());
        }
        gauss_jordan(&mut work, n, width).ok_or(LinalgError::SingularMatrix)?;
        Ok((0..n).map(|i| work[i * width + n].clone()).collect())
    }
}

impl<E: Field> ComputeProvider<E> for CpuDenseProvider {
    fn id(&self) -> &'static str {
        CPU_DENSE_ID
    }

    fn name(&self) -> String {
        "CPU Dense (reference)".to_string()
    }

    fn is_available(&self) -> bool {
        true
    }

    fn priority(&self) -> i32 {
        PRIORITY_CPU_DENSE
    }

    fn vector_add(&self, a: &Vector<E>, b: &Vector<E>) -> Result<Vector<E>> {
        check_same_len(a, b, "vector_add")?;
        Ok(Vector::from_vec(self.zip_map(a.as_slice(), b.as_slice(), |x, y| x.add(y))))
    }

    fn vector_subtract(&self, a: &Vector<E>, b: &Vector<E>) -> Result<Vector<E>> {
        check_same_len(a, b, "vector_subtract")?;
        Ok(Vector::from_vec(
            self.zip_map(a.as_slice(), b.as_slice(), |x, y| x.subtract(y)),
        ))
    }

    fn vector_scale(&self, v: &Vector<E>, scalar: &E) -> Result<Vector<E>> {
        Ok(Vector::from_vec(self.map(v.as_slice(), |x| x.multiply(scalar))))
    }

    fn dot(&self, a: &Vector<E>, b: &Vector<E>) -> Result<E> {
        check_same_len(a, b, "dot")?;
        let sum = if self.parallel(a.dimension()) {
            a.as_slice()
                .par_iter()
                .zip(b.as_slice().par_iter())
                .map(|(x, y)| x.multiply(y))
                .reduce(E::zero, |acc, v| acc.add(&v))
        } else {
            a.iter()
                .zip(b.iter())
                .fold(E::zero(), |acc, (x, y)| acc.add(&x.multiply(y)))
        };
        Ok(sum)
    }

    fn norm(&self, v: &Vector<E>) -> Result<E> {
        let squared = ComputeProvider::dot(self, v, v)?;
        squared
            .sqrt()
            .ok_or_else(|| unsupported(CPU_DENSE_ID, "norm over a field without square roots"))
    }

    fn matrix_add(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        Ok(self.add_dense(&a.to_dense(), &b.to_dense())?.into())
    }

    fn matrix_subtract(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        Ok(self.subtract_dense(&a.to_dense(), &b.to_dense())?.into())
    }

    fn matrix_scale(&self, a: &Matrix<E>, scalar: &E) -> Result<Matrix<E>> {
        let dense = a.to_dense();
        let data = self.map(dense.data(), |x| x.multiply(scalar));
        Ok(DenseMatrix::new(dense.rows(), dense.cols(), data)?.into())
    }

    fn matrix_multiply(&self, a: &Matrix<E>, b: &Matrix<E>) -> Result<Matrix<E>> {
        Ok(self.multiply_dense(&a.to_dense(), &b.to_dense())?.into())
    }

    fn matrix_vector_multiply(&self, a: &Matrix<E>, v: &Vector<E>) -> Result<Vector<E>> {
        self.multiply_vector_dense(&a.to_dense(), v)
    }

    fn transpose(&self, a: &Matrix<E>) -> Result<Matrix<E>> {
        Ok(self.transpose_dense(&a.to_dense()).into())
    }

    fn inverse(&self, a: &Matrix<E>) -> Result<Matrix<E>> {
        Ok(self.inverse_dense(&a.to_dense())?.into())
    }

    fn determinant(&self, a: &Matrix<E>) -> Result<E> {
        self.determinant_dense(&a.to_dense())
    }

    fn solve(&self, a: &Matrix<E>, b: &Vector<E>) -> Result<Vector<E>> {
        self.solve_dense(&a.to_dense(), b)
    }
}
