//! Compressed Sparse Row matrices for neighborhood operators.
//!
//! [`CsrMatrix`] is an immutable, cache-friendly row-major sparse matrix. Column
//! indices inside each row are sorted and unique, and explicit zeros are never
//! stored, so iteration order is deterministic and two matrices with the same
//! entries compare equal.
//!
//! Only the operations message passing needs are provided: assembly from
//! triplets, transposition, sparse × sparse and sparse × dense products,
//! element-wise maps and pattern masks.

use std::fmt;

use ndarray::Array2;
use num_traits::Float;

use crate::topo_error::{Result, TopoModelError};

/// Numeric element usable inside a [`CsrMatrix`].
pub trait Scalar: Float + Send + Sync + fmt::Debug + 'static {}
impl<T: Float + Send + Sync + fmt::Debug + 'static> Scalar for T {}

/// Row-major sparse matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct CsrMatrix<T = f32> {
    nrows: usize,
    ncols: usize,
    /// `offsets[i]..offsets[i + 1]` is the slice of row `i` in `indices`/`values`.
    offsets: Vec<usize>,
    indices: Vec<usize>,
    values: Vec<T>,
}

impl<T: Scalar> CsrMatrix<T> {
    /// All-zero matrix of the given shape.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            nrows,
            ncols,
            offsets: vec![0; nrows + 1],
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    /// `n × n` identity.
    pub fn identity(n: usize) -> Self {
        Self::diag(&vec![T::one(); n])
    }

    /// Square diagonal matrix with the given diagonal (zeros are dropped).
    pub fn diag(diagonal: &[T]) -> Self {
        let n = diagonal.len();
        let mut offsets = Vec::with_capacity(n + 1);
        let mut indices = Vec::with_capacity(n);
        let mut values = Vec::with_capacity(n);
        offsets.push(0);
        for (i, &d) in diagonal.iter().enumerate() {
            if d != T::zero() {
                indices.push(i);
                values.push(d);
            }
            offsets.push(indices.len());
        }
        Self {
            nrows: n,
            ncols: n,
            offsets,
            indices,
            values,
        }
    }

    /// Assemble from `(row, col, value)` triplets.
    ///
    /// Duplicate coordinates are summed and entries that end up exactly zero
    /// are dropped.
    ///
    /// # Errors
    /// [`TopoModelError::ShapeMismatch`] if a coordinate lies outside the shape.
    pub fn from_triplets<I>(nrows: usize, ncols: usize, triplets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, usize, T)>,
    {
        let mut rows: Vec<Vec<(usize, T)>> = vec![Vec::new(); nrows];
        for (i, j, v) in triplets {
            if i >= nrows || j >= ncols {
                return Err(TopoModelError::ShapeMismatch {
                    op: "from_triplets",
                    left: (i, j),
                    right: (nrows, ncols),
                });
            }
            rows[i].push((j, v));
        }

        let mut offsets = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        offsets.push(0);
        for mut row in rows {
            row.sort_unstable_by_key(|(j, _)| *j);
            let mut k = 0;
            while k < row.len() {
                let j = row[k].0;
                let mut acc = T::zero();
                while k < row.len() && row[k].0 == j {
                    acc = acc + row[k].1;
                    k += 1;
                }
                if acc != T::zero() {
                    indices.push(j);
                    values.push(acc);
                }
            }
            offsets.push(indices.len());
        }
        Ok(Self {
            nrows,
            ncols,
            offsets,
            indices,
            values,
        })
    }

    /// Sparse copy of a dense matrix (exact zeros are skipped).
    pub fn from_dense(dense: &Array2<T>) -> Self {
        let (nrows, ncols) = dense.dim();
        let mut offsets = Vec::with_capacity(nrows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        offsets.push(0);
        for row in dense.rows() {
            for (j, &v) in row.iter().enumerate() {
                if v != T::zero() {
                    indices.push(j);
                    values.push(v);
                }
            }
            offsets.push(indices.len());
        }
        Self {
            nrows,
            ncols,
            offsets,
            indices,
            values,
        }
    }

    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    /// Number of stored (non-zero) entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    /// CSR row offsets (length `nrows + 1`).
    #[inline]
    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Column index of every stored entry.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Value of every stored entry.
    #[inline]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    /// Entries of row `i` as `(col, value)` pairs in ascending column order.
    /// Rows past `nrows` are empty.
    pub fn row(&self, i: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        let range = if i < self.nrows {
            self.offsets[i]..self.offsets[i + 1]
        } else {
            0..0
        };
        self.indices[range.clone()]
            .iter()
            .copied()
            .zip(self.values[range].iter().copied())
    }

    /// All stored entries as `(row, col, value)`, row-major.
    pub fn triplets(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        (0..self.nrows).flat_map(move |i| self.row(i).map(move |(j, v)| (i, j, v)))
    }

    /// Value at `(i, j)`; zero when not stored or out of range.
    pub fn get(&self, i: usize, j: usize) -> T {
        if i >= self.nrows {
            return T::zero();
        }
        let range = self.offsets[i]..self.offsets[i + 1];
        match self.indices[range.clone()].binary_search(&j) {
            Ok(k) => self.values[range.start + k],
            Err(_) => T::zero(),
        }
    }

    pub fn transpose(&self) -> Self {
        let mut counts = vec![0usize; self.ncols + 1];
        for &j in &self.indices {
            counts[j + 1] += 1;
        }
        for j in 0..self.ncols {
            counts[j + 1] += counts[j];
        }
        let offsets = counts.clone();
        let mut write = counts;
        let mut indices = vec![0usize; self.nnz()];
        let mut values = vec![T::zero(); self.nnz()];
        // rows are visited in ascending order, so each transposed row stays sorted
        for i in 0..self.nrows {
            for (j, v) in self.row(i) {
                let pos = write[j];
                indices[pos] = i;
                values[pos] = v;
                write[j] += 1;
            }
        }
        Self {
            nrows: self.ncols,
            ncols: self.nrows,
            offsets,
            indices,
            values,
        }
    }

    /// Apply `f` to every stored value, dropping results that become zero.
    pub fn map_values<F: Fn(T) -> T>(&self, f: F) -> Self {
        let mut offsets = Vec::with_capacity(self.nrows + 1);
        let mut indices = Vec::with_capacity(self.nnz());
        let mut values = Vec::with_capacity(self.nnz());
        offsets.push(0);
        for i in 0..self.nrows {
            for (j, v) in self.row(i) {
                let w = f(v);
                if w != T::zero() {
                    indices.push(j);
                    values.push(w);
                }
            }
            offsets.push(indices.len());
        }
        Self {
            nrows: self.nrows,
            ncols: self.ncols,
            offsets,
            indices,
            values,
        }
    }

    pub fn abs(&self) -> Self {
        self.map_values(|v| v.abs())
    }

    pub fn scale(&self, factor: T) -> Self {
        self.map_values(|v| v * factor)
    }

    /// Replace every stored value by one.
    pub fn binarize(&self) -> Self {
        self.map_values(|_| T::one())
    }

    /// Copy with all diagonal entries removed.
    pub fn without_diagonal(&self) -> Self {
        let triplets = self.triplets().filter(|&(i, j, _)| i != j);
        // coordinates come from a valid matrix, so assembly cannot fail
        Self::from_triplets(self.nrows, self.ncols, triplets).unwrap_or_else(|_| self.clone())
    }

    /// Element-wise sum.
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other, "add")?;
        Self::from_triplets(
            self.nrows,
            self.ncols,
            self.triplets().chain(other.triplets()),
        )
    }

    /// Element-wise difference.
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.check_same_shape(other, "sub")?;
        Self::from_triplets(
            self.nrows,
            self.ncols,
            self.triplets()
                .chain(other.triplets().map(|(i, j, v)| (i, j, -v))),
        )
    }

    fn check_same_shape(&self, other: &Self, op: &'static str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(TopoModelError::ShapeMismatch {
                op,
                left: self.shape(),
                right: other.shape(),
            });
        }
        Ok(())
    }

    /// Sparse × sparse product (row-wise Gustavson with a dense accumulator).
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        if self.ncols != other.nrows {
            return Err(TopoModelError::ShapeMismatch {
                op: "matmul",
                left: self.shape(),
                right: other.shape(),
            });
        }
        let n = other.ncols;
        let mut acc = vec![T::zero(); n];
        let mut seen = vec![false; n];
        let mut touched: Vec<usize> = Vec::new();

        let mut offsets = Vec::with_capacity(self.nrows + 1);
        let mut indices = Vec::new();
        let mut values = Vec::new();
        offsets.push(0);
        for i in 0..self.nrows {
            for (k, a) in self.row(i) {
                for (j, b) in other.row(k) {
                    if !seen[j] {
                        seen[j] = true;
                        touched.push(j);
                    }
                    acc[j] = acc[j] + a * b;
                }
            }
            touched.sort_unstable();
            for &j in &touched {
                if acc[j] != T::zero() {
                    indices.push(j);
                    values.push(acc[j]);
                }
                acc[j] = T::zero();
                seen[j] = false;
            }
            touched.clear();
            offsets.push(indices.len());
        }
        Ok(Self {
            nrows: self.nrows,
            ncols: n,
            offsets,
            indices,
            values,
        })
    }

    /// Sparse × dense product `self · x`.
    pub fn matmul_dense(&self, x: &Array2<T>) -> Result<Array2<T>> {
        if self.ncols != x.nrows() {
            return Err(TopoModelError::ShapeMismatch {
                op: "matmul_dense",
                left: self.shape(),
                right: x.dim(),
            });
        }
        let channels = x.ncols();
        let mut out = Array2::<T>::zeros((self.nrows, channels));

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            let rows: Vec<Vec<T>> = (0..self.nrows)
                .into_par_iter()
                .map(|i| {
                    let mut acc = vec![T::zero(); channels];
                    for (j, v) in self.row(i) {
                        for (c, slot) in acc.iter_mut().enumerate() {
                            *slot = *slot + v * x[[j, c]];
                        }
                    }
                    acc
                })
                .collect();
            for (i, row) in rows.into_iter().enumerate() {
                for (c, v) in row.into_iter().enumerate() {
                    out[[i, c]] = v;
                }
            }
        }

        #[cfg(not(feature = "rayon"))]
        for i in 0..self.nrows {
            let mut out_row = out.row_mut(i);
            for (j, v) in self.row(i) {
                let x_row = x.row(j);
                for (o, &xv) in out_row.iter_mut().zip(x_row.iter()) {
                    *o = *o + v * xv;
                }
            }
        }

        Ok(out)
    }

    /// `selfᵀ · x` without materialising the transpose.
    pub fn transpose_matmul_dense(&self, x: &Array2<T>) -> Result<Array2<T>> {
        if self.nrows != x.nrows() {
            return Err(TopoModelError::ShapeMismatch {
                op: "transpose_matmul_dense",
                left: (self.ncols, self.nrows),
                right: x.dim(),
            });
        }
        let mut out = Array2::<T>::zeros((self.ncols, x.ncols()));
        for i in 0..self.nrows {
            let x_row = x.row(i);
            for (j, v) in self.row(i) {
                let mut out_row = out.row_mut(j);
                for (o, &xv) in out_row.iter_mut().zip(x_row.iter()) {
                    *o = *o + v * xv;
                }
            }
        }
        Ok(out)
    }

    /// Keep the sparsity pattern of `self`, multiplying each stored value by
    /// the matching entry of `dense`.
    pub fn hadamard_dense(&self, dense: &Array2<T>) -> Result<Self> {
        if self.shape() != dense.dim() {
            return Err(TopoModelError::ShapeMismatch {
                op: "hadamard_dense",
                left: self.shape(),
                right: dense.dim(),
            });
        }
        let triplets = self.triplets().map(|(i, j, v)| (i, j, v * dense[[i, j]]));
        Self::from_triplets(self.nrows, self.ncols, triplets)
    }

    /// Replace the stored values (pattern unchanged). `values.len()` must equal `nnz`.
    pub fn with_values(&self, values: Vec<T>) -> Result<Self> {
        if values.len() != self.nnz() {
            return Err(TopoModelError::ShapeMismatch {
                op: "with_values",
                left: (self.nnz(), 1),
                right: (values.len(), 1),
            });
        }
        Ok(Self {
            nrows: self.nrows,
            ncols: self.ncols,
            offsets: self.offsets.clone(),
            indices: self.indices.clone(),
            values,
        })
    }

    pub fn row_sums(&self) -> Vec<T> {
        (0..self.nrows)
            .map(|i| self.row(i).fold(T::zero(), |acc, (_, v)| acc + v))
            .collect()
    }

    pub fn col_sums(&self) -> Vec<T> {
        let mut sums = vec![T::zero(); self.ncols];
        for (&j, &v) in self.indices.iter().zip(self.values.iter()) {
            sums[j] = sums[j] + v;
        }
        sums
    }

    pub fn to_dense(&self) -> Array2<T> {
        let mut out = Array2::<T>::zeros((self.nrows, self.ncols));
        for (i, j, v) in self.triplets() {
            out[[i, j]] = v;
        }
        out
    }

    /// `true` when `|a_ij - a_ji| <= tol` for every entry.
    pub fn is_symmetric(&self, tol: T) -> bool {
        self.is_square()
            && self
                .triplets()
                .all(|(i, j, v)| (v - self.get(j, i)).abs() <= tol)
    }

    /// Largest absolute stored value (zero for an empty matrix).
    pub fn max_abs(&self) -> T {
        self.values
            .iter()
            .fold(T::zero(), |acc, &v| if v.abs() > acc { v.abs() } else { acc })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn sample() -> CsrMatrix {
        // [[1, 0, 2],
        //  [0, 0, 3],
        //  [4, 5, 0]]
        CsrMatrix::from_triplets(
            3,
            3,
            vec![(0, 0, 1.0), (0, 2, 2.0), (1, 2, 3.0), (2, 0, 4.0), (2, 1, 5.0)],
        )
        .unwrap()
    }

    #[test]
    fn triplets_are_summed_and_zeros_dropped() {
        let m = CsrMatrix::from_triplets(2, 2, vec![(0, 1, 1.0f32), (0, 1, 2.0), (1, 0, 1.0), (1, 0, -1.0)])
            .unwrap();
        assert_eq!(m.nnz(), 1);
        assert_eq!(m.get(0, 1), 3.0);
        assert_eq!(m.get(1, 0), 0.0);
    }

    #[test]
    fn out_of_bounds_triplet_is_an_error() {
        let err = CsrMatrix::<f32>::from_triplets(2, 2, vec![(2, 0, 1.0)]).unwrap_err();
        assert!(matches!(err, TopoModelError::ShapeMismatch { op: "from_triplets", .. }));
    }

    #[test]
    fn transpose_matches_dense() {
        let m = sample();
        assert_eq!(m.transpose().to_dense(), m.to_dense().t().to_owned());
        assert_eq!(m.transpose().transpose(), m);
    }

    #[test]
    fn sparse_products_match_dense() {
        let m = sample();
        let x = array![[1.0f32, -1.0], [0.5, 2.0], [3.0, 0.0]];
        let dense = m.to_dense();
        assert_eq!(m.matmul_dense(&x).unwrap(), dense.dot(&x));
        assert_eq!(m.transpose_matmul_dense(&x).unwrap(), dense.t().dot(&x));
        assert_eq!(m.matmul(&m).unwrap().to_dense(), dense.dot(&dense));
    }

    #[test]
    fn matmul_rejects_bad_shapes() {
        let m = sample();
        let x = Array2::<f32>::zeros((2, 2));
        assert!(m.matmul_dense(&x).is_err());
        let r = CsrMatrix::<f32>::zeros(2, 3);
        assert!(m.matmul(&r).is_err());
    }

    #[test]
    fn add_sub_and_cancel() {
        let m = sample();
        assert_eq!(m.sub(&m).unwrap().nnz(), 0);
        assert_eq!(m.add(&m).unwrap(), m.scale(2.0));
    }

    #[test]
    fn diagonal_helpers() {
        let m = sample();
        let off = m.without_diagonal();
        assert_eq!(off.get(0, 0), 0.0);
        assert_eq!(off.nnz(), 4);
        assert_eq!(CsrMatrix::<f32>::identity(3).nnz(), 3);
        assert_eq!(m.row_sums(), vec![3.0, 3.0, 9.0]);
        assert_eq!(m.col_sums(), vec![5.0, 5.0, 5.0]);
    }

    #[test]
    fn hadamard_keeps_pattern() {
        let m = sample();
        let dense = Array2::from_elem((3, 3), 2.0f32);
        let h = m.hadamard_dense(&dense).unwrap();
        assert_eq!(h, m.scale(2.0));
    }

    #[test]
    fn symmetric_detection() {
        let m = sample();
        assert!(!m.is_symmetric(0.0));
        let s = m.add(&m.transpose()).unwrap();
        assert!(s.is_symmetric(0.0));
    }

    #[test]
    fn rows_past_the_end_are_empty() {
        let m = sample();
        assert_eq!(m.row(m.nrows()).count(), 0);
        assert_eq!(m.row(usize::MAX).count(), 0);
    }

    #[test]
    fn from_dense_roundtrips() {
        let m = sample();
        assert_eq!(CsrMatrix::from_dense(&m.to_dense()), m);
    }
}
