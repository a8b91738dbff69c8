//! Small dense linear-algebra helpers used to build neighborhood operators.

use ndarray::Array2;

use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};

/// Pivot magnitude below which a matrix is treated as singular.
const SINGULAR_EPS: f64 = 1e-10;

/// Inverse of a square dense matrix by Gauss–Jordan elimination with partial
/// pivoting. Computation runs in `f64`.
///
/// # Errors
/// * [`TopoModelError::ShapeMismatch`] if `a` is not square.
/// * [`TopoModelError::SingularMatrix`] if a pivot vanishes.
pub fn invert(a: &Array2<f32>) -> Result<Array2<f32>> {
    let (n, m) = a.dim();
    if n != m {
        return Err(TopoModelError::ShapeMismatch {
            op: "invert",
            left: (n, m),
            right: (m, n),
        });
    }
    let mut work: Array2<f64> = a.mapv(f64::from);
    let mut inv = Array2::<f64>::eye(n);

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| work[[i, col]].abs().total_cmp(&work[[j, col]].abs()))
            .ok_or(TopoModelError::SingularMatrix)?;
        if work[[pivot_row, col]].abs() < SINGULAR_EPS {
            return Err(TopoModelError::SingularMatrix);
        }
        if pivot_row != col {
            for k in 0..n {
                work.swap([pivot_row, k], [col, k]);
                inv.swap([pivot_row, k], [col, k]);
            }
        }
        let pivot = work[[col, col]];
        for k in 0..n {
            work[[col, k]] /= pivot;
            inv[[col, k]] /= pivot;
        }
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = work[[row, col]];
            if factor == 0.0 {
                continue;
            }
            for k in 0..n {
                work[[row, k]] -= factor * work[[col, k]];
                inv[[row, k]] -= factor * inv[[col, k]];
            }
        }
    }
    Ok(inv.mapv(|v| v as f32))
}

/// Largest absolute eigenvalue of a square sparse matrix, estimated by power
/// iteration from a constant start vector.
pub fn spectral_radius(a: &CsrMatrix<f32>, max_iter: usize, tol: f32) -> Result<f32> {
    if !a.is_square() {
        return Err(TopoModelError::ShapeMismatch {
            op: "spectral_radius",
            left: a.shape(),
            right: (a.ncols(), a.nrows()),
        });
    }
    let n = a.nrows();
    if n == 0 || a.nnz() == 0 {
        return Ok(0.0);
    }
    // alternate signs so the start vector is not orthogonal to a Laplacian's top eigenvector
    let mut v = Array2::<f32>::from_shape_fn((n, 1), |(i, _)| {
        (1.0 + i as f32 / n as f32) * if i % 2 == 0 { 1.0 } else { -1.0 }
    });
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.mapv_inplace(|x| x / norm);

    let mut lambda = 0.0f32;
    for _ in 0..max_iter {
        let w = a.matmul_dense(&v)?;
        let norm = w.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Ok(0.0);
        }
        let next = norm;
        v = w.mapv(|x| x / norm);
        if (next - lambda).abs() <= tol * next.max(1.0) {
            return Ok(next);
        }
        lambda = next;
    }
    Ok(lambda)
}
