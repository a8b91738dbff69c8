//! Neighborhood kinds and the normalisations applied before message passing.
//!
//! Raw incidence or Laplacian matrices are rarely fed to a layer as-is. The
//! helpers here rescale them so repeated propagation neither explodes nor
//! vanishes:
//!
//! * [`symmetric_normalize`]: `D^{-1/2} A D^{-1/2}` (GCN style);
//! * [`row_normalize`]: `D^{-1} A` (mean aggregation);
//! * [`scaled_laplacian`]: `L / λ_max`;
//! * [`harmonic_projection`]: `I - εL`;
//! * [`dist2cycle_operator`]: `A↓ ⊙ (I + L↓)^{-1}` on edges.
//!
//! Rows with zero degree stay zero; they are reported once through `log::warn!`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::linalg::{invert, spectral_radius};
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::complex::Complex;

/// Which operator relates two sets of cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborhoodKind {
    /// `B_r`: rank `r-1` cells × rank `r` cells.
    Incidence,
    /// `B_rᵀ`: rank `r` cells × rank `r-1` cells.
    Coincidence,
    Adjacency,
    Coadjacency,
    UpLaplacian,
    DownLaplacian,
    HodgeLaplacian,
}

impl NeighborhoodKind {
    pub const ALL: [NeighborhoodKind; 7] = [
        NeighborhoodKind::Incidence,
        NeighborhoodKind::Coincidence,
        NeighborhoodKind::Adjacency,
        NeighborhoodKind::Coadjacency,
        NeighborhoodKind::UpLaplacian,
        NeighborhoodKind::DownLaplacian,
        NeighborhoodKind::HodgeLaplacian,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NeighborhoodKind::Incidence => "incidence",
            NeighborhoodKind::Coincidence => "coincidence",
            NeighborhoodKind::Adjacency => "adjacency",
            NeighborhoodKind::Coadjacency => "coadjacency",
            NeighborhoodKind::UpLaplacian => "up_laplacian",
            NeighborhoodKind::DownLaplacian => "down_laplacian",
            NeighborhoodKind::HodgeLaplacian => "hodge_laplacian",
        }
    }
}

impl fmt::Display for NeighborhoodKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NeighborhoodKind {
    type Err = TopoModelError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace('-', "_");
        NeighborhoodKind::ALL
            .into_iter()
            .find(|k| k.as_str() == key)
            .ok_or_else(|| TopoModelError::UnknownNeighborhood(s.to_string()))
    }
}

fn inverse_sqrt_degrees(degrees: &[f32], what: &str) -> Vec<f32> {
    let zero = degrees.iter().filter(|d| **d == 0.0).count();
    if zero > 0 {
        log::warn!("{what}: {zero} zero-degree rows left unnormalised");
    }
    degrees
        .iter()
        .map(|&d| if d > 0.0 { d.sqrt().recip() } else { 0.0 })
        .collect()
}

/// `D^{-1/2} A D^{-1/2}` with `D` the row sums of `|A|`. Square input only.
pub fn symmetric_normalize(a: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    if !a.is_square() {
        return Err(TopoModelError::ShapeMismatch {
            op: "symmetric_normalize",
            left: a.shape(),
            right: (a.ncols(), a.nrows()),
        });
    }
    let d = inverse_sqrt_degrees(&a.abs().row_sums(), "symmetric_normalize");
    let triplets = a.triplets().map(|(i, j, v)| (i, j, d[i] * v * d[j]));
    CsrMatrix::from_triplets(a.nrows(), a.ncols(), triplets)
}

/// `D^{-1} A` with `D` the row sums of `|A|`; rows then average their neighbours.
pub fn row_normalize(a: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let sums = a.abs().row_sums();
    let zero = sums.iter().filter(|d| **d == 0.0).count();
    if zero > 0 {
        log::warn!("row_normalize: {zero} empty rows");
    }
    let triplets = a.triplets().map(|(i, j, v)| (i, j, v / sums[i]));
    CsrMatrix::from_triplets(a.nrows(), a.ncols(), triplets)
}

/// Power-iteration budget for [`scaled_laplacian`].
const POWER_ITERATIONS: usize = 500;

/// `L / λ_max(L)`, so the spectrum lies in `[0, 1]` for a PSD Laplacian.
/// A zero matrix is returned unchanged.
pub fn scaled_laplacian(l: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let lambda = spectral_radius(l, POWER_ITERATIONS, 1e-6)?;
    if lambda == 0.0 {
        return Ok(l.clone());
    }
    Ok(l.scale(lambda.recip()))
}

/// `I - εL`, the first-order projection onto (approximately) harmonic signals.
pub fn harmonic_projection(l: &CsrMatrix<f32>, epsilon: f32) -> Result<CsrMatrix<f32>> {
    if !l.is_square() {
        return Err(TopoModelError::ShapeMismatch {
            op: "harmonic_projection",
            left: l.shape(),
            right: (l.ncols(), l.nrows()),
        });
    }
    CsrMatrix::identity(l.nrows()).sub(&l.scale(epsilon))
}

/// Edge operator `A↓ ⊙ (I + L↓)^{-1}` built from the signed boundary `B_1`.
///
/// `I + L↓ = I + B_1ᵀ B_1` is symmetric positive definite, so its
/// pseudo-inverse is the ordinary inverse.
pub fn dist2cycle_operator(b1: &CsrMatrix<f32>) -> Result<CsrMatrix<f32>> {
    let l_down = b1.transpose().matmul(b1)?;
    let n = l_down.nrows();
    let shifted = CsrMatrix::identity(n).add(&l_down)?;
    let inv = invert(&shifted.to_dense())?;
    let a_down = l_down.without_diagonal().binarize();
    a_down.hadamard_dense(&inv)
}

/// Normalisation applied by [`operator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    #[default]
    None,
    Symmetric,
    Row,
    Scaled,
}

/// Build one operator from a complex and normalise it in a single call.
pub fn operator<C: Complex + ?Sized>(
    complex: &C,
    kind: NeighborhoodKind,
    rank: usize,
    norm: Normalization,
) -> Result<CsrMatrix<f32>> {
    let m = complex.neighborhood(kind, rank)?;
    log::debug!("{kind} at rank {rank}: {:?} with {} entries", m.shape(), m.nnz());
    match norm {
        Normalization::None => Ok(m),
        Normalization::Symmetric => symmetric_normalize(&m),
        Normalization::Row => row_normalize(&m),
        Normalization::Scaled => scaled_laplacian(&m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::SimplicialComplex;

    fn path3() -> CsrMatrix<f32> {
        // 0 - 1 - 2
        CsrMatrix::from_triplets(
            3,
            3,
            vec![(0, 1, 1.0), (1, 0, 1.0), (1, 2, 1.0), (2, 1, 1.0)],
        )
        .unwrap()
    }

    #[test]
    fn parse_and_display() {
        for k in NeighborhoodKind::ALL {
            assert_eq!(k.to_string().parse::<NeighborhoodKind>().unwrap(), k);
        }
        assert_eq!(
            "Up-Laplacian".parse::<NeighborhoodKind>().unwrap(),
            NeighborhoodKind::UpLaplacian
        );
        assert!("boundary".parse::<NeighborhoodKind>().is_err());
    }

    #[test]
    fn symmetric_normalization_of_path() {
        let n = symmetric_normalize(&path3()).unwrap();
        let expect = 1.0 / 2.0f32.sqrt();
        assert!((n.get(0, 1) - expect).abs() < 1e-6);
        assert!(n.is_symmetric(1e-6));
    }

    #[test]
    fn row_normalization_averages() {
        let n = row_normalize(&path3()).unwrap();
        assert_eq!(n.row_sums(), vec![1.0, 1.0, 1.0]);
        assert_eq!(n.get(1, 0), 0.5);
    }

    #[test]
    fn zero_degree_rows_stay_zero() {
        let a = CsrMatrix::from_triplets(2, 2, vec![(0, 0, 2.0)]).unwrap();
        let n = symmetric_normalize(&a).unwrap();
        assert!((n.get(0, 0) - 1.0).abs() < 1e-6);
        assert_eq!(n.row(1).count(), 0);
    }

    #[test]
    fn scaled_laplacian_has_unit_radius() {
        let sc = SimplicialComplex::from_simplices([vec![0, 1], vec![1, 2]]).unwrap();
        let l = scaled_laplacian(&sc.hodge_laplacian(0).unwrap()).unwrap();
        let r = spectral_radius(&l, 500, 1e-7).unwrap();
        assert!((r - 1.0).abs() < 1e-3, "radius {r}");
    }

    #[test]
    fn harmonic_projection_is_identity_minus_scaled() {
        let p = harmonic_projection(&path3(), 0.5).unwrap();
        assert_eq!(p.get(0, 0), 1.0);
        assert_eq!(p.get(0, 1), -0.5);
    }

    #[test]
    fn dist2cycle_operator_pattern_is_lower_adjacency() {
        let sc = SimplicialComplex::from_simplices([vec![0, 1, 2]]).unwrap();
        let b1 = sc.incidence_matrix(1, true).unwrap();
        let op = dist2cycle_operator(&b1).unwrap();
        assert_eq!(op.shape(), (3, 3));
        // every pair of triangle edges shares a vertex
        assert_eq!(op.nnz(), 6);
        assert!(op.is_symmetric(1e-5));
    }

    #[test]
    fn operator_applies_normalization() {
        let sc = SimplicialComplex::from_simplices([vec![0, 1], vec![1, 2]]).unwrap();
        let a = operator(&sc, NeighborhoodKind::Adjacency, 0, Normalization::Row).unwrap();
        assert_eq!(a.row_sums(), vec![1.0, 1.0, 1.0]);
    }
}
