#![allow(dead_code)]

use ndarray::Array2;
use topomodel::features::RankFeatures;
use topomodel::sparse::CsrMatrix;
use topomodel::topology::{CellComplex, Complex, Hypergraph, SimplicialComplex};

/// Two triangles glued along an edge, plus a dangling edge: `[5, 6, 2]` cells.
pub fn bowtie() -> SimplicialComplex {
    SimplicialComplex::from_simplices([vec![0, 1, 2], vec![1, 2, 3], vec![3, 4]])
        .expect("valid simplices")
}

/// A square and a triangle sharing the edge `(2, 3)`.
pub fn square_and_triangle() -> CellComplex {
    CellComplex::from_parts(
        [(0, 1), (1, 2), (2, 3), (3, 0), (2, 4), (4, 3)],
        [vec![0, 1, 2, 3], vec![2, 4, 3]],
    )
    .expect("valid cell complex")
}

/// Six nodes, four overlapping hyperedges.
pub fn small_hypergraph() -> Hypergraph {
    Hypergraph::from_hyperedges(
        6,
        [vec![0, 1, 2], vec![2, 3], vec![3, 4, 5], vec![0, 5]],
    )
    .expect("valid hypergraph")
}

/// Deterministic, non-constant features of shape `(rows, cols)`.
pub fn ramp(rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |(i, j)| {
        ((i * 7 + j * 3) % 5) as f32 / 5.0 - 0.4
    })
}

/// Features for ranks 0..=2 of `complex`, with `channels[r]` columns.
pub fn rank_features<C: Complex>(complex: &C, channels: [usize; 3]) -> RankFeatures {
    let shape = complex.shape();
    (0..3).fold(RankFeatures::new(), |f, r| {
        f.with(r, ramp(shape[r], channels[r]))
    })
}

/// Largest absolute entry of `a - b`.
pub fn max_abs_diff(a: &Array2<f32>, b: &Array2<f32>) -> f32 {
    assert_eq!(a.dim(), b.dim(), "shape mismatch");
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f32::max)
}

/// Panics unless every entry of `m` is (numerically) zero.
pub fn assert_zero(m: &CsrMatrix<f32>) {
    assert!(m.max_abs() < 1e-6, "expected zero matrix, got {:?}", m.to_dense());
}
