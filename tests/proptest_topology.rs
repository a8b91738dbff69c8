mod util;

use ndarray::Array2;
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use topomodel::sparse::CsrMatrix;
use topomodel::topology::{Complex, SimplicialComplex};
use util::{assert_zero, max_abs_diff};

fn random_sparse(rows: usize, cols: usize, density: f64, seed: u64) -> CsrMatrix<f32> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut triplets = Vec::new();
    for i in 0..rows {
        for j in 0..cols {
            if rng.r#gen::<f64>() < density {
                triplets.push((i, j, rng.gen_range(-2.0f32..2.0)));
            }
        }
    }
    CsrMatrix::from_triplets(rows, cols, triplets).expect("in-bounds triplets")
}

proptest! {
    #[test]
    fn prop_sparse_products_match_dense(
        n in 1usize..8,
        m in 1usize..8,
        k in 1usize..6,
        density in 0.0f64..1.0,
        seed in any::<u64>(),
    ) {
        let a = random_sparse(n, m, density, seed);
        let b = random_sparse(m, k, density, seed.wrapping_add(1));
        let x = Array2::from_shape_fn((m, k), |(i, j)| (i as f32 - j as f32) * 0.25);

        let dense = a.to_dense().dot(&b.to_dense());
        prop_assert!(max_abs_diff(&a.matmul(&b).unwrap().to_dense(), &dense) < 1e-4);
        prop_assert!(max_abs_diff(&a.matmul_dense(&x).unwrap(), &a.to_dense().dot(&x)) < 1e-4);
        prop_assert_eq!(a.transpose().to_dense(), a.to_dense().t().to_owned());

        let y = Array2::from_shape_fn((n, k), |(i, j)| (i * k + j) as f32 * 0.1);
        let expected = a.to_dense().t().dot(&y);
        prop_assert!(max_abs_diff(&a.transpose_matmul_dense(&y).unwrap(), &expected) < 1e-4);
    }

    #[test]
    fn prop_random_complexes_are_chain_complexes(
        n_vertices in 3usize..9,
        n_simplices in 1usize..8,
        seed in any::<u64>(),
    ) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut sc = SimplicialComplex::new();
        for _ in 0..n_simplices {
            let size = rng.gen_range(1..=4usize.min(n_vertices));
            let mut verts: Vec<usize> = (0..n_vertices).collect();
            for i in 0..size {
                let j = rng.gen_range(i..n_vertices);
                verts.swap(i, j);
            }
            sc.add_simplex(&verts[..size]).unwrap();
        }

        for rank in 1..sc.dim() {
            let bb = sc
                .incidence_matrix(rank, true)
                .unwrap()
                .matmul(&sc.incidence_matrix(rank + 1, true).unwrap())
                .unwrap();
            assert_zero(&bb);
        }
        for rank in 0..=sc.dim() {
            let l = sc.hodge_laplacian(rank).unwrap();
            prop_assert!(l.is_symmetric(1e-6));
            // Laplacians are positive semi-definite, so their diagonal is too
            prop_assert!((0..l.nrows()).all(|i| l.get(i, i) >= 0.0));
            let a = sc.adjacency_matrix(rank).unwrap();
            prop_assert!(a.values().iter().all(|v| *v == 1.0));
            prop_assert!((0..a.nrows()).all(|i| a.get(i, i) == 0.0));
        }
    }
}
