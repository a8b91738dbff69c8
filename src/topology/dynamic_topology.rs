//! Hypergraphs inferred from node features.
//!
//! Dynamic hypergraph convolutions rebuild their topology from the current
//! embedding at every layer. Two families of hyperedges are produced:
//!
//! * **k-NN**: for every node, the node together with its `k` nearest
//!   neighbours in Euclidean distance (ties broken by lower index);
//! * **k-means**: one hyperedge per non-empty cluster of Lloyd's algorithm.
//!
//! Both are deterministic. k-means starts from evenly spaced rows
//! (`⌊c·n/k⌋` for cluster `c`) instead of random seeds.

use itertools::Itertools;
use ndarray::{Array2, ArrayView1};

use crate::topo_error::{Result, TopoModelError};
use crate::topology::hypergraph::Hypergraph;

fn sq_dist(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// One hyperedge per node: the node plus its `k` nearest neighbours.
///
/// `k` is clamped to `n - 1`.
pub fn knn_hyperedges(x: &Array2<f32>, k: usize) -> Result<Vec<Vec<usize>>> {
    let n = x.nrows();
    if n == 0 {
        return Err(TopoModelError::EmptyInput("node features"));
    }
    let k_eff = k.min(n - 1);
    if k_eff < k {
        log::warn!("k-NN hyperedges: k = {k} clamped to {k_eff} for {n} nodes");
    }
    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let mut dists: Vec<(f32, usize)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (sq_dist(x.row(i), x.row(j)), j))
            .collect();
        dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        let mut edge: Vec<usize> = std::iter::once(i)
            .chain(dists.into_iter().take(k_eff).map(|(_, j)| j))
            .collect();
        edge.sort_unstable();
        out.push(edge);
    }
    Ok(out)
}

/// Lloyd's k-means; returns the cluster index of every row.
///
/// `k` is clamped to the number of rows. Empty clusters keep their previous
/// centroid.
pub fn kmeans(x: &Array2<f32>, k: usize, max_iter: usize) -> Result<Vec<usize>> {
    let n = x.nrows();
    if n == 0 {
        return Err(TopoModelError::EmptyInput("node features"));
    }
    if k == 0 {
        return Err(TopoModelError::InvalidConfig(
            "k-means needs at least one centroid".into(),
        ));
    }
    let k = k.min(n);
    let d = x.ncols();
    let mut centroids = Array2::<f32>::zeros((k, d));
    for c in 0..k {
        centroids.row_mut(c).assign(&x.row(c * n / k));
    }

    let mut assignment = vec![usize::MAX; n];
    for iter in 0..max_iter.max(1) {
        let mut changed = false;
        for i in 0..n {
            let best = (0..k)
                .map(|c| (sq_dist(x.row(i), centroids.row(c)), c))
                .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
                .map(|(_, c)| c)
                .unwrap_or(0);
            if assignment[i] != best {
                assignment[i] = best;
                changed = true;
            }
        }
        if !changed {
            log::debug!("k-means converged after {iter} iterations");
            break;
        }
        let mut sums = Array2::<f32>::zeros((k, d));
        let mut counts = vec![0usize; k];
        for (i, &c) in assignment.iter().enumerate() {
            let mut row = sums.row_mut(c);
            row += &x.row(i);
            counts[c] += 1;
        }
        for c in 0..k {
            if counts[c] == 0 {
                log::warn!("k-means cluster {c} is empty; keeping previous centroid");
                continue;
            }
            let mean = sums.row(c).mapv(|v| v / counts[c] as f32);
            centroids.row_mut(c).assign(&mean);
        }
    }
    Ok(assignment)
}

/// One hyperedge per non-empty k-means cluster.
pub fn kmeans_hyperedges(x: &Array2<f32>, k: usize, max_iter: usize) -> Result<Vec<Vec<usize>>> {
    Ok(kmeans(x, k, max_iter)?
        .into_iter()
        .enumerate()
        .map(|(i, c)| (c, i))
        .into_group_map()
        .into_iter()
        .sorted_by_key(|(c, _)| *c)
        .map(|(_, nodes)| nodes)
        .collect())
}

/// Iterations used by [`dynamic_hypergraph`] for k-means.
pub const KMEANS_MAX_ITER: usize = 20;

/// k-NN hyperedges followed by k-means hyperedges over the rows of `x`.
pub fn dynamic_hypergraph(
    x: &Array2<f32>,
    k_neighbours: usize,
    k_centroids: usize,
) -> Result<Hypergraph> {
    let mut hg = Hypergraph::from_hyperedges(x.nrows(), knn_hyperedges(x, k_neighbours)?)?;
    for e in kmeans_hyperedges(x, k_centroids, KMEANS_MAX_ITER)? {
        hg.add_hyperedge(&e)?;
    }
    log::debug!(
        "dynamic hypergraph: {} nodes, {} hyperedges",
        hg.n_nodes(),
        hg.n_hyperedges()
    );
    Ok(hg)
}
