//! Hypergraphs: nodes (rank 0) and hyperedges (rank 1).
//!
//! A hyperedge is any non-empty set of nodes. The incidence matrix is
//! unsigned with shape `(n_nodes, n_hyperedges)`; the `signed` flag of
//! [`Complex::incidence_matrix`] is ignored because hyperedges carry no
//! orientation.

use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::complex::Complex;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Hypergraph {
    n_nodes: usize,
    hyperedges: Vec<Vec<usize>>,
}

impl Hypergraph {
    /// Hypergraph on `n_nodes` nodes and no hyperedges.
    pub fn new(n_nodes: usize) -> Self {
        Self {
            n_nodes,
            hyperedges: Vec::new(),
        }
    }

    pub fn from_hyperedges<I, E>(n_nodes: usize, hyperedges: I) -> Result<Self>
    where
        I: IntoIterator<Item = E>,
        E: AsRef<[usize]>,
    {
        let mut hg = Self::new(n_nodes);
        for e in hyperedges {
            hg.add_hyperedge(e.as_ref())?;
        }
        Ok(hg)
    }

    /// Append a hyperedge; repeated nodes are merged. Returns its column index.
    ///
    /// # Errors
    /// * [`TopoModelError::EmptyInput`] for an empty node list.
    /// * [`TopoModelError::InvalidCell`] if a node index is out of range.
    pub fn add_hyperedge(&mut self, nodes: &[usize]) -> Result<usize> {
        if nodes.is_empty() {
            return Err(TopoModelError::EmptyInput("hyperedge"));
        }
        if let Some(&bad) = nodes.iter().find(|&&v| v >= self.n_nodes) {
            return Err(TopoModelError::InvalidCell(format!(
                "node {bad} out of range for {} nodes",
                self.n_nodes
            )));
        }
        let mut e = nodes.to_vec();
        e.sort_unstable();
        e.dedup();
        self.hyperedges.push(e);
        Ok(self.hyperedges.len() - 1)
    }

    /// Concatenate the hyperedges of `other` (same node set).
    pub fn extend(&mut self, other: &Hypergraph) -> Result<()> {
        if other.n_nodes != self.n_nodes {
            return Err(TopoModelError::ShapeMismatch {
                op: "hypergraph extend",
                left: (self.n_nodes, self.hyperedges.len()),
                right: (other.n_nodes, other.hyperedges.len()),
            });
        }
        self.hyperedges.extend(other.hyperedges.iter().cloned());
        Ok(())
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.n_nodes
    }

    #[inline]
    pub fn n_hyperedges(&self) -> usize {
        self.hyperedges.len()
    }

    pub fn hyperedges(&self) -> &[Vec<usize>] {
        &self.hyperedges
    }

    /// Number of hyperedges containing each node.
    pub fn node_degrees(&self) -> Vec<f32> {
        let mut deg = vec![0.0; self.n_nodes];
        for e in &self.hyperedges {
            for &v in e {
                deg[v] += 1.0;
            }
        }
        deg
    }

    /// Number of nodes in each hyperedge.
    pub fn edge_degrees(&self) -> Vec<f32> {
        self.hyperedges.iter().map(|e| e.len() as f32).collect()
    }

    /// Unsigned node × hyperedge incidence.
    pub fn incidence(&self) -> Result<CsrMatrix<f32>> {
        let triplets = self
            .hyperedges
            .iter()
            .enumerate()
            .flat_map(|(j, e)| e.iter().map(move |&v| (v, j, 1.0)));
        CsrMatrix::from_triplets(self.n_nodes, self.hyperedges.len(), triplets)
    }
}

impl Complex for Hypergraph {
    fn shape(&self) -> Vec<usize> {
        if self.hyperedges.is_empty() {
            vec![self.n_nodes]
        } else {
            vec![self.n_nodes, self.hyperedges.len()]
        }
    }

    fn incidence_matrix(&self, rank: usize, _signed: bool) -> Result<CsrMatrix<f32>> {
        if rank != 1 || self.hyperedges.is_empty() {
            return Err(TopoModelError::RankOutOfRange {
                rank,
                max: self.dim(),
            });
        }
        self.incidence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fano_like() -> Hypergraph {
        Hypergraph::from_hyperedges(5, [vec![0, 1, 2], vec![2, 3], vec![3, 4, 0, 4]]).unwrap()
    }

    #[test]
    fn incidence_shape_and_degrees() {
        let hg = fano_like();
        let b = hg.incidence_matrix(1, true).unwrap();
        assert_eq!(b.shape(), (5, 3));
        assert_eq!(hg.node_degrees(), vec![2.0, 1.0, 2.0, 2.0, 1.0]);
        assert_eq!(hg.edge_degrees(), vec![3.0, 2.0, 3.0]);
        assert_eq!(b.col_sums(), hg.edge_degrees());
    }

    #[test]
    fn node_adjacency_through_hyperedges() {
        let hg = fano_like();
        let a0 = hg.adjacency_matrix(0).unwrap();
        assert_eq!(a0.get(0, 1), 1.0);
        assert_eq!(a0.get(1, 3), 0.0);
        assert_eq!(a0.get(4, 0), 1.0);
        // hyperedges meeting in a node are co-adjacent
        let c1 = hg.coadjacency_matrix(1).unwrap();
        assert_eq!(c1.get(0, 1), 1.0);
    }

    #[test]
    fn invalid_hyperedges() {
        let mut hg = Hypergraph::new(3);
        assert_eq!(hg.add_hyperedge(&[]), Err(TopoModelError::EmptyInput("hyperedge")));
        assert!(matches!(hg.add_hyperedge(&[0, 3]), Err(TopoModelError::InvalidCell(_))));
        assert!(hg.incidence_matrix(1, false).is_err());
    }

    #[test]
    fn extend_requires_same_node_set() {
        let mut a = Hypergraph::from_hyperedges(3, [vec![0, 1]]).unwrap();
        let b = Hypergraph::from_hyperedges(3, [vec![1, 2]]).unwrap();
        a.extend(&b).unwrap();
        assert_eq!(a.n_hyperedges(), 2);
        assert!(a.extend(&Hypergraph::new(4)).is_err());
    }
}
