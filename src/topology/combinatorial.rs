//! Combinatorial complexes: set-type relations with a user-assigned rank.
//!
//! A combinatorial complex is a family of non-empty vertex sets, each with a
//! rank, such that inclusion never lowers rank: `x ⊂ y ⇒ rank(x) ≤ rank(y)`.
//! Singletons are exactly the rank-0 cells. Ranks may skip values; missing
//! ranks simply hold no cells.
//!
//! Unlike graded complexes, incidence is defined between *any* two ranks
//! `r < s` by set inclusion, and adjacency/co-adjacency can be taken through
//! any higher/lower rank.

use std::collections::HashMap;

use crate::invariants::DebugInvariants;
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::complex::Complex;

/// `a ⊆ b` for sorted, deduplicated slices.
fn is_subset(a: &[usize], b: &[usize]) -> bool {
    if a.len() > b.len() {
        return false;
    }
    let mut it = b.iter();
    a.iter().all(|x| it.any(|y| y == x))
}

#[derive(Clone, Debug, Default)]
pub struct CombinatorialComplex {
    /// `cells[r]` = cells of rank `r` in insertion order.
    cells: Vec<Vec<Vec<usize>>>,
    rank_of: HashMap<Vec<usize>, usize>,
}

impl CombinatorialComplex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a cell with the given rank (idempotent for an identical rank).
    ///
    /// Every vertex of the cell is inserted as a rank-0 cell.
    ///
    /// # Errors
    /// * [`TopoModelError::EmptyInput`] / [`TopoModelError::DuplicateVertex`]
    ///   for malformed vertex lists.
    /// * [`TopoModelError::RankMonotonicity`] if the cell would break
    ///   `x ⊂ y ⇒ rank(x) ≤ rank(y)`, or a singleton is given a non-zero rank.
    /// * [`TopoModelError::InvalidCell`] if the set exists with another rank.
    pub fn add_cell(&mut self, vertices: &[usize], rank: usize) -> Result<()> {
        if vertices.is_empty() {
            return Err(TopoModelError::EmptyInput("cell"));
        }
        let mut cell = vertices.to_vec();
        cell.sort_unstable();
        if cell.windows(2).any(|w| w[0] == w[1]) {
            return Err(TopoModelError::DuplicateVertex);
        }
        if (cell.len() == 1) != (rank == 0) {
            return Err(TopoModelError::RankMonotonicity(format!(
                "cell {cell:?} cannot have rank {rank}; rank 0 is reserved for single vertices"
            )));
        }
        if let Some(&existing) = self.rank_of.get(&cell) {
            if existing == rank {
                return Ok(());
            }
            return Err(TopoModelError::InvalidCell(format!(
                "cell {cell:?} already present with rank {existing}"
            )));
        }
        for (other, &r) in &self.rank_of {
            let below = other.len() < cell.len() && is_subset(other, &cell) && r > rank;
            let above = cell.len() < other.len() && is_subset(&cell, other) && r < rank;
            if below || above {
                return Err(TopoModelError::RankMonotonicity(format!(
                    "{cell:?} (rank {rank}) vs {other:?} (rank {r})"
                )));
            }
        }
        if rank > 0 {
            for &v in &cell {
                self.insert_unchecked(vec![v], 0);
            }
        }
        self.insert_unchecked(cell, rank);
        Ok(())
    }

    fn insert_unchecked(&mut self, cell: Vec<usize>, rank: usize) {
        if self.rank_of.contains_key(&cell) {
            return;
        }
        if self.cells.len() <= rank {
            self.cells.resize(rank + 1, Vec::new());
        }
        self.rank_of.insert(cell.clone(), rank);
        self.cells[rank].push(cell);
    }

    /// Cells of `rank` in matrix order.
    pub fn cells(&self, rank: usize) -> &[Vec<usize>] {
        self.cells.get(rank).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rank_of(&self, vertices: &[usize]) -> Option<usize> {
        let mut cell = vertices.to_vec();
        cell.sort_unstable();
        self.rank_of.get(&cell).copied()
    }

    /// Unsigned incidence between ranks `r < s`: `B[i, j] = 1` iff
    /// `cells(r)[i] ⊂ cells(s)[j]`.
    pub fn incidence_between(&self, r: usize, s: usize) -> Result<CsrMatrix<f32>> {
        let max = self.dim();
        if r >= s || s > max {
            return Err(TopoModelError::RankOutOfRange {
                rank: if r >= s { r } else { s },
                max,
            });
        }
        let lower = self.cells(r);
        let upper = self.cells(s);
        let mut triplets = Vec::new();
        for (j, y) in upper.iter().enumerate() {
            for (i, x) in lower.iter().enumerate() {
                if is_subset(x, y) {
                    triplets.push((i, j, 1.0));
                }
            }
        }
        CsrMatrix::from_triplets(lower.len(), upper.len(), triplets)
    }

    /// Cells of `rank` adjacent through a common cell of rank `via > rank`.
    pub fn adjacency_via(&self, rank: usize, via: usize) -> Result<CsrMatrix<f32>> {
        let b = self.incidence_between(rank, via)?;
        Ok(b.matmul(&b.transpose())?.without_diagonal().binarize())
    }

    /// Cells of `rank` co-adjacent through a common cell of rank `via < rank`.
    pub fn coadjacency_via(&self, rank: usize, via: usize) -> Result<CsrMatrix<f32>> {
        let b = self.incidence_between(via, rank)?;
        Ok(b.transpose().matmul(&b)?.without_diagonal().binarize())
    }
}

impl Complex for CombinatorialComplex {
    fn shape(&self) -> Vec<usize> {
        self.cells.iter().map(Vec::len).collect()
    }

    fn incidence_matrix(&self, rank: usize, _signed: bool) -> Result<CsrMatrix<f32>> {
        if rank == 0 {
            return Err(TopoModelError::RankOutOfRange {
                rank,
                max: self.dim(),
            });
        }
        self.incidence_between(rank - 1, rank)
    }
}

impl DebugInvariants for CombinatorialComplex {
    fn validate_invariants(&self) -> Result<()> {
        for (r, cells) in self.cells.iter().enumerate() {
            for x in cells {
                if self.rank_of.get(x) != Some(&r) {
                    return Err(TopoModelError::InvalidCell(format!(
                        "cell {x:?} listed at rank {r} but indexed differently"
                    )));
                }
            }
        }
        for (x, &rx) in &self.rank_of {
            for (y, &ry) in &self.rank_of {
                if x.len() < y.len() && is_subset(x, y) && rx > ry {
                    return Err(TopoModelError::RankMonotonicity(format!(
                        "{x:?} (rank {rx}) ⊂ {y:?} (rank {ry})"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CombinatorialComplex {
        let mut cc = CombinatorialComplex::new();
        cc.add_cell(&[0, 1], 1).unwrap();
        cc.add_cell(&[1, 2], 1).unwrap();
        cc.add_cell(&[0, 1, 2, 3], 3).unwrap();
        cc
    }

    #[test]
    fn shape_allows_rank_gaps() {
        let cc = sample();
        assert_eq!(cc.shape(), vec![4, 2, 0, 1]);
        assert_eq!(cc.rank_of(&[2, 1]), Some(1));
        cc.validate_invariants().unwrap();
    }

    #[test]
    fn monotonicity_is_enforced() {
        let mut cc = sample();
        let err = cc.add_cell(&[0, 1, 2], 4).unwrap_err();
        assert!(matches!(err, TopoModelError::RankMonotonicity(_)));
        let err = cc.add_cell(&[2, 3], 5).unwrap_err();
        assert!(matches!(err, TopoModelError::RankMonotonicity(_)));
        assert!(cc.add_cell(&[7], 1).is_err());
        assert!(matches!(cc.add_cell(&[0, 1], 2), Err(TopoModelError::InvalidCell(_))));
    }

    #[test]
    fn incidence_between_non_consecutive_ranks() {
        let cc = sample();
        let b13 = cc.incidence_between(1, 3).unwrap();
        assert_eq!(b13.shape(), (2, 1));
        assert_eq!(b13.nnz(), 2);
        let b03 = cc.incidence_between(0, 3).unwrap();
        assert_eq!(b03.nnz(), 4);
        assert!(cc.incidence_between(3, 1).is_err());
    }

    #[test]
    fn adjacency_through_higher_cell() {
        let cc = sample();
        let a = cc.adjacency_via(1, 3).unwrap();
        assert_eq!(a.get(0, 1), 1.0);
        let c = cc.coadjacency_via(1, 0).unwrap();
        assert_eq!(c.get(0, 1), 1.0);
        // consecutive-rank Complex view: nothing lives at rank 2
        assert_eq!(cc.adjacency_matrix(1).unwrap().nnz(), 0);
    }
}
