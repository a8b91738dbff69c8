//! Rank-indexed feature matrices.
//!
//! [`RankFeatures`] maps a rank to a dense `(num_cells, channels)` matrix. It is
//! the signal a model consumes and produces; the complex it lives on is kept
//! separately and only its [`shape`](crate::topology::Complex::shape) is used
//! for validation.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::topo_error::{Result, TopoModelError};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankFeatures {
    by_rank: BTreeMap<usize, Array2<f32>>,
}

impl RankFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, rank: usize, x: Array2<f32>) -> Self {
        self.by_rank.insert(rank, x);
        self
    }

    /// Insert or replace the features of `rank`, returning the previous ones.
    pub fn insert(&mut self, rank: usize, x: Array2<f32>) -> Option<Array2<f32>> {
        self.by_rank.insert(rank, x)
    }

    pub fn get(&self, rank: usize) -> Option<&Array2<f32>> {
        self.by_rank.get(&rank)
    }

    /// Features of `rank` or [`TopoModelError::RankOutOfRange`].
    pub fn require(&self, rank: usize) -> Result<&Array2<f32>> {
        self.by_rank
            .get(&rank)
            .ok_or_else(|| TopoModelError::RankOutOfRange {
                rank,
                max: self.by_rank.keys().next_back().copied().unwrap_or(0),
            })
    }

    /// Ranks carrying features, ascending.
    pub fn ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.by_rank.keys().copied()
    }

    pub fn num_cells(&self, rank: usize) -> Option<usize> {
        self.by_rank.get(&rank).map(Array2::nrows)
    }

    pub fn channels(&self, rank: usize) -> Option<usize> {
        self.by_rank.get(&rank).map(Array2::ncols)
    }

    pub fn len(&self) -> usize {
        self.by_rank.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rank.is_empty()
    }

    /// Check that every feature matrix has one row per cell of its rank.
    pub fn check_against(&self, shape: &[usize]) -> Result<()> {
        for (&rank, x) in &self.by_rank {
            let cells = *shape.get(rank).ok_or(TopoModelError::RankOutOfRange {
                rank,
                max: shape.len().saturating_sub(1),
            })?;
            if x.nrows() != cells {
                return Err(TopoModelError::ShapeMismatch {
                    op: "features vs complex",
                    left: x.dim(),
                    right: (cells, x.ncols()),
                });
            }
        }
        Ok(())
    }
}

impl FromIterator<(usize, Array2<f32>)> for RankFeatures {
    fn from_iter<I: IntoIterator<Item = (usize, Array2<f32>)>>(iter: I) -> Self {
        Self {
            by_rank: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_checks() {
        let f = RankFeatures::new()
            .with(0, Array2::zeros((3, 4)))
            .with(1, Array2::zeros((2, 4)));
        assert_eq!(f.ranks().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(f.channels(1), Some(4));
        f.check_against(&[3, 2]).unwrap();
        assert!(matches!(
            f.check_against(&[3, 3]),
            Err(TopoModelError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            f.check_against(&[3]),
            Err(TopoModelError::RankOutOfRange { rank: 1, max: 0 })
        ));
    }

    #[test]
    fn require_missing_rank() {
        let f: RankFeatures = [(0, Array2::zeros((1, 1)))].into_iter().collect();
        assert!(f.require(0).is_ok());
        assert!(f.require(2).is_err());
    }
}
