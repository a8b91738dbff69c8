//! The [`Complex`] trait: neighborhood operators derived from incidence.
//!
//! Every structure in [`crate::topology`] exposes its incidence matrices
//! `B_r` (rows = cells of rank `r - 1`, columns = cells of rank `r`). All other
//! neighborhood operators are derived from them here:
//!
//! | operator | definition |
//! |---|---|
//! | adjacency (rank `r`) | off-diagonal support of `|B_{r+1}| |B_{r+1}|ᵀ` |
//! | co-adjacency (rank `r`) | off-diagonal support of `|B_r|ᵀ |B_r|` |
//! | up Laplacian | `B_{r+1} B_{r+1}ᵀ` |
//! | down Laplacian | `B_rᵀ B_r` |
//! | Hodge Laplacian | up + down |
//!
//! Ranks without cofaces (or faces) give zero operators of the right size.

use crate::neighborhood::NeighborhoodKind;
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};

/// A rank-graded combinatorial structure.
pub trait Complex {
    /// Number of cells at each rank, starting at rank 0.
    fn shape(&self) -> Vec<usize>;

    /// Incidence matrix `B_rank` with shape `(n_{rank-1}, n_rank)`.
    ///
    /// # Errors
    /// [`TopoModelError::RankOutOfRange`] for `rank == 0` or `rank > dim()`.
    fn incidence_matrix(&self, rank: usize, signed: bool) -> Result<CsrMatrix<f32>>;

    /// Highest rank carrying at least one cell (0 for an empty structure).
    fn dim(&self) -> usize {
        self.shape().len().saturating_sub(1)
    }

    /// Number of cells of `rank`.
    fn num_cells(&self, rank: usize) -> Result<usize> {
        self.shape()
            .get(rank)
            .copied()
            .ok_or(TopoModelError::RankOutOfRange {
                rank,
                max: self.dim(),
            })
    }

    /// Cells of `rank` sharing a coface of rank `rank + 1`.
    fn adjacency_matrix(&self, rank: usize) -> Result<CsrMatrix<f32>> {
        let n = self.num_cells(rank)?;
        if rank == self.dim() {
            return Ok(CsrMatrix::zeros(n, n));
        }
        let b = self.incidence_matrix(rank + 1, false)?;
        Ok(b.matmul(&b.transpose())?.without_diagonal().binarize())
    }

    /// Cells of `rank` sharing a face of rank `rank - 1`.
    fn coadjacency_matrix(&self, rank: usize) -> Result<CsrMatrix<f32>> {
        let n = self.num_cells(rank)?;
        if rank == 0 {
            return Ok(CsrMatrix::zeros(n, n));
        }
        let b = self.incidence_matrix(rank, false)?;
        Ok(b.transpose().matmul(&b)?.without_diagonal().binarize())
    }

    /// `B_{r+1} B_{r+1}ᵀ` with signed incidence.
    fn up_laplacian(&self, rank: usize) -> Result<CsrMatrix<f32>> {
        let n = self.num_cells(rank)?;
        if rank == self.dim() {
            return Ok(CsrMatrix::zeros(n, n));
        }
        let b = self.incidence_matrix(rank + 1, true)?;
        b.matmul(&b.transpose())
    }

    /// `B_rᵀ B_r` with signed incidence.
    fn down_laplacian(&self, rank: usize) -> Result<CsrMatrix<f32>> {
        let n = self.num_cells(rank)?;
        if rank == 0 {
            return Ok(CsrMatrix::zeros(n, n));
        }
        let b = self.incidence_matrix(rank, true)?;
        b.transpose().matmul(&b)
    }

    /// Hodge Laplacian `L_r = L_r^up + L_r^down`.
    fn hodge_laplacian(&self, rank: usize) -> Result<CsrMatrix<f32>> {
        self.up_laplacian(rank)?.add(&self.down_laplacian(rank)?)
    }

    /// Dispatch on a [`NeighborhoodKind`].
    ///
    /// `Incidence` returns `B_rank` (rank-1 cells × rank cells); `Coincidence`
    /// returns its transpose. The remaining kinds are square over `rank`.
    fn neighborhood(&self, kind: NeighborhoodKind, rank: usize) -> Result<CsrMatrix<f32>> {
        match kind {
            NeighborhoodKind::Incidence => self.incidence_matrix(rank, true),
            NeighborhoodKind::Coincidence => Ok(self.incidence_matrix(rank, true)?.transpose()),
            NeighborhoodKind::Adjacency => self.adjacency_matrix(rank),
            NeighborhoodKind::Coadjacency => self.coadjacency_matrix(rank),
            NeighborhoodKind::UpLaplacian => self.up_laplacian(rank),
            NeighborhoodKind::DownLaplacian => self.down_laplacian(rank),
            NeighborhoodKind::HodgeLaplacian => self.hodge_laplacian(rank),
        }
    }
}
