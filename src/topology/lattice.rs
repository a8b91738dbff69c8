//! Oriented face lattice (Hasse diagram) shared by graded complexes.
//!
//! [`FaceLattice`] stores arrows `cell → face` together with an orientation
//! sign and mirrors every arrow in a reverse (`face → cell`) map, so both the
//! boundary (`cone`) and the coboundary (`support`) of a cell can be walked in
//! time proportional to its degree. Cells are bucketed by rank in insertion
//! order; a cell's position inside its rank is its row/column in every
//! boundary matrix.
//!
//! Signed boundary matrices are assembled lazily and cached until the next
//! mutation.

use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::OnceCell;

use crate::invariants::DebugInvariants;
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::cell_id::CellId;

/// Direction of a lattice walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dir {
    /// Towards faces (boundary).
    Down,
    /// Towards cofaces (coboundary).
    Up,
}

/// In-memory oriented Hasse diagram.
#[derive(Clone, Debug, Default)]
pub struct FaceLattice {
    /// Outgoing arrows: cell → (face, orientation).
    adjacency_out: HashMap<CellId, Vec<(CellId, i8)>>,
    /// Incoming arrows (mirrors): face → (cell, orientation).
    adjacency_in: HashMap<CellId, Vec<(CellId, i8)>>,
    rank_of: HashMap<CellId, usize>,
    index_in_rank: HashMap<CellId, usize>,
    /// `strata[r]` = cells of rank `r` in insertion order.
    strata: Vec<Vec<CellId>>,
    next_id: u64,
    /// Signed `B_r` for `r = 1..=max_rank`, at position `r - 1`.
    boundaries: OnceCell<Vec<CsrMatrix<f32>>>,
}

impl FaceLattice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new cell of the given rank.
    ///
    /// # Errors
    /// [`TopoModelError::RankOutOfRange`] if `rank` would leave a gap above the
    /// current top rank.
    pub fn add_cell(&mut self, rank: usize) -> Result<CellId> {
        if rank > self.strata.len() {
            return Err(TopoModelError::RankOutOfRange {
                rank,
                max: self.strata.len(),
            });
        }
        self.next_id += 1;
        let id = CellId::new(self.next_id)?;
        if rank == self.strata.len() {
            self.strata.push(Vec::new());
        }
        self.index_in_rank.insert(id, self.strata[rank].len());
        self.strata[rank].push(id);
        self.rank_of.insert(id, rank);
        self.boundaries.take();
        Ok(id)
    }

    /// Add the arrow `cell → face` with orientation `±1`.
    ///
    /// # Errors
    /// * [`TopoModelError::InvalidCell`] if either cell is unknown, the ranks are
    ///   not consecutive, the orientation is not `±1`, or the arrow exists.
    pub fn add_face(&mut self, cell: CellId, face: CellId, orientation: i8) -> Result<()> {
        let rc = self.rank(cell)?;
        let rf = self.rank(face)?;
        if rf + 1 != rc {
            return Err(TopoModelError::InvalidCell(format!(
                "face {face} has rank {rf}, expected {} for cell {cell}",
                rc.saturating_sub(1)
            )));
        }
        if orientation != 1 && orientation != -1 {
            return Err(TopoModelError::InvalidCell(format!(
                "orientation {orientation} of arrow {cell} -> {face} is not ±1"
            )));
        }
        if self.has_face(cell, face) {
            return Err(TopoModelError::InvalidCell(format!(
                "arrow {cell} -> {face} already present"
            )));
        }
        self.adjacency_out
            .entry(cell)
            .or_default()
            .push((face, orientation));
        self.adjacency_in
            .entry(face)
            .or_default()
            .push((cell, orientation));
        self.boundaries.take();
        Ok(())
    }

    #[inline]
    pub fn has_face(&self, cell: CellId, face: CellId) -> bool {
        self.adjacency_out
            .get(&cell)
            .is_some_and(|v| v.iter().any(|(f, _)| *f == face))
    }

    /// Rank of a cell.
    pub fn rank(&self, cell: CellId) -> Result<usize> {
        self.rank_of
            .get(&cell)
            .copied()
            .ok_or_else(|| TopoModelError::InvalidCell(format!("unknown cell {cell}")))
    }

    /// Position of a cell inside its rank.
    pub fn index_in_rank(&self, cell: CellId) -> Result<usize> {
        self.index_in_rank
            .get(&cell)
            .copied()
            .ok_or_else(|| TopoModelError::InvalidCell(format!("unknown cell {cell}")))
    }

    /// Cells of `rank` in insertion order (empty if the rank does not exist).
    pub fn cells_of_rank(&self, rank: usize) -> &[CellId] {
        self.strata.get(rank).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest populated rank, or `None` for an empty lattice.
    pub fn max_rank(&self) -> Option<usize> {
        self.strata.len().checked_sub(1)
    }

    /// Number of cells at each rank.
    pub fn shape(&self) -> Vec<usize> {
        self.strata.iter().map(Vec::len).collect()
    }

    pub fn num_cells(&self) -> usize {
        self.rank_of.len()
    }

    /// Faces of `cell` with their orientation.
    pub fn cone(&self, cell: CellId) -> impl Iterator<Item = (CellId, i8)> + '_ {
        self.adjacency_out
            .get(&cell)
            .into_iter()
            .flat_map(|v| v.iter().copied())
    }

    /// Cofaces of `cell` with their orientation.
    pub fn support(&self, cell: CellId) -> impl Iterator<Item = (CellId, i8)> + '_ {
        self.adjacency_in
            .get(&cell)
            .into_iter()
            .flat_map(|v| v.iter().copied())
    }

    /// All cells reachable downward from `seeds`, seeds included, sorted.
    pub fn closure<I: IntoIterator<Item = CellId>>(&self, seeds: I) -> Vec<CellId> {
        self.walk(seeds, Dir::Down)
    }

    /// All cells reachable upward from `seeds`, seeds included, sorted.
    pub fn star<I: IntoIterator<Item = CellId>>(&self, seeds: I) -> Vec<CellId> {
        self.walk(seeds, Dir::Up)
    }

    fn walk<I: IntoIterator<Item = CellId>>(&self, seeds: I, dir: Dir) -> Vec<CellId> {
        let mut seen: HashSet<CellId> = HashSet::new();
        let mut queue: VecDeque<CellId> = VecDeque::new();
        for s in seeds {
            if seen.insert(s) {
                queue.push_back(s);
            }
        }
        while let Some(p) = queue.pop_front() {
            let next: Vec<CellId> = match dir {
                Dir::Down => self.cone(p).map(|(q, _)| q).collect(),
                Dir::Up => self.support(p).map(|(q, _)| q).collect(),
            };
            for q in next {
                if seen.insert(q) {
                    queue.push_back(q);
                }
            }
        }
        let mut out: Vec<CellId> = seen.into_iter().collect();
        out.sort_unstable();
        out
    }

    /// Boundary matrix `B_rank` of shape `(n_{rank-1}, n_rank)`.
    ///
    /// # Errors
    /// [`TopoModelError::RankOutOfRange`] for `rank == 0` or above the top rank.
    pub fn boundary_matrix(&self, rank: usize, signed: bool) -> Result<CsrMatrix<f32>> {
        let max = self.max_rank().unwrap_or(0);
        if rank == 0 || rank > max {
            return Err(TopoModelError::RankOutOfRange { rank, max });
        }
        let all = self
            .boundaries
            .get_or_try_init(|| (1..=max).map(|r| self.assemble_boundary(r)).collect())?;
        let b = &all[rank - 1];
        Ok(if signed { b.clone() } else { b.abs() })
    }

    fn assemble_boundary(&self, rank: usize) -> Result<CsrMatrix<f32>> {
        let cells = self.cells_of_rank(rank);
        let n_faces = self.cells_of_rank(rank - 1).len();
        let mut triplets = Vec::new();
        for (j, &c) in cells.iter().enumerate() {
            for (f, o) in self.cone(c) {
                triplets.push((self.index_in_rank(f)?, j, f32::from(o)));
            }
        }
        log::debug!(
            "assembled B_{rank}: {n_faces}x{} with {} entries",
            cells.len(),
            triplets.len()
        );
        CsrMatrix::from_triplets(n_faces, cells.len(), triplets)
    }
}

impl DebugInvariants for FaceLattice {
    fn validate_invariants(&self) -> Result<()> {
        for (&cell, outs) in &self.adjacency_out {
            let rc = self.rank(cell)?;
            for &(face, o) in outs {
                if self.rank(face)? + 1 != rc {
                    return Err(TopoModelError::InvalidCell(format!(
                        "arrow {cell} -> {face} skips a rank"
                    )));
                }
                let mirrored = self
                    .adjacency_in
                    .get(&face)
                    .is_some_and(|ins| ins.iter().any(|&(c, oi)| c == cell && oi == o));
                if !mirrored {
                    return Err(TopoModelError::InvalidCell(format!(
                        "missing mirror for arrow {cell} -> {face}"
                    )));
                }
            }
        }
        let n_in: usize = self.adjacency_in.values().map(Vec::len).sum();
        let n_out: usize = self.adjacency_out.values().map(Vec::len).sum();
        if n_in != n_out {
            return Err(TopoModelError::InvalidCell(format!(
                "{n_in} incoming vs {n_out} outgoing arrows"
            )));
        }
        for (r, cells) in self.strata.iter().enumerate() {
            for (i, c) in cells.iter().enumerate() {
                if self.index_in_rank.get(c) != Some(&i) || self.rank_of.get(c) != Some(&r) {
                    return Err(TopoModelError::InvalidCell(format!(
                        "cell {c} has inconsistent rank bookkeeping"
                    )));
                }
            }
        }
        Ok(())
    }
}
