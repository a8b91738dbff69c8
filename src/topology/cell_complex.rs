//! Regular 2-dimensional cell complexes.
//!
//! Vertices carry arbitrary `usize` labels. Edges are stored oriented from
//! the smaller to the larger label. A 2-cell is a closed walk through at
//! least three distinct vertices; its boundary visits each edge of the walk
//! with sign `+1` when the walk agrees with the edge orientation and `-1`
//! otherwise. Unlike a simplicial complex, a 2-cell may have any number of
//! sides and several 2-cells may share the same boundary.

use std::collections::HashMap;

use crate::invariants::DebugInvariants;
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::cell_id::CellId;
use crate::topology::complex::Complex;
use crate::topology::lattice::FaceLattice;

#[derive(Clone, Debug, Default)]
pub struct CellComplex {
    lattice: FaceLattice,
    vertices: HashMap<usize, CellId>,
    edges: HashMap<(usize, usize), CellId>,
    labels: HashMap<CellId, Vec<usize>>,
}

impl CellComplex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from edges and 2-cells (each 2-cell a vertex cycle).
    pub fn from_parts<E, C>(edges: E, cells: C) -> Result<Self>
    where
        E: IntoIterator<Item = (usize, usize)>,
        C: IntoIterator<Item = Vec<usize>>,
    {
        let mut cx = Self::new();
        for (u, v) in edges {
            cx.add_edge(u, v)?;
        }
        for c in cells {
            cx.add_cell(&c)?;
        }
        cx.debug_assert_invariants();
        Ok(cx)
    }

    /// Insert a vertex (idempotent).
    pub fn add_vertex(&mut self, label: usize) -> Result<CellId> {
        if let Some(&id) = self.vertices.get(&label) {
            return Ok(id);
        }
        let id = self.lattice.add_cell(0)?;
        self.vertices.insert(label, id);
        self.labels.insert(id, vec![label]);
        Ok(id)
    }

    /// Insert the edge `{u, v}` (idempotent), oriented `min → max`.
    pub fn add_edge(&mut self, u: usize, v: usize) -> Result<CellId> {
        if u == v {
            return Err(TopoModelError::DuplicateVertex);
        }
        let key = (u.min(v), u.max(v));
        if let Some(&id) = self.edges.get(&key) {
            return Ok(id);
        }
        let tail = self.add_vertex(key.0)?;
        let head = self.add_vertex(key.1)?;
        let id = self.lattice.add_cell(1)?;
        self.lattice.add_face(id, tail, -1)?;
        self.lattice.add_face(id, head, 1)?;
        self.edges.insert(key, id);
        self.labels.insert(id, vec![key.0, key.1]);
        Ok(id)
    }

    /// Insert a 2-cell bounded by the closed walk `cycle`.
    ///
    /// # Errors
    /// * [`TopoModelError::InvalidCell`] for walks shorter than three vertices.
    /// * [`TopoModelError::DuplicateVertex`] if the walk revisits a vertex.
    pub fn add_cell(&mut self, cycle: &[usize]) -> Result<CellId> {
        if cycle.len() < 3 {
            return Err(TopoModelError::InvalidCell(format!(
                "2-cell boundary {cycle:?} needs at least three vertices"
            )));
        }
        let mut seen = cycle.to_vec();
        seen.sort_unstable();
        if seen.windows(2).any(|w| w[0] == w[1]) {
            return Err(TopoModelError::DuplicateVertex);
        }
        let mut boundary = Vec::with_capacity(cycle.len());
        for (k, &a) in cycle.iter().enumerate() {
            let b = cycle[(k + 1) % cycle.len()];
            let edge = self.add_edge(a, b)?;
            boundary.push((edge, if a < b { 1 } else { -1 }));
        }
        let id = self.lattice.add_cell(2)?;
        for (edge, sign) in boundary {
            self.lattice.add_face(id, edge, sign)?;
        }
        self.labels.insert(id, cycle.to_vec());
        Ok(id)
    }

    pub fn vertex_index(&self, label: usize) -> Option<usize> {
        let id = self.vertices.get(&label)?;
        self.lattice.index_in_rank(*id).ok()
    }

    pub fn edge_index(&self, u: usize, v: usize) -> Option<usize> {
        let id = self.edges.get(&(u.min(v), u.max(v)))?;
        self.lattice.index_in_rank(*id).ok()
    }

    /// Vertex labels of every cell of `rank`, in matrix order.
    pub fn cells(&self, rank: usize) -> Vec<&[usize]> {
        self.lattice
            .cells_of_rank(rank)
            .iter()
            .filter_map(|c| self.labels.get(c).map(Vec::as_slice))
            .collect()
    }

    pub fn lattice(&self) -> &FaceLattice {
        &self.lattice
    }
}

impl Complex for CellComplex {
    fn shape(&self) -> Vec<usize> {
        self.lattice.shape()
    }

    fn incidence_matrix(&self, rank: usize, signed: bool) -> Result<CsrMatrix<f32>> {
        self.lattice.boundary_matrix(rank, signed)
    }
}

impl DebugInvariants for CellComplex {
    fn validate_invariants(&self) -> Result<()> {
        self.lattice.validate_invariants()?;
        if self.dim() == 2 {
            let bb = self
                .incidence_matrix(1, true)?
                .matmul(&self.incidence_matrix(2, true)?)?;
            if bb.nnz() != 0 {
                return Err(TopoModelError::InvalidCell(
                    "boundary of a 2-cell is not a cycle".into(),
                ));
            }
        }
        Ok(())
    }
}
