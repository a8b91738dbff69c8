//! Simplicial complexes with oriented boundary operators.
//!
//! A simplex is a sorted set of vertex labels. Inserting a simplex inserts its
//! whole closure, so the complex is always closed under taking faces. The face
//! obtained by dropping the `i`-th vertex of a simplex enters its boundary with
//! sign `(-1)^i`, which makes every boundary of a boundary vanish.

use std::collections::HashMap;

use crate::invariants::DebugInvariants;
use crate::sparse::CsrMatrix;
use crate::topo_error::{Result, TopoModelError};
use crate::topology::cell_id::CellId;
use crate::topology::complex::Complex;
use crate::topology::lattice::FaceLattice;

#[derive(Clone, Debug, Default)]
pub struct SimplicialComplex {
    lattice: FaceLattice,
    ids: HashMap<Vec<usize>, CellId>,
    vertices_of: HashMap<CellId, Vec<usize>>,
}

impl SimplicialComplex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a complex from maximal simplices.
    ///
    /// # Example
    /// ```rust
    /// use topomodel::topology::{Complex, SimplicialComplex};
    /// let sc = SimplicialComplex::from_simplices([vec![0, 1, 2], vec![2, 3]]).unwrap();
    /// assert_eq!(sc.shape(), vec![4, 4, 1]);
    /// ```
    pub fn from_simplices<I, S>(simplices: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[usize]>,
    {
        let mut sc = Self::new();
        for s in simplices {
            sc.add_simplex(s.as_ref())?;
        }
        sc.debug_assert_invariants();
        Ok(sc)
    }

    /// Insert a simplex and all of its faces. Returns the id of the simplex.
    ///
    /// # Errors
    /// * [`TopoModelError::EmptyInput`] for an empty vertex list.
    /// * [`TopoModelError::DuplicateVertex`] if a vertex repeats.
    pub fn add_simplex(&mut self, vertices: &[usize]) -> Result<CellId> {
        if vertices.is_empty() {
            return Err(TopoModelError::EmptyInput("simplex"));
        }
        let mut sorted = vertices.to_vec();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(TopoModelError::DuplicateVertex);
        }
        self.insert_sorted(sorted)
    }

    fn insert_sorted(&mut self, simplex: Vec<usize>) -> Result<CellId> {
        if let Some(&id) = self.ids.get(&simplex) {
            return Ok(id);
        }
        let mut faces = Vec::with_capacity(simplex.len());
        if simplex.len() > 1 {
            for i in 0..simplex.len() {
                let mut face = simplex.clone();
                face.remove(i);
                let sign = if i % 2 == 0 { 1 } else { -1 };
                faces.push((self.insert_sorted(face)?, sign));
            }
        }
        let id = self.lattice.add_cell(simplex.len() - 1)?;
        for (face, sign) in faces {
            self.lattice.add_face(id, face, sign)?;
        }
        self.ids.insert(simplex.clone(), id);
        self.vertices_of.insert(id, simplex);
        Ok(id)
    }

    /// `true` if the (unsorted) vertex set is a simplex of the complex.
    pub fn contains(&self, vertices: &[usize]) -> bool {
        let mut sorted = vertices.to_vec();
        sorted.sort_unstable();
        self.ids.contains_key(&sorted)
    }

    /// Row/column of a simplex in the matrices of its rank.
    pub fn index_of(&self, vertices: &[usize]) -> Option<usize> {
        let mut sorted = vertices.to_vec();
        sorted.sort_unstable();
        let id = self.ids.get(&sorted)?;
        self.lattice.index_in_rank(*id).ok()
    }

    /// Simplices of `rank` in matrix order.
    pub fn simplices(&self, rank: usize) -> Vec<&[usize]> {
        self.lattice
            .cells_of_rank(rank)
            .iter()
            .filter_map(|c| self.vertices_of.get(c).map(Vec::as_slice))
            .collect()
    }

    /// Underlying oriented face lattice.
    pub fn lattice(&self) -> &FaceLattice {
        &self.lattice
    }
}

impl Complex for SimplicialComplex {
    fn shape(&self) -> Vec<usize> {
        self.lattice.shape()
    }

    fn incidence_matrix(&self, rank: usize, signed: bool) -> Result<CsrMatrix<f32>> {
        self.lattice.boundary_matrix(rank, signed)
    }
}

impl DebugInvariants for SimplicialComplex {
    fn validate_invariants(&self) -> Result<()> {
        self.lattice.validate_invariants()?;
        for r in 1..self.dim() {
            let bb = self
                .incidence_matrix(r, true)?
                .matmul(&self.incidence_matrix(r + 1, true)?)?;
            if bb.nnz() != 0 {
                return Err(TopoModelError::InvalidCell(format!(
                    "B_{r} B_{} is not zero",
                    r + 1
                )));
            }
        }
        Ok(())
    }
}
