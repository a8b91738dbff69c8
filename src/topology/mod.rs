//! Higher-order combinatorial domains.
//!
//! Simplicial and cell complexes are built on an oriented [`FaceLattice`];
//! hypergraphs and combinatorial complexes store their cells directly. All of
//! them implement [`Complex`], from which every neighborhood operator is
//! derived.

pub mod cell_complex;
pub mod cell_id;
pub mod combinatorial;
pub mod complex;
pub mod dynamic_topology;
pub mod hypergraph;
pub mod lattice;
pub mod simplicial;

pub use cell_complex::CellComplex;
pub use cell_id::CellId;
pub use combinatorial::CombinatorialComplex;
pub use complex::Complex;
pub use hypergraph::Hypergraph;
pub use lattice::{Dir, FaceLattice};
pub use simplicial::SimplicialComplex;
