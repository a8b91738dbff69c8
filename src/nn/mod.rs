//! Neural-network layers on topological domains.
//!
//! Layers are grouped by the structure they run on. Each family provides a
//! single-layer type (`*Layer`) working on precomputed neighborhood matrices
//! and a small model that stacks layers and adds a linear readout.

pub mod base;
pub mod cell;
pub mod hypergraph;
pub mod simplicial;
