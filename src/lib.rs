#![cfg_attr(docsrs, feature(doc_cfg))]
//! # topomodel
//!
//! topomodel is a library of neural-network layers for higher-order
//! combinatorial domains: simplicial complexes, cell complexes, hypergraphs and
//! combinatorial complexes. It generalises graph convolution by passing
//! messages along neighborhood operators (incidence, adjacency, co-adjacency,
//! Laplacians) between cells of equal or neighbouring rank.
//!
//! ## Features
//! - Topological domains with oriented boundary operators, built on an oriented
//!   face lattice with cached per-rank boundary matrices
//! - Sparse CSR neighborhood matrices and their normalisations
//! - Per-rank convolutions with optional attention, hand-derived backward passes
//!   and first-order optimizers
//! - Ready-made models: SCN2, HSN, SAN, Dist2Cycle (simplicial), CCXN, CWN
//!   (cell), UniGCN and DHGCN (hypergraph)
//!
//! ## Determinism
//!
//! All randomized decisions use `SmallRng` seeds drawn from configuration so runs are
//! reproducible. Unit tests fix seeds explicitly to ensure deterministic behavior.
//!
//! ## Usage
//!
//! ```
//! use topomodel::prelude::*;
//! use ndarray::Array2;
//!
//! let sc = SimplicialComplex::from_simplices([vec![0, 1, 2], vec![2, 3]]).unwrap();
//! let input = HsnInput::from_complex(&sc, Array2::ones((4, 3))).unwrap();
//! let mut rng = TrainConfig::default().rng();
//! let model = Hsn::new(3, 2, 2, &LayerConfig::default(), &mut rng).unwrap();
//! assert_eq!(model.forward(&input).unwrap().dim(), (4, 2));
//! ```
//!
//! ## Optional features
//! - `rayon`: parallel sparse × dense products
//! - `check-invariants`: structural checks of topological domains in release builds

pub mod config;
pub mod features;
pub mod invariants;
pub mod linalg;
pub mod metrics;
pub mod neighborhood;
pub mod nn;
pub mod sparse;
pub mod topo_error;
pub mod topology;
pub mod train;

pub use invariants::DebugInvariants;
pub use topo_error::{Result, TopoModelError};

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::config::{LayerConfig, OptimizerKind, TrainConfig};
    pub use crate::features::RankFeatures;
    pub use crate::invariants::DebugInvariants;
    pub use crate::neighborhood::{NeighborhoodKind, Normalization, operator};
    pub use crate::nn::base::{
        Activation, Adam, AggrFunc, Aggregation, Conv, ConvOptions, Initialization, Linear, Loss,
        Optimizer, Parameter, Parametrized, Sgd,
    };
    pub use crate::nn::cell::{Ccxn, CcxnInput, CcxnLayer, Cwn, CwnInput, CwnLayer};
    pub use crate::nn::hypergraph::{
        Dhgcn, DhgcnInput, DhgcnLayer, UniGcn, UniGcnInput, UniGcnLayer,
    };
    pub use crate::nn::simplicial::{
        Dist2Cycle, Dist2CycleInput, Dist2CycleLayer, Hsn, HsnInput, HsnLayer, San, SanInput,
        SanLayer, Scn2, Scn2Input, Scn2Layer,
    };
    pub use crate::sparse::CsrMatrix;
    pub use crate::topo_error::TopoModelError;
    pub use crate::topology::{
        CellComplex, CellId, CombinatorialComplex, Complex, Hypergraph, SimplicialComplex,
    };
    pub use crate::train::{Differentiable, Model, Target, TrainHistory, Trainer};
}

