//! TopoModelError: Unified error type for topomodel public APIs
//!
//! This error type is used throughout the library so that topology
//! construction, neighborhood assembly and layer forward/backward passes report
//! failures instead of panicking.

use thiserror::Error;

/// Convenience alias used by every fallible API in the crate.
pub type Result<T> = std::result::Result<T, TopoModelError>;

/// Unified error type for topomodel operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TopoModelError {
    /// Two operands of a linear-algebra operation have incompatible shapes.
    #[error("Shape mismatch in {op}: {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: (usize, usize),
        right: (usize, usize),
    },
    /// A rank was requested that the structure does not have.
    #[error("Rank {rank} out of range (maximum rank is {max})")]
    RankOutOfRange { rank: usize, max: usize },
    /// A cell references vertices or faces that do not exist.
    #[error("Invalid cell: {0}")]
    InvalidCell(String),
    /// A simplex or cell lists the same vertex twice.
    #[error("Cell lists the same vertex more than once")]
    DuplicateVertex,
    /// A combinatorial complex cell violates rank monotonicity.
    #[error("Rank monotonicity violated: {0}")]
    RankMonotonicity(String),
    /// An operation received an empty input where at least one item is required.
    #[error("Empty input: {0}")]
    EmptyInput(&'static str),
    /// A configuration value is out of its admissible range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    /// Could not parse an activation name.
    #[error("Unknown activation function `{0}`")]
    UnknownActivation(String),
    /// Could not parse an aggregation name.
    #[error("Unknown aggregation function `{0}`")]
    UnknownAggregation(String),
    /// Could not parse a neighborhood name.
    #[error("Unknown neighborhood `{0}`")]
    UnknownNeighborhood(String),
    /// A dense matrix that must be inverted is singular.
    #[error("Matrix is singular and cannot be inverted")]
    SingularMatrix,
    /// Attempted to construct a CellId with a zero value (invalid).
    #[error("CellId must be non-zero (0 is reserved as invalid/sentinel)")]
    InvalidCellId,
    /// A configuration document could not be decoded.
    #[error("Configuration decode error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for TopoModelError {
    fn from(e: serde_json::Error) -> Self {
        TopoModelError::Config(e.to_string())
    }
}
