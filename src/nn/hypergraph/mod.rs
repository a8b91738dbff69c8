//! Layers on hypergraphs.

pub mod dhgcn;
pub mod unigcn;

pub use dhgcn::{Dhgcn, DhgcnInput, DhgcnLayer};
pub use unigcn::{UniGcn, UniGcnInput, UniGcnLayer};
