//! Layers on cell complexes.

pub mod ccxn;
pub mod cwn;

pub use ccxn::{Ccxn, CcxnInput, CcxnLayer};
pub use cwn::{Cwn, CwnInput, CwnLayer};
