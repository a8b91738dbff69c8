//! Layers on simplicial complexes.

pub mod dist2cycle;
pub mod hsn;
pub mod san;
pub mod scn2;

pub use dist2cycle::{Dist2Cycle, Dist2CycleInput, Dist2CycleLayer};
pub use hsn::{Hsn, HsnInput, HsnLayer};
pub use san::{San, SanConv, SanInput, SanLayer};
pub use scn2::{Scn2, Scn2Input, Scn2Layer};
