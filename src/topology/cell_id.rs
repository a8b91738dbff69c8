//! `CellId`: a strong, zero-cost handle for cells of a complex
//!
//! Every cell of a face lattice (vertex, edge, face, ...) is represented by a
//! unique, opaque identifier. `CellId` wraps a nonzero `u64` so that 0 stays
//! reserved as an invalid or sentinel value.

use std::{fmt, num::NonZeroU64};

use crate::topo_error::{Result, TopoModelError};

/// Identifier of a single cell inside a [`FaceLattice`](super::lattice::FaceLattice).
///
/// # Memory layout
/// This type is `repr(transparent)`, so it has the same ABI and alignment as
/// a `u64`.
#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct CellId(NonZeroU64);

impl CellId {
    /// Creates a new `CellId` from a raw `u64` value.
    ///
    /// # Errors
    /// Returns [`TopoModelError::InvalidCellId`] if `raw == 0`.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use topomodel::topology::cell_id::CellId;
    /// let c = CellId::new(1).unwrap();
    /// assert_eq!(c.get(), 1);
    /// ```
    #[inline]
    pub fn new(raw: u64) -> Result<Self> {
        NonZeroU64::new(raw)
            .map(CellId)
            .ok_or(TopoModelError::InvalidCellId)
    }

    /// Returns the inner `u64` value of this `CellId`.
    #[inline]
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CellId").field(&self.get()).finish()
    }
}

/// Prints only the raw integer.
impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.get())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_rejected() {
        assert_eq!(CellId::new(0), Err(TopoModelError::InvalidCellId));
    }

    #[test]
    fn debug_and_display() {
        let c = CellId::new(7).unwrap();
        assert_eq!(format!("{:?}", c), "CellId(7)");
        assert_eq!(format!("{}", c), "7");
    }

    #[test]
    fn ordering_follows_raw_value() {
        let a = CellId::new(1).unwrap();
        let b = CellId::new(2).unwrap();
        assert!(a < b);
    }

    #[test]
    fn json_roundtrip() {
        let c = CellId::new(123).unwrap();
        let s = serde_json::to_string(&c).unwrap();
        let back: CellId = serde_json::from_str(&s).unwrap();
        assert_eq!(back, c);
    }
}
