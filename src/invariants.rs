//! Structural invariant checks for topology containers.
//!
//! Bulk constructors call [`DebugInvariants::debug_assert_invariants`] once
//! the structure is complete. The check is compiled in for debug builds and
//! for release builds with the `check-invariants` feature.

use crate::topo_error::TopoModelError;

/// Types whose internal structure can be validated.
pub trait DebugInvariants {
    /// Validate invariants and return the first violation encountered.
    fn validate_invariants(&self) -> Result<(), TopoModelError>;

    /// Panic on the first violated invariant when checking is enabled.
    #[inline]
    fn debug_assert_invariants(&self) {
        #[cfg(any(debug_assertions, feature = "check-invariants"))]
        if let Err(e) = self.validate_invariants() {
            panic!(
                "[invariants] {} violated: {}",
                std::any::type_name::<Self>(),
                e
            );
        }
    }
}
