//! Recoverable failures reported by `ChainedHashMap`.
//!
//! Panics raised by user `Hash`/`BuildHasher`/`KeyEq` code are not turned
//! into errors; they unwind through the table, which has not been mutated
//! at the point any user callback runs.

use allocator_api2::alloc::AllocError;
use std::collections::TryReserveError;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TableError {
    /// Lookup by `at`/`at_mut` on a key that is not present.
    #[error("key not found")]
    NotFound,
    /// The allocator refused an entry or the anchor table could not grow.
    #[error("allocation failed")]
    AllocationFailure,
    /// Rejected by `set_max_load_factor`; must be finite and positive.
    #[error("invalid max load factor: {0}")]
    InvalidLoadFactor(f64),
}

impl From<AllocError> for TableError {
    fn from(_: AllocError) -> Self {
        TableError::AllocationFailure
    }
}

impl From<TryReserveError> for TableError {
    fn from(_: TryReserveError) -> Self {
        TableError::AllocationFailure
    }
}
