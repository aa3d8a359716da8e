//! chained-hashmap: a single-threaded, separately chained hash map whose
//! entries all share one singly linked list.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: O(1) average insert, lookup and erase with stable entry
//!   addresses, a grow-only bucket table, and no partial mutation when user
//!   code or the allocator fails.
//! - Layers:
//!   - `entry`: boxes one key/value pair. Construction is two-stage: hash
//!     first (`PendingEntry`), allocate second (`allocate_in`).
//!   - `anchors`: one slot per bucket naming the node right before that
//!     bucket's run in the shared list.
//!   - `chain`: node arena, sentinel head and anchors; the only code that
//!     rewrites links or anchors.
//!   - `map`: `ChainedHashMap`, the public API and the growth policy.
//!
//! Chain layout
//! - Every entry's node is in one list starting at a sentinel head. Nodes
//!   of one bucket are contiguous (a run) and runs never interleave.
//! - A new node is spliced right after its bucket's anchor. A node for an
//!   empty bucket starts a new run at the very front of the list; the run
//!   that used to be first is re-anchored on the new node.
//! - Erasing a node re-anchors the following run when that run was anchored
//!   on it, and clears the bucket's anchor when the run becomes empty.
//! - Lookups stop at the first node of a different bucket.
//!
//! Hashing and growth
//! - Each node caches its `u64` hash; bucket index is `hash % bucket_count`.
//!   Growth and copying never call the user hasher.
//! - After an insert, `len / bucket_count < max_load_factor` holds. Growth
//!   doubles the bucket count (or more, for small load factors) and
//!   re-threads existing nodes without rebuilding entries. The bucket count
//!   never shrinks.
//!
//! Failure model
//! - Allocation failure is returned as `TableError::AllocationFailure`;
//!   the anchors a growth step needs are allocated before the new entry is
//!   linked, so a failing insert leaves the table as it was.
//! - Panics from `Hash`, `BuildHasher` or `KeyEq` propagate unchanged. All
//!   such calls happen before any mutation.
//! - Erasing the end position or a stale position panics.
//!
//! Positions
//! - `Position` is a generational arena key, not a borrow. Stale positions
//!   resolve to nothing. A position keeps naming its entry across growth,
//!   but what follows it in the chain changes.
//!
//! Notes and non-goals
//! - Single-threaded; no internal locking.
//! - No shrinking on erase, no persistence or serialization.

mod anchors;
mod capability;
mod chain;
mod chain_proptest;
mod entry;
mod error;
mod iter;
mod map;
mod reentrancy;

// Public surface
pub use capability::{DefaultEq, EqFn, KeyEq, SelectOnCopy};
pub use error::TableError;
pub use iter::{IntoIter, Iter, IterMut, Keys, Position, Values};
pub use map::{ChainedHashMap, DEFAULT_BUCKET_COUNT, DEFAULT_MAX_LOAD_FACTOR};

pub use allocator_api2::alloc::{AllocError, Allocator, Global};
