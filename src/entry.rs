//! Entries and the two-stage construction boundary.
//!
//! An entry is built in two steps. `PendingEntry` holds the key, the value
//! and the key's hash but owns no table storage; producing it runs the user
//! hasher and nothing else. `PendingEntry::allocate_in` then moves the pair
//! into its own allocation from the table's allocator. Nothing is linked
//! into the table until both steps succeed, so a panicking hasher or a
//! refused allocation leaves the table untouched.
//!
//! Each entry lives in its own box, so its address does not move when the
//! node arena grows or the chain is re-threaded.

use allocator_api2::alloc::{AllocError, Allocator, Global};
use allocator_api2::boxed::Box;

#[derive(Debug)]
pub(crate) struct Entry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
}

pub(crate) type EntryBox<K, V, A = Global> = Box<Entry<K, V>, A>;

/// First stage: hashed, not yet allocated.
#[derive(Debug)]
pub(crate) struct PendingEntry<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) hash: u64,
}

impl<K, V> PendingEntry<K, V> {
    pub(crate) fn new(key: K, value: V, hash: u64) -> Self {
        Self { key, value, hash }
    }

    /// Second stage. On failure the key and value are dropped and no
    /// storage is held.
    pub(crate) fn allocate_in<A: Allocator>(
        self,
        alloc: A,
    ) -> Result<(EntryBox<K, V, A>, u64), AllocError> {
        let PendingEntry { key, value, hash } = self;
        let boxed = Box::try_new_in(Entry { key, value }, alloc)?;
        Ok((boxed, hash))
    }
}

/// Moves the pair out of its box and releases the allocation.
pub(crate) fn into_parts<K, V, A: Allocator>(boxed: EntryBox<K, V, A>) -> (K, V) {
    let Entry { key, value } = Box::into_inner(boxed);
    (key, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::alloc::Layout;
    use core::ptr::NonNull;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone)]
    struct Refusing;

    unsafe impl Allocator for Refusing {
        fn allocate(&self, _layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
            Err(AllocError)
        }
        unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {
            unreachable!("nothing was allocated")
        }
    }

    struct DropCounter(Rc<Cell<usize>>);
    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn allocate_then_take_apart() {
        let pending = PendingEntry::new("k".to_string(), 7, 42);
        let (boxed, hash) = pending.allocate_in(Global).unwrap();
        assert_eq!(hash, 42);
        assert_eq!(boxed.key, "k");
        let (k, v) = into_parts(boxed);
        assert_eq!((k.as_str(), v), ("k", 7));
    }

    #[test]
    fn refused_allocation_drops_payload() {
        let drops = Rc::new(Cell::new(0));
        let pending = PendingEntry::new(1u32, DropCounter(drops.clone()), 1);
        assert!(pending.allocate_in(Refusing).is_err());
        assert_eq!(drops.get(), 1);
    }

    // Forwards to `Global` and counts live blocks.
    #[derive(Clone, Default)]
    struct Counting(Rc<Cell<isize>>);

    unsafe impl Allocator for Counting {
        fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
            let block = Global.allocate(layout)?;
            self.0.set(self.0.get() + 1);
            Ok(block)
        }
        unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
            self.0.set(self.0.get() - 1);
            Global.deallocate(ptr, layout)
        }
    }

    #[test]
    fn take_apart_frees_through_own_allocator() {
        let alloc = Counting::default();
        let drops = Rc::new(Cell::new(0));
        let pending = PendingEntry::new("k".to_string(), DropCounter(drops.clone()), 3);
        let (boxed, _) = pending.allocate_in(alloc.clone()).unwrap();
        assert_eq!(alloc.0.get(), 1);
        let (key, value) = into_parts(boxed);
        assert_eq!(alloc.0.get(), 0);
        assert_eq!(drops.get(), 0);
        drop(value);
        assert_eq!(drops.get(), 1);
        assert_eq!(key, "k");
    }

    #[test]
    fn zero_sized_entries() {
        let (boxed, _) = PendingEntry::new((), (), 0).allocate_in(Global).unwrap();
        let ((), ()) = into_parts(boxed);
    }
}
