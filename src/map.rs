//! ChainedHashMap: public table API and growth policy.

use crate::anchors::AnchorTable;
use crate::capability::{DefaultEq, KeyEq, SelectOnCopy};
use crate::chain::{Chain, NodeKey};
use crate::entry::{into_parts, PendingEntry};
use crate::error::TableError;
use crate::iter::{IntoIter, Iter, IterMut, Keys, Position, Values};
use crate::reentrancy::ProbeFlag;
use allocator_api2::alloc::{Allocator, Global};
use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use std::collections::hash_map::RandomState;
use tracing::{debug, trace};

/// Bucket count used when none is requested.
pub const DEFAULT_BUCKET_COUNT: usize = 100;
/// Growth fires once `len / bucket_count` reaches this.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 1.0;

/// A hash map threading all entries through one list, with one predecessor
/// anchor per bucket.
///
/// `S` hashes keys, `E` compares them and `A` allocates entries. Every entry
/// is boxed separately, so references obtained through a position stay at
/// the same address across growth.
pub struct ChainedHashMap<K, V, S = RandomState, E = DefaultEq, A: Allocator = Global> {
    chain: Chain<K, V, A>,
    max_load_factor: f64,
    hasher: S,
    eq: E,
    alloc: A,
    probe: ProbeFlag,
}

#[derive(Copy, Clone, Debug)]
enum Growth {
    Automatic,
    Explicit,
}

// Smallest bucket count that keeps `len / n` strictly below `max_load`.
fn buckets_for(len: usize, max_load: f64) -> usize {
    let mut n = ((len as f64 / max_load).floor() as usize).saturating_add(1);
    while n < usize::MAX && len as f64 / n as f64 >= max_load {
        n += 1;
    }
    n.max(1)
}

fn or_abort<T>(r: Result<T, TableError>) -> T {
    match r {
        Ok(v) => v,
        Err(e) => panic!("ChainedHashMap: {e}"),
    }
}

impl<K, V> ChainedHashMap<K, V> {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKET_COUNT)
    }

    pub fn with_buckets(bucket_count: usize) -> Self {
        Self::with_buckets_and_hasher(bucket_count, RandomState::new())
    }
}

impl<K, V> Default for ChainedHashMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, E> ChainedHashMap<K, V, S, E>
where
    E: Default,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_buckets_and_hasher(DEFAULT_BUCKET_COUNT, hasher)
    }

    pub fn with_buckets_and_hasher(bucket_count: usize, hasher: S) -> Self {
        Self::with_buckets_hasher_and_eq(bucket_count, hasher, E::default())
    }
}

impl<K, V, S, E> ChainedHashMap<K, V, S, E> {
    pub fn with_buckets_hasher_and_eq(bucket_count: usize, hasher: S, eq: E) -> Self {
        Self::with_parts_in(bucket_count, hasher, eq, Global)
    }
}

impl<K, V, S, E, A> ChainedHashMap<K, V, S, E, A>
where
    A: Allocator + Clone,
{
    pub fn with_buckets_in(bucket_count: usize, alloc: A) -> Self
    where
        S: Default,
        E: Default,
    {
        Self::with_parts_in(bucket_count, S::default(), E::default(), alloc)
    }

    /// Panics if the anchor table cannot be allocated; see
    /// `try_with_parts_in`.
    pub fn with_parts_in(bucket_count: usize, hasher: S, eq: E, alloc: A) -> Self {
        or_abort(Self::try_with_parts_in(bucket_count, hasher, eq, alloc))
    }

    pub fn try_with_parts_in(
        bucket_count: usize,
        hasher: S,
        eq: E,
        alloc: A,
    ) -> Result<Self, TableError> {
        Ok(Self {
            chain: Chain::with_buckets(bucket_count)?,
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            hasher,
            eq,
            alloc,
            probe: ProbeFlag::new(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chain.len() == 0
    }

    #[inline]
    pub fn bucket_count(&self) -> usize {
        self.chain.bucket_count()
    }

    /// Number of entries in bucket `bucket`. Panics if
    /// `bucket >= bucket_count()`.
    pub fn bucket_size(&self, bucket: usize) -> usize {
        self.chain.run_len(bucket)
    }

    #[inline]
    pub fn load_factor(&self) -> f64 {
        self.len() as f64 / self.bucket_count() as f64
    }

    #[inline]
    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    /// Sets the growth threshold. Grows right away if the current load
    /// already reaches it; on failure nothing changes.
    pub fn set_max_load_factor(&mut self, max_load: f64) -> Result<(), TableError> {
        if !max_load.is_finite() || max_load <= 0.0 {
            return Err(TableError::InvalidLoadFactor(max_load));
        }
        let growth = self.growth_for(self.len(), max_load)?;
        trace!(from = self.max_load_factor, to = max_load, "max load factor set");
        self.max_load_factor = max_load;
        if let Some(anchors) = growth {
            self.rethread_into(anchors, Growth::Automatic);
        }
        Ok(())
    }

    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub fn key_eq(&self) -> &E {
        &self.eq
    }

    pub fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Re-threads the table over `bucket_count` buckets. No-op unless that
    /// is more than the current count; the table never shrinks.
    pub fn rehash(&mut self, bucket_count: usize) -> Result<(), TableError> {
        if bucket_count <= self.bucket_count() {
            return Ok(());
        }
        let anchors = AnchorTable::try_new(bucket_count)?;
        self.rethread_into(anchors, Growth::Explicit);
        Ok(())
    }

    /// Grows so that `len` entries fit without automatic growth.
    ///
    /// `len` counts entries, not buckets: the bucket count becomes the
    /// smallest one keeping `len / bucket_count` below the max load factor.
    /// Use `rehash` to ask for a bucket count directly.
    pub fn reserve(&mut self, len: usize) -> Result<(), TableError> {
        self.rehash(buckets_for(len, self.max_load_factor))
    }

    // Pre-allocates the anchors needed once the table holds `len` entries,
    // so the insert that triggers growth cannot fail halfway.
    fn growth_for(&self, len: usize, max_load: f64) -> Result<Option<AnchorTable>, TableError> {
        let buckets = self.bucket_count();
        if (len as f64 / buckets as f64) < max_load {
            return Ok(None);
        }
        let target = buckets.saturating_mul(2).max(buckets_for(len, max_load));
        Ok(Some(AnchorTable::try_new(target)?))
    }

    fn rethread_into(&mut self, anchors: AnchorTable, growth: Growth) {
        debug!(
            from = self.bucket_count(),
            to = anchors.len(),
            len = self.len(),
            ?growth,
            "rehash"
        );
        self.chain.rethread(anchors);
    }

    /// Drops every entry; the bucket count is kept.
    pub fn clear(&mut self) {
        trace!(len = self.len(), "clear");
        self.chain.clear();
    }

    #[inline]
    pub fn begin(&self) -> Position {
        Position::from_link(self.chain.first())
    }

    #[inline]
    pub fn end(&self) -> Position {
        Position::end()
    }

    /// Position following `pos`; `end()` for the last entry, the end
    /// position or a stale position.
    pub fn next(&self, pos: Position) -> Position {
        let next = pos
            .node()
            .and_then(|k| self.chain.node(k))
            .and_then(|n| n.next());
        Position::from_link(next)
    }

    pub fn entry_at(&self, pos: Position) -> Option<(&K, &V)> {
        let node = self.chain.node(pos.node()?)?;
        Some((&node.entry.key, &node.entry.value))
    }

    pub fn value_at_mut(&mut self, pos: Position) -> Option<&mut V> {
        let node = self.chain.node_mut(pos.node()?)?;
        Some(&mut node.entry.value)
    }

    /// Removes the entry at `pos` and returns it.
    ///
    /// Panics on the end position or a stale position.
    pub fn erase(&mut self, pos: Position) -> (K, V) {
        let key = pos.node().expect("erase of the end position");
        let node = self.chain.unlink(key);
        into_parts(node.entry)
    }

    /// Removes `[first, last)` and returns how many entries went.
    ///
    /// Panics if `last` is not reachable from `first`.
    pub fn erase_range(&mut self, first: Position, last: Position) -> usize {
        let mut cursor = first;
        let mut erased = 0;
        while cursor != last {
            let key = cursor
                .node()
                .expect("erase range end is not reachable from its start");
            let next = self
                .chain
                .node(key)
                .expect("stale position in erase range")
                .next();
            drop(self.chain.unlink(key));
            cursor = Position::from_link(next);
            erased += 1;
        }
        erased
    }

    pub fn iter(&self) -> Iter<'_, K, V, A> {
        Iter::new(&self.chain)
    }

    pub fn iter_mut(&mut self) -> IterMut<'_, K, V, A> {
        IterMut::new(&mut self.chain)
    }

    pub fn keys(&self) -> Keys<'_, K, V, A> {
        Keys { inner: self.iter() }
    }

    pub fn values(&self) -> Values<'_, K, V, A> {
        Values { inner: self.iter() }
    }

    /// Moves the contents out, leaving `self` empty with the default bucket
    /// count and the same capabilities.
    pub fn take(&mut self) -> Self
    where
        S: Clone,
        E: Clone,
    {
        let mut empty = Self::with_parts_in(
            DEFAULT_BUCKET_COUNT,
            self.hasher.clone(),
            self.eq.clone(),
            self.alloc.clone(),
        );
        empty.max_load_factor = self.max_load_factor;
        core::mem::replace(self, empty)
    }

    /// Deep copy. Entries of the copy come from
    /// `self.allocator().select_on_copy()`; bucket count, load factor and
    /// iteration order match the source. No key is rehashed.
    pub fn try_clone(&self) -> Result<Self, TableError>
    where
        K: Clone,
        V: Clone,
        S: Clone,
        E: Clone,
        A: SelectOnCopy,
    {
        let alloc = self.alloc.select_on_copy();
        let mut chain = Chain::with_buckets(self.bucket_count())?;
        chain.try_reserve_nodes(self.len())?;
        // Threading prepends, so walking backwards rebuilds the same order.
        for key in self.chain.order().into_iter().rev() {
            let node = self
                .chain
                .node(key)
                .expect("chain order lists live nodes");
            let pending =
                PendingEntry::new(node.entry.key.clone(), node.entry.value.clone(), node.hash);
            let (entry, hash) = pending.allocate_in(alloc.clone())?;
            chain.link(entry, hash);
        }
        Ok(Self {
            chain,
            max_load_factor: self.max_load_factor,
            hasher: self.hasher.clone(),
            eq: self.eq.clone(),
            alloc,
            probe: ProbeFlag::new(),
        })
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        self.chain.check_invariants();
    }
}

impl<K, V, S, E, A> ChainedHashMap<K, V, S, E, A>
where
    S: BuildHasher,
    A: Allocator + Clone,
{
    fn make_hash<Q>(&self, q: &Q) -> u64
    where
        Q: ?Sized + Hash,
    {
        self.hasher.hash_one(q)
    }

    // Runs user hash and equality only; never mutates.
    fn probe<Q>(&self, q: &Q) -> (u64, Option<NodeKey>)
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        let _p = self.probe.enter();
        let hash = self.make_hash(q);
        let bucket = self.chain.bucket_of(hash);
        let hit = self.chain.find_in_run(bucket, |node| {
            node.hash == hash && self.eq.equal(<K as Borrow<Q>>::borrow(&node.entry.key), q)
        });
        (hash, hit)
    }

    /// Inserts `key -> value` unless the key is present. Returns the
    /// position of the entry holding the key and whether it was inserted;
    /// an existing value is never overwritten.
    pub fn emplace(&mut self, key: K, value: V) -> Result<(Position, bool), TableError>
    where
        K: Hash,
        E: KeyEq<K>,
    {
        self.emplace_with(key, || value)
    }

    /// Like `emplace`, but builds the value only when the key is absent.
    pub fn emplace_with<F>(&mut self, key: K, make: F) -> Result<(Position, bool), TableError>
    where
        K: Hash,
        E: KeyEq<K>,
        F: FnOnce() -> V,
    {
        let (hash, hit) = self.probe(&key);
        if let Some(existing) = hit {
            return Ok((Position::at(existing), false));
        }
        let pending = PendingEntry::new(key, make(), hash);
        let node = self.link_pending(pending)?;
        Ok((Position::at(node), true))
    }

    /// `emplace` taking the pair as one value.
    pub fn insert(&mut self, entry: (K, V)) -> Result<(Position, bool), TableError>
    where
        K: Hash,
        E: KeyEq<K>,
    {
        let (key, value) = entry;
        self.emplace(key, value)
    }

    // Every fallible step runs before the node is linked: arena slot,
    // growth anchors, then the entry box.
    fn link_pending(&mut self, pending: PendingEntry<K, V>) -> Result<NodeKey, TableError> {
        self.chain.try_reserve_nodes(1)?;
        let growth = self.growth_for(self.len() + 1, self.max_load_factor)?;
        let (entry, hash) = pending.allocate_in(self.alloc.clone())?;
        let node = self.chain.link(entry, hash);
        if let Some(anchors) = growth {
            self.rethread_into(anchors, Growth::Automatic);
        }
        Ok(node)
    }

    /// Value for `key`, inserting `V::default()` first if absent.
    pub fn get_or_insert_default(&mut self, key: K) -> Result<&mut V, TableError>
    where
        K: Hash,
        E: KeyEq<K>,
        V: Default,
    {
        let (pos, _) = self.emplace_with(key, V::default)?;
        Ok(self
            .value_at_mut(pos)
            .expect("entry must exist right after emplace"))
    }

    pub fn find<Q>(&self, q: &Q) -> Position
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        Position::from_link(self.probe(q).1)
    }

    pub fn contains_key<Q>(&self, q: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        self.probe(q).1.is_some()
    }

    pub fn get<Q>(&self, q: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        self.find(q).value(self)
    }

    pub fn get_mut<Q>(&mut self, q: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        let pos = self.find(q);
        self.value_at_mut(pos)
    }

    /// Value for `key`, or `TableError::NotFound`.
    pub fn at<Q>(&self, q: &Q) -> Result<&V, TableError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        self.get(q).ok_or(TableError::NotFound)
    }

    pub fn at_mut<Q>(&mut self, q: &Q) -> Result<&mut V, TableError>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        self.get_mut(q).ok_or(TableError::NotFound)
    }

    /// Removes `key` and returns its value, if present.
    pub fn remove<Q>(&mut self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash,
        E: KeyEq<Q>,
    {
        let pos = self.find(q);
        if pos.is_end() {
            return None;
        }
        Some(self.erase(pos).1)
    }

    /// Index of the bucket `key` hashes to.
    pub fn bucket<Q>(&self, q: &Q) -> usize
    where
        Q: ?Sized + Hash,
    {
        let _p = self.probe.enter();
        self.chain.bucket_of(self.make_hash(q))
    }
}

impl<K, V, S, E, A> Clone for ChainedHashMap<K, V, S, E, A>
where
    K: Clone,
    V: Clone,
    S: Clone,
    E: Clone,
    A: Allocator + Clone + SelectOnCopy,
{
    fn clone(&self) -> Self {
        or_abort(self.try_clone())
    }
}

impl<K, V, S, E, A> fmt::Debug for ChainedHashMap<K, V, S, E, A>
where
    K: fmt::Debug,
    V: fmt::Debug,
    A: Allocator + Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K, V, S, E, A> PartialEq for ChainedHashMap<K, V, S, E, A>
where
    K: Hash,
    V: PartialEq,
    S: BuildHasher,
    E: KeyEq<K>,
    A: Allocator + Clone,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S, E, A> Extend<(K, V)> for ChainedHashMap<K, V, S, E, A>
where
    K: Hash,
    S: BuildHasher,
    E: KeyEq<K>,
    A: Allocator + Clone,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            or_abort(self.emplace(k, v));
        }
    }
}

impl<K, V, S, E> FromIterator<(K, V)> for ChainedHashMap<K, V, S, E>
where
    K: Hash,
    S: BuildHasher + Default,
    E: KeyEq<K> + Default,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Self::with_buckets_and_hasher(DEFAULT_BUCKET_COUNT, S::default());
        map.extend(iter);
        map
    }
}

impl<'a, K, V, S, E, A: Allocator + Clone> IntoIterator for &'a ChainedHashMap<K, V, S, E, A> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S, E, A: Allocator + Clone> IntoIterator for &'a mut ChainedHashMap<K, V, S, E, A> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, S, E, A: Allocator + Clone> IntoIterator for ChainedHashMap<K, V, S, E, A> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V, A>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter::new(self.chain)
    }
}
