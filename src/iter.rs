//! Positions and iterators over a `ChainedHashMap`.
//!
//! Iteration follows the shared chain: entries of one bucket come out
//! together, but neither insertion order nor bucket-number order is kept.

use crate::chain::{Chain, Node, NodeKey};
use crate::entry::into_parts;
use crate::map::ChainedHashMap;
use allocator_api2::alloc::{Allocator, Global};
use core::iter::FusedIterator;
use slotmap::{SecondaryMap, SlotMap};

/// A forward position in the chain, or the end position.
///
/// Positions are plain handles and do not borrow the map. Erasing the entry
/// a position names makes it stale: it then resolves to nothing and never
/// aliases a later entry. Erasing other entries leaves it valid. After a
/// rehash a position still names the same entry, but the entries that
/// follow it in the chain are different.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct Position(Option<NodeKey>);

impl Position {
    #[inline]
    pub(crate) fn at(node: NodeKey) -> Self {
        Position(Some(node))
    }

    #[inline]
    pub(crate) fn from_link(link: Option<NodeKey>) -> Self {
        Position(link)
    }

    #[inline]
    pub(crate) fn node(self) -> Option<NodeKey> {
        self.0
    }

    /// The past-the-end position.
    #[inline]
    pub const fn end() -> Self {
        Position(None)
    }

    #[inline]
    pub fn is_end(&self) -> bool {
        self.0.is_none()
    }

    pub fn key<'a, K, V, S, E, A>(&self, map: &'a ChainedHashMap<K, V, S, E, A>) -> Option<&'a K>
    where
        A: Allocator + Clone,
    {
        map.entry_at(*self).map(|(k, _)| k)
    }

    pub fn value<'a, K, V, S, E, A>(&self, map: &'a ChainedHashMap<K, V, S, E, A>) -> Option<&'a V>
    where
        A: Allocator + Clone,
    {
        map.entry_at(*self).map(|(_, v)| v)
    }

    pub fn value_mut<'a, K, V, S, E, A>(
        &self,
        map: &'a mut ChainedHashMap<K, V, S, E, A>,
    ) -> Option<&'a mut V>
    where
        A: Allocator + Clone,
    {
        map.value_at_mut(*self)
    }
}

/// Iterator over `(&K, &V)` in chain order.
pub struct Iter<'a, K, V, A: Allocator = Global> {
    chain: &'a Chain<K, V, A>,
    cursor: Option<NodeKey>,
    remaining: usize,
}

impl<'a, K, V, A: Allocator> Iter<'a, K, V, A> {
    pub(crate) fn new(chain: &'a Chain<K, V, A>) -> Self {
        Self {
            chain,
            cursor: chain.first(),
            remaining: chain.len(),
        }
    }
}

impl<K, V, A: Allocator> Clone for Iter<'_, K, V, A> {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain,
            cursor: self.cursor,
            remaining: self.remaining,
        }
    }
}

impl<'a, K, V, A: Allocator> Iterator for Iter<'a, K, V, A> {
    type Item = (&'a K, &'a V);

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        let node = self.chain.node(self.cursor?)?;
        self.cursor = node.next();
        self.remaining -= 1;
        Some((&node.entry.key, &node.entry.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for Iter<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Iter<'_, K, V, A> {}

/// Iterator over `(&K, &mut V)` in chain order.
///
/// Creating one costs O(len): the chain order and a table of disjoint node
/// borrows are collected up front, on the global allocator, and that
/// allocation is not fallible.
pub struct IterMut<'a, K, V, A: Allocator = Global> {
    order: std::vec::IntoIter<NodeKey>,
    nodes: SecondaryMap<NodeKey, &'a mut Node<K, V, A>>,
}

impl<'a, K, V, A: Allocator> IterMut<'a, K, V, A> {
    pub(crate) fn new(chain: &'a mut Chain<K, V, A>) -> Self {
        let order = chain.order().into_iter();
        let nodes = chain.nodes_mut().iter_mut().collect();
        Self { order, nodes }
    }
}

impl<'a, K, V, A: Allocator> Iterator for IterMut<'a, K, V, A> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        let key = self.order.next()?;
        let node: &'a mut Node<K, V, A> = self.nodes.remove(key)?;
        let entry = &mut *node.entry;
        Some((&entry.key, &mut entry.value))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for IterMut<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for IterMut<'_, K, V, A> {}

/// Owning iterator over `(K, V)` in chain order.
pub struct IntoIter<K, V, A: Allocator = Global> {
    nodes: SlotMap<NodeKey, Node<K, V, A>>,
    cursor: Option<NodeKey>,
}

impl<K, V, A: Allocator> IntoIter<K, V, A> {
    pub(crate) fn new(chain: Chain<K, V, A>) -> Self {
        let (nodes, cursor) = chain.into_nodes();
        Self { nodes, cursor }
    }
}

impl<K, V, A: Allocator> Iterator for IntoIter<K, V, A> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.nodes.remove(self.cursor?)?;
        self.cursor = node.next();
        Some(into_parts(node.entry))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.nodes.len(), Some(self.nodes.len()))
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for IntoIter<K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for IntoIter<K, V, A> {}

/// Iterator over keys in chain order.
pub struct Keys<'a, K, V, A: Allocator = Global> {
    pub(crate) inner: Iter<'a, K, V, A>,
}

impl<'a, K, V, A: Allocator> Iterator for Keys<'a, K, V, A> {
    type Item = &'a K;

    #[inline]
    fn next(&mut self) -> Option<&'a K> {
        self.inner.next().map(|(k, _)| k)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// Iterator over values in chain order.
pub struct Values<'a, K, V, A: Allocator = Global> {
    pub(crate) inner: Iter<'a, K, V, A>,
}

impl<'a, K, V, A: Allocator> Iterator for Values<'a, K, V, A> {
    type Item = &'a V;

    #[inline]
    fn next(&mut self) -> Option<&'a V> {
        self.inner.next().map(|(_, v)| v)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V, A: Allocator> Clone for Keys<'_, K, V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, A: Allocator> Clone for Values<'_, K, V, A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, A: Allocator> ExactSizeIterator for Keys<'_, K, V, A> {}
impl<K, V, A: Allocator> ExactSizeIterator for Values<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Keys<'_, K, V, A> {}
impl<K, V, A: Allocator> FusedIterator for Values<'_, K, V, A> {}
