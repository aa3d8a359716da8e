//! The shared chain: node arena, sentinel head and bucket anchors.
//!
//! Every live entry sits in one singly linked list. Nodes of the same
//! bucket form one contiguous run, and `anchors[i]` names the node right
//! before bucket `i`'s run (or the sentinel head for the first run), so a
//! run can be found and extended in O(1) without a doubly linked list.
//!
//! Nodes live in a `SlotMap`; links and anchors hold generational keys
//! instead of pointers. A removed node's key never resolves again, which
//! is what keeps stale positions harmless.
//!
//! This module is the only place that rewrites links or anchors. It never
//! calls user code: bucket indices are derived from the hash cached in each
//! node.

use crate::anchors::{Anchor, AnchorTable};
use crate::entry::EntryBox;
use allocator_api2::alloc::{Allocator, Global};
use slotmap::SlotMap;
use std::collections::TryReserveError;

slotmap::new_key_type! {
    /// Arena key of a chain node.
    pub(crate) struct NodeKey;
}

pub(crate) struct Node<K, V, A: Allocator = Global> {
    pub(crate) entry: EntryBox<K, V, A>,
    pub(crate) hash: u64,
    next: Option<NodeKey>,
}

impl<K, V, A: Allocator> Node<K, V, A> {
    #[inline]
    pub(crate) fn next(&self) -> Option<NodeKey> {
        self.next
    }
}

pub(crate) struct Chain<K, V, A: Allocator = Global> {
    nodes: SlotMap<NodeKey, Node<K, V, A>>,
    // Sentinel head: only its `next` link is meaningful.
    head: Option<NodeKey>,
    anchors: AnchorTable,
}

#[inline]
pub(crate) fn bucket_index(hash: u64, bucket_count: usize) -> usize {
    (hash % bucket_count as u64) as usize
}

impl<K, V, A: Allocator> Chain<K, V, A> {
    pub(crate) fn with_buckets(bucket_count: usize) -> Result<Self, TryReserveError> {
        Ok(Self {
            nodes: SlotMap::with_key(),
            head: None,
            anchors: AnchorTable::try_new(bucket_count.max(1))?,
        })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub(crate) fn bucket_count(&self) -> usize {
        self.anchors.len()
    }

    #[inline]
    pub(crate) fn bucket_of(&self, hash: u64) -> usize {
        bucket_index(hash, self.anchors.len())
    }

    #[inline]
    pub(crate) fn first(&self) -> Option<NodeKey> {
        self.head
    }

    #[inline]
    pub(crate) fn node(&self, key: NodeKey) -> Option<&Node<K, V, A>> {
        self.nodes.get(key)
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node<K, V, A>> {
        self.nodes.get_mut(key)
    }

    #[inline]
    fn next_of(&self, anchor: Anchor) -> Option<NodeKey> {
        match anchor {
            Anchor::Head => self.head,
            Anchor::After(k) => self.nodes[k].next,
        }
    }

    #[inline]
    fn set_next(&mut self, anchor: Anchor, link: Option<NodeKey>) {
        match anchor {
            Anchor::Head => self.head = link,
            Anchor::After(k) => self.nodes[k].next = link,
        }
    }

    /// Walks bucket `bucket`'s run and returns the first node for which
    /// `hit` holds. `hit` sees the cached hash and the node.
    pub(crate) fn find_in_run<F>(&self, bucket: usize, mut hit: F) -> Option<NodeKey>
    where
        F: FnMut(&Node<K, V, A>) -> bool,
    {
        let mut cursor = self.next_of(self.anchors.get(bucket)?);
        while let Some(k) = cursor {
            let node = &self.nodes[k];
            if self.bucket_of(node.hash) != bucket {
                return None;
            }
            if hit(node) {
                return Some(k);
            }
            cursor = node.next;
        }
        None
    }

    pub(crate) fn run_len(&self, bucket: usize) -> usize {
        let mut n = 0;
        self.find_in_run(bucket, |_| {
            n += 1;
            false
        });
        n
    }

    /// Makes room in the arena for `additional` more nodes. The chain itself
    /// is not touched, so a failure leaves nothing to undo.
    pub(crate) fn try_reserve_nodes(&mut self, additional: usize) -> Result<(), TryReserveError> {
        self.nodes.try_reserve(additional)
    }

    /// Adds a new node at the front of its bucket's run.
    pub(crate) fn link(&mut self, entry: EntryBox<K, V, A>, hash: u64) -> NodeKey {
        let key = self.nodes.insert(Node {
            entry,
            hash,
            next: None,
        });
        self.thread(key);
        key
    }

    // Splices an unlinked node in front of its bucket's run. An empty
    // bucket gets a fresh run at the very front of the list; the run that
    // used to be first is then preceded by the new node.
    fn thread(&mut self, key: NodeKey) {
        let bucket = self.bucket_of(self.nodes[key].hash);
        let anchor = match self.anchors.get(bucket) {
            Some(anchor) => anchor,
            None => {
                if let Some(first) = self.head {
                    let displaced = self.bucket_of(self.nodes[first].hash);
                    self.anchors.set(displaced, Anchor::After(key));
                }
                self.anchors.set(bucket, Anchor::Head);
                Anchor::Head
            }
        };
        let run_first = self.next_of(anchor);
        self.nodes[key].next = run_first;
        self.set_next(anchor, Some(key));
    }

    /// Removes `key` from the chain and the arena.
    ///
    /// Panics if `key` is not live.
    pub(crate) fn unlink(&mut self, key: NodeKey) -> Node<K, V, A> {
        let node = self
            .nodes
            .get(key)
            .expect("unlink of a node that is not in the table");
        let bucket = self.bucket_of(node.hash);
        let next = node.next;
        let run_anchor = self
            .anchors
            .get(bucket)
            .expect("occupied bucket without an anchor");

        let mut pred = run_anchor;
        loop {
            match self.next_of(pred) {
                Some(k) if k == key => break,
                Some(k) => pred = Anchor::After(k),
                None => panic!("node missing from its bucket run"),
            }
        }
        self.set_next(pred, next);

        let next_bucket = next.map(|k| self.bucket_of(self.nodes[k].hash));
        match next_bucket {
            // The following run was anchored at the removed node.
            Some(b) if b != bucket => {
                self.anchors.set(b, pred);
                if pred == run_anchor {
                    self.anchors.clear(bucket);
                }
            }
            Some(_) => {}
            None => {
                if pred == run_anchor {
                    self.anchors.clear(bucket);
                }
            }
        }

        self.nodes
            .remove(key)
            .expect("node checked live at the start of unlink")
    }

    /// Re-threads every node against `anchors`, which must be empty.
    /// Entries and nodes are relinked, never rebuilt.
    pub(crate) fn rethread(&mut self, anchors: AnchorTable) {
        debug_assert_eq!(anchors.occupied().count(), 0);
        let mut cursor = self.head.take();
        self.anchors = anchors;
        while let Some(k) = cursor {
            cursor = self.nodes[k].next.take();
            self.thread(k);
        }
    }

    pub(crate) fn clear(&mut self) {
        self.head = None;
        self.anchors.clear_all();
        self.nodes.clear();
    }

    /// Node keys in chain order.
    pub(crate) fn order(&self) -> Vec<NodeKey> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(k) = cursor {
            out.push(k);
            cursor = self.nodes[k].next;
        }
        out
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut SlotMap<NodeKey, Node<K, V, A>> {
        &mut self.nodes
    }

    pub(crate) fn into_nodes(self) -> (SlotMap<NodeKey, Node<K, V, A>>, Option<NodeKey>) {
        (self.nodes, self.head)
    }

    /// Checks every structural invariant; panics with a description of the
    /// first violation.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let count = self.bucket_count();
        let mut seen = std::collections::HashSet::new();
        let mut finished = std::collections::HashSet::new();
        let mut current: Option<usize> = None;
        let mut pred = Anchor::Head;
        let mut cursor = self.head;
        while let Some(k) = cursor {
            assert!(seen.insert(k), "node reached twice");
            let node = self.nodes.get(k).expect("link to a dead node");
            let bucket = bucket_index(node.hash, count);
            if current != Some(bucket) {
                assert!(
                    finished.insert(bucket),
                    "bucket {bucket} has more than one run"
                );
                assert_eq!(
                    self.anchors.get(bucket),
                    Some(pred),
                    "bucket {bucket} anchor does not precede its run"
                );
                current = Some(bucket);
            }
            pred = Anchor::After(k);
            cursor = node.next;
        }
        assert_eq!(seen.len(), self.nodes.len(), "unreachable nodes");
        for (bucket, _) in self.anchors.occupied() {
            assert!(finished.contains(&bucket), "anchor set on empty bucket {bucket}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PendingEntry;

    fn chain(buckets: usize) -> Chain<u64, u64> {
        Chain::with_buckets(buckets).unwrap()
    }

    fn push(c: &mut Chain<u64, u64>, k: u64) -> NodeKey {
        let (entry, hash) = PendingEntry::new(k, k * 10, k).allocate_in(Global).unwrap();
        let key = c.link(entry, hash);
        c.check_invariants();
        key
    }

    fn keys(c: &Chain<u64, u64>) -> Vec<u64> {
        c.order().into_iter().map(|k| c.nodes[k].entry.key).collect()
    }

    #[test]
    fn new_runs_go_to_the_front() {
        let mut c = chain(4);
        push(&mut c, 1);
        push(&mut c, 2);
        push(&mut c, 5);
        assert_eq!(keys(&c), vec![2, 5, 1]);
        assert_eq!(c.anchors.get(2), Some(Anchor::Head));
        assert_eq!(c.run_len(1), 2);
        assert_eq!(c.run_len(2), 1);
        assert_eq!(c.run_len(3), 0);
    }

    #[test]
    fn zero_buckets_clamped() {
        assert_eq!(chain(0).bucket_count(), 1);
    }

    #[test]
    fn unlink_run_tail_repoints_following_anchor() {
        let mut c = chain(4);
        let one = push(&mut c, 1);
        push(&mut c, 2);
        // order: 2, 1 ; anchor[1] = After(node 2)
        let two = c.first().unwrap();
        let removed = c.unlink(two);
        assert_eq!(removed.entry.key, 2);
        c.check_invariants();
        assert_eq!(c.anchors.get(1), Some(Anchor::Head));
        assert_eq!(c.first(), Some(one));
    }

    #[test]
    fn unlink_middle_and_last() {
        let mut c = chain(4);
        let a = push(&mut c, 1);
        let b = push(&mut c, 5);
        let d = push(&mut c, 9);
        push(&mut c, 2);
        c.unlink(b);
        c.check_invariants();
        c.unlink(a);
        c.check_invariants();
        c.unlink(d);
        c.check_invariants();
        assert_eq!(keys(&c), vec![2]);
        assert!(c.anchors.get(1).is_none());
    }

    #[test]
    fn rethread_keeps_nodes() {
        let mut c = chain(2);
        let ks: Vec<_> = (0..16).map(|k| push(&mut c, k)).collect();
        c.rethread(AnchorTable::try_new(7).unwrap());
        c.check_invariants();
        assert_eq!(c.bucket_count(), 7);
        assert_eq!(c.len(), 16);
        for (i, k) in ks.iter().enumerate() {
            assert_eq!(c.node(*k).unwrap().entry.key, i as u64);
        }
    }

    #[test]
    fn oversized_node_reservation_fails_cleanly() {
        let mut c = chain(4);
        for k in 0..3 {
            push(&mut c, k);
        }
        let before = keys(&c);
        assert!(c.try_reserve_nodes(usize::MAX / 2).is_err());
        c.check_invariants();
        assert_eq!(keys(&c), before);
        c.try_reserve_nodes(8).unwrap();
        push(&mut c, 3);
        assert_eq!(c.len(), 4);
    }

    #[test]
    fn clear_resets_anchors() {
        let mut c = chain(3);
        for k in 0..6 {
            push(&mut c, k);
        }
        c.clear();
        c.check_invariants();
        assert_eq!(c.len(), 0);
        assert!(c.first().is_none());
        push(&mut c, 4);
    }
}
