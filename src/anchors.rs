//! Bucket anchor table: bucket index -> predecessor of the bucket's run.
//!
//! Passive storage only. Which anchor points where is decided in `chain`.

use crate::chain::NodeKey;
use std::collections::TryReserveError;

/// The node a bucket's run is spliced after.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum Anchor {
    /// The sentinel head; the run is the first in the list.
    Head,
    /// A live node whose `next` is the run's first node.
    After(NodeKey),
}

#[derive(Clone, Debug)]
pub(crate) struct AnchorTable {
    slots: Vec<Option<Anchor>>,
}

impl AnchorTable {
    /// All-empty table with `len` buckets. Fails instead of aborting when
    /// the slots cannot be allocated.
    pub(crate) fn try_new(len: usize) -> Result<Self, TryReserveError> {
        let mut slots = Vec::new();
        slots.try_reserve_exact(len)?;
        slots.resize(len, None);
        Ok(Self { slots })
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub(crate) fn get(&self, bucket: usize) -> Option<Anchor> {
        self.slots[bucket]
    }

    #[inline]
    pub(crate) fn set(&mut self, bucket: usize, anchor: Anchor) {
        self.slots[bucket] = Some(anchor);
    }

    #[inline]
    pub(crate) fn clear(&mut self, bucket: usize) {
        self.slots[bucket] = None;
    }

    pub(crate) fn clear_all(&mut self) {
        self.slots.fill(None);
    }

    /// Buckets with a set anchor, i.e. occupied buckets.
    pub(crate) fn occupied(&self) -> impl Iterator<Item = (usize, Anchor)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, a)| a.map(|a| (i, a)))
    }
}
