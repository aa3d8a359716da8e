#![cfg(test)]

// Property tests for ChainedHashMap kept inside the crate so they can run
// the chain invariant checker after every operation.

use crate::{ChainedHashMap, DefaultEq, Position};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;
use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{BuildHasher, BuildHasherDefault, Hasher};
use std::rc::Rc;

// Key newtype with Borrow<str> to exercise borrowed lookup.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
struct Key(String);
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
impl std::borrow::Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug)]
enum Op {
    Emplace(usize, i32),
    EmplaceWith(usize, i32),
    Erase(usize),
    Remove(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    Rehash(usize),
    Reserve(usize),
    Iterate,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> Key {
    Key(pool[i].clone())
}

fn arb_scenario() -> impl Strategy<Value = (usize, Vec<String>, Vec<Op>)> {
    let pool = proptest::collection::vec("[a-z]{0,5}", 1..=12);
    (1usize..6, pool).prop_flat_map(|(buckets, pool)| {
        let idx = proptest::sample::select((0..pool.len()).collect::<Vec<_>>());
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Emplace(i, v)),
            2 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::EmplaceWith(i, v)),
            2 => idx.clone().prop_map(Op::Erase),
            1 => idx.clone().prop_map(Op::Remove),
            2 => idx.clone().prop_map(Op::Find),
            1 => prop_oneof![contains_pool, "[a-z]{0,5}"].prop_map(Op::Contains),
            1 => (idx.clone(), any::<i32>()).prop_map(|(i, d)| Op::Mutate(i, d)),
            2 => (any::<bool>(), 0usize..40).prop_map(|(explicit, n)| {
                if explicit { Op::Rehash(n) } else { Op::Reserve(n) }
            }),
            1 => Just(Op::Iterate),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..80).prop_map(move |ops| (buckets, pool.clone(), ops))
    })
}

// State-machine equivalence against std::collections::HashMap.
// Invariants exercised after every operation:
// - the chain is well formed: one run per bucket, anchors precede runs;
// - first writer wins: emplace on a present key keeps the old value;
// - positions of live keys are stable; erased positions never resolve;
// - load factor stays below the maximum after inserts;
// - rehash never shrinks and a no-op rehash keeps the iteration order;
// - iteration yields each live entry exactly once.
fn run_state_machine<S>(
    sut: &mut ChainedHashMap<Key, i32, S, DefaultEq>,
    pool: &[String],
    ops: Vec<Op>,
) -> Result<(), TestCaseError>
where
    S: BuildHasher,
{
    let mut model: HashMap<Key, i32> = HashMap::new();
    let mut live: HashMap<Key, Position> = HashMap::new();
    let mut stale: Vec<Position> = Vec::new();
    let default_calls = Rc::new(Cell::new(0));

    for op in ops {
        match op {
            Op::Emplace(i, v) => {
                let k = key_from(pool, i);
                let (pos, inserted) = sut.emplace(k.clone(), v).unwrap();
                prop_assert_eq!(inserted, !model.contains_key(&k));
                if inserted {
                    model.insert(k.clone(), v);
                    live.insert(k.clone(), pos);
                }
                prop_assert_eq!(Some(&pos), live.get(&k));
                prop_assert_eq!(pos.value(sut), model.get(&k));
                prop_assert!(sut.load_factor() < sut.max_load_factor());
            }
            Op::EmplaceWith(i, v) => {
                let k = key_from(pool, i);
                let already = model.contains_key(&k);
                let counter = default_calls.clone();
                let before = counter.get();
                let (pos, inserted) = sut
                    .emplace_with(k.clone(), move || {
                        counter.set(counter.get() + 1);
                        v
                    })
                    .unwrap();
                prop_assert_eq!(inserted, !already);
                if inserted {
                    prop_assert_eq!(default_calls.get(), before + 1);
                    model.insert(k.clone(), v);
                    live.insert(k.clone(), pos);
                } else {
                    prop_assert_eq!(default_calls.get(), before, "value built for a present key");
                }
                prop_assert_eq!(pos.value(sut), model.get(&k));
            }
            Op::Erase(i) => {
                let k = key_from(pool, i);
                if let Some(pos) = live.remove(&k) {
                    let (kk, vv) = sut.erase(pos);
                    prop_assert!(kk == k);
                    prop_assert_eq!(Some(vv), model.remove(&k));
                    stale.push(pos);
                } else {
                    prop_assert!(sut.find(&k).is_end());
                }
            }
            Op::Remove(i) => {
                let k = key_from(pool, i);
                if let Some(pos) = live.remove(&k) {
                    stale.push(pos);
                }
                prop_assert_eq!(sut.remove(k.0.as_str()), model.remove(&k));
            }
            Op::Find(i) => {
                let k = key_from(pool, i);
                let pos = sut.find(&k);
                prop_assert_eq!(!pos.is_end(), model.contains_key(&k));
                if !pos.is_end() {
                    prop_assert_eq!(Some(&pos), live.get(&k));
                }
            }
            Op::Contains(s) => {
                let has_model = model.keys().any(|k| k.0 == s);
                prop_assert_eq!(sut.contains_key(s.as_str()), has_model);
            }
            Op::Mutate(i, d) => {
                let k = key_from(pool, i);
                if let Some(&pos) = live.get(&k) {
                    let vr = pos.value_mut(sut);
                    prop_assert!(vr.is_some(), "live position should resolve");
                    if let Some(vr) = vr {
                        *vr = vr.saturating_add(d);
                    }
                    if let Some(mv) = model.get_mut(&k) {
                        *mv = mv.saturating_add(d);
                    }
                }
            }
            Op::Rehash(n) => {
                let before_count = sut.bucket_count();
                let before_order: Vec<Key> = sut.keys().cloned().collect();
                sut.rehash(n).unwrap();
                prop_assert_eq!(sut.bucket_count(), before_count.max(n));
                if n <= before_count {
                    let after: Vec<Key> = sut.keys().cloned().collect();
                    prop_assert_eq!(after, before_order);
                }
            }
            Op::Reserve(n) => {
                let before_count = sut.bucket_count();
                sut.reserve(n).unwrap();
                prop_assert!(sut.bucket_count() >= before_count);
                prop_assert!((n as f64) / (sut.bucket_count() as f64) < sut.max_load_factor());
            }
            Op::Iterate => {
                let keys: Vec<Key> = sut.keys().cloned().collect();
                let distinct: BTreeSet<Key> = keys.iter().cloned().collect();
                prop_assert_eq!(keys.len(), distinct.len(), "entry visited twice");
                let m_keys: BTreeSet<Key> = model.keys().cloned().collect();
                prop_assert_eq!(distinct, m_keys);
            }
            Op::Clear => {
                sut.clear();
                model.clear();
                stale.extend(live.drain().map(|(_, p)| p));
            }
        }

        sut.check_invariants();
        for pos in &stale {
            prop_assert!(pos.value(sut).is_none(), "stale position resolved");
        }
        for (k, pos) in &live {
            prop_assert_eq!(pos.key(sut), Some(k));
        }
        prop_assert_eq!(sut.len(), model.len());
        prop_assert_eq!(sut.is_empty(), model.is_empty());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 96, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((buckets, pool, ops) in arb_scenario()) {
        let mut sut: ChainedHashMap<Key, i32> = ChainedHashMap::with_buckets(buckets);
        run_state_machine(&mut sut, &pool, ops)?;
    }
}

// Every key hashes to zero: one bucket run holds everything.
#[derive(Default)]
struct ConstHasher;
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

// Hashes land in a handful of values so runs of several buckets collide
// and interleave in interesting ways under small bucket counts.
#[derive(Default)]
struct FewHasher(u64);
impl Hasher for FewHasher {
    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 = self.0.wrapping_mul(31).wrapping_add(u64::from(*b));
        }
    }
    fn finish(&self) -> u64 {
        self.0 % 7
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((buckets, pool, ops) in arb_scenario()) {
        let mut sut: ChainedHashMap<Key, i32, BuildHasherDefault<ConstHasher>> =
            ChainedHashMap::with_buckets_and_hasher(buckets, Default::default());
        run_state_machine(&mut sut, &pool, ops)?;
    }

    #[test]
    fn prop_state_machine_with_few_hashes((buckets, pool, ops) in arb_scenario()) {
        let mut sut: ChainedHashMap<Key, i32, BuildHasherDefault<FewHasher>> =
            ChainedHashMap::with_buckets_and_hasher(buckets, Default::default());
        run_state_machine(&mut sut, &pool, ops)?;
    }

    // A copy is structurally sound, equal to its source, and independent.
    #[test]
    fn prop_copy_is_independent((buckets, pool, ops) in arb_scenario()) {
        let mut src: ChainedHashMap<Key, i32, BuildHasherDefault<FewHasher>> =
            ChainedHashMap::with_buckets_and_hasher(buckets, Default::default());
        for op in ops {
            if let Op::Emplace(i, v) | Op::EmplaceWith(i, v) = op {
                src.emplace(key_from(&pool, i), v).unwrap();
            }
        }
        let snapshot: Vec<(Key, i32)> = src.iter().map(|(k, v)| (k.clone(), *v)).collect();
        let mut copy = src.clone();
        copy.check_invariants();
        prop_assert!(copy == src);

        for k in pool.iter() {
            copy.remove(k.as_str());
            copy.emplace(Key(format!("{k}!")), 0).unwrap();
        }
        copy.check_invariants();
        let after: Vec<(Key, i32)> = src.iter().map(|(k, v)| (k.clone(), *v)).collect();
        prop_assert_eq!(after, snapshot);
        src.check_invariants();
    }
}
