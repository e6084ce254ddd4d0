//! LockMap - A lock-protected HashMap with a rich operation surface
//!
//! A `LockMap` wraps a `HashMap` behind a single reader/writer lock. Any
//! number of readers may proceed in parallel, writers are exclusive, and
//! every operation takes `&self` and performs its own locking, so the map
//! can be shared freely between threads.
//!
//! This is the opposite trade-off to a concurrently readable or lock-free
//! structure. There are no transactions and no versioning, a writer blocks
//! all readers for the duration of its critical section. In exchange the
//! structure is small, predictable, and offers operations a bare
//! `RwLock<HashMap>` makes awkward: batched inserts, compute-on-miss,
//! predicate removal, aggregation, and snapshot-based iteration that is
//! safe against reentrant callbacks.
//!
//! Operations that accept caller-supplied functions come in two flavours.
//! The locked flavour ([`for_each`](LockMapRaw::for_each),
//! [`for_each_until`](LockMapRaw::for_each_until),
//! [`any_match`](LockMapRaw::any_match), [`all_match`](LockMapRaw::all_match)
//! and the aggregations) holds the read lock across the whole traversal and
//! copies nothing, so the callback must never call back into the same map.
//! The snapshot flavour ([`for_each_safe`](LockMapRaw::for_each_safe),
//! [`remove_if`](LockMapRaw::remove_if),
//! [`remove_unless`](LockMapRaw::remove_unless),
//! [`clear_and`](LockMapRaw::clear_and) and
//! [`get_or_insert_with`](LockMapRaw::get_or_insert_with)) materialises the
//! entries first and runs the callback with no lock held, so the callback
//! may freely read or mutate the map. The price is an O(n) copy and that
//! the callback's view may be slightly stale relative to concurrent
//! writers. That staleness is part of the contract, not a defect.
//!
//! # Examples
//! ```
//! use lmap::LockMap;
//!
//! let map: LockMap<&str, i64> = LockMap::new();
//! map.insert("a", 1);
//! map.insert_all(vec![("b", 2), ("c", 3)]);
//!
//! assert_eq!(map.len(), 3);
//! assert_eq!(map.get("a"), Some(1));
//! assert_eq!(map.sum_of(|_k, v| *v), 6);
//!
//! map.remove_if(|_k, v| *v < 2);
//! assert!(!map.contains_key("a"));
//! ```

#[cfg(feature = "asynch")]
pub mod asynch;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::iter::{FromIterator, Sum};

use lock_api::{RawRwLock, RwLock};
use tracing::trace;

use crate::error::Error;

#[cfg(feature = "foldhash")]
use foldhash::fast::RandomState;

#[cfg(all(feature = "ahash", not(feature = "foldhash")))]
use ahash::RandomState;

#[cfg(not(any(feature = "ahash", feature = "foldhash")))]
use std::collections::hash_map::RandomState;

#[cfg(feature = "serde")]
use core::marker::PhantomData;
#[cfg(feature = "serde")]
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
#[cfg(feature = "serde")]
use serde::{Serialize, Serializer};

pub(crate) type Inner<K, V> = HashMap<K, V, RandomState>;

/// An owned key/value pair.
///
/// This is the exchange format for the bulk read and bulk construction
/// interfaces. Entries are materialised on demand from the backing storage
/// and are yours to keep, mutating one has no effect on the map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry<K, V> {
    /// The key this entry was stored under at snapshot time.
    pub key: K,
    /// The value associated with the key at snapshot time.
    pub value: V,
}

impl<K, V> Entry<K, V> {
    /// Pair a key with a value.
    pub fn new(key: K, value: V) -> Self {
        Entry { key, value }
    }
}

impl<K, V> From<(K, V)> for Entry<K, V> {
    fn from((key, value): (K, V)) -> Self {
        Entry { key, value }
    }
}

/// A lock-protected map generic over its raw lock type.
///
/// You nearly always want the [`LockMap`] alias, which pins the raw lock
/// to `parking_lot::RawRwLock`. The generic exists so the lock can be
/// substituted where a different blocking behaviour is needed.
///
/// The lock is released on every exit path out of a critical section,
/// including panics from caller-supplied functions: all access goes
/// through guards, and the default raw lock does not poison, so a panic
/// in one thread never wedges the map for the others.
pub struct LockMapRaw<K, V, M: RawRwLock> {
    inner: RwLock<M, Inner<K, V>>,
}

/// A lock-protected map with the default raw lock type provided.
pub type LockMap<K, V> = LockMapRaw<K, V, parking_lot::RawRwLock>;

impl<K, V, M: RawRwLock> LockMapRaw<K, V, M> {
    /// Construct a new empty map.
    pub fn new() -> Self {
        LockMapRaw {
            inner: RwLock::new(HashMap::with_hasher(RandomState::default())),
        }
    }

    /// Construct a new empty map with storage pre-sized for at least
    /// `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        LockMapRaw {
            inner: RwLock::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    /// returns the current number of k:v pairs in the map
    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.len()
    }

    /// Determine if the map is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V, M: RawRwLock> Default for LockMapRaw<K, V, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, M> LockMapRaw<K, V, M>
where
    K: Hash + Eq + Clone,
    V: Clone,
    M: RawRwLock,
{
    /// Construct a map pre-populated from a sequence of entries. Entries
    /// are applied in order, so a later duplicate key overwrites an
    /// earlier one.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = Entry<K, V>>,
    {
        entries.into_iter().map(|e| (e.key, e.value)).collect()
    }

    /// Construct a map by zipping a key sequence with a value sequence by
    /// index. The sequences must have equal length, a mismatch is
    /// reported as [`Error::LengthMismatch`] rather than truncating to
    /// the shorter side.
    pub fn from_keys_values(keys: Vec<K>, values: Vec<V>) -> Result<Self, Error> {
        if keys.len() != values.len() {
            return Err(Error::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        Ok(keys.into_iter().zip(values).collect())
    }

    /// Insert or update a value by key. If the key was already present
    /// the previous value is returned as `Some(V)`.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let mut inner = self.inner.write();
        inner.insert(key, value)
    }

    /// Insert or update all the provided pairs as one critical section.
    ///
    /// The iterator is drained *before* the lock is taken, so an iterator
    /// that calls back into this map can not deadlock. Once the lock is
    /// held, no other operation interleaves between the individual
    /// inserts of the batch.
    pub fn insert_all<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let pairs: Vec<(K, V)> = pairs.into_iter().collect();
        trace!(count = pairs.len(), "insert_all");
        let mut inner = self.inner.write();
        for (k, v) in pairs {
            inner.insert(k, v);
        }
    }

    /// Assert if a key exists in the map.
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read();
        inner.contains_key(k)
    }

    /// Retrieve a value from the map. If the key exists an owned copy of
    /// the value is returned as `Some(V)`, otherwise `None`. The copy is
    /// detached from the map, it never aliases the backing storage.
    pub fn get<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read();
        inner.get(k).cloned()
    }

    /// Retrieve a value from the map, or `default` if the key is absent.
    pub fn get_or_default<Q>(&self, k: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read();
        inner.get(k).cloned().unwrap_or(default)
    }

    /// Retrieve a value from the map, computing and inserting it if the
    /// key is absent.
    ///
    /// The compute function runs with *no* lock held, so it may call back
    /// into this map, including mutating it. The cost of that freedom is
    /// that the probe and the insert are separate critical sections: two
    /// threads racing on the same absent key may both compute, and the
    /// last insert wins. There is no exactly-once guarantee. When `f`
    /// must run at most once per key, serialise the callers externally.
    pub fn get_or_insert_with<F>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> V,
    {
        {
            let inner = self.inner.read();
            if let Some(v) = inner.get(&key) {
                return v.clone();
            }
        }
        // Read lock dropped before the compute fn runs.
        let value = f();
        let mut inner = self.inner.write();
        inner.insert(key, value.clone());
        value
    }

    /// Remove a key from the map, returning the value that was present as
    /// `Some(V)`. Removing an absent key is a no-op reported as `None`,
    /// never an error.
    pub fn remove<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.write();
        inner.remove(k)
    }

    /// Remove every entry for which the predicate returns true. Returns
    /// the number of entries removed.
    ///
    /// The predicate is evaluated against a point-in-time snapshot with
    /// no lock held, so it may call back into this map. Entries inserted
    /// by other threads after the snapshot are not considered, even if
    /// the predicate would match them, and an entry the predicate matched
    /// is deleted by key even if its value changed in the meantime.
    pub fn remove_if<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<K> = self
            .entries()
            .into_iter()
            .filter(|e| pred(&e.key, &e.value))
            .map(|e| e.key)
            .collect();
        self.remove_keys(&doomed)
    }

    /// Remove every entry for which the predicate returns false. Returns
    /// the number of entries removed. The snapshot semantics are those of
    /// [`remove_if`](Self::remove_if).
    pub fn remove_unless<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.remove_if(|k, v| !pred(k, v))
    }

    /// Remove all keys and values from the map.
    ///
    /// Like the other bulk operations this snapshots the key set first
    /// and then deletes those keys under the write lock. Only keys
    /// present at snapshot time are guaranteed removed, a key inserted
    /// concurrently with the clear may survive it.
    pub fn clear(&self) {
        let keys = self.keys();
        self.remove_keys(&keys);
    }

    /// Remove all entries from the map, running the provided action on
    /// each removed entry.
    ///
    /// The action runs against the snapshot with no lock held, before the
    /// deletions are applied, so it may call back into this map. The
    /// snapshot caveats of [`clear`](Self::clear) apply.
    pub fn clear_and<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        let entries = self.entries();
        for e in &entries {
            action(&e.key, &e.value);
        }
        let mut inner = self.inner.write();
        for e in &entries {
            inner.remove(&e.key);
        }
    }

    // Apply a batch of snapshot deletions as one critical section.
    fn remove_keys(&self, keys: &[K]) -> usize {
        let mut inner = self.inner.write();
        let removed = keys.iter().filter_map(|k| inner.remove(k)).count();
        trace!(removed, "applied snapshot removals");
        removed
    }

    /// Run the action over every entry while holding the read lock.
    ///
    /// This is the zero-copy traversal. The action MUST NOT call back
    /// into any operation on this map: the read lock is held for the
    /// entire traversal, so a write acquisition from within the action
    /// blocks forever behind it. Use
    /// [`for_each_safe`](Self::for_each_safe) for actions that mutate
    /// the map.
    pub fn for_each<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        let inner = self.inner.read();
        for (k, v) in inner.iter() {
            action(k, v);
        }
    }

    /// Run the action over a snapshot of every entry with no lock held.
    ///
    /// Safe for actions that call back into this map, at the cost of an
    /// O(n) copy. Each entry present at snapshot time is visited exactly
    /// once, entries inserted afterwards are not visited.
    pub fn for_each_safe<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        for e in self.entries().iter() {
            action(&e.key, &e.value);
        }
    }

    /// Run the action over entries while holding the read lock, stopping
    /// at the first entry for which it returns true.
    ///
    /// Iteration order is unspecified, so which entries are visited
    /// before the stopping entry is too. The callback restriction of
    /// [`for_each`](Self::for_each) applies.
    pub fn for_each_until<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let inner = self.inner.read();
        for (k, v) in inner.iter() {
            if action(k, v) {
                break;
            }
        }
    }

    /// Assert if any entry satisfies the predicate. Short-circuits on the
    /// first match. The callback restriction of
    /// [`for_each`](Self::for_each) applies.
    pub fn any_match<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        let inner = self.inner.read();
        inner.iter().any(|(k, v)| pred(k, v))
    }

    /// Assert if every entry satisfies the predicate. Short-circuits on
    /// the first miss, and is vacuously true for an empty map. The
    /// callback restriction of [`for_each`](Self::for_each) applies.
    pub fn all_match<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        let inner = self.inner.read();
        inner.iter().all(|(k, v)| pred(k, v))
    }

    /// Fold the map to a sum in one scan under the read lock, applying
    /// `f` to every entry. The callback restriction of
    /// [`for_each`](Self::for_each) applies.
    pub fn sum_of<T, F>(&self, mut f: F) -> T
    where
        T: Sum<T>,
        F: FnMut(&K, &V) -> T,
    {
        let inner = self.inner.read();
        inner.iter().map(|(k, v)| f(k, v)).sum()
    }

    /// Find the largest value produced by applying `f` to every entry,
    /// or `None` if the map is empty. The callback restriction of
    /// [`for_each`](Self::for_each) applies.
    pub fn max_of<T, F>(&self, mut f: F) -> Option<T>
    where
        T: Ord,
        F: FnMut(&K, &V) -> T,
    {
        let inner = self.inner.read();
        inner.iter().map(|(k, v)| f(k, v)).max()
    }

    /// Find the smallest value produced by applying `f` to every entry,
    /// or `None` if the map is empty. The callback restriction of
    /// [`for_each`](Self::for_each) applies.
    pub fn min_of<T, F>(&self, mut f: F) -> Option<T>
    where
        T: Ord,
        F: FnMut(&K, &V) -> T,
    {
        let inner = self.inner.read();
        inner.iter().map(|(k, v)| f(k, v)).min()
    }

    /// Copy out all the keys currently in the map. The order is
    /// unspecified and may differ between calls.
    pub fn keys(&self) -> Vec<K> {
        let inner = self.inner.read();
        inner.keys().cloned().collect()
    }

    /// Copy out all the values currently in the map. The order is
    /// unspecified and may differ between calls.
    pub fn values(&self) -> Vec<V> {
        let inner = self.inner.read();
        inner.values().cloned().collect()
    }

    /// Copy out all the entries currently in the map as a point-in-time
    /// snapshot. The entries are owned copies, detached from the backing
    /// storage. The order is unspecified and may differ between calls.
    pub fn entries(&self) -> Vec<Entry<K, V>> {
        let inner = self.inner.read();
        inner
            .iter()
            .map(|(k, v)| Entry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }
}

impl<K, V, M> FromIterator<(K, V)> for LockMapRaw<K, V, M>
where
    K: Hash + Eq + Clone,
    V: Clone,
    M: RawRwLock,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::new();
        map.insert_all(iter);
        map
    }
}

impl<K, V, M> FromIterator<Entry<K, V>> for LockMapRaw<K, V, M>
where
    K: Hash + Eq + Clone,
    V: Clone,
    M: RawRwLock,
{
    fn from_iter<I: IntoIterator<Item = Entry<K, V>>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<K, V, M> fmt::Debug for LockMapRaw<K, V, M>
where
    K: fmt::Debug,
    V: fmt::Debug,
    M: RawRwLock,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Some(guard) => f.debug_map().entries(guard.iter()).finish(),
            None => f.write_str("LockMap { <locked> }"),
        }
    }
}

#[cfg(feature = "serde")]
impl<K, V, M> Serialize for LockMapRaw<K, V, M>
where
    K: Serialize,
    V: Serialize,
    M: RawRwLock,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let inner = self.inner.read();
        serializer.collect_map(inner.iter())
    }
}

#[cfg(feature = "serde")]
struct LockMapVisitor<K, V, M: RawRwLock> {
    marker: PhantomData<LockMapRaw<K, V, M>>,
}

#[cfg(feature = "serde")]
impl<'de, K, V, M> Visitor<'de> for LockMapVisitor<K, V, M>
where
    K: Deserialize<'de> + Hash + Eq + Clone,
    V: Deserialize<'de> + Clone,
    M: RawRwLock,
{
    type Value = LockMapRaw<K, V, M>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map")
    }

    fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: MapAccess<'de>,
    {
        std::iter::from_fn(|| access.next_entry().transpose()).collect()
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, M> Deserialize<'de> for LockMapRaw<K, V, M>
where
    K: Deserialize<'de> + Hash + Eq + Clone,
    V: Deserialize<'de> + Clone,
    M: RawRwLock,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(LockMapVisitor {
            marker: PhantomData,
        })
    }
}
