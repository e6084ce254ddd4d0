//! Async LockMap - A lock-protected HashMap for async contexts
//!
//! This is the `tokio::sync::RwLock` backed variant of the sync
//! [`LockMap`](super::LockMap). The operation surface and the snapshot
//! semantics are identical, but lock acquisition suspends the task
//! instead of blocking the thread. See the [`lockmap`](crate::lockmap)
//! module docs for the locking and snapshot contract.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::iter::{FromIterator, Sum};

use tokio::sync::RwLock;
use tracing::trace;

use super::{Entry, Inner, RandomState};
use crate::error::Error;

/// A lock-protected async map.
///
/// Behaves as the sync [`LockMap`](super::LockMap), with every operation
/// `async`. Waiting on the lock yields to the executor rather than
/// blocking the thread, and the write lock is never held across an await
/// of caller code.
pub struct LockMap<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K, V> Default for LockMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LockMap<K, V> {
    /// Construct a new empty map.
    pub fn new() -> Self {
        LockMap {
            inner: RwLock::new(HashMap::with_hasher(RandomState::default())),
        }
    }

    /// Construct a new empty map with storage pre-sized for at least
    /// `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Self {
        LockMap {
            inner: RwLock::new(HashMap::with_capacity_and_hasher(
                capacity,
                RandomState::default(),
            )),
        }
    }

    /// returns the current number of k:v pairs in the map
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.len()
    }

    /// Determine if the map is currently empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> LockMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
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
    /// index. A length mismatch is reported as
    /// [`Error::LengthMismatch`].
    pub fn from_keys_values(keys: Vec<K>, values: Vec<V>) -> Result<Self, Error> {
        if keys.len() != values.len() {
            return Err(Error::LengthMismatch {
                keys: keys.len(),
                values: values.len(),
            });
        }
        Ok(keys.into_iter().zip(values).collect())
    }

    /// Insert or update a value by key, returning the previous value if
    /// the key was already present.
    pub async fn insert(&self, key: K, value: V) -> Option<V> {
        let mut inner = self.inner.write().await;
        inner.insert(key, value)
    }

    /// Insert or update all the provided pairs as one critical section.
    /// The iterator is drained before the lock is taken.
    pub async fn insert_all<I>(&self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let pairs: Vec<(K, V)> = pairs.into_iter().collect();
        trace!(count = pairs.len(), "insert_all");
        let mut inner = self.inner.write().await;
        for (k, v) in pairs {
            inner.insert(k, v);
        }
    }

    /// Assert if a key exists in the map.
    pub async fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read().await;
        inner.contains_key(k)
    }

    /// Retrieve an owned copy of the value for a key, or `None` if the
    /// key is absent.
    pub async fn get<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read().await;
        inner.get(k).cloned()
    }

    /// Retrieve a value from the map, or `default` if the key is absent.
    pub async fn get_or_default<Q>(&self, k: &Q, default: V) -> V
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let inner = self.inner.read().await;
        inner.get(k).cloned().unwrap_or(default)
    }

    /// Retrieve a value from the map, computing and inserting it if the
    /// key is absent.
    ///
    /// The compute future is awaited with *no* lock held, so it may call
    /// back into this map and other tasks are never blocked behind it.
    /// As in the sync variant, two tasks racing on the same absent key
    /// may both compute, and the last insert wins.
    pub async fn get_or_insert_with<F, Fut>(&self, key: K, f: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        {
            let inner = self.inner.read().await;
            if let Some(v) = inner.get(&key) {
                return v.clone();
            }
        }
        // Read lock dropped before the compute future is awaited.
        let value = f().await;
        let mut inner = self.inner.write().await;
        inner.insert(key, value.clone());
        value
    }

    /// Remove a key from the map, returning the value that was present.
    /// Removing an absent key is a no-op reported as `None`.
    pub async fn remove<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.write().await;
        inner.remove(k)
    }

    /// Remove every entry for which the predicate returns true, against
    /// a point-in-time snapshot evaluated with no lock held. Returns the
    /// number of entries removed.
    pub async fn remove_if<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let doomed: Vec<K> = self
            .entries()
            .await
            .into_iter()
            .filter(|e| pred(&e.key, &e.value))
            .map(|e| e.key)
            .collect();
        self.remove_keys(&doomed).await
    }

    /// Remove every entry for which the predicate returns false, with the
    /// snapshot semantics of [`remove_if`](Self::remove_if). Returns the
    /// number of entries removed.
    pub async fn remove_unless<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.remove_if(|k, v| !pred(k, v)).await
    }

    /// Remove all keys and values from the map. Only keys present at
    /// snapshot time are guaranteed removed.
    pub async fn clear(&self) {
        let keys = self.keys().await;
        self.remove_keys(&keys).await;
    }

    /// Remove all entries from the map, running the provided action on
    /// each removed entry with no lock held.
    pub async fn clear_and<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        let entries = self.entries().await;
        for e in &entries {
            action(&e.key, &e.value);
        }
        let mut inner = self.inner.write().await;
        for e in &entries {
            inner.remove(&e.key);
        }
    }

    async fn remove_keys(&self, keys: &[K]) -> usize {
        let mut inner = self.inner.write().await;
        let removed = keys.iter().filter_map(|k| inner.remove(k)).count();
        trace!(removed, "applied snapshot removals");
        removed
    }

    /// Run the action over every entry while holding the read lock. The
    /// action must not call back into this map, see the sync
    /// [`for_each`](super::LockMapRaw::for_each).
    pub async fn for_each<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        let inner = self.inner.read().await;
        for (k, v) in inner.iter() {
            action(k, v);
        }
    }

    /// Run the action over a snapshot of every entry with no lock held.
    pub async fn for_each_safe<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V),
    {
        for e in self.entries().await.iter() {
            action(&e.key, &e.value);
        }
    }

    /// Run the action over entries under the read lock, stopping at the
    /// first entry for which it returns true. Iteration order is
    /// unspecified.
    pub async fn for_each_until<F>(&self, mut action: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        let inner = self.inner.read().await;
        for (k, v) in inner.iter() {
            if action(k, v) {
                break;
            }
        }
    }

    /// Assert if any entry satisfies the predicate.
    pub async fn any_match<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        let inner = self.inner.read().await;
        inner.iter().any(|(k, v)| pred(k, v))
    }

    /// Assert if every entry satisfies the predicate. Vacuously true for
    /// an empty map.
    pub async fn all_match<F>(&self, mut pred: F) -> bool
    where
        F: FnMut(&K, &V) -> bool,
    {
        let inner = self.inner.read().await;
        inner.iter().all(|(k, v)| pred(k, v))
    }

    /// Fold the map to a sum in one scan under the read lock.
    pub async fn sum_of<T, F>(&self, mut f: F) -> T
    where
        T: Sum<T>,
        F: FnMut(&K, &V) -> T,
    {
        let inner = self.inner.read().await;
        inner.iter().map(|(k, v)| f(k, v)).sum()
    }

    /// Find the largest value produced by applying `f` to every entry,
    /// or `None` if the map is empty.
    pub async fn max_of<T, F>(&self, mut f: F) -> Option<T>
    where
        T: Ord,
        F: FnMut(&K, &V) -> T,
    {
        let inner = self.inner.read().await;
        inner.iter().map(|(k, v)| f(k, v)).max()
    }

    /// Find the smallest value produced by applying `f` to every entry,
    /// or `None` if the map is empty.
    pub async fn min_of<T, F>(&self, mut f: F) -> Option<T>
    where
        T: Ord,
        F: FnMut(&K, &V) -> T,
    {
        let inner = self.inner.read().await;
        inner.iter().map(|(k, v)| f(k, v)).min()
    }

    /// Copy out all the keys currently in the map, in unspecified order.
    pub async fn keys(&self) -> Vec<K> {
        let inner = self.inner.read().await;
        inner.keys().cloned().collect()
    }

    /// Copy out all the values currently in the map, in unspecified
    /// order.
    pub async fn values(&self) -> Vec<V> {
        let inner = self.inner.read().await;
        inner.values().cloned().collect()
    }

    /// Copy out all the entries currently in the map as a point-in-time
    /// snapshot, in unspecified order.
    pub async fn entries(&self) -> Vec<Entry<K, V>> {
        let inner = self.inner.read().await;
        inner
            .iter()
            .map(|(k, v)| Entry {
                key: k.clone(),
                value: v.clone(),
            })
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for LockMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        // Construction happens before the map is shared, no lock needed.
        let mut map = HashMap::with_hasher(RandomState::default());
        map.extend(iter);
        LockMap {
            inner: RwLock::new(map),
        }
    }
}

impl<K, V> FromIterator<Entry<K, V>> for LockMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn from_iter<I: IntoIterator<Item = Entry<K, V>>>(iter: I) -> Self {
        Self::from_entries(iter)
    }
}

impl<K, V> fmt::Debug for LockMap<K, V>
where
    K: fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_read() {
            Ok(guard) => f.debug_map().entries(guard.iter()).finish(),
            Err(_) => f.write_str("LockMap { <locked> }"),
        }
    }
}
