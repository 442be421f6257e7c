use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use moka::notification::RemovalCause;
use moka::ops::compute::{CompResult, Op};

use super::{CacheStore, Lookup};
use crate::entry::{CacheEntry, Generation};

type InMemoryCache<K, V, E> = moka::sync::Cache<K, CacheEntry<V, E>>;

/// A capacity-bounded store backed by a [`moka`] cache.
///
/// Moka evicts entries on its own once the configured capacity is reached, which includes
/// entries of computations that are still running. Atomicity per key is provided by moka's
/// entry API.
pub struct BoundedStore<K, V, E> {
    name: Arc<str>,
    cache: InMemoryCache<K, V, E>,
}

impl<K, V, E> BoundedStore<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a store holding at most `capacity` entries.
    pub fn new(name: &str, capacity: u64) -> Self {
        Self::with_weigher(name, capacity, |_key, _value| 1)
    }

    /// Creates a store whose `capacity` is measured in the sum of all weights.
    ///
    /// Only ready values are weighed, an entry for a running computation weighs `1`.
    pub fn with_weigher<W>(name: &str, capacity: u64, weigher: W) -> Self
    where
        W: Fn(&K, &V) -> u32 + Send + Sync + 'static,
    {
        let name: Arc<str> = name.into();
        let listener_name = Arc::clone(&name);

        let cache = InMemoryCache::builder()
            .name(&name)
            .max_capacity(capacity)
            .weigher(move |key, entry: &CacheEntry<V, E>| match entry.ready_value() {
                Some(value) => weigher(key, value).max(1),
                None => 1,
            })
            .eviction_listener(move |_key, entry: CacheEntry<V, E>, cause| {
                if !matches!(cause, RemovalCause::Size) {
                    return;
                }
                tracing::trace!(
                    cache = %listener_name,
                    generation = %entry.generation(),
                    ready = entry.is_ready(),
                    "Evicted entry to stay within capacity",
                );
                metric!(
                    counter("caches.evicted") += 1,
                    "cache" => &listener_name,
                    "ready" => if entry.is_ready() { "true" } else { "false" },
                );
            })
            .build();

        Self { name, cache }
    }

    /// Runs moka's pending maintenance tasks, which makes [`entry_count`](CacheStore::entry_count)
    /// and capacity-driven eviction deterministic.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}

impl<K, V, E> Clone for BoundedStore<K, V, E> {
    /// Clones share the same underlying cache.
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            cache: self.cache.clone(),
        }
    }
}

impl<K, V, E> fmt::Debug for BoundedStore<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedStore")
            .field("name", &self.name)
            .field("entries", &self.cache.entry_count())
            .finish()
    }
}

impl<K, V, E> CacheStore<K, V, E> for BoundedStore<K, V, E>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &K) -> Option<CacheEntry<V, E>> {
        self.cache.get(key)
    }

    fn get_or_insert_with(
        &self,
        key: &K,
        init: &mut dyn FnMut() -> CacheEntry<V, E>,
    ) -> Lookup<V, E> {
        let entry = self.cache.entry(key.clone()).or_insert_with(|| init());
        if entry.is_fresh() {
            Lookup::Inserted
        } else {
            Lookup::Present(entry.into_value())
        }
    }

    fn compare_and_replace(
        &self,
        key: &K,
        generation: Generation,
        entry: CacheEntry<V, E>,
    ) -> bool {
        let result = self
            .cache
            .entry(key.clone())
            .and_compute_with(|current| match current {
                Some(current) if current.value().is_in_progress(generation) => Op::Put(entry),
                _ => Op::Nop,
            });
        matches!(result, CompResult::ReplacedWith(_))
    }

    fn compare_and_remove(&self, key: &K, generation: Generation) -> bool {
        let result = self
            .cache
            .entry(key.clone())
            .and_compute_with(|current| match current {
                Some(current) if current.value().is_in_progress(generation) => Op::Remove,
                _ => Op::Nop,
            });
        matches!(result, CompResult::Removed(_))
    }

    fn evict(&self, key: &K) -> bool {
        self.cache.remove(key).is_some()
    }

    fn evict_all(&self) {
        // `invalidate_all` only hides entries lazily, remove them one by one so that a
        // completing computation cannot find its stale entry anymore.
        for (key, _entry) in self.cache.iter() {
            self.cache.invalidate(&*key);
        }
    }

    fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
