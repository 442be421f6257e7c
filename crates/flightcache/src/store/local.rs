use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

use parking_lot::Mutex;

use super::{CacheStore, Lookup};
use crate::entry::{CacheEntry, Generation};

/// An unbounded store behind a single lock.
///
/// The lock is only ever held for map bookkeeping, never while a computation runs, so all keys
/// can share it. Entries are only dropped through [`evict`](CacheStore::evict) and
/// [`evict_all`](CacheStore::evict_all).
pub struct LocalStore<K, V, E> {
    entries: Mutex<HashMap<K, CacheEntry<V, E>>>,
}

impl<K, V, E> LocalStore<K, V, E> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V, E> Default for LocalStore<K, V, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> fmt::Debug for LocalStore<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries = self.entries.try_lock().map(|e| e.len()).unwrap_or_default();
        f.debug_struct("LocalStore")
            .field("entries", &entries)
            .finish()
    }
}

impl<K, V, E> CacheStore<K, V, E> for LocalStore<K, V, E>
where
    K: Clone + Eq + Hash + Send,
    V: Clone + Send + Sync,
    E: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<CacheEntry<V, E>> {
        self.entries.lock().get(key).cloned()
    }

    fn get_or_insert_with(
        &self,
        key: &K,
        init: &mut dyn FnMut() -> CacheEntry<V, E>,
    ) -> Lookup<V, E> {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get(key) {
            return Lookup::Present(entry.clone());
        }
        entries.insert(key.clone(), init());
        Lookup::Inserted
    }

    fn compare_and_replace(
        &self,
        key: &K,
        generation: Generation,
        entry: CacheEntry<V, E>,
    ) -> bool {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(current) if current.is_in_progress(generation) => {
                *current = entry;
                true
            }
            _ => false,
        }
    }

    fn compare_and_remove(&self, key: &K, generation: Generation) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(current) if current.is_in_progress(generation) => {
                entries.remove(key);
                true
            }
            _ => false,
        }
    }

    fn evict(&self, key: &K) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    fn evict_all(&self) {
        self.entries.lock().clear();
    }

    fn entry_count(&self) -> u64 {
        self.entries.lock().len() as u64
    }
}
