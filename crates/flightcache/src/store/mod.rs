//! Storage substrates for the [`CoalescingCache`](crate::CoalescingCache).
//!
//! A store maps keys to [`CacheEntry`]s and is allowed to drop entries at any time, for
//! example to stay within a capacity. The coalescing logic never relies on an entry still
//! being present. It only relies on every operation of the [`CacheStore`] trait being atomic
//! with respect to other operations on the same key.

use crate::entry::{CacheEntry, Generation};

mod bounded;
mod local;

pub use bounded::BoundedStore;
pub use local::LocalStore;

/// The outcome of [`CacheStore::get_or_insert_with`].
#[derive(Debug)]
pub enum Lookup<V, E> {
    /// An entry was already stored for the key, and is returned as-is.
    Present(CacheEntry<V, E>),
    /// No entry was stored, the freshly created one has been inserted.
    Inserted,
}

/// The capabilities a storage substrate has to provide.
pub trait CacheStore<K, V, E>: Send + Sync {
    /// Returns a copy of the entry stored for `key`.
    fn get(&self, key: &K) -> Option<CacheEntry<V, E>>;

    /// Returns the entry stored for `key`, or inserts the one created by `init`.
    ///
    /// Looking at the existing entry and inserting the new one has to happen as one atomic step,
    /// and `init` must be called at most once, and only if nothing was stored.
    fn get_or_insert_with(
        &self,
        key: &K,
        init: &mut dyn FnMut() -> CacheEntry<V, E>,
    ) -> Lookup<V, E>;

    /// Replaces the entry for `key` with `entry`, if the stored entry is the running
    /// computation of `generation`.
    ///
    /// Returns `true` if the entry was replaced.
    fn compare_and_replace(&self, key: &K, generation: Generation, entry: CacheEntry<V, E>)
    -> bool;

    /// Removes the entry for `key`, if the stored entry is the running computation of
    /// `generation`.
    ///
    /// Returns `true` if the entry was removed.
    fn compare_and_remove(&self, key: &K, generation: Generation) -> bool;

    /// Unconditionally removes the entry for `key`.
    fn evict(&self, key: &K) -> bool;

    /// Unconditionally removes all entries.
    fn evict_all(&self);

    /// The number of entries currently stored.
    ///
    /// Stores with background maintenance may report an approximation.
    fn entry_count(&self) -> u64;
}
