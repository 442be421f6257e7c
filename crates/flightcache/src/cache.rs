use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use futures::channel::oneshot;
use tracing::Instrument;

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, Generation, InFlight, Resolved};
use crate::store::{BoundedStore, CacheStore, LocalStore, Lookup};
use crate::utils::defer::defer;

/// What the bookkeeping step of [`CoalescingCache::resolve`] decided.
enum Acquired<V, E> {
    /// The value was already computed.
    Ready(V),
    /// Another caller is computing the value.
    Joined(InFlight<V, E>),
    /// This caller has to start the computation, the handle was published already.
    Started(InFlight<V, E>, oneshot::Sender<Result<V, E>>),
}

/// An in-memory cache that coalesces concurrent lookups of the same key.
///
/// For every key, at most one computation is running at any time. Callers asking for a key that
/// is being computed wait for that computation instead of starting their own, and all of them
/// observe the same value or the same error. Successful values are kept in the underlying
/// [`CacheStore`] until the store evicts them. Errors are never kept, the next lookup after a
/// failure starts a fresh computation.
///
/// Computations are spawned on the tokio runtime and run to completion even if the caller that
/// started them stops waiting.
///
/// Each computation belongs to a [`Generation`]. When a computation finishes it only updates the
/// store if the store still holds the running entry of its own generation. A computation whose
/// entry was evicted in the meantime still answers its waiters, but never resurrects the key or
/// overwrites an entry of a newer generation.
pub struct CoalescingCache<K, V, E> {
    name: Arc<str>,
    store: Arc<dyn CacheStore<K, V, E>>,
}

impl<K, V, E> Clone for CoalescingCache<K, V, E> {
    fn clone(&self) -> Self {
        // https://github.com/rust-lang/rust/issues/26925
        Self {
            name: Arc::clone(&self.name),
            store: Arc::clone(&self.store),
        }
    }
}

impl<K, V, E> fmt::Debug for CoalescingCache<K, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescingCache")
            .field("name", &self.name)
            .field("entries", &self.store.entry_count())
            .finish()
    }
}

impl<K, V, E> CoalescingCache<K, V, E>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a cache on top of the given store.
    pub fn new<S>(name: &str, store: S) -> Self
    where
        S: CacheStore<K, V, E> + 'static,
    {
        Self {
            name: name.into(),
            store: Arc::new(store),
        }
    }

    /// Creates a cache that never evicts entries on its own.
    pub fn unbounded(name: &str) -> Self {
        Self::new(name, LocalStore::new())
    }

    /// Creates a cache that keeps at most `capacity` entries.
    pub fn bounded(name: &str, capacity: u64) -> Self {
        Self::new(name, BoundedStore::new(name, capacity))
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        match config.capacity {
            Some(capacity) => Self::bounded(&config.name, capacity),
            None => Self::unbounded(&config.name),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the value for `key`, computing it with `compute` if needed.
    ///
    /// - If a value is cached, it is returned right away and `compute` is not called.
    /// - If a computation for `key` is running, this waits for it and returns its outcome.
    ///   `compute` is not called.
    /// - Otherwise `compute` is called and the returned future is spawned. The running
    ///   computation is visible to other callers before it is started.
    ///
    /// Errors returned by the computation are passed through unchanged to every waiting caller.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime, or if the computation started by this call
    /// panics. Callers that were only waiting for a panicked computation retry with their own
    /// `compute` instead.
    pub async fn resolve<F, Fut>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut compute = Some(compute);

        loop {
            match self.acquire(&key) {
                Acquired::Ready(value) => return Ok(value),
                Acquired::Joined(in_flight) => {
                    let generation = in_flight.generation();
                    match in_flight.into_channel().await {
                        Ok(result) => return result,
                        Err(oneshot::Canceled) => {
                            tracing::debug!(
                                cache = %self.name,
                                ?key,
                                %generation,
                                "Joined computation was abandoned, retrying",
                            );
                            // The entry is removed right after the computation is dropped.
                            tokio::task::yield_now().await;
                        }
                    }
                }
                Acquired::Started(in_flight, sender) => {
                    let Some(compute) = compute.take() else {
                        // Only joined callers retry, and they never gave up their `compute`.
                        unreachable!("a caller can start at most one computation");
                    };
                    let generation = in_flight.generation();
                    self.spawn_computation(key.clone(), generation, compute, sender);

                    match in_flight.into_channel().await {
                        Ok(result) => return result,
                        Err(oneshot::Canceled) => panic!(
                            "{} computation {generation} for {key:?} panicked",
                            self.name
                        ),
                    }
                }
            }
        }
    }

    /// Returns the cached value for `key`, without waiting or computing anything.
    pub fn peek(&self, key: &K) -> Option<V> {
        match self.store.get(key)? {
            CacheEntry::Ready(resolved) => Some(resolved.value().clone()),
            CacheEntry::InProgress(_) => None,
        }
    }

    /// Removes the entry for `key`, whatever state it is in.
    ///
    /// A computation that is still running for `key` keeps running and answers the callers that
    /// are waiting for it, but its result is not stored.
    pub fn evict(&self, key: &K) -> bool {
        self.store.evict(key)
    }

    /// Removes all entries.
    pub fn evict_all(&self) {
        self.store.evict_all()
    }

    /// The number of stored entries, including running computations.
    pub fn entry_count(&self) -> u64 {
        self.store.entry_count()
    }

    /// Looks up `key`, publishing a new running computation if there is no entry.
    ///
    /// This is the only step that needs to be atomic, and it does not do anything but
    /// bookkeeping. The computation itself is started by the caller afterwards.
    fn acquire(&self, key: &K) -> Acquired<V, E> {
        let name = &*self.name;
        let mut started = None;

        let lookup = self.store.get_or_insert_with(key, &mut || {
            let generation = Generation::next();
            let (sender, receiver) = oneshot::channel();
            let in_flight = InFlight::new(generation, receiver.shared());
            started = Some((in_flight.clone(), sender));
            CacheEntry::InProgress(in_flight)
        });

        match (lookup, started) {
            (Lookup::Present(CacheEntry::Ready(resolved)), _) => {
                tracing::trace!(cache = name, ?key, "Cache hit");
                metric!(counter("caches.resolve") += 1, "cache" => name, "status" => "hit");
                Acquired::Ready(resolved.value().clone())
            }
            (Lookup::Present(CacheEntry::InProgress(in_flight)), _) => {
                // A concurrent lookup was deduplicated.
                tracing::trace!(
                    cache = name,
                    ?key,
                    generation = %in_flight.generation(),
                    "Joining running computation",
                );
                metric!(counter("caches.resolve") += 1, "cache" => name, "status" => "join");
                Acquired::Joined(in_flight)
            }
            (Lookup::Inserted, Some((in_flight, sender))) => {
                tracing::trace!(
                    cache = name,
                    ?key,
                    generation = %in_flight.generation(),
                    "Starting computation",
                );
                metric!(counter("caches.resolve") += 1, "cache" => name, "status" => "miss");
                Acquired::Started(in_flight, sender)
            }
            (Lookup::Inserted, None) => {
                unreachable!("the store inserted an entry without creating it")
            }
        }
    }

    /// Starts the computation of `generation` on the runtime.
    ///
    /// Once the computation finishes, the store is updated before the result is sent to the
    /// waiting callers, so any caller arriving later either finds the value or starts over.
    fn spawn_computation<F, Fut>(
        &self,
        key: K,
        generation: Generation,
        compute: F,
        sender: oneshot::Sender<Result<V, E>>,
    ) where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let name = Arc::clone(&self.name);
        let store = Arc::clone(&self.store);

        // Removes the running entry if the task dies before the store was updated, for example
        // because the computation or the store update panicked. Dropping the sender along with it
        // wakes up the waiters.
        let abandoned = {
            let name = Arc::clone(&name);
            let store = Arc::clone(&store);
            let key = key.clone();
            defer(move || {
                store.compare_and_remove(&key, generation);
                tracing::error!(
                    cache = %name,
                    ?key,
                    %generation,
                    "Computation was abandoned before completing",
                );
                metric!(counter("caches.computation") += 1, "cache" => &name, "result" => "abandoned");
            })
        };

        let computation = compute();

        let task = async move {
            let start = Instant::now();
            let result = computation.await;

            metric!(
                timer("caches.computation.duration") = start.elapsed(),
                "cache" => &name,
            );

            let stored = match &result {
                Ok(value) => {
                    metric!(counter("caches.computation") += 1, "cache" => &name, "result" => "ok");
                    let entry = CacheEntry::Ready(Resolved::new(generation, value.clone()));
                    store.compare_and_replace(&key, generation, entry)
                }
                Err(_) => {
                    metric!(counter("caches.computation") += 1, "cache" => &name, "result" => "err");
                    let removed = store.compare_and_remove(&key, generation);
                    if removed {
                        tracing::debug!(cache = %name, ?key, %generation, "Computation failed");
                    }
                    removed
                }
            };

            if !stored {
                // The entry was evicted, and possibly replaced by a newer generation.
                tracing::debug!(
                    cache = %name,
                    ?key,
                    %generation,
                    "Discarding result of stale computation",
                );
                metric!(counter("caches.computation.discarded") += 1, "cache" => &name);
            }
            abandoned.cancel();

            // Nobody might be waiting anymore, which is fine.
            sender.send(result).ok();
        };

        tokio::spawn(task.in_current_span());
    }
}
