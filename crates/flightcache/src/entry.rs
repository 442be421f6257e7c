use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::channel::oneshot;
use futures::future::Shared;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Identifies one `absent -> in progress -> {ready | absent}` cycle of a key.
///
/// Generations are unique for the lifetime of the process, so a completion can always tell
/// whether the entry it is about to touch is still its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Generation(u64);

impl Generation {
    pub(crate) fn next() -> Self {
        Self(NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

pub(crate) type ComputationChannel<V, E> = Shared<oneshot::Receiver<Result<V, E>>>;

/// A handle to a computation that is still running.
///
/// The handle can be cloned and awaited by any number of callers, every one of them observes
/// the same outcome.
pub struct InFlight<V, E> {
    generation: Generation,
    channel: ComputationChannel<V, E>,
}

impl<V, E> InFlight<V, E> {
    pub(crate) fn new(generation: Generation, channel: ComputationChannel<V, E>) -> Self {
        Self {
            generation,
            channel,
        }
    }

    /// The generation this computation belongs to.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub(crate) fn into_channel(self) -> ComputationChannel<V, E> {
        self.channel
    }
}

impl<V, E> Clone for InFlight<V, E>
where
    V: Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            channel: self.channel.clone(),
        }
    }
}

impl<V, E> fmt::Debug for InFlight<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlight")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// A successfully computed value, together with the generation that produced it.
#[derive(Clone, Debug)]
pub struct Resolved<V> {
    generation: Generation,
    value: V,
}

impl<V> Resolved<V> {
    pub(crate) fn new(generation: Generation, value: V) -> Self {
        Self { generation, value }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn value(&self) -> &V {
        &self.value
    }
}

/// An entry of a [`CacheStore`](crate::CacheStore).
///
/// Entries are only ever created by the [`CoalescingCache`](crate::CoalescingCache) and are
/// replaced wholesale, never mutated in place. Failed computations do not have an entry.
#[derive(Debug)]
pub enum CacheEntry<V, E> {
    /// A computation for the key is running.
    InProgress(InFlight<V, E>),
    /// The value for the key has been computed.
    Ready(Resolved<V>),
}

impl<V, E> CacheEntry<V, E> {
    pub fn generation(&self) -> Generation {
        match self {
            Self::InProgress(in_flight) => in_flight.generation(),
            Self::Ready(resolved) => resolved.generation(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Whether this is the still running computation of `generation`.
    pub fn is_in_progress(&self, generation: Generation) -> bool {
        matches!(self, Self::InProgress(in_flight) if in_flight.generation() == generation)
    }

    pub fn ready_value(&self) -> Option<&V> {
        match self {
            Self::InProgress(_) => None,
            Self::Ready(resolved) => Some(resolved.value()),
        }
    }
}

impl<V, E> Clone for CacheEntry<V, E>
where
    V: Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        match self {
            Self::InProgress(in_flight) => Self::InProgress(in_flight.clone()),
            Self::Ready(resolved) => Self::Ready(resolved.clone()),
        }
    }
}
