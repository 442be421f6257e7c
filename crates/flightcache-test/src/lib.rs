//! Helpers for testing the coalescing cache.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Use a [`Counter`] to build compute closures, and assert on [`Counter::calls`] to find out
//!    how many computations were actually started.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::channel::oneshot;
use futures::future::BoxFuture;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `flightcache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("flightcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// Counts how many computations were started.
///
/// Clones share the same count.
#[derive(Clone, Debug, Default)]
pub struct Counter {
    calls: Arc<AtomicUsize>,
}

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of computations started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns a compute closure that yields `result` after `delay`.
    ///
    /// The call is counted as soon as the closure is invoked, not when the returned future
    /// completes.
    pub fn compute<V, E>(
        &self,
        delay: Duration,
        result: Result<V, E>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<V, E>> + Send + use<V, E>
    where
        V: Send + 'static,
        E: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(delayed(delay, result))
        }
    }

    /// Returns a compute closure that yields `result` once the returned [`Gate`] is opened.
    pub fn gated<T>(
        &self,
        result: T,
    ) -> (
        impl FnOnce() -> BoxFuture<'static, T> + Send + use<T>,
        Gate,
    )
    where
        T: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        let (started_tx, started) = oneshot::channel();
        let (release, release_rx) = oneshot::channel();

        let compute = move || -> BoxFuture<'static, T> {
            calls.fetch_add(1, Ordering::SeqCst);
            started_tx.send(()).ok();
            Box::pin(async move {
                release_rx.await.ok();
                result
            })
        };

        (compute, Gate { started, release })
    }

    /// Returns a compute closure that panics when polled.
    pub fn panicking<V, E>(
        &self,
        delay: Duration,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<V, E>> + Send + use<V, E>
    where
        V: Send + 'static,
        E: Send + 'static,
    {
        let calls = Arc::clone(&self.calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(explode(delay))
        }
    }
}

/// Controls a computation created by [`Counter::gated`].
///
/// Dropping the gate opens it.
#[derive(Debug)]
pub struct Gate {
    started: oneshot::Receiver<()>,
    release: oneshot::Sender<()>,
}

impl Gate {
    /// Waits until the computation was started.
    ///
    /// Computations are started right after they were published to the cache, so once this
    /// returns, any other lookup of the same key joins this computation.
    pub async fn started(&mut self) {
        (&mut self.started).await.ok();
    }

    /// Lets the computation finish.
    pub fn open(self) {
        self.release.send(()).ok();
    }
}

/// Yields `result` after sleeping for `delay`.
pub fn delayed<T>(delay: Duration, result: T) -> impl Future<Output = T> + Send + 'static
where
    T: Send + 'static,
{
    async move {
        tokio::time::sleep(delay).await;
        result
    }
}

async fn explode<V, E>(delay: Duration) -> Result<V, E> {
    tokio::time::sleep(delay).await;
    panic!("computation exploded")
}
