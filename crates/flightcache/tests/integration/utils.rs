use flightcache::CoalescingCache;
use flightcache_test as test;

pub use test::{Counter, Gate, delayed};

/// An error as it could be returned by a remote fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FetchError {
    NotFound,
    Timeout,
}

pub type TestCache = CoalescingCache<String, String, FetchError>;

/// Sets up logging and returns one cache per store implementation.
///
/// Behavior that does not depend on capacity has to be identical for every store.
pub fn setup_caches() -> Vec<TestCache> {
    test::setup();

    vec![
        TestCache::unbounded("unbounded"),
        TestCache::bounded("bounded", 1_000),
    ]
}

pub fn key(key: &str) -> String {
    key.to_owned()
}

pub fn ok(value: &str) -> Result<String, FetchError> {
    Ok(value.to_owned())
}
