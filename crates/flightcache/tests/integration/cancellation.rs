use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use flightcache::CoalescingCache;
use flightcache_test as test;

use crate::*;

#[tokio::test]
async fn test_cancelled_caller_does_not_cancel_computation() {
    for cache in setup_caches() {
        let counter = Counter::new();
        let joiner_counter = Counter::new();

        let (compute, mut gate) = counter.gated(ok("survivor"));
        let owner = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(key("a"), compute).await }
        });
        gate.started().await;

        let joiner = tokio::spawn({
            let cache = cache.clone();
            let compute = joiner_counter.compute(Duration::ZERO, ok("other"));
            async move { cache.resolve(key("a"), compute).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        owner.abort();
        assert!(owner.await.unwrap_err().is_cancelled());

        gate.open();
        assert_eq!(joiner.await.unwrap(), ok("survivor"));
        assert_eq!(joiner_counter.calls(), 0, "{}", cache.name());
        assert_eq!(cache.peek(&key("a")), Some("survivor".to_owned()));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicked_computation_is_retried_by_joiners() {
    for cache in setup_caches() {
        let panicking = Counter::new();
        let joiner_counter = Counter::new();

        let owner = tokio::spawn({
            let cache = cache.clone();
            let compute = panicking.panicking::<String, FetchError>(Duration::from_millis(200));
            async move { cache.resolve(key("a"), compute).await }
        });
        while panicking.calls() == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        let joiner = tokio::spawn({
            let cache = cache.clone();
            let compute = joiner_counter.compute(Duration::ZERO, ok("retried"));
            async move { cache.resolve(key("a"), compute).await }
        });

        assert!(owner.await.unwrap_err().is_panic());
        assert_eq!(joiner.await.unwrap(), ok("retried"));
        assert_eq!(panicking.calls(), 1);
        assert_eq!(joiner_counter.calls(), 1, "{}", cache.name());
        assert_eq!(cache.peek(&key("a")), Some("retried".to_owned()));
    }
}

/// A value whose first clone panics.
#[derive(Debug)]
struct Fragile {
    value: &'static str,
    armed: Arc<AtomicBool>,
}

impl Clone for Fragile {
    fn clone(&self) -> Self {
        if self.armed.swap(false, Ordering::SeqCst) {
            panic!("cloning {} exploded", self.value);
        }
        Self {
            value: self.value,
            armed: Arc::clone(&self.armed),
        }
    }
}

#[tokio::test]
async fn test_panic_while_storing_value_does_not_wedge_key() {
    test::setup();

    let caches = [
        CoalescingCache::<String, Fragile, FetchError>::unbounded("unbounded"),
        CoalescingCache::<String, Fragile, FetchError>::bounded("bounded", 1_000),
    ];

    for cache in caches {
        let armed = Arc::new(AtomicBool::new(true));
        let owner = tokio::spawn({
            let cache = cache.clone();
            let fragile = Fragile {
                value: "first",
                armed: Arc::clone(&armed),
            };
            async move { cache.resolve(key("a"), move || async move { Ok(fragile) }).await }
        });
        assert!(owner.await.unwrap_err().is_panic(), "{}", cache.name());

        let counter = Counter::new();
        let fragile = Fragile {
            value: "second",
            armed: Arc::clone(&armed),
        };
        let retried = tokio::time::timeout(
            Duration::from_secs(2),
            cache.resolve(key("a"), counter.compute(Duration::ZERO, Ok(fragile))),
        )
        .await
        .expect("key stays stuck on the panicked computation");

        assert_eq!(retried.unwrap().value, "second", "{}", cache.name());
        assert_eq!(counter.calls(), 1, "{}", cache.name());
        assert_eq!(cache.peek(&key("a")).map(|f| f.value), Some("second"));
    }
}
