use std::time::Duration;

use flightcache::{BoundedStore, CacheStore};

use crate::*;

#[tokio::test]
async fn test_evicted_value_is_recomputed() {
    for cache in setup_caches() {
        let counter = Counter::new();

        let first = cache
            .resolve(key("a"), counter.compute(Duration::ZERO, ok("first")))
            .await;
        assert_eq!(first, ok("first"));

        assert!(cache.evict(&key("a")));

        let second = cache
            .resolve(key("a"), counter.compute(Duration::ZERO, ok("second")))
            .await;
        assert_eq!(second, ok("second"));
        assert_eq!(counter.calls(), 2);
    }
}

#[tokio::test]
async fn test_stale_completion_does_not_overwrite_newer_generation() {
    for cache in setup_caches() {
        let counter = Counter::new();

        let (first, mut first_gate) = counter.gated(ok("V1"));
        let first_lookup = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(key("Q4"), first).await }
        });
        first_gate.started().await;

        // evicted while the first computation is running
        assert!(cache.evict(&key("Q4")));

        let (second, mut second_gate) = counter.gated(ok("V2"));
        let second_lookup = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(key("Q4"), second).await }
        });
        second_gate.started().await;
        assert_eq!(counter.calls(), 2);

        // the stale generation answers its own caller, but leaves the store alone
        first_gate.open();
        assert_eq!(first_lookup.await.unwrap(), ok("V1"));
        assert_eq!(cache.peek(&key("Q4")), None);

        second_gate.open();
        assert_eq!(second_lookup.await.unwrap(), ok("V2"));
        assert_eq!(cache.peek(&key("Q4")), Some("V2".to_owned()));

        let third = cache
            .resolve(key("Q4"), counter.compute(Duration::ZERO, ok("V3")))
            .await;
        assert_eq!(third, ok("V2"));
        assert_eq!(counter.calls(), 2, "{}", cache.name());
    }
}

#[tokio::test]
async fn test_stale_completion_does_not_resurrect_key() {
    for cache in setup_caches() {
        let counter = Counter::new();

        let (compute, mut gate) = counter.gated(ok("stale"));
        let lookup = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(key("Q4"), compute).await }
        });
        gate.started().await;

        cache.evict_all();
        gate.open();
        assert_eq!(lookup.await.unwrap(), ok("stale"));

        assert_eq!(cache.peek(&key("Q4")), None);
        let fresh = cache
            .resolve(key("Q4"), counter.compute(Duration::ZERO, ok("fresh")))
            .await;
        assert_eq!(fresh, ok("fresh"));
        assert_eq!(counter.calls(), 2);
    }
}

#[tokio::test]
async fn test_stale_failure_does_not_remove_newer_generation() {
    for cache in setup_caches() {
        let counter = Counter::new();

        let (failing, mut failing_gate) = counter.gated(Err(FetchError::Timeout));
        let failing_lookup = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(key("Q6"), failing).await }
        });
        failing_gate.started().await;
        cache.evict(&key("Q6"));

        let newer = cache
            .resolve(key("Q6"), counter.compute(Duration::ZERO, ok("newer")))
            .await;
        assert_eq!(newer, ok("newer"));

        failing_gate.open();
        assert_eq!(failing_lookup.await.unwrap(), Err(FetchError::Timeout));
        assert_eq!(cache.peek(&key("Q6")), Some("newer".to_owned()));
    }
}

#[tokio::test]
async fn test_capacity_bound_store_recomputes_evicted_keys() {
    let store = BoundedStore::<String, String, FetchError>::new("tiny", 2);
    let cache = TestCache::new("tiny", store.clone());
    let counter = Counter::new();

    for round in 0..3 {
        for i in 0..10 {
            let value = format!("value-{i}");
            let result = cache
                .resolve(
                    format!("key-{i}"),
                    counter.compute(Duration::ZERO, Ok(value.clone())),
                )
                .await;
            assert_eq!(result, Ok(value), "round {round}");
        }
        store.run_pending_tasks();
        assert!(store.entry_count() <= 2, "round {round}");
    }

    // 10 keys do not fit into a capacity of 2, later rounds have to recompute some of them
    assert!(counter.calls() > 10);
    assert!(counter.calls() <= 30);
}
