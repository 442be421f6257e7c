use std::time::Duration;

use futures::future::join_all;

use crate::*;

#[tokio::test]
async fn test_concurrent_lookups_share_one_computation() {
    for cache in setup_caches() {
        let slow_fetch = Counter::new();

        let lookups = (0..50).map(|_| {
            cache.resolve(
                key("Q2"),
                slow_fetch.compute(Duration::from_millis(50), ok("slow")),
            )
        });
        let results = join_all(lookups).await;

        assert_eq!(slow_fetch.calls(), 1, "{}", cache.name());
        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|result| *result == ok("slow")));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_tasks_share_one_computation() {
    for cache in setup_caches() {
        let slow_fetch = Counter::new();

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let cache = cache.clone();
                let compute = slow_fetch.compute(Duration::from_millis(50), ok("slow"));
                tokio::spawn(async move { cache.resolve(key("Q2"), compute).await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), ok("slow"));
        }
        assert_eq!(slow_fetch.calls(), 1, "{}", cache.name());
    }
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_failure() {
    for cache in setup_caches() {
        let failing = Counter::new();

        let lookups = (0..10).map(|_| {
            cache.resolve(
                key("Q5"),
                failing.compute(Duration::from_millis(20), Err(FetchError::Timeout)),
            )
        });
        let results = join_all(lookups).await;

        assert_eq!(failing.calls(), 1);
        assert!(
            results
                .iter()
                .all(|result| *result == Err(FetchError::Timeout))
        );
        assert_eq!(cache.peek(&key("Q5")), None, "{}", cache.name());
    }
}

#[tokio::test]
async fn test_slow_key_does_not_block_other_keys() {
    for cache in setup_caches() {
        let counter = Counter::new();
        let (slow, mut gate) = counter.gated(ok("slow"));

        let slow_lookup = tokio::spawn({
            let cache = cache.clone();
            async move { cache.resolve(key("slow"), slow).await }
        });
        gate.started().await;

        // the slow computation is still running while this one completes
        let fast = tokio::time::timeout(
            Duration::from_secs(5),
            cache.resolve(key("fast"), counter.compute(Duration::ZERO, ok("fast"))),
        )
        .await
        .expect("lookup of an unrelated key was blocked");
        assert_eq!(fast, ok("fast"));
        assert!(!slow_lookup.is_finished());

        gate.open();
        assert_eq!(slow_lookup.await.unwrap(), ok("slow"));
        assert_eq!(counter.calls(), 2);
    }
}
