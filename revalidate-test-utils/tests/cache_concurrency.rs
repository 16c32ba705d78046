//! Cache and driver behaviour on tokio's multi-threaded runtime.
//!
//! These run on real time with several workers, so reads, refreshes,
//! shutdown and the sweeper genuinely overlap instead of taking turns.

use std::sync::Arc;
use std::time::Duration;

use revalidate_test_utils::fixtures::{self, START};
use revalidate_test_utils::*;
use tokio::sync::Barrier;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn end_racing_refreshes_leaves_driver_empty() {
    init_tracing();

    for round in 0..100u64 {
        let clock = fixtures::manual_clock();
        let cache = fixtures::memory_cache::<u32>(&clock);
        for i in 0..8 {
            cache
                .set(&format!("k{i}"), 1, Horizons::stale_after(1))
                .await
                .unwrap();
        }
        clock.advance(1);

        let provider =
            CountingProvider::new(2u32).with_delay(Duration::from_micros(round % 4 * 250));
        let mut readers = Vec::new();
        for i in 0..8 {
            let cache = cache.clone();
            let provider = provider.clone();
            readers.push(tokio::spawn(async move {
                cache
                    .get_with(&format!("k{i}"), provider, Horizons::never())
                    .await
            }));
        }

        let ender = {
            let cache = cache.clone();
            tokio::spawn(async move { cache.end().await })
        };
        ender.await.unwrap().unwrap();

        for reader in readers {
            // Each read either served the stale record or lost the race to end().
            match reader.await.unwrap() {
                Ok(record) => assert!(record.stale, "round {round}: {record:?}"),
                Err(e) => assert_eq!(e, RevalidateError::Closed, "round {round}"),
            }
        }

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(
            cache.driver().is_empty().unwrap(),
            "round {round}: key written after end"
        );
        assert_eq!(cache.refreshes_in_flight(), 0);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn parallel_stale_reads_share_one_refresh() {
    const READERS: usize = 16;

    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    let horizons = Horizons::new(1, 1_000);
    cache.set("hot", 1, horizons).await.unwrap();
    clock.advance(1);

    let provider = CountingProvider::new(2u32).with_delay(Duration::from_millis(200));
    let barrier = Arc::new(Barrier::new(READERS));
    let mut readers = Vec::new();
    for _ in 0..READERS {
        let cache = cache.clone();
        let provider = provider.clone();
        let barrier = Arc::clone(&barrier);
        readers.push(tokio::spawn(async move {
            barrier.wait().await;
            cache.get_with("hot", provider, horizons).await
        }));
    }

    for reader in readers {
        let record = reader.await.unwrap().unwrap();
        assert!(matches!(record.value, 1 | 2));
    }

    await_refreshes(&cache, Duration::from_secs(5)).await;
    assert_eq!(provider.calls(), 1);

    let stats = cache.stats();
    assert_eq!(stats.refreshes_started, 1);
    assert_eq!(stats.hits + stats.stale_hits, READERS as u64);
    assert_eq!(stats.misses, 0);

    let record = cache.get("hot").await.unwrap().unwrap();
    assert_eq!(record.value, 2);
    cache.end().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sweeper_runs_against_concurrent_driver_calls() {
    const WORKERS: u32 = 4;
    const PER_WORKER: u32 = 250;
    const KEPT: usize = (WORKERS * PER_WORKER) as usize;
    const DOOMED: u64 = (WORKERS * PER_WORKER) as u64;

    let clock = fixtures::manual_clock();
    let config = CacheConfig::new().with_sweep_interval(Duration::from_millis(1));
    let dyn_clock: Arc<dyn Clock> = clock.clone();
    let driver = Arc::new(MemoryDriver::<u32>::spawn(dyn_clock, &config).unwrap());

    let mut workers = Vec::new();
    for worker in 0..WORKERS {
        let driver = Arc::clone(&driver);
        workers.push(tokio::spawn(async move {
            for n in 0..PER_WORKER {
                let keep = format!("keep:{worker}:{n}");
                let doomed = format!("doomed:{worker}:{n}");
                let dropped = format!("dropped:{worker}:{n}");

                driver
                    .store(&keep, CacheRecord::new(n, START, Horizons::expire_after(1_000)))
                    .await
                    .unwrap();
                // Already past its expiry horizon: only the sweeper removes it.
                driver
                    .store(&doomed, CacheRecord::new(n, START - 10, Horizons::expire_after(5)))
                    .await
                    .unwrap();
                driver
                    .store(&dropped, CacheRecord::new(n, START, Horizons::never()))
                    .await
                    .unwrap();

                assert!(driver.delete(&dropped).await.unwrap());
                let kept = driver.fetch(&keep).await.unwrap();
                assert_eq!(kept.map(|record| record.value), Some(n));

                if n % 16 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for worker in workers {
        worker.await.unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while driver.len().unwrap() > KEPT && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert_eq!(driver.len().unwrap(), KEPT);

    for worker in 0..WORKERS {
        for n in 0..PER_WORKER {
            let record = driver.fetch(&format!("keep:{worker}:{n}")).await.unwrap();
            assert_eq!(record.map(|record| record.value), Some(n));
        }
    }

    let metrics = driver.sweep_metrics();
    assert!(metrics.cycles >= 1);
    assert_eq!(metrics.records_pruned, DOOMED);

    driver.end().await.unwrap();
    assert!(!driver.is_sweeping());
}
