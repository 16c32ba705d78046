//! End-to-end cache scenarios over the in-memory driver.
//!
//! Time is driven by a `ManualClock` for record ages and by paused tokio
//! time for the sweeper and slow providers, so nothing here sleeps for real.

use std::time::Duration;

use revalidate_test_utils::assertions::*;
use revalidate_test_utils::fixtures::{self, START};
use revalidate_test_utils::*;

#[tokio::test]
async fn stale_then_expired_scenario() {
    init_tracing();
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);

    cache.set("a", 1, Horizons::new(2, 10)).await.unwrap();

    clock.advance(3);
    let record = cache.get("a").await.unwrap().unwrap();
    assert_stale(&record, &1);
    assert_eq!(record.timestamp, START + 3);

    // 11 more seconds: 14 after the write, 11 after the bump.
    clock.advance(11);
    assert!(cache.get("a").await.unwrap().is_none());
    assert!(cache.driver().fetch("a").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_key_is_filled_by_provider() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    let provider = CountingProvider::new(42u32);

    let record = cache
        .get_with("missing", provider.clone(), Horizons::never())
        .await
        .unwrap();
    assert_fresh(&record, &42);
    assert_eq!(provider.calls(), 1);

    // Now cached: the provider is not asked again.
    let again = cache
        .get_with("missing", provider.clone(), Horizons::never())
        .await
        .unwrap();
    assert_fresh(&again, &42);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn stale_read_with_provider_refreshes_once() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<String>(&clock);
    let horizons = Horizons::new(5, 60);

    cache.set("greeting", "hello".to_string(), horizons).await.unwrap();
    clock.advance(5);

    let provider = CountingProvider::new("bonjour".to_string());
    let record = cache
        .get_with("greeting", provider.clone(), horizons)
        .await
        .unwrap();
    assert_stale(&record, &"hello".to_string());

    settle_refreshes(&cache).await;
    assert_eq!(provider.calls(), 1);

    let record = cache.get("greeting").await.unwrap().unwrap();
    assert_fresh(&record, &"bonjour".to_string());
    assert_eq!(record.horizons(), horizons);
    assert_eq!(record.timestamp, START + 5);
}

#[tokio::test]
async fn permanent_record_never_changes() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    cache.set("p", 5, Horizons::never()).await.unwrap();

    for _ in 0..5 {
        clock.advance(1_000_000);
        let record = cache.get("p").await.unwrap().unwrap();
        assert_fresh(&record, &5);
        assert_eq!(record.timestamp, START);
    }
}

#[tokio::test]
async fn misordered_horizons_still_expire() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    cache.set("m", 1, Horizons::new(20, 5)).await.unwrap();

    clock.advance(5);
    assert!(cache.get("m").await.unwrap().is_none());
}

#[tokio::test]
async fn driver_failure_is_not_a_miss() {
    let provider = CountingProvider::new(1u32);
    let cache = Cache::<u32, _>::new(FailingDriver::new("backend offline"));

    assert_driver_unavailable(&cache.get("a").await);
    assert_driver_unavailable(
        &cache
            .get_with("a", provider.clone(), Horizons::never())
            .await,
    );
    assert_driver_unavailable(&cache.set("a", 1, Horizons::never()).await);

    // A failed fetch must not fall through to the provider.
    assert_eq!(provider.calls(), 0);
    assert_ok(&cache.end().await);
}

#[tokio::test]
async fn provider_failure_on_miss_propagates() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);

    let result = cache
        .get_with("a", CountingProvider::failing(0u32, "boom"), Horizons::never())
        .await;
    assert_provider_failed(&result);
    assert!(cache.driver().is_empty().unwrap());
}

#[tokio::test]
async fn provider_failure_on_refresh_keeps_serving_stale() {
    init_tracing();
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    cache.set("a", 1, Horizons::new(1, 100)).await.unwrap();

    clock.advance(1);
    let provider = CountingProvider::failing(0u32, "boom");
    let record = cache
        .get_with("a", provider.clone(), Horizons::new(1, 100))
        .await
        .unwrap();
    assert_stale(&record, &1);

    settle_refreshes(&cache).await;
    assert_eq!(provider.calls(), 1);
    assert_eq!(cache.stats().refresh_failures, 1);

    clock.advance(1);
    let record = cache.get("a").await.unwrap().unwrap();
    assert_stale(&record, &1);
}

#[tokio::test]
async fn dedupe_can_be_disabled() {
    let clock = fixtures::manual_clock();
    let config = CacheConfig::new().with_dedupe_refreshes(false);
    let cache = fixtures::memory_cache_with::<u32>(&clock, config);
    cache.set("a", 1, Horizons::stale_after(-1)).await.unwrap();

    let provider = CountingProvider::new(2u32);
    for _ in 0..3 {
        cache
            .get_with("a", provider.clone(), Horizons::stale_after(-1))
            .await
            .unwrap();
    }

    settle_refreshes(&cache).await;
    assert_eq!(provider.calls(), 3);
    assert_eq!(cache.stats().refreshes_started, 3);
    assert_eq!(cache.stats().refreshes_skipped, 0);
}

#[tokio::test(start_paused = true)]
async fn sweeper_reclaims_unread_keys() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache_with::<u32>(&clock, fixtures::fast_sweep_config());

    cache.set("short", 1, Horizons::expire_after(10)).await.unwrap();
    cache.set("long", 2, Horizons::expire_after(1_000)).await.unwrap();
    clock.advance(10);

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let driver = cache.driver();
    assert!(driver.fetch("short").await.unwrap().is_none());
    assert!(driver.fetch("long").await.unwrap().is_some());
    assert!(driver.sweep_metrics().cycles >= 1);
    assert_eq!(driver.sweep_metrics().records_pruned, 1);
}

#[tokio::test(start_paused = true)]
async fn end_cancels_refresh_and_nothing_is_resurrected() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    cache.set("a", 1, Horizons::stale_after(1)).await.unwrap();

    clock.advance(1);
    let provider = CountingProvider::new(2u32).with_delay(Duration::from_secs(5));
    cache
        .get_with("a", provider.clone(), Horizons::never())
        .await
        .unwrap();
    tokio::task::yield_now().await;
    assert_eq!(provider.calls(), 1);

    cache.end().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert!(cache.driver().is_empty().unwrap());
    assert_eq!(cache.refreshes_in_flight(), 0);
    assert_eq!(cache.stats().refreshes_completed, 0);
    assert_closed(&cache.get("a").await);
}

#[tokio::test]
async fn end_twice_leaves_cache_empty() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::counting_cache::<u32>(&clock);
    cache.set("a", 1, Horizons::never()).await.unwrap();
    cache.set("b", 2, Horizons::new(1, 2)).await.unwrap();

    assert_ok(&cache.end().await);
    assert_ok(&cache.end().await);

    assert!(cache.driver().inner().is_empty().unwrap());
    assert_eq!(cache.driver().calls().ends, 2);
}

#[tokio::test]
async fn clones_share_state() {
    let clock = fixtures::manual_clock();
    let cache = fixtures::memory_cache::<u32>(&clock);
    let handle = cache.clone();

    handle.set("a", 1, Horizons::never()).await.unwrap();
    assert_fresh(&cache.get("a").await.unwrap().unwrap(), &1);

    handle.end().await.unwrap();
    assert!(cache.is_closed());
    assert_closed(&cache.set("a", 2, Horizons::never()).await);
}
