//! Fallback pulls against local mock venues

mod common;

use price_index::fallback::{FallbackSource, RestPoller};
use price_index::metrics::Metrics;
use price_index::{SnapshotCache, Venue};
use std::sync::Arc;
use std::time::Duration;

async fn poller(venue: Venue, path: &str, depth: usize) -> (RestPoller, SnapshotCache, Arc<Metrics>) {
    let addr = common::serve(common::mock_rest_venues()).await;
    let cache = SnapshotCache::new();
    let metrics = Arc::new(Metrics::new().unwrap());
    let poller = RestPoller::new(
        venue,
        &common::rest_venue(addr, path, depth),
        Duration::from_secs(2),
        cache.clone(),
        metrics.clone(),
    )
    .unwrap();
    (poller, cache, metrics)
}

#[tokio::test]
async fn test_binance_pull_is_cached() {
    let (poller, cache, metrics) = poller(Venue::Binance, "binance", 20).await;
    poller.pull("BTCUSDT").await;

    let top = cache.book(Venue::Binance, "BTCUSDT").await.unwrap();
    assert_eq!(top.bid(), 100.0);
    assert_eq!(top.ask(), 102.0);
    assert_eq!(top.mid(), 101.0);
    assert_eq!(metrics.fallback_pulls(Venue::Binance, true), 1);
}

#[tokio::test]
async fn test_kraken_pull_maps_pair_names() {
    let (poller, cache, _) = poller(Venue::Kraken, "kraken", 10).await;
    poller.pull("BTCUSDT").await;

    let top = cache.book(Venue::Kraken, "BTCUSDT").await.unwrap();
    assert_eq!(top.mid(), 103.0);
}

#[tokio::test]
async fn test_huobi_pull_is_cached() {
    let (poller, cache, _) = poller(Venue::Huobi, "huobi", 5).await;
    poller.pull("BTCUSDT").await;

    assert_eq!(cache.book(Venue::Huobi, "BTCUSDT").await.unwrap().mid(), 99.0);
}

#[tokio::test]
async fn test_venue_reported_errors_are_swallowed() {
    for (venue, path, depth) in [
        (Venue::Binance, "binance", 20),
        (Venue::Kraken, "kraken", 10),
        (Venue::Huobi, "huobi", 5),
    ] {
        let (poller, cache, metrics) = poller(venue, path, depth).await;
        poller.pull("DOGEEUR").await;

        assert!(cache.is_empty().await, "{} cached an error response", venue);
        assert_eq!(metrics.fallback_pulls(venue, false), 1);
    }
}

#[tokio::test]
async fn test_http_failure_is_swallowed() {
    let (poller, cache, metrics) = poller(Venue::Binance, "broken", 20).await;
    poller.pull("BTCUSDT").await;

    assert!(cache.is_empty().await);
    assert_eq!(metrics.fallback_pulls(Venue::Binance, false), 1);
}

#[tokio::test]
async fn test_fetch_reports_the_failure() {
    let (poller, _, _) = poller(Venue::Kraken, "kraken", 10).await;
    let err = poller.fetch("DOGEEUR").await.unwrap_err();
    assert!(err.to_string().contains("Unknown asset pair"));
}
