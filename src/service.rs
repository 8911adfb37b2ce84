//! Price index service
//!
//! Wires the snapshot cache, the per-venue connectors and pollers, the
//! connector manager, the aggregator and the refresh scheduler together, and
//! exposes the operations the HTTP layer needs.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::aggregator::{GlobalPrice, PriceAggregator};
use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::connector::{ConnectionState, StreamSettings, VenueConnector};
use crate::error::Result;
use crate::fallback::RestPoller;
use crate::manager::ConnectorManager;
use crate::metrics::Metrics;
use crate::scheduler::{RefreshHandle, RefreshScheduler};
use crate::venue::{normalize_pair, Venue};

/// Poll step while waiting for the first quote of a new pair
const FIRST_QUOTE_POLL: Duration = Duration::from_millis(50);

pub struct PriceIndex {
    config: Config,
    cache: SnapshotCache,
    metrics: Arc<Metrics>,
    manager: Arc<ConnectorManager>,
    aggregator: PriceAggregator,
    scheduler: Mutex<Option<RefreshHandle>>,
}

impl PriceIndex {
    /// Build connectors and pollers for every enabled venue
    pub fn from_config(config: Config) -> Result<Self> {
        let cache = SnapshotCache::with_ttl(config.cache_ttl());
        let metrics = Arc::new(Metrics::new()?);

        let mut manager = ConnectorManager::new();
        for venue in config.venues.enabled() {
            let connector = VenueConnector::new(
                venue,
                StreamSettings::from_config(&config, venue),
                cache.clone(),
                metrics.clone(),
            );
            let poller = RestPoller::from_config(&config, venue, cache.clone(), metrics.clone())?;
            metrics.set_connection_state(venue, ConnectionState::Disconnected);
            manager.register(Arc::new(connector), Arc::new(poller));
        }

        Ok(Self::new(config, cache, metrics, manager))
    }

    /// Assemble from prebuilt parts; the aggregator reads the manager's venues
    pub fn new(
        config: Config,
        cache: SnapshotCache,
        metrics: Arc<Metrics>,
        manager: ConnectorManager,
    ) -> Self {
        let aggregator = PriceAggregator::new(cache.clone(), manager.venues());
        Self {
            config,
            cache,
            metrics,
            manager: Arc::new(manager),
            aggregator,
            scheduler: Mutex::new(None),
        }
    }

    /// Seed the tracked set, open every stream and start the refresh timer
    pub async fn start(&self) {
        let defaults: Vec<String> = self
            .config
            .default_pairs
            .iter()
            .filter_map(|pair| match normalize_pair(pair) {
                Ok(pair) => Some(pair),
                Err(e) => {
                    warn!(error = %e, "Ignoring configured pair");
                    None
                }
            })
            .collect();

        let pairs = self.cache.seed_pairs(&defaults).await;
        info!(pairs = ?pairs, venues = ?self.manager.venues(), "Starting price index");

        self.manager.connect_all(&pairs);

        let handle = RefreshScheduler::spawn(
            self.manager.clone(),
            self.cache.clone(),
            self.config.refresh_interval(),
        );
        *self.scheduler.lock() = Some(handle);
    }

    /// Track `pair`; a newly tracked pair gets an immediate refresh pass.
    ///
    /// Returns whether the pair was newly added.
    pub async fn ensure_tracked(&self, pair: &str) -> Result<bool> {
        let pair = normalize_pair(pair)?;
        if !self.cache.track_pair(&pair).await {
            return Ok(false);
        }

        let pairs = self.cache.tracked_pairs().await;
        info!(pair = %pair, tracked = pairs.len(), "Tracking new pair");
        self.manager.ensure_all(&pairs).await;
        Ok(true)
    }

    pub async fn is_tracked(&self, pair: &str) -> bool {
        match normalize_pair(pair) {
            Ok(pair) => self.cache.tracked_pairs().await.contains(&pair),
            Err(_) => false,
        }
    }

    pub async fn global_price(&self, pair: &str) -> GlobalPrice {
        self.aggregator.global_price(pair).await
    }

    /// Global price, waiting up to `within` for the first venue quote
    pub async fn wait_for_price(&self, pair: &str, within: Duration) -> GlobalPrice {
        let deadline = Instant::now() + within;
        loop {
            let price = self.aggregator.global_price(pair).await;
            if price.is_available() || Instant::now() >= deadline {
                return price;
            }
            sleep(FIRST_QUOTE_POLL).await;
        }
    }

    pub async fn tracked_pairs(&self) -> Vec<String> {
        self.cache.tracked_pairs().await
    }

    pub fn connection_states(&self) -> BTreeMap<Venue, ConnectionState> {
        self.manager.states()
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.manager.venues()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Stop the refresh timer and close every connector
    pub fn shutdown(&self) {
        if let Some(mut handle) = self.scheduler.lock().take() {
            handle.cancel();
        }
        self.manager.close_all();
        info!("Price index stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PriceIndexError;
    use crate::orderbook::TopOfBook;

    fn index() -> PriceIndex {
        PriceIndex::new(
            Config::default(),
            SnapshotCache::new(),
            Arc::new(Metrics::new().unwrap()),
            ConnectorManager::new(),
        )
    }

    #[tokio::test]
    async fn test_ensure_tracked_twice_tracks_once() {
        let index = index();
        assert!(index.ensure_tracked("BTCUSDT").await.unwrap());
        assert!(!index.ensure_tracked("btcusdt").await.unwrap());
        assert_eq!(index.tracked_pairs().await, vec!["BTCUSDT"]);
        assert!(index.is_tracked("BtcUsdt").await);
    }

    #[tokio::test]
    async fn test_concurrent_ensure_tracked_loses_nothing() {
        let index = Arc::new(index());
        let pairs = ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT", "ADAUSDT"];

        let tasks: Vec<_> = pairs
            .iter()
            .map(|pair| {
                let index = index.clone();
                let pair = pair.to_string();
                tokio::spawn(async move { index.ensure_tracked(&pair).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        let mut tracked = index.tracked_pairs().await;
        tracked.sort();
        let mut expected: Vec<String> = pairs.iter().map(|p| p.to_string()).collect();
        expected.sort();
        assert_eq!(tracked, expected);
    }

    #[tokio::test]
    async fn test_invalid_pair_is_rejected() {
        let index = index();
        assert!(matches!(
            index.ensure_tracked("BTC/USDT").await,
            Err(PriceIndexError::InvalidPair(_))
        ));
        assert!(index.tracked_pairs().await.is_empty());
        assert!(!index.is_tracked("BTC/USDT").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_price_gives_up_after_deadline() {
        let index = index();
        let started = Instant::now();
        let price = index
            .wait_for_price("BTCUSDT", Duration::from_millis(1_000))
            .await;
        assert!(!price.is_available());
        assert!(started.elapsed() >= Duration::from_millis(1_000));
    }

    #[tokio::test]
    async fn test_start_seeds_default_pairs() {
        let index = index();
        index.start().await;
        assert_eq!(index.tracked_pairs().await, vec!["BTCUSDT"]);
        index.shutdown();
    }

    #[tokio::test]
    async fn test_global_price_reads_cache() {
        let cache = SnapshotCache::new();
        cache
            .put_book(TopOfBook::new(Venue::Kraken, "ETHUSDT", 10.0, 12.0).unwrap())
            .await;

        let mut manager = ConnectorManager::new();
        let connector = VenueConnector::new(
            Venue::Kraken,
            StreamSettings::from_config(&Config::default(), Venue::Kraken),
            cache.clone(),
            Arc::new(Metrics::new().unwrap()),
        );
        let poller = RestPoller::from_config(
            &Config::default(),
            Venue::Kraken,
            cache.clone(),
            Arc::new(Metrics::new().unwrap()),
        )
        .unwrap();
        manager.register(Arc::new(connector), Arc::new(poller));

        let index = PriceIndex::new(
            Config::default(),
            cache,
            Arc::new(Metrics::new().unwrap()),
            manager,
        );
        let price = index.global_price("ethusdt").await;
        assert_eq!(price.price, 11.0);
        assert_eq!(
            index.connection_states(),
            BTreeMap::from([(Venue::Kraken, ConnectionState::Disconnected)])
        );
    }
}
