//! TTL-bounded snapshot cache
//!
//! The single point of truth connectors and pollers write to and the
//! aggregator reads from. Every call runs in one critical section; expired
//! entries are dropped lazily when read.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::orderbook::TopOfBook;
use crate::venue::Venue;

/// Lifetime of an entry written without an explicit TTL
pub const DEFAULT_TTL: Duration = Duration::from_millis(60_000);

/// Slot identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Top of book of one pair on one venue
    Book { venue: Venue, pair: String },
    /// Ordered, deduplicated set of tracked pairs
    TrackedPairs,
}

impl CacheKey {
    pub fn book(venue: Venue, pair: &str) -> Self {
        CacheKey::Book {
            venue,
            pair: pair.to_uppercase(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Book { venue, pair } => write!(f, "{}:{}", venue, pair),
            CacheKey::TrackedPairs => f.write_str("tracked-pairs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Book(TopOfBook),
    Pairs(Vec<String>),
}

#[derive(Debug)]
struct CacheEntry {
    value: CacheValue,
    /// `None` never expires
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_visible(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| now <= expires_at)
    }
}

/// Concurrency-safe key/value store with per-entry expiry
#[derive(Debug, Clone)]
pub struct SnapshotCache {
    entries: Arc<Mutex<HashMap<CacheKey, CacheEntry>>>,
    default_ttl: Duration,
}

impl Default for SnapshotCache {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            default_ttl,
        }
    }

    /// Store `value` for the default TTL
    pub async fn set(&self, key: CacheKey, value: CacheValue) {
        self.set_with_ttl(key, value, Some(self.default_ttl)).await;
    }

    /// Store `value`; a `None` TTL keeps it until deleted
    pub async fn set_with_ttl(&self, key: CacheKey, value: CacheValue, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = self.entries.lock().await;
        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Current value of `key`; expired and missing entries are both absent
    pub async fn get(&self, key: &CacheKey) -> Option<CacheValue> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let visible = entries.get(key)?.is_visible(now);
        if !visible {
            entries.remove(key);
            debug!(key = %key, "Cache entry expired");
            return None;
        }

        entries.get(key).map(|entry| entry.value.clone())
    }

    pub async fn delete(&self, key: &CacheKey) {
        self.entries.lock().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Number of physically stored entries, including expired ones not read since
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write a venue snapshot under its `{venue}:{pair}` key
    pub async fn put_book(&self, top: TopOfBook) {
        let key = CacheKey::book(top.venue(), top.pair());
        self.set(key, CacheValue::Book(top)).await;
    }

    pub async fn book(&self, venue: Venue, pair: &str) -> Option<TopOfBook> {
        match self.get(&CacheKey::book(venue, pair)).await {
            Some(CacheValue::Book(top)) => Some(top),
            _ => None,
        }
    }

    pub async fn tracked_pairs(&self) -> Vec<String> {
        match self.get(&CacheKey::TrackedPairs).await {
            Some(CacheValue::Pairs(pairs)) => pairs,
            _ => Vec::new(),
        }
    }

    /// Add `pair` to the tracked set; returns false if it was already tracked
    pub async fn track_pair(&self, pair: &str) -> bool {
        let pair = pair.to_uppercase();
        let mut entries = self.entries.lock().await;

        let mut pairs = match entries.get(&CacheKey::TrackedPairs) {
            Some(CacheEntry {
                value: CacheValue::Pairs(pairs),
                ..
            }) => pairs.clone(),
            _ => Vec::new(),
        };
        if pairs.contains(&pair) {
            return false;
        }

        pairs.push(pair);
        entries.insert(
            CacheKey::TrackedPairs,
            CacheEntry {
                value: CacheValue::Pairs(pairs),
                expires_at: None,
            },
        );
        true
    }

    /// Seed the tracked set with `pairs` when nothing is tracked yet
    pub async fn seed_pairs(&self, pairs: &[String]) -> Vec<String> {
        let mut entries = self.entries.lock().await;

        if let Some(CacheEntry {
            value: CacheValue::Pairs(existing),
            ..
        }) = entries.get(&CacheKey::TrackedPairs)
        {
            if !existing.is_empty() {
                return existing.clone();
            }
        }

        let mut seeded: Vec<String> = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let pair = pair.to_uppercase();
            if !seeded.contains(&pair) {
                seeded.push(pair);
            }
        }
        entries.insert(
            CacheKey::TrackedPairs,
            CacheEntry {
                value: CacheValue::Pairs(seeded.clone()),
                expires_at: None,
            },
        );
        seeded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(venue: Venue, bid: f64, ask: f64) -> TopOfBook {
        TopOfBook::new(venue, "BTCUSDT", bid, ask).unwrap()
    }

    #[test]
    fn test_key_format() {
        assert_eq!(CacheKey::book(Venue::Binance, "btcusdt").to_string(), "binance:BTCUSDT");
        assert_eq!(CacheKey::TrackedPairs.to_string(), "tracked-pairs");
    }

    #[tokio::test]
    async fn test_get_never_set_is_absent() {
        let cache = SnapshotCache::new();
        assert!(cache.get(&CacheKey::book(Venue::Kraken, "BTCUSDT")).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_within_ttl() {
        let cache = SnapshotCache::new();
        let top = book(Venue::Binance, 100.0, 102.0);
        cache.put_book(top.clone()).await;

        tokio::time::advance(Duration::from_millis(59_999)).await;
        assert_eq!(cache.book(Venue::Binance, "BTCUSDT").await, Some(top));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent_and_removed() {
        let cache = SnapshotCache::new();
        cache.put_book(book(Venue::Binance, 100.0, 102.0)).await;
        assert_eq!(cache.len().await, 1);

        tokio::time::advance(DEFAULT_TTL + Duration::from_millis(1)).await;
        // still physically present until read
        assert_eq!(cache.len().await, 1);
        assert!(cache.book(Venue::Binance, "BTCUSDT").await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_ttl() {
        let cache = SnapshotCache::with_ttl(Duration::from_secs(5));
        cache.put_book(book(Venue::Huobi, 1.0, 2.0)).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.book(Venue::Huobi, "BTCUSDT").await.is_none());
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let cache = SnapshotCache::new();
        cache.put_book(book(Venue::Kraken, 100.0, 102.0)).await;
        cache.put_book(book(Venue::Kraken, 200.0, 202.0)).await;
        assert_eq!(cache.book(Venue::Kraken, "BTCUSDT").await.unwrap().mid(), 201.0);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let cache = SnapshotCache::new();
        cache.put_book(book(Venue::Kraken, 100.0, 102.0)).await;
        cache.put_book(book(Venue::Huobi, 100.0, 102.0)).await;

        cache.delete(&CacheKey::book(Venue::Kraken, "BTCUSDT")).await;
        assert!(cache.book(Venue::Kraken, "BTCUSDT").await.is_none());
        assert!(cache.book(Venue::Huobi, "BTCUSDT").await.is_some());

        cache.clear().await;
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_pairs_are_deduplicated_and_do_not_expire() {
        let cache = SnapshotCache::new();
        assert!(cache.track_pair("BTCUSDT").await);
        assert!(!cache.track_pair("btcusdt").await);
        assert!(cache.track_pair("ETHUSDT").await);

        tokio::time::advance(DEFAULT_TTL * 3).await;
        assert_eq!(cache.tracked_pairs().await, vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[tokio::test]
    async fn test_concurrent_tracking_loses_nothing() {
        let cache = SnapshotCache::new();
        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.track_pair(&format!("PAIR{}USDT", i % 10)).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(cache.tracked_pairs().await.len(), 10);
    }

    #[tokio::test]
    async fn test_seed_pairs_only_when_empty() {
        let cache = SnapshotCache::new();
        let seeded = cache
            .seed_pairs(&["btcusdt".to_string(), "BTCUSDT".to_string()])
            .await;
        assert_eq!(seeded, vec!["BTCUSDT"]);

        let kept = cache.seed_pairs(&["ETHUSDT".to_string()]).await;
        assert_eq!(kept, vec!["BTCUSDT"]);
    }
}
