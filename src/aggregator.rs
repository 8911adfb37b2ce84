//! Cross-venue mid-price index

use serde::Serialize;
use std::collections::BTreeMap;

use crate::cache::SnapshotCache;
use crate::venue::Venue;

/// Global price of one pair; `price <= 0` means no venue had data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalPrice {
    pub price: f64,
    pub pair: String,
    pub venues: BTreeMap<Venue, f64>,
}

impl GlobalPrice {
    pub fn is_available(&self) -> bool {
        self.price > 0.0
    }
}

#[derive(Debug, Clone)]
pub struct PriceAggregator {
    cache: SnapshotCache,
    venues: Vec<Venue>,
}

impl PriceAggregator {
    pub fn new(cache: SnapshotCache, venues: Vec<Venue>) -> Self {
        Self { cache, venues }
    }

    /// Mean of the live venue mids for `pair`; stale, absent and non-positive mids are left out
    pub async fn global_price(&self, pair: &str) -> GlobalPrice {
        let pair = pair.to_uppercase();
        let mut venues = BTreeMap::new();

        for venue in &self.venues {
            if let Some(top) = self.cache.book(*venue, &pair).await {
                let mid = top.mid();
                if mid.is_finite() && mid > 0.0 {
                    venues.insert(*venue, mid);
                }
            }
        }

        let price = if venues.is_empty() {
            0.0
        } else {
            venues.values().sum::<f64>() / venues.len() as f64
        };

        GlobalPrice { price, pair, venues }
    }
}
