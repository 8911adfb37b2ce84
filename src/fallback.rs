//! One-shot depth pulls used while a venue stream is unavailable

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::SnapshotCache;
use crate::config::{Config, VenueConfig};
use crate::error::{PriceIndexError, Result};
use crate::metrics::{Metrics, QuoteSource};
use crate::orderbook::TopOfBook;
use crate::parser::parse_rest;
use crate::venue::Venue;

/// Pull side of a venue, as seen by the connector manager
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FallbackSource: Send + Sync {
    fn venue(&self) -> Venue;

    /// Best effort: failures are logged and swallowed
    async fn pull(&self, pair: &str);
}

/// REST depth poller of one venue
pub struct RestPoller {
    venue: Venue,
    endpoint: String,
    depth: usize,
    client: reqwest::Client,
    cache: SnapshotCache,
    metrics: Arc<Metrics>,
}

impl RestPoller {
    pub fn new(
        venue: Venue,
        venue_config: &VenueConfig,
        request_timeout: Duration,
        cache: SnapshotCache,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            venue,
            endpoint: venue_config.rest_endpoint.clone(),
            depth: venue_config.depth,
            client,
            cache,
            metrics,
        })
    }

    pub fn from_config(
        config: &Config,
        venue: Venue,
        cache: SnapshotCache,
        metrics: Arc<Metrics>,
    ) -> Result<Self> {
        Self::new(
            venue,
            config.venues.get(venue),
            Duration::from_millis(config.request_timeout_ms),
            cache,
            metrics,
        )
    }

    /// Fetch and normalize the depth of `pair` without touching the cache
    pub async fn fetch(&self, pair: &str) -> Result<TopOfBook> {
        let query = self.venue.rest_query(pair, self.depth);
        debug!(venue = %self.venue, pair = %pair, url = %self.endpoint, "Fetching depth snapshot");

        let body = self
            .client
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_rest(self.venue, pair, &body)
    }

    async fn try_pull(&self, pair: &str) -> Result<TopOfBook> {
        let top = self.fetch(pair).await?;
        if top.mid() <= 0.0 {
            return Err(PriceIndexError::PullError(format!(
                "non-positive mid for {}",
                pair
            )));
        }
        self.cache.put_book(top.clone()).await;
        Ok(top)
    }
}

#[async_trait]
impl FallbackSource for RestPoller {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn pull(&self, pair: &str) {
        match self.try_pull(pair).await {
            Ok(top) => {
                self.metrics.fallback_pull(self.venue, true);
                self.metrics.quote_cached(self.venue, QuoteSource::Rest);
                info!(
                    venue = %self.venue,
                    pair = %top.pair(),
                    mid = top.mid(),
                    "Fallback pull cached"
                );
            }
            Err(e) => {
                self.metrics.fallback_pull(self.venue, false);
                warn!(venue = %self.venue, pair = %pair, error = %e, "Fallback pull failed");
            }
        }
    }
}
