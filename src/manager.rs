//! Stream-versus-pull policy over every venue
//!
//! The manager owns one stream connector and one fallback source per venue.
//! [`ConnectorManager::ensure`] is consulted on every refresh tick and for
//! every newly tracked pair, since a stream may drop between two calls.

use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::connector::{ConnectionState, StreamConnector};
use crate::fallback::FallbackSource;
use crate::venue::Venue;

struct VenueLink {
    stream: Arc<dyn StreamConnector>,
    fallback: Arc<dyn FallbackSource>,
}

#[derive(Default)]
pub struct ConnectorManager {
    links: BTreeMap<Venue, VenueLink>,
}

impl ConnectorManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the stream and pull side of one venue, replacing any previous pair
    pub fn register(
        &mut self,
        stream: Arc<dyn StreamConnector>,
        fallback: Arc<dyn FallbackSource>,
    ) {
        let venue = stream.venue();
        debug_assert_eq!(venue, fallback.venue());
        self.links.insert(venue, VenueLink { stream, fallback });
    }

    pub fn venues(&self) -> Vec<Venue> {
        self.links.keys().copied().collect()
    }

    /// Keep `venue` fresh for `pairs`.
    ///
    /// A subscribed stream gets a hot subscription update; otherwise every pair
    /// is pulled once, and a stream that was never started is started.
    pub async fn ensure(&self, venue: Venue, pairs: &[String]) {
        let Some(link) = self.links.get(&venue) else {
            debug!(venue = %venue, "Venue not registered, ensure skipped");
            return;
        };

        if link.stream.is_connected() {
            link.stream.update_subscription(pairs.to_vec());
            return;
        }

        match link.stream.state() {
            ConnectionState::Closing => return,
            ConnectionState::Disconnected if !link.stream.is_started() => {
                info!(venue = %venue, "Starting stream connector");
                link.stream.connect(pairs.to_vec());
            }
            _ => {
                link.stream.update_subscription(pairs.to_vec());
            }
        }

        debug!(venue = %venue, pairs = pairs.len(), "Stream unavailable, pulling");
        join_all(pairs.iter().map(|pair| link.fallback.pull(pair))).await;
    }

    /// [`ensure`](Self::ensure) every registered venue concurrently
    pub async fn ensure_all(&self, pairs: &[String]) {
        join_all(self.links.keys().map(|venue| self.ensure(*venue, pairs))).await;
    }

    pub fn connect_all(&self, pairs: &[String]) {
        for link in self.links.values() {
            link.stream.connect(pairs.to_vec());
        }
    }

    pub fn close_all(&self) {
        for link in self.links.values() {
            link.stream.close();
        }
    }

    pub fn states(&self) -> BTreeMap<Venue, ConnectionState> {
        self.links
            .iter()
            .map(|(venue, link)| (*venue, link.stream.state()))
            .collect()
    }
}
