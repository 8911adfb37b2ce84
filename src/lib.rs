//! Price Index - cross-exchange mid-price aggregation
//!
//! This crate keeps a near-real-time mid price for a dynamic set of trading
//! pairs by streaming top-of-book data from several exchanges, falling back
//! to one-shot depth pulls whenever a stream is unavailable.

pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod connector;
pub mod error;
pub mod fallback;
pub mod manager;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod scheduler;
pub mod service;
pub mod venue;
pub mod websocket;

pub use aggregator::{GlobalPrice, PriceAggregator};
pub use cache::{CacheKey, CacheValue, SnapshotCache};
pub use config::Config;
pub use connector::{ConnectionState, StreamConnector, VenueConnector};
pub use error::{PriceIndexError, Result};
pub use fallback::{FallbackSource, RestPoller};
pub use manager::ConnectorManager;
pub use orderbook::{mid_price, TopOfBook};
pub use parser::{parse_depth, Frame, ParsedMessage};
pub use scheduler::{RefreshHandle, RefreshScheduler};
pub use service::PriceIndex;
pub use venue::Venue;
