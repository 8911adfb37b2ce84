//! Prometheus metrics for connectors and fallback pulls

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

use crate::connector::ConnectionState;
use crate::error::Result;
use crate::venue::Venue;

/// Where a cached quote came from
#[derive(Debug, Clone, Copy)]
pub enum QuoteSource {
    Stream,
    Rest,
}

impl QuoteSource {
    fn as_str(&self) -> &'static str {
        match self {
            QuoteSource::Stream => "stream",
            QuoteSource::Rest => "rest",
        }
    }
}

pub struct Metrics {
    registry: Registry,
    frames_total: IntCounterVec,
    parse_errors_total: IntCounterVec,
    quotes_cached_total: IntCounterVec,
    reconnects_total: IntCounterVec,
    fallback_pulls_total: IntCounterVec,
    connection_state: IntGaugeVec,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("price_index".to_string()), None)?;

        let frames_total = IntCounterVec::new(
            Opts::new("frames_total", "Stream frames received"),
            &["venue"],
        )?;
        let parse_errors_total = IntCounterVec::new(
            Opts::new("parse_errors_total", "Stream frames dropped as malformed"),
            &["venue"],
        )?;
        let quotes_cached_total = IntCounterVec::new(
            Opts::new("quotes_cached_total", "Top-of-book records written to the cache"),
            &["venue", "source"],
        )?;
        let reconnects_total = IntCounterVec::new(
            Opts::new("reconnects_total", "Reconnects scheduled after a failure"),
            &["venue"],
        )?;
        let fallback_pulls_total = IntCounterVec::new(
            Opts::new("fallback_pulls_total", "One-shot depth pulls by outcome"),
            &["venue", "outcome"],
        )?;
        let connection_state = IntGaugeVec::new(
            Opts::new(
                "connection_state",
                "0 disconnected, 1 connecting, 2 subscribed, 3 closing",
            ),
            &["venue"],
        )?;

        registry.register(Box::new(frames_total.clone()))?;
        registry.register(Box::new(parse_errors_total.clone()))?;
        registry.register(Box::new(quotes_cached_total.clone()))?;
        registry.register(Box::new(reconnects_total.clone()))?;
        registry.register(Box::new(fallback_pulls_total.clone()))?;
        registry.register(Box::new(connection_state.clone()))?;

        Ok(Self {
            registry,
            frames_total,
            parse_errors_total,
            quotes_cached_total,
            reconnects_total,
            fallback_pulls_total,
            connection_state,
        })
    }

    pub fn frame_received(&self, venue: Venue) {
        self.frames_total.with_label_values(&[venue.as_str()]).inc();
    }

    pub fn parse_error(&self, venue: Venue) {
        self.parse_errors_total.with_label_values(&[venue.as_str()]).inc();
    }

    pub fn quote_cached(&self, venue: Venue, source: QuoteSource) {
        self.quotes_cached_total
            .with_label_values(&[venue.as_str(), source.as_str()])
            .inc();
    }

    pub fn reconnect_scheduled(&self, venue: Venue) {
        self.reconnects_total.with_label_values(&[venue.as_str()]).inc();
    }

    pub fn fallback_pull(&self, venue: Venue, ok: bool) {
        let outcome = if ok { "ok" } else { "failed" };
        self.fallback_pulls_total
            .with_label_values(&[venue.as_str(), outcome])
            .inc();
    }

    pub fn set_connection_state(&self, venue: Venue, state: ConnectionState) {
        let value = match state {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Subscribed => 2,
            ConnectionState::Closing => 3,
        };
        self.connection_state
            .with_label_values(&[venue.as_str()])
            .set(value);
    }

    pub fn parse_errors(&self, venue: Venue) -> u64 {
        self.parse_errors_total.with_label_values(&[venue.as_str()]).get()
    }

    pub fn fallback_pulls(&self, venue: Venue, ok: bool) -> u64 {
        let outcome = if ok { "ok" } else { "failed" };
        self.fallback_pulls_total
            .with_label_values(&[venue.as_str(), outcome])
            .get()
    }

    /// Prometheus text exposition of every metric
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::PriceIndexError::MetricsError(e.to_string()))
    }
}
