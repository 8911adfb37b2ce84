//! Venue stream connectors
//!
//! A [`VenueConnector`] owns one stream session at a time: it subscribes to
//! the tracked pairs, normalizes every depth message into the snapshot cache
//! and reconnects with backoff when the stream drops. Each connector is an
//! independent object; nothing is shared between venues except the cache.

mod session;
mod state;

pub use state::{
    Action, Backoff, ConnectionEvent, ConnectionState, ConnectionStateMachine, INITIAL_BACKOFF,
    MAX_BACKOFF,
};

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::cache::SnapshotCache;
use crate::config::Config;
use crate::metrics::{Metrics, QuoteSource};
use crate::orderbook::DepthBooks;
use crate::parser::{Frame, ParsedMessage};
use crate::venue::Venue;
use session::{Command, Session};

/// Stream side of a venue, as seen by the connector manager
#[cfg_attr(test, mockall::automock)]
pub trait StreamConnector: Send + Sync {
    fn venue(&self) -> Venue;

    fn state(&self) -> ConnectionState;

    /// True only while subscribed
    fn is_connected(&self) -> bool;

    /// Whether a session was ever started and not closed since
    fn is_started(&self) -> bool;

    fn connect(&self, pairs: Vec<String>);

    /// Hot-update the subscription; returns whether anything was sent
    fn update_subscription(&self, pairs: Vec<String>) -> bool;

    fn close(&self);
}

/// Timing and endpoint of a stream session
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub endpoint: String,
    pub depth: usize,
    pub connect_timeout: Duration,
    pub recv_timeout: Duration,
    pub keepalive: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl StreamSettings {
    pub fn from_config(config: &Config, venue: Venue) -> Self {
        let venue_config = config.venues.get(venue);
        Self {
            endpoint: venue_config.ws_endpoint.clone(),
            depth: venue_config.depth,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            recv_timeout: Duration::from_secs(config.recv_timeout_secs),
            keepalive: Duration::from_secs(config.keepalive_secs),
            backoff_initial: Duration::from_millis(config.reconnect_initial_ms),
            backoff_max: Duration::from_millis(config.reconnect_max_ms),
        }
    }

    fn backoff(&self) -> Backoff {
        Backoff::new(self.backoff_initial, self.backoff_max)
    }
}

/// State machine tagged with the session generation it belongs to
struct Lifecycle {
    generation: u64,
    machine: ConnectionStateMachine,
}

/// State shared between a connector and its running session
struct ConnectorCore {
    venue: Venue,
    lifecycle: Mutex<Lifecycle>,
    pairs: Mutex<Vec<String>>,
    books: Mutex<DepthBooks>,
    cache: SnapshotCache,
    metrics: Arc<Metrics>,
}

impl ConnectorCore {
    fn state(&self) -> ConnectionState {
        self.lifecycle.lock().machine.state()
    }

    fn generation(&self) -> u64 {
        self.lifecycle.lock().generation
    }

    fn pairs(&self) -> Vec<String> {
        self.pairs.lock().clone()
    }

    /// Feed an event from session `generation`; superseded sessions are told to stop
    fn apply(&self, generation: u64, event: ConnectionEvent) -> Action {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return Action::Stop;
        }

        let before = lifecycle.machine.state();
        let action = lifecycle.machine.on_event(event);
        let after = lifecycle.machine.state();
        drop(lifecycle);

        if before != after {
            info!(venue = %self.venue, from = %before, to = %after, "Connection state changed");
            self.metrics.set_connection_state(self.venue, after);
        }
        action
    }

    /// Socket of session `generation` opened; books restart from fresh snapshots.
    ///
    /// A superseded session gets `Stop` and leaves the current books alone.
    fn open(&self, generation: u64) -> Action {
        let action = self.apply(generation, ConnectionEvent::Opened);
        if action == Action::Subscribe {
            self.books.lock().clear();
        }
        action
    }

    /// Normalize one frame into the cache; returns a reply to send, if any
    async fn handle_frame(&self, generation: u64, frame: &Frame) -> Option<String> {
        self.metrics.frame_received(self.venue);

        let parsed = match ParsedMessage::parse(self.venue, frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.metrics.parse_error(self.venue);
                warn!(venue = %self.venue, error = %e, "Dropping malformed message");
                return None;
            }
        };

        match parsed {
            ParsedMessage::Depth(depth) => {
                let result = self.books.lock().apply(&depth);
                match result {
                    Some(Ok(top)) => {
                        trace!(
                            venue = %self.venue,
                            pair = %top.pair(),
                            mid = top.mid(),
                            spread_bps = ?top.spread_bps(),
                            "Top of book updated"
                        );
                        self.cache.put_book(top).await;
                        self.metrics.quote_cached(self.venue, QuoteSource::Stream);
                        self.apply(generation, ConnectionEvent::Message);
                    }
                    Some(Err(e)) => {
                        warn!(venue = %self.venue, pair = %depth.pair, error = %e, "Dropping invalid quote");
                    }
                    None => {
                        debug!(venue = %self.venue, pair = %depth.pair, "Book not ready, update skipped");
                    }
                }
                None
            }
            ParsedMessage::Ping(reply) => Some(reply),
            ParsedMessage::Subscribed(topic) => {
                info!(venue = %self.venue, topic = %topic, "Subscription acknowledged");
                self.apply(generation, ConnectionEvent::Acknowledged);
                None
            }
            ParsedMessage::Rejected(reason) => {
                warn!(venue = %self.venue, reason = %reason, "Subscription rejected");
                None
            }
            ParsedMessage::Heartbeat => {
                trace!(venue = %self.venue, "Heartbeat");
                None
            }
            ParsedMessage::Unknown(msg) => {
                trace!(venue = %self.venue, msg = %msg, "Unknown message type");
                None
            }
        }
    }
}

/// Stream connector of one venue
pub struct VenueConnector {
    core: Arc<ConnectorCore>,
    settings: StreamSettings,
    control: Mutex<Option<mpsc::UnboundedSender<Command>>>,
}

impl VenueConnector {
    pub fn new(
        venue: Venue,
        settings: StreamSettings,
        cache: SnapshotCache,
        metrics: Arc<Metrics>,
    ) -> Self {
        let core = ConnectorCore {
            venue,
            lifecycle: Mutex::new(Lifecycle {
                generation: 0,
                machine: ConnectionStateMachine::new(settings.backoff()),
            }),
            pairs: Mutex::new(Vec::new()),
            books: Mutex::new(DepthBooks::new(venue, settings.depth)),
            cache,
            metrics,
        };

        Self {
            core: Arc::new(core),
            settings,
            control: Mutex::new(None),
        }
    }

    pub fn venue(&self) -> Venue {
        self.core.venue
    }

    pub fn state(&self) -> ConnectionState {
        self.core.state()
    }

    /// True only in [`ConnectionState::Subscribed`]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Subscribed
    }

    pub fn is_started(&self) -> bool {
        self.control.lock().is_some()
    }

    /// Pairs the next subscription will cover
    pub fn pairs(&self) -> Vec<String> {
        self.core.pairs()
    }

    /// Start a new session subscribed to `pairs`, stopping any running one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self, pairs: Vec<String>) {
        let mut control = self.control.lock();

        let generation = {
            let mut lifecycle = self.core.lifecycle.lock();
            if lifecycle.machine.state() == ConnectionState::Closing {
                debug!(venue = %self.core.venue, "Connector closed, connect ignored");
                return;
            }
            lifecycle.generation += 1;
            lifecycle.machine = ConnectionStateMachine::new(self.settings.backoff());
            lifecycle.generation
        };

        if let Some(previous) = control.take() {
            info!(venue = %self.core.venue, "Replacing running stream session");
            let _ = previous.send(Command::Shutdown);
        }

        *self.core.pairs.lock() = pairs;

        let (sender, receiver) = mpsc::unbounded_channel();
        let session = Session::new(
            self.core.clone(),
            generation,
            self.settings.clone(),
            receiver,
        );
        tokio::spawn(session.run());
        *control = Some(sender);
    }

    /// Send a subscription for the full `pairs` set on the open socket.
    ///
    /// Nothing is sent when the set is unchanged or the stream is not
    /// subscribed; the set is still remembered so the next reconnect
    /// subscribes to it.
    pub fn update_subscription(&self, pairs: Vec<String>) -> bool {
        let changed = {
            let mut current = self.core.pairs.lock();
            let changed = *current != pairs;
            *current = pairs;
            changed
        };

        if !changed || !self.is_connected() {
            return false;
        }

        match self.control.lock().as_ref() {
            Some(sender) => sender.send(Command::Resubscribe).is_ok(),
            None => false,
        }
    }

    /// Shut down for good: releases the socket and cancels any pending reconnect
    pub fn close(&self) {
        let generation = self.core.generation();
        self.core.apply(generation, ConnectionEvent::ShutdownRequested);

        if let Some(sender) = self.control.lock().take() {
            let _ = sender.send(Command::Shutdown);
        }
        info!(venue = %self.core.venue, "Connector closed");
    }

    /// Run one received frame through the normalizer into the cache.
    ///
    /// Returns the reply the venue expects (e.g. a pong), if any.
    pub async fn handle_frame(&self, frame: &Frame) -> Option<String> {
        let generation = self.core.generation();
        self.core.handle_frame(generation, frame).await
    }
}

impl StreamConnector for VenueConnector {
    fn venue(&self) -> Venue {
        VenueConnector::venue(self)
    }

    fn state(&self) -> ConnectionState {
        VenueConnector::state(self)
    }

    fn is_connected(&self) -> bool {
        VenueConnector::is_connected(self)
    }

    fn is_started(&self) -> bool {
        VenueConnector::is_started(self)
    }

    fn connect(&self, pairs: Vec<String>) {
        VenueConnector::connect(self, pairs)
    }

    fn update_subscription(&self, pairs: Vec<String>) -> bool {
        VenueConnector::update_subscription(self, pairs)
    }

    fn close(&self) {
        VenueConnector::close(self)
    }
}
