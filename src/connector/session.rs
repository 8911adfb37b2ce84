//! Stream session loop
//!
//! Connects, subscribes, pumps frames into the normalizer and reconnects
//! with backoff until told to shut down or superseded by a newer session.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::{Action, ConnectionEvent, ConnectorCore, StreamSettings};
use crate::error::{PriceIndexError, Result};
use crate::websocket::WebSocketClient;

/// Control messages from the owning connector
#[derive(Debug)]
pub(super) enum Command {
    /// Send the subscription for the current pair set
    Resubscribe,
    Shutdown,
}

/// How a connected session ended without error
enum SessionEnd {
    Shutdown,
}

pub(super) struct Session {
    core: Arc<ConnectorCore>,
    generation: u64,
    settings: StreamSettings,
    commands: mpsc::UnboundedReceiver<Command>,
    client: WebSocketClient,
}

impl Session {
    pub(super) fn new(
        core: Arc<ConnectorCore>,
        generation: u64,
        settings: StreamSettings,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            core,
            generation,
            settings,
            commands,
            client: WebSocketClient::new(),
        }
    }

    /// Run until shut down; reconnects indefinitely on failure
    pub(super) async fn run(mut self) {
        let venue = self.core.venue;
        info!(venue = %venue, generation = self.generation, "Starting stream session");

        loop {
            if self.apply(ConnectionEvent::ConnectRequested) == Action::Stop {
                break;
            }

            let event = match self.connect_and_process().await {
                Ok(SessionEnd::Shutdown) => break,
                Err(e) if e.is_connection_error() => {
                    warn!(venue = %venue, error = %e, "Stream closed");
                    ConnectionEvent::Closed
                }
                Err(e) => {
                    error!(venue = %venue, error = %e, "Stream error");
                    ConnectionEvent::Errored
                }
            };
            self.client.close().await;

            let delay = match self.apply(event) {
                Action::Reconnect(delay) => delay,
                _ => break,
            };

            self.core.metrics.reconnect_scheduled(venue);
            warn!(
                venue = %venue,
                delay_secs = delay.as_secs(),
                "Reconnecting after backoff"
            );

            if !self.wait(delay).await {
                break;
            }
        }

        self.client.close().await;
        info!(venue = %venue, generation = self.generation, "Stream session finished");
    }

    fn apply(&self, event: ConnectionEvent) -> Action {
        self.core.apply(self.generation, event)
    }

    /// Connect, subscribe and process frames until the socket fails or a shutdown arrives
    async fn connect_and_process(&mut self) -> Result<SessionEnd> {
        {
            let connect = timeout(
                self.settings.connect_timeout,
                self.client.connect(&self.settings.endpoint),
            );
            tokio::pin!(connect);

            loop {
                tokio::select! {
                    result = &mut connect => {
                        result.map_err(|_| PriceIndexError::ConnectionTimeout)??;
                        break;
                    }
                    command = self.commands.recv() => {
                        if matches!(command, None | Some(Command::Shutdown)) {
                            return Ok(SessionEnd::Shutdown);
                        }
                    }
                }
            }
        }

        match self.core.open(self.generation) {
            Action::Subscribe => self.send_subscription().await?,
            _ => return Ok(SessionEnd::Shutdown),
        }

        let mut last_message = Instant::now();

        loop {
            tokio::select! {
                received = timeout(self.settings.keepalive, self.client.recv()) => match received {
                    Ok(Ok(Some(frame))) => {
                        last_message = Instant::now();
                        if let Some(reply) = self.core.handle_frame(self.generation, &frame).await {
                            debug!(venue = %self.core.venue, "Answering application ping");
                            self.client.send_text(reply).await?;
                        }
                    }
                    Ok(Ok(None)) => {
                        last_message = Instant::now();
                    }
                    Ok(Err(e)) => return Err(e),
                    Err(_) => {
                        if last_message.elapsed() >= self.settings.recv_timeout {
                            warn!(
                                venue = %self.core.venue,
                                last_message_secs = last_message.elapsed().as_secs(),
                                "No message received within timeout, reconnecting"
                            );
                            return Err(PriceIndexError::ConnectionTimeout);
                        }
                        debug!(venue = %self.core.venue, "Sending keepalive ping");
                        self.client.ping().await?;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Resubscribe) => self.send_subscription().await?,
                    None | Some(Command::Shutdown) => return Ok(SessionEnd::Shutdown),
                },
            }
        }
    }

    async fn send_subscription(&mut self) -> Result<()> {
        let pairs = self.core.pairs();
        let frames = self.core.venue.subscribe_frames(&pairs, self.settings.depth);
        for frame in frames {
            self.client.send_text(frame).await?;
        }
        info!(venue = %self.core.venue, pairs = ?pairs, "Subscription sent");
        Ok(())
    }

    /// Sleep out a backoff delay; false when a shutdown arrives first
    async fn wait(&mut self, delay: Duration) -> bool {
        let pause = sleep(delay);
        tokio::pin!(pause);

        loop {
            tokio::select! {
                _ = &mut pause => return true,
                command = self.commands.recv() => {
                    if matches!(command, None | Some(Command::Shutdown)) {
                        return false;
                    }
                }
            }
        }
    }
}
