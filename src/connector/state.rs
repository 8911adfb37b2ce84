//! Connection state machine and reconnect backoff
//!
//! Socket callbacks are reduced to typed [`ConnectionEvent`]s; the machine
//! answers each with an [`Action`] for the session loop to carry out. Nothing
//! here touches the network, so transitions can be tested directly.

use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Delay before the first reconnect attempt
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(5_000);
/// Upper bound of the reconnect delay
pub const MAX_BACKOFF: Duration = Duration::from_millis(60_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Subscribed,
    /// Deliberate shutdown; terminal
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Closing => "closing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// A connect attempt is starting
    ConnectRequested,
    /// The socket opened
    Opened,
    /// The venue acknowledged the subscription
    Acknowledged,
    /// A depth message was applied
    Message,
    /// The socket closed without being asked to
    Closed,
    /// Transport failure, including a failed connect attempt
    Errored,
    /// Deliberate shutdown
    ShutdownRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    /// Send the subscription for the current pair set
    Subscribe,
    /// Reconnect after the given delay
    Reconnect(Duration),
    /// Leave the session loop
    Stop,
}

/// Exponential reconnect delay: doubles per consecutive failure, capped
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay for this failure; advances the delay for the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }

    /// Delay the next failure would get
    pub fn peek(&self) -> Duration {
        self.current
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    backoff: Backoff,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new(Backoff::default())
    }
}

impl ConnectionStateMachine {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn on_event(&mut self, event: ConnectionEvent) -> Action {
        use ConnectionEvent::*;
        use ConnectionState::*;

        if self.state == Closing {
            return Action::Stop;
        }

        match event {
            ConnectRequested => {
                self.state = Connecting;
                Action::None
            }
            Opened => {
                self.backoff.reset();
                self.state = Connecting;
                Action::Subscribe
            }
            Acknowledged | Message => {
                if self.state == Connecting {
                    self.state = Subscribed;
                }
                Action::None
            }
            Closed | Errored => {
                self.state = Disconnected;
                Action::Reconnect(self.backoff.next_delay())
            }
            ShutdownRequested => {
                self.state = Closing;
                Action::Stop
            }
        }
    }
}
