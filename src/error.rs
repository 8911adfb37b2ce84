//! Error types for the price index

use thiserror::Error;

/// Price index errors
#[derive(Error, Debug)]
pub enum PriceIndexError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("Invalid quote: bid {bid} / ask {ask}")]
    InvalidQuote { bid: f64, ask: f64 },

    #[error("Invalid trading pair: {0:?}")]
    InvalidPair(String),

    #[error("REST API error: {0}")]
    PullError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Connection timeout")]
    ConnectionTimeout,
}

impl PriceIndexError {
    /// Whether the error came from the transport rather than from the payload
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            PriceIndexError::WebSocketConnection(_)
                | PriceIndexError::WebSocketMessage(_)
                | PriceIndexError::ConnectionTimeout
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for PriceIndexError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        PriceIndexError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for PriceIndexError {
    fn from(err: serde_json::Error) -> Self {
        PriceIndexError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for PriceIndexError {
    fn from(err: reqwest::Error) -> Self {
        PriceIndexError::PullError(err.to_string())
    }
}

impl From<std::io::Error> for PriceIndexError {
    fn from(err: std::io::Error) -> Self {
        PriceIndexError::Io(err.to_string())
    }
}

impl From<::config::ConfigError> for PriceIndexError {
    fn from(err: ::config::ConfigError) -> Self {
        PriceIndexError::ConfigError(err.to_string())
    }
}

impl From<prometheus::Error> for PriceIndexError {
    fn from(err: prometheus::Error) -> Self {
        PriceIndexError::MetricsError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PriceIndexError>;
