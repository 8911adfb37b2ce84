//! Configuration module for the price index

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

use crate::error::{PriceIndexError, Result};
use crate::venue::Venue;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pairs tracked from startup (e.g., ["BTCUSDT"])
    pub default_pairs: Vec<String>,

    /// Listen address of the HTTP surface
    pub http_addr: String,

    /// Period of the refresh pass over every tracked pair
    pub refresh_interval_ms: u64,

    /// Lifetime of a cached venue snapshot
    pub cache_ttl_ms: u64,

    /// Reconnection settings
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,

    /// Upper bound for opening a stream
    pub connect_timeout_ms: u64,

    /// Upper bound for a fallback pull
    pub request_timeout_ms: u64,

    /// Stream is considered stale after this long without a frame
    pub recv_timeout_secs: u64,

    /// Idle time after which a keepalive ping is sent
    pub keepalive_secs: u64,

    /// How long a price request waits for the first quote of a new pair
    pub first_quote_wait_ms: u64,

    pub venues: VenuesConfig,
}

/// Per-venue connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuesConfig {
    #[serde(default = "VenueConfig::binance")]
    pub binance: VenueConfig,
    #[serde(default = "VenueConfig::kraken")]
    pub kraken: VenueConfig,
    #[serde(default = "VenueConfig::huobi")]
    pub huobi: VenueConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub ws_endpoint: String,
    pub rest_endpoint: String,
    /// Book depth requested from the venue
    pub depth: usize,
}

fn enabled_by_default() -> bool {
    true
}

impl VenueConfig {
    pub fn binance() -> Self {
        Self {
            enabled: true,
            ws_endpoint: "wss://stream.binance.com:9443/stream".to_string(),
            rest_endpoint: "https://api.binance.com/api/v3/depth".to_string(),
            depth: 20,
        }
    }

    pub fn kraken() -> Self {
        Self {
            enabled: true,
            ws_endpoint: "wss://ws.kraken.com".to_string(),
            rest_endpoint: "https://api.kraken.com/0/public/Depth".to_string(),
            depth: 10,
        }
    }

    pub fn huobi() -> Self {
        Self {
            enabled: true,
            ws_endpoint: "wss://api.huobi.pro/ws".to_string(),
            rest_endpoint: "https://api.huobi.pro/market/depth".to_string(),
            depth: 5,
        }
    }
}

impl Default for VenuesConfig {
    fn default() -> Self {
        Self {
            binance: VenueConfig::binance(),
            kraken: VenueConfig::kraken(),
            huobi: VenueConfig::huobi(),
        }
    }
}

impl VenuesConfig {
    pub fn get(&self, venue: Venue) -> &VenueConfig {
        match venue {
            Venue::Binance => &self.binance,
            Venue::Kraken => &self.kraken,
            Venue::Huobi => &self.huobi,
        }
    }

    /// Venues that take part in the index
    pub fn enabled(&self) -> Vec<Venue> {
        Venue::ALL
            .into_iter()
            .filter(|venue| self.get(*venue).enabled)
            .collect()
    }
}

impl Config {
    /// Load configuration from `.env`, `config/default.toml` and the environment
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        let config = Self::load_from(Path::new("config/default"))?;
        Ok(config)
    }

    /// Load configuration from an optional file plus `PRICE_INDEX__*` variables
    pub fn load_from(path: &Path) -> Result<Self> {
        let source = ::config::Config::builder()
            .add_source(::config::Config::try_from(&Config::default())?)
            .add_source(::config::File::from(path).required(false))
            .add_source(
                ::config::Environment::with_prefix("PRICE_INDEX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Config = source.try_deserialize()?;

        if let Ok(pairs) = env::var("PRICE_INDEX_PAIRS") {
            config.default_pairs = pairs
                .split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("refresh_interval_ms", self.refresh_interval_ms),
            ("cache_ttl_ms", self.cache_ttl_ms),
            ("reconnect_initial_ms", self.reconnect_initial_ms),
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
            ("recv_timeout_secs", self.recv_timeout_secs),
            ("keepalive_secs", self.keepalive_secs),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(PriceIndexError::ConfigError(format!("{name} must be positive")));
        }

        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(PriceIndexError::ConfigError(
                "reconnect_max_ms is below reconnect_initial_ms".to_string(),
            ));
        }

        let enabled = self.venues.enabled();
        if enabled.is_empty() {
            return Err(PriceIndexError::ConfigError("no venue enabled".to_string()));
        }
        for venue in enabled {
            if self.venues.get(venue).depth == 0 {
                return Err(PriceIndexError::ConfigError(format!("{venue} depth must be positive")));
            }
        }

        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn first_quote_wait(&self) -> Duration {
        Duration::from_millis(self.first_quote_wait_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_pairs: vec!["BTCUSDT".to_string()],
            http_addr: "0.0.0.0:3000".to_string(),
            refresh_interval_ms: 6_000,
            cache_ttl_ms: 60_000,
            reconnect_initial_ms: 5_000,
            reconnect_max_ms: 60_000,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 5_000,
            recv_timeout_secs: 45,
            keepalive_secs: 30,
            first_quote_wait_ms: 1_000,
            venues: VenuesConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_interval(), Duration::from_millis(6_000));
        assert_eq!(config.cache_ttl(), Duration::from_millis(60_000));
        assert_eq!(config.venues.enabled().len(), 3);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price-index.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
refresh_interval_ms = 2500
default_pairs = ["ETHUSDT", "BTCUSDT"]

[venues.kraken]
enabled = false
ws_endpoint = "wss://ws.kraken.com"
rest_endpoint = "https://api.kraken.com/0/public/Depth"
depth = 25
"#
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.refresh_interval_ms, 2500);
        assert_eq!(config.default_pairs, vec!["ETHUSDT", "BTCUSDT"]);
        assert_eq!(config.venues.kraken.depth, 25);
        assert_eq!(config.venues.enabled(), vec![Venue::Binance, Venue::Huobi]);
        // untouched sections keep their defaults
        assert_eq!(config.venues.binance.depth, 20);
        assert_eq!(config.cache_ttl_ms, 60_000);
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let config = Config {
            reconnect_initial_ms: 10_000,
            reconnect_max_ms: 1_000,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(PriceIndexError::ConfigError(_))
        ));
    }

    #[test]
    fn test_validate_rejects_all_venues_disabled() {
        let mut config = Config::default();
        config.venues.binance.enabled = false;
        config.venues.kraken.enabled = false;
        config.venues.huobi.enabled = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_venue_field_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price-index.toml");
        std::fs::write(&path, "[venues.kraken]\nenabled = false\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert!(!config.venues.kraken.enabled);
        assert_eq!(config.venues.kraken.ws_endpoint, "wss://ws.kraken.com");
        assert_eq!(config.venues.kraken.depth, 10);
        assert_eq!(config.venues.enabled(), vec![Venue::Binance, Venue::Huobi]);
    }
}
