//! Venue identities and pair symbology
//!
//! Each venue names pairs differently and speaks its own subscription
//! protocol. Everything venue-specific lives in the submodules; the rest of
//! the crate only sees [`Venue`] and canonical pair names such as `BTCUSDT`.

pub mod binance;
pub mod huobi;
pub mod kraken;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{PriceIndexError, Result};

/// An external exchange feeding the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Binance,
    Kraken,
    Huobi,
}

impl Venue {
    pub const ALL: [Venue; 3] = [Venue::Binance, Venue::Kraken, Venue::Huobi];

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Binance => "binance",
            Venue::Kraken => "kraken",
            Venue::Huobi => "huobi",
        }
    }

    /// Frames to send on an open stream to subscribe to `pairs`
    pub fn subscribe_frames(&self, pairs: &[String], depth: usize) -> Vec<String> {
        if pairs.is_empty() {
            return Vec::new();
        }
        match self {
            Venue::Binance => vec![binance::subscribe_frame(pairs, depth)],
            Venue::Kraken => vec![kraken::subscribe_frame(pairs, depth)],
            Venue::Huobi => pairs
                .iter()
                .map(|pair| huobi::subscribe_frame(pair))
                .collect(),
        }
    }

    /// Query string of the one-shot depth request for `pair`
    pub fn rest_query(&self, pair: &str, depth: usize) -> Vec<(&'static str, String)> {
        match self {
            Venue::Binance => binance::rest_query(pair, depth),
            Venue::Kraken => kraken::rest_query(pair, depth),
            Venue::Huobi => huobi::rest_query(pair, depth),
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Venue {
    type Err = PriceIndexError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Venue::Binance),
            "kraken" => Ok(Venue::Kraken),
            "huobi" => Ok(Venue::Huobi),
            other => Err(PriceIndexError::ConfigError(format!("unknown venue {other}"))),
        }
    }
}

/// Quote assets recognised when a canonical pair must be split
const QUOTE_ASSETS: [&str; 7] = ["USDT", "USDC", "USD", "EUR", "GBP", "BTC", "ETH"];

/// Canonical form of a user supplied pair: trimmed, upper-case, alphanumeric
pub fn normalize_pair(raw: &str) -> Result<String> {
    let pair = raw.trim().to_ascii_uppercase();
    if pair.len() < 4 || pair.len() > 20 || !pair.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(PriceIndexError::InvalidPair(raw.to_string()));
    }
    Ok(pair)
}

/// Split a canonical pair into base and quote assets
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    QUOTE_ASSETS.iter().find_map(|quote| {
        pair.strip_suffix(quote)
            .filter(|base| !base.is_empty())
            .map(|base| (base, &pair[base.len()..]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pair() {
        assert_eq!(normalize_pair(" btcusdt ").unwrap(), "BTCUSDT");
        assert_eq!(normalize_pair("EthUsdc").unwrap(), "ETHUSDC");
        assert!(matches!(
            normalize_pair("BTC/USDT"),
            Err(PriceIndexError::InvalidPair(_))
        ));
        assert!(normalize_pair("").is_err());
    }

    #[test]
    fn test_split_pair_prefers_longest_quote() {
        assert_eq!(split_pair("BTCUSDT"), Some(("BTC", "USDT")));
        assert_eq!(split_pair("BTCUSD"), Some(("BTC", "USD")));
        assert_eq!(split_pair("ETHBTC"), Some(("ETH", "BTC")));
        assert_eq!(split_pair("USDT"), None);
        assert_eq!(split_pair("FOOBAR"), None);
    }

    #[test]
    fn test_venue_names_round_trip() {
        for venue in Venue::ALL {
            assert_eq!(venue.as_str().parse::<Venue>().unwrap(), venue);
        }
        assert!("bitstamp".parse::<Venue>().is_err());
    }

    #[test]
    fn test_huobi_subscribes_once_per_pair() {
        let pairs = vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()];
        assert_eq!(Venue::Huobi.subscribe_frames(&pairs, 5).len(), 2);
        assert_eq!(Venue::Binance.subscribe_frames(&pairs, 20).len(), 1);
        assert!(Venue::Kraken.subscribe_frames(&[], 10).is_empty());
    }
}
