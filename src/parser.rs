//! Normalizer for venue messages
//!
//! Turns venue-specific frames (plain JSON, combined-stream envelopes,
//! gzip-compressed binary frames) into one normalized [`ParsedMessage`],
//! and depth payloads into a [`TopOfBook`].

use flate2::read::GzDecoder;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::borrow::Cow;
use std::io::Read;
use std::str::FromStr;

use crate::error::{PriceIndexError, Result};
use crate::orderbook::TopOfBook;
use crate::venue::{binance, huobi, kraken, Venue};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on an inflated gzip frame
pub const MAX_INFLATED_FRAME: u64 = 4 * 1024 * 1024;

/// A raw frame as received from a venue stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

impl Frame {
    /// Textual payload, inflating gzip-compressed binary frames
    pub fn text(&self) -> Result<Cow<'_, str>> {
        match self {
            Frame::Text(text) => Ok(Cow::Borrowed(text)),
            Frame::Binary(data) if data.starts_with(&GZIP_MAGIC) => {
                let mut text = String::new();
                GzDecoder::new(data.as_slice())
                    .take(MAX_INFLATED_FRAME + 1)
                    .read_to_string(&mut text)
                    .map_err(|e| PriceIndexError::ParseError(format!("gzip frame: {}", e)))?;
                if text.len() as u64 > MAX_INFLATED_FRAME {
                    return Err(PriceIndexError::ParseError(format!(
                        "gzip frame inflates past {} bytes",
                        MAX_INFLATED_FRAME
                    )));
                }
                Ok(Cow::Owned(text))
            }
            Frame::Binary(data) => std::str::from_utf8(data)
                .map(Cow::Borrowed)
                .map_err(|e| PriceIndexError::ParseError(format!("binary frame: {}", e))),
        }
    }
}

/// Price level (price, quantity pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

/// Whether a depth message carries the full visible book or only changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthKind {
    Snapshot,
    Delta,
}

/// Depth payload for one pair, already mapped to the canonical pair name
#[derive(Debug, Clone)]
pub struct DepthMessage {
    pub pair: String,
    pub kind: DepthKind,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}

/// Parsed venue stream message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Depth(DepthMessage),
    /// Application-level ping; the payload is the reply to send back
    Ping(String),
    /// Subscription acknowledged by the venue
    Subscribed(String),
    /// Subscription refused by the venue
    Rejected(String),
    Heartbeat,
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw frame received from `venue`
    pub fn parse(venue: Venue, frame: &Frame) -> Result<Self> {
        let text = frame.text()?;
        match venue {
            Venue::Binance => binance::parse_message(&text),
            Venue::Kraken => kraken::parse_message(&text),
            Venue::Huobi => huobi::parse_message(&text),
        }
    }
}

/// Parse a stream frame carrying a full depth snapshot into a top-of-book record
pub fn parse_depth(venue: Venue, frame: &Frame) -> Result<TopOfBook> {
    match ParsedMessage::parse(venue, frame)? {
        ParsedMessage::Depth(depth) if depth.kind == DepthKind::Snapshot => {
            TopOfBook::from_levels(venue, &depth.pair, &depth.bids, &depth.asks)
        }
        ParsedMessage::Depth(depth) => Err(PriceIndexError::ParseError(format!(
            "incremental update for {} carries no full book",
            depth.pair
        ))),
        other => Err(PriceIndexError::ParseError(format!(
            "not a depth message: {:?}",
            other
        ))),
    }
}

/// Parse the body of a one-shot depth request for `pair`
pub fn parse_rest(venue: Venue, pair: &str, body: &str) -> Result<TopOfBook> {
    let (bids, asks) = match venue {
        Venue::Binance => binance::parse_rest(body)?,
        Venue::Kraken => kraken::parse_rest(body)?,
        Venue::Huobi => huobi::parse_rest(body)?,
    };
    TopOfBook::from_levels(venue, pair, &bids, &asks)
}

/// Decimal from a JSON string or number
pub(crate) fn decimal_from_value(value: &Value) -> Result<Decimal> {
    let raw = match value {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => {
            return Err(PriceIndexError::ParseError(format!(
                "expected a numeric value, got {}",
                other
            )))
        }
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(|e| PriceIndexError::ParseError(format!("invalid number {}: {}", raw, e)))
}

/// One `[price, size, ...]` entry; trailing elements are ignored
fn level_from_values(entry: &[Value]) -> Result<PriceLevel> {
    if entry.len() < 2 {
        return Err(PriceIndexError::ParseError(
            "Invalid price level format".to_string(),
        ));
    }
    Ok(PriceLevel {
        price: decimal_from_value(&entry[0])?,
        quantity: decimal_from_value(&entry[1])?,
    })
}

/// Price levels from an untyped JSON array of level arrays
pub(crate) fn levels_from_value(value: &Value) -> Result<Vec<PriceLevel>> {
    let entries = value
        .as_array()
        .ok_or_else(|| PriceIndexError::ParseError("price levels must be an array".to_string()))?;
    entries
        .iter()
        .map(|entry| {
            entry
                .as_array()
                .ok_or_else(|| {
                    PriceIndexError::ParseError("price level must be an array".to_string())
                })
                .and_then(|entry| level_from_values(entry))
        })
        .collect()
}

/// Custom deserializer for price levels from arrays of strings or numbers
pub(crate) fn deserialize_price_levels<'de, D>(
    deserializer: D,
) -> std::result::Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<Value>> = Deserialize::deserialize(deserializer)?;
    raw.iter()
        .map(|entry| level_from_values(entry).map_err(serde::de::Error::custom))
        .collect()
}
