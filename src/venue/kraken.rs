//! Kraken v1 book channel and REST depth protocol
//!
//! Book frames are arrays: `[channelID, {payload}, ({payload},) "book-N", "XBT/USDT"]`.
//! The first frame after subscribing carries `as`/`bs` snapshots, later frames
//! carry `a`/`b` changes and may split asks and bids across two objects.

use serde::Deserialize;
use serde_json::Value;

use super::split_pair;
use crate::error::{PriceIndexError, Result};
use crate::parser::{levels_from_value, DepthKind, DepthMessage, ParsedMessage, PriceLevel};

/// Kraken names bitcoin XBT
fn to_kraken_asset(asset: &str) -> &str {
    match asset {
        "BTC" => "XBT",
        other => other,
    }
}

fn from_kraken_asset(asset: &str) -> &str {
    match asset {
        "XBT" => "BTC",
        other => other,
    }
}

/// Websocket pair name, e.g. `BTCUSDT` -> `XBT/USDT`
pub fn ws_symbol(pair: &str) -> String {
    match split_pair(pair) {
        Some((base, quote)) => format!("{}/{}", to_kraken_asset(base), to_kraken_asset(quote)),
        None => pair.to_string(),
    }
}

/// REST pair name, e.g. `BTCUSDT` -> `XBTUSDT`
pub fn rest_symbol(pair: &str) -> String {
    ws_symbol(pair).replace('/', "")
}

/// Canonical pair from a websocket pair name, e.g. `XBT/USDT` -> `BTCUSDT`
pub fn pair_from_symbol(symbol: &str) -> String {
    match symbol.split_once('/') {
        Some((base, quote)) => format!(
            "{}{}",
            from_kraken_asset(&base.to_uppercase()),
            from_kraken_asset(&quote.to_uppercase())
        ),
        None => symbol.to_uppercase(),
    }
}

pub fn subscribe_frame(pairs: &[String], depth: usize) -> String {
    let symbols: Vec<String> = pairs.iter().map(|pair| ws_symbol(pair)).collect();
    serde_json::json!({
        "event": "subscribe",
        "pair": symbols,
        "subscription": { "name": "book", "depth": depth },
    })
    .to_string()
}

pub fn rest_query(pair: &str, depth: usize) -> Vec<(&'static str, String)> {
    vec![("pair", rest_symbol(pair)), ("count", depth.to_string())]
}

/// Event messages (status, heartbeat, subscription status)
#[derive(Debug, Clone, Deserialize)]
struct EventMessage {
    event: String,
    status: Option<String>,
    pair: Option<String>,
    #[serde(rename = "errorMessage")]
    error_message: Option<String>,
}

pub fn parse_message(raw: &str) -> Result<ParsedMessage> {
    let value: Value = serde_json::from_str(raw)?;

    match value {
        Value::Array(items) => parse_book(&items),
        Value::Object(_) => {
            let event: EventMessage = serde_json::from_value(value)?;
            Ok(parse_event(event))
        }
        _ => Ok(ParsedMessage::Unknown(raw.to_string())),
    }
}

fn parse_event(event: EventMessage) -> ParsedMessage {
    match event.event.as_str() {
        "heartbeat" => ParsedMessage::Heartbeat,
        "subscriptionStatus" if event.status.as_deref() == Some("subscribed") => {
            ParsedMessage::Subscribed(event.pair.unwrap_or_default())
        }
        "subscriptionStatus" => ParsedMessage::Rejected(format!(
            "{}: {}",
            event.pair.unwrap_or_default(),
            event.error_message.unwrap_or_else(|| "unknown error".to_string())
        )),
        other => ParsedMessage::Unknown(other.to_string()),
    }
}

fn parse_book(items: &[Value]) -> Result<ParsedMessage> {
    if items.len() < 4 {
        return Err(PriceIndexError::ParseError(format!(
            "book frame has {} elements",
            items.len()
        )));
    }

    let symbol = items[items.len() - 1]
        .as_str()
        .ok_or_else(|| PriceIndexError::ParseError("book frame without pair".to_string()))?;
    let channel = items[items.len() - 2].as_str().unwrap_or_default();
    if !channel.starts_with("book") {
        return Ok(ParsedMessage::Unknown(channel.to_string()));
    }

    let mut kind = DepthKind::Delta;
    let mut bids = Vec::new();
    let mut asks = Vec::new();

    for payload in &items[1..items.len() - 2] {
        let payload = payload
            .as_object()
            .ok_or_else(|| PriceIndexError::ParseError("book payload must be an object".to_string()))?;

        if let (Some(snapshot_asks), Some(snapshot_bids)) = (payload.get("as"), payload.get("bs")) {
            kind = DepthKind::Snapshot;
            asks.extend(levels_from_value(snapshot_asks)?);
            bids.extend(levels_from_value(snapshot_bids)?);
            continue;
        }
        if let Some(changes) = payload.get("a") {
            asks.extend(levels_from_value(changes)?);
        }
        if let Some(changes) = payload.get("b") {
            bids.extend(levels_from_value(changes)?);
        }
    }

    Ok(ParsedMessage::Depth(DepthMessage {
        pair: pair_from_symbol(symbol),
        kind,
        bids,
        asks,
    }))
}

/// REST depth response
#[derive(Debug, Deserialize)]
struct DepthResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: serde_json::Map<String, Value>,
}

pub fn parse_rest(body: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)> {
    let response: DepthResponse = serde_json::from_str(body)?;
    if !response.error.is_empty() {
        return Err(PriceIndexError::PullError(format!(
            "kraken: {}",
            response.error.join(", ")
        )));
    }

    // Result is keyed by Kraken's own pair name, which may differ from the request
    let book = response
        .result
        .values()
        .next()
        .ok_or_else(|| PriceIndexError::PullError("kraken: empty result".to_string()))?;

    let bids = levels_from_value(book.get("bids").unwrap_or(&Value::Null))?;
    let asks = levels_from_value(book.get("asks").unwrap_or(&Value::Null))?;
    Ok((bids, asks))
}
