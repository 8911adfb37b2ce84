//! Huobi market depth protocol
//!
//! Stream frames arrive gzip-compressed; the connector inflates them before
//! they reach this module. Huobi pings at the application level and drops
//! connections that do not answer with the same value.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PriceIndexError, Result};
use crate::parser::{deserialize_price_levels, DepthKind, DepthMessage, ParsedMessage, PriceLevel};

/// Depth channel of a pair, e.g. `market.btcusdt.depth.step0`
pub fn channel(pair: &str) -> String {
    format!("market.{}.depth.step0", pair.to_lowercase())
}

/// Canonical pair from a channel name
fn pair_from_channel(channel: &str) -> Option<String> {
    let mut parts = channel.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("market"), Some(symbol), Some("depth")) if !symbol.is_empty() => {
            Some(symbol.replace('_', "").to_uppercase())
        }
        _ => None,
    }
}

pub fn subscribe_frame(pair: &str) -> String {
    let channel = channel(pair);
    serde_json::json!({ "sub": channel, "id": channel }).to_string()
}

pub fn rest_query(pair: &str, depth: usize) -> Vec<(&'static str, String)> {
    vec![
        ("symbol", pair.to_lowercase()),
        ("depth", depth.to_string()),
        ("type", "step0".to_string()),
    ]
}

/// Depth tick shared by stream and REST payloads
#[derive(Debug, Clone, Deserialize)]
pub struct Tick {
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

pub fn parse_message(raw: &str) -> Result<ParsedMessage> {
    let value: Value = serde_json::from_str(raw)?;

    if let Some(ping) = value.get("ping") {
        return Ok(ParsedMessage::Ping(serde_json::json!({ "pong": ping }).to_string()));
    }

    if let Some(channel) = value.get("ch").and_then(Value::as_str) {
        let pair = pair_from_channel(channel)
            .ok_or_else(|| PriceIndexError::ParseError(format!("unexpected channel {}", channel)))?;
        let tick = value
            .get("tick")
            .cloned()
            .ok_or_else(|| PriceIndexError::ParseError(format!("{} without tick", channel)))?;
        let tick: Tick = serde_json::from_value(tick)?;
        return Ok(ParsedMessage::Depth(DepthMessage {
            pair,
            kind: DepthKind::Snapshot,
            bids: tick.bids,
            asks: tick.asks,
        }));
    }

    match value.get("status").and_then(Value::as_str) {
        Some("ok") => Ok(ParsedMessage::Subscribed(
            value
                .get("subbed")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        )),
        Some(_) => Ok(ParsedMessage::Rejected(
            value
                .get("err-msg")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string(),
        )),
        None => Ok(ParsedMessage::Unknown(raw.to_string())),
    }
}

pub fn parse_rest(body: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)> {
    let value: Value = serde_json::from_str(body)?;
    if value.get("status").and_then(Value::as_str) != Some("ok") {
        let reason = value
            .get("err-msg")
            .and_then(Value::as_str)
            .unwrap_or("unexpected response");
        return Err(PriceIndexError::PullError(format!("huobi: {}", reason)));
    }

    let tick = value
        .get("tick")
        .cloned()
        .ok_or_else(|| PriceIndexError::PullError("huobi: response without tick".to_string()))?;
    let tick: Tick = serde_json::from_value(tick)?;
    Ok((tick.bids, tick.asks))
}
