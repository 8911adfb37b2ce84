//! Binance combined-stream and REST depth protocol

use serde::Deserialize;
use serde_json::Value;

use crate::error::{PriceIndexError, Result};
use crate::parser::{deserialize_price_levels, DepthKind, DepthMessage, ParsedMessage, PriceLevel};

/// Binance partial book depth payload (stream `data` and REST body)
#[derive(Debug, Clone, Deserialize)]
pub struct PartialDepth {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    /// Bids
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Binance diff depth event
#[derive(Debug, Clone, Deserialize)]
pub struct DepthUpdate {
    /// Event type
    #[serde(rename = "e")]
    pub event_type: String,

    /// Event time (milliseconds)
    #[serde(rename = "E")]
    pub event_time: u64,

    /// Symbol
    #[serde(rename = "s")]
    pub symbol: String,

    /// Bids to update
    #[serde(rename = "b", deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks to update
    #[serde(rename = "a", deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    /// Stream name
    pub stream: String,

    /// Data payload
    pub data: Value,
}

/// Partial depth stream name, e.g. `btcusdt@depth20@100ms`
pub fn stream_name(pair: &str, depth: usize) -> String {
    format!("{}@depth{}@100ms", pair.to_lowercase(), depth)
}

pub fn subscribe_frame(pairs: &[String], depth: usize) -> String {
    let streams: Vec<String> = pairs.iter().map(|pair| stream_name(pair, depth)).collect();
    serde_json::json!({
        "method": "SUBSCRIBE",
        "params": streams,
        "id": chrono::Utc::now().timestamp_millis(),
    })
    .to_string()
}

pub fn rest_query(pair: &str, depth: usize) -> Vec<(&'static str, String)> {
    vec![("symbol", pair.to_uppercase()), ("limit", depth.to_string())]
}

/// Canonical pair from a stream name
fn pair_from_stream(stream: &str) -> Option<String> {
    stream
        .split('@')
        .next()
        .filter(|symbol| !symbol.is_empty())
        .map(|symbol| symbol.to_uppercase())
}

pub fn parse_message(raw: &str) -> Result<ParsedMessage> {
    let value: Value = serde_json::from_str(raw)?;

    // Combined streams wrap every payload with its stream name
    if let Ok(stream_msg) = serde_json::from_value::<StreamMessage>(value.clone()) {
        return parse_stream_data(&stream_msg.stream, stream_msg.data);
    }

    if let Some(error) = value.get("error") {
        return Ok(ParsedMessage::Rejected(error.to_string()));
    }

    if value.get("id").is_some() && value.get("result").is_some() {
        return Ok(ParsedMessage::Subscribed(value["id"].to_string()));
    }

    if value.get("e").and_then(Value::as_str) == Some("depthUpdate") {
        let update: DepthUpdate = serde_json::from_value(value)?;
        return Ok(depth_update(update));
    }

    Ok(ParsedMessage::Unknown(raw.to_string()))
}

fn parse_stream_data(stream: &str, data: Value) -> Result<ParsedMessage> {
    if !stream.contains("@depth") {
        return Ok(ParsedMessage::Unknown(data.to_string()));
    }

    if data.get("e").and_then(Value::as_str) == Some("depthUpdate") {
        let update: DepthUpdate = serde_json::from_value(data)?;
        return Ok(depth_update(update));
    }

    let pair = pair_from_stream(stream)
        .ok_or_else(|| PriceIndexError::ParseError(format!("no symbol in stream {}", stream)))?;
    let depth: PartialDepth = serde_json::from_value(data)?;

    Ok(ParsedMessage::Depth(DepthMessage {
        pair,
        kind: DepthKind::Snapshot,
        bids: depth.bids,
        asks: depth.asks,
    }))
}

fn depth_update(update: DepthUpdate) -> ParsedMessage {
    ParsedMessage::Depth(DepthMessage {
        pair: update.symbol.to_uppercase(),
        kind: DepthKind::Delta,
        bids: update.bids,
        asks: update.asks,
    })
}

pub fn parse_rest(body: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>)> {
    let value: Value = serde_json::from_str(body)?;
    if let Some(msg) = value.get("msg").and_then(Value::as_str) {
        return Err(PriceIndexError::PullError(format!("binance: {}", msg)));
    }
    let depth: PartialDepth = serde_json::from_value(value)?;
    Ok((depth.bids, depth.asks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_subscribe_frame() {
        let frame = subscribe_frame(&["BTCUSDT".to_string(), "ETHUSDT".to_string()], 20);
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["method"], "SUBSCRIBE");
        assert_eq!(
            value["params"],
            serde_json::json!(["btcusdt@depth20@100ms", "ethusdt@depth20@100ms"])
        );
        assert!(value["id"].is_i64());
    }

    #[test]
    fn test_parse_partial_depth() {
        let raw = r#"{
            "stream": "ethusdt@depth5@100ms",
            "data": {
                "lastUpdateId": 160,
                "bids": [["3000.10", "10"], ["3000.00", "1"]],
                "asks": [["3000.20", "100"]]
            }
        }"#;

        let msg = parse_message(raw).unwrap();
        if let ParsedMessage::Depth(depth) = msg {
            assert_eq!(depth.pair, "ETHUSDT");
            assert_eq!(depth.kind, DepthKind::Snapshot);
            assert_eq!(depth.bids.len(), 2);
            assert_eq!(depth.asks[0].price, Decimal::from_str("3000.20").unwrap());
        } else {
            panic!("Expected Depth");
        }
    }

    #[test]
    fn test_parse_depth_update() {
        let raw = r#"{
            "e": "depthUpdate",
            "E": 1672531200000,
            "s": "BTCUSDT",
            "U": 100,
            "u": 105,
            "b": [["50000.00", "1.5"], ["49999.00", "2.0"]],
            "a": [["50001.00", "1.0"], ["50002.00", "0.5"]]
        }"#;

        let msg = parse_message(raw).unwrap();
        if let ParsedMessage::Depth(depth) = msg {
            assert_eq!(depth.pair, "BTCUSDT");
            assert_eq!(depth.kind, DepthKind::Delta);
            assert_eq!(depth.bids.len(), 2);
            assert_eq!(depth.bids[0].price, Decimal::from_str("50000.00").unwrap());
        } else {
            panic!("Expected Depth");
        }
    }

    #[test]
    fn test_parse_acknowledgement_and_rejection() {
        assert!(matches!(
            parse_message(r#"{"result":null,"id":1700000000000}"#).unwrap(),
            ParsedMessage::Subscribed(_)
        ));
        assert!(matches!(
            parse_message(r#"{"error":{"code":2,"msg":"Invalid request"},"id":1}"#).unwrap(),
            ParsedMessage::Rejected(_)
        ));
    }

    #[test]
    fn test_trade_stream_is_unknown() {
        let raw = r#"{"stream":"btcusdt@trade","data":{"e":"trade","p":"1"}}"#;
        assert!(matches!(parse_message(raw).unwrap(), ParsedMessage::Unknown(_)));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(
            parse_message("{\"stream\":"),
            Err(PriceIndexError::ParseError(_))
        ));
    }

    #[test]
    fn test_parse_rest_error_body() {
        let body = r#"{"code":-1121,"msg":"Invalid symbol."}"#;
        assert!(matches!(parse_rest(body), Err(PriceIndexError::PullError(_))));
    }
}
