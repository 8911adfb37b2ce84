//! Local mock venues for integration tests

#![allow(dead_code)]

use axum::{extract::Query, routing::get, Json, Router};
use futures_util::{SinkExt, StreamExt};
use price_index::config::VenueConfig;
use price_index::{SnapshotCache, TopOfBook, Venue};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Serve `router` on an ephemeral local port
pub async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

type Params = Query<HashMap<String, String>>;

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> &'a str {
    params.get(name).map(String::as_str).unwrap_or_default()
}

/// REST depth endpoints of all three venues; only BTCUSDT is listed
pub fn mock_rest_venues() -> Router {
    Router::new()
        .route(
            "/binance/depth",
            get(|Query(params): Params| async move {
                if param(&params, "symbol") == "BTCUSDT" && param(&params, "limit") == "20" {
                    Json(json!({
                        "lastUpdateId": 1027024,
                        "bids": [["99.50", "3.0"], ["100.00", "1.0"]],
                        "asks": [["102.00", "1.0"], ["103.00", "2.0"]]
                    }))
                } else {
                    Json(json!({ "code": -1121, "msg": "Invalid symbol." }))
                }
            }),
        )
        .route(
            "/kraken/depth",
            get(|Query(params): Params| async move {
                if param(&params, "pair") == "XBTUSDT" && param(&params, "count") == "10" {
                    Json(json!({
                        "error": [],
                        "result": {
                            "XBTUSDT": {
                                "asks": [["104.00000", "1.000", 1688671834]],
                                "bids": [["102.00000", "2.000", 1688671834]]
                            }
                        }
                    }))
                } else {
                    Json(json!({ "error": ["EQuery:Unknown asset pair"] }))
                }
            }),
        )
        .route(
            "/huobi/depth",
            get(|Query(params): Params| async move {
                if param(&params, "symbol") == "btcusdt" && param(&params, "type") == "step0" {
                    Json(json!({
                        "ch": "market.btcusdt.depth.step0",
                        "status": "ok",
                        "ts": 1630000000000u64,
                        "tick": {
                            "bids": [[98.0, 1.0]],
                            "asks": [[100.0, 1.0]],
                            "version": 1
                        }
                    }))
                } else {
                    Json(json!({
                        "status": "error",
                        "err-code": "invalid-parameter",
                        "err-msg": "invalid symbol"
                    }))
                }
            }),
        )
        .route(
            "/broken/depth",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        )
}

pub fn rest_venue(base: SocketAddr, path: &str, depth: usize) -> VenueConfig {
    VenueConfig {
        enabled: true,
        // Nothing listens on port 1, so streams stay down and pulls are used
        ws_endpoint: "ws://127.0.0.1:1".to_string(),
        rest_endpoint: format!("http://{}/{}/depth", base, path),
        depth,
    }
}

/// Websocket venue: records every text frame it receives and replies to the
/// first one with `script`. Closes each connection after the script unless
/// `hold_open` is set.
/// Recorded once a held-open client connection goes away
pub const CLOSED_MARKER: &str = r#"{"closed":true}"#;

pub async fn ws_venue(script: Vec<String>, hold_open: bool) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (received, receiver) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let received = received.clone();
            let script = script.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };
                if let Some(Ok(Message::Text(first))) = ws.next().await {
                    let _ = received.send(first);
                }
                for frame in script {
                    if ws.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                if hold_open {
                    while let Some(Ok(message)) = ws.next().await {
                        if let Message::Text(text) = message {
                            let _ = received.send(text);
                        }
                    }
                    let _ = received.send(CLOSED_MARKER.to_string());
                } else {
                    let _ = ws.close(None).await;
                }
            });
        }
    });

    (format!("ws://{}", addr), receiver)
}

/// Poll `check` until it holds or five seconds pass
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Wait up to five seconds for a cached book
pub async fn wait_for_book(cache: &SnapshotCache, venue: Venue, pair: &str) -> Option<TopOfBook> {
    for _ in 0..100 {
        if let Some(top) = cache.book(venue, pair).await {
            return Some(top);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}

/// Next frame the websocket venue received, within five seconds
pub async fn next_frame(receiver: &mut mpsc::UnboundedReceiver<String>) -> Option<Value> {
    let text = tokio::time::timeout(Duration::from_secs(5), receiver.recv())
        .await
        .ok()??;
    serde_json::from_str(&text).ok()
}
