//! WebSocket transport shared by the venue connectors

mod client;

pub use client::WebSocketClient;
