//! Order book module
//!
//! Normalized top-of-book records plus the local depth books a connector
//! keeps for venues that stream incremental changes.

mod book;
mod manager;
mod top;

pub use book::OrderBook;
pub use manager::DepthBooks;
pub use top::{mid_price, TopOfBook};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Bid,
    Ask,
}
