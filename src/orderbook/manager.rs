//! Depth books of one connector
//!
//! Manages one local order book per pair.

use std::collections::HashMap;

use super::{OrderBook, TopOfBook};
use crate::error::Result;
use crate::parser::{DepthKind, DepthMessage};
use crate::venue::Venue;

/// Manages order books for multiple pairs
#[derive(Debug)]
pub struct DepthBooks {
    venue: Venue,
    books: HashMap<String, OrderBook>,
    max_depth: usize,
}

impl DepthBooks {
    pub fn new(venue: Venue, max_depth: usize) -> Self {
        Self {
            venue,
            books: HashMap::new(),
            max_depth,
        }
    }

    /// Apply a depth message to the book of its pair.
    ///
    /// Returns the resulting top of book, or `None` when the message could
    /// not be applied (a change arriving before any snapshot) or left a side empty.
    pub fn apply(&mut self, depth: &DepthMessage) -> Option<Result<TopOfBook>> {
        let max_depth = self.max_depth;
        let book = self
            .books
            .entry(depth.pair.clone())
            .or_insert_with(|| OrderBook::new(&depth.pair, max_depth));

        match depth.kind {
            DepthKind::Snapshot => book.replace(&depth.bids, &depth.asks),
            DepthKind::Delta => {
                if !book.apply_changes(&depth.bids, &depth.asks) {
                    return None;
                }
            }
        }

        book.top_of_book(self.venue)
    }

    /// Drop every book; used when a new connection starts over with snapshots
    pub fn clear(&mut self) {
        self.books.clear();
    }

    /// Get list of pairs being tracked
    pub fn pairs(&self) -> Vec<String> {
        self.books.keys().cloned().collect()
    }
}
