//! Local depth book for one pair
//!
//! Uses BTreeMap for efficient sorted price level management.

use rust_decimal::Decimal;
use std::cmp::Reverse;
use std::collections::BTreeMap;

use super::{Side, TopOfBook};
use crate::error::Result;
use crate::parser::PriceLevel;
use crate::venue::Venue;

/// Order book for a single pair
#[derive(Debug)]
pub struct OrderBook {
    pair: String,
    /// Bids sorted by price descending (highest first)
    bids: BTreeMap<Reverse<Decimal>, Decimal>,
    /// Asks sorted by price ascending (lowest first)
    asks: BTreeMap<Decimal, Decimal>,
    /// Whether the book has been seeded with a snapshot
    initialized: bool,
    /// Maximum depth levels to maintain
    max_depth: usize,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(pair: &str, max_depth: usize) -> Self {
        Self {
            pair: pair.to_string(),
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            initialized: false,
            max_depth,
        }
    }

    /// Replace the book with a full snapshot
    pub fn replace(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) {
        self.bids.clear();
        self.asks.clear();

        for level in bids {
            if level.quantity > Decimal::ZERO {
                self.bids.insert(Reverse(level.price), level.quantity);
            }
        }

        for level in asks {
            if level.quantity > Decimal::ZERO {
                self.asks.insert(level.price, level.quantity);
            }
        }

        self.initialized = true;
        self.trim_depth();
    }

    /// Apply absolute level changes; a zero quantity removes the level.
    ///
    /// Returns false when no snapshot has seeded the book yet.
    pub fn apply_changes(&mut self, bids: &[PriceLevel], asks: &[PriceLevel]) -> bool {
        if !self.initialized {
            return false;
        }

        for level in bids {
            self.update_side(Side::Bid, level);
        }

        for level in asks {
            self.update_side(Side::Ask, level);
        }

        self.trim_depth();

        true
    }

    /// Update a single price level
    fn update_side(&mut self, side: Side, level: &PriceLevel) {
        match side {
            Side::Bid => {
                if level.quantity == Decimal::ZERO {
                    self.bids.remove(&Reverse(level.price));
                } else {
                    self.bids.insert(Reverse(level.price), level.quantity);
                }
            }
            Side::Ask => {
                if level.quantity == Decimal::ZERO {
                    self.asks.remove(&level.price);
                } else {
                    self.asks.insert(level.price, level.quantity);
                }
            }
        }
    }

    /// Trim the book to max depth
    fn trim_depth(&mut self) {
        while self.bids.len() > self.max_depth {
            self.bids.pop_last();
        }
        while self.asks.len() > self.max_depth {
            self.asks.pop_last();
        }
    }

    /// Get best bid price
    pub fn best_bid(&self) -> Option<Decimal> {
        self.bids.first_key_value().map(|(Reverse(p), _)| *p)
    }

    /// Get best ask price
    pub fn best_ask(&self) -> Option<Decimal> {
        self.asks.first_key_value().map(|(p, _)| *p)
    }

    /// Top of book, if both sides are populated
    pub fn top_of_book(&self, venue: Venue) -> Option<Result<TopOfBook>> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(TopOfBook::from_decimals(venue, &self.pair, bid, ask)),
            _ => None,
        }
    }

    /// Check if the book is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn levels(&self) -> (usize, usize) {
        (self.bids.len(), self.asks.len())
    }
}
