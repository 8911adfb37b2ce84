//! Normalized best bid / best ask record

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{PriceIndexError, Result};
use crate::parser::PriceLevel;
use crate::venue::Venue;

/// Mid price of a quote; fails when the quote is crossed or not finite
pub fn mid_price(bid: f64, ask: f64) -> Result<f64> {
    if !bid.is_finite() || !ask.is_finite() || bid > ask {
        return Err(PriceIndexError::InvalidQuote { bid, ask });
    }
    Ok((bid + ask) / 2.0)
}

/// Best bid and best ask of one pair on one venue
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopOfBook {
    pair: String,
    venue: Venue,
    bid: f64,
    ask: f64,
    mid: f64,
    observed_at: DateTime<Utc>,
}

impl TopOfBook {
    /// Validate the quote and fix its mid price
    pub fn new(venue: Venue, pair: &str, bid: f64, ask: f64) -> Result<Self> {
        let mid = mid_price(bid, ask)?;
        Ok(Self {
            pair: pair.to_uppercase(),
            venue,
            bid,
            ask,
            mid,
            observed_at: Utc::now(),
        })
    }

    /// Best bid is the highest bid present, best ask the lowest ask present.
    /// Level ordering is not relied upon.
    pub fn from_levels(
        venue: Venue,
        pair: &str,
        bids: &[PriceLevel],
        asks: &[PriceLevel],
    ) -> Result<Self> {
        let best_bid = bids.iter().map(|level| level.price).max();
        let best_ask = asks.iter().map(|level| level.price).min();

        match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Self::from_decimals(venue, pair, bid, ask),
            _ => Err(PriceIndexError::ParseError(format!(
                "{} book for {} has an empty side",
                venue, pair
            ))),
        }
    }

    pub fn from_decimals(venue: Venue, pair: &str, bid: Decimal, ask: Decimal) -> Result<Self> {
        let bid = bid.to_f64().unwrap_or(f64::NAN);
        let ask = ask.to_f64().unwrap_or(f64::NAN);
        Self::new(venue, pair, bid, ask)
    }

    pub fn pair(&self) -> &str {
        &self.pair
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    pub fn bid(&self) -> f64 {
        self.bid
    }

    pub fn ask(&self) -> f64 {
        self.ask
    }

    pub fn mid(&self) -> f64 {
        self.mid
    }

    pub fn observed_at(&self) -> DateTime<Utc> {
        self.observed_at
    }

    /// Spread in basis points of the mid
    pub fn spread_bps(&self) -> Option<f64> {
        (self.mid > 0.0).then(|| (self.ask - self.bid) / self.mid * 10_000.0)
    }
}
