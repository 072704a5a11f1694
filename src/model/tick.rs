//! Market-data tick snapshot, per spec.md §3's Tick row.
use serde::{Deserialize, Serialize};

use super::ids::Symbol;

/// One side's (price, volume) at a given depth. Absent levels are simply
/// not present in `DepthBook`'s vectors (dense-prefix decoding, spec.md
/// §4.4).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
}

/// Best-5 order book, dense from index 0 upward. A shorter vector than 5
/// means levels beyond it were invalid/absent on the wire.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct DepthBook {
    pub asks: Vec<PriceLevel>,
    pub bids: Vec<PriceLevel>,
}

impl DepthBook {
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }
}

/// An immutable, frozen-upon-emission market snapshot for one symbol.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Tick {
    pub symbol: Symbol,
    /// `YYYYMMDD`.
    pub date: i32,
    /// `HHMMSS.fff` encoded as in spec.md §4.1: `HH*10000 + MM*100 + SS`
    /// plus a fractional second from milliseconds.
    pub time: f64,
    pub trading_day: i32,
    pub last_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub pre_close: f64,
    pub open_interest: f64,
    pub pre_open_interest: f64,
    pub volume: f64,
    pub turnover: f64,
    pub upper_limit_price: f64,
    pub lower_limit_price: f64,
    /// Circuit-breaker bands; absent unless the exchange publishes them.
    pub upper_band: Option<f64>,
    pub lower_band: Option<f64>,
    pub book: DepthBook,
}

impl Tick {
    pub fn best_ask_price(&self) -> Option<f64> {
        self.book.best_ask().map(|l| l.price)
    }

    pub fn best_bid_price(&self) -> Option<f64> {
        self.book.best_bid().map(|l| l.price)
    }
}
