//! Bar (OHLC + volume profile) entity, per spec.md §3/§4.3.
//!
//! Per-price maps key on a scaled integer tick index rather than a raw
//! float (spec.md §9: "the source's use of numeric keys is an accident of
//! its host runtime; implementers should scale by `priceTick` to an
//! integer key") so the map is a well-ordered, hashable `BTreeMap<i64, _>`.
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ids::Symbol;

/// Converts a price to its scaled integer tick index. `price_tick` is the
/// instrument's minimum price increment (spec.md §3 Instrument row).
pub fn price_to_tick_index(price: f64, price_tick: f64) -> i64 {
    (price / price_tick).round() as i64
}

pub fn tick_index_to_price(tick_index: i64, price_tick: f64) -> f64 {
    tick_index as f64 * price_tick
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Bar {
    pub symbol: Symbol,
    /// The instrument's price tick, retained so per-price keys can be
    /// converted back to a price.
    pub price_tick: f64,
    /// Bucket key: either the `floor(time/100)*100` minute bucket, or the
    /// ordinal of the volume bucket, depending on aggregator mode.
    pub bucket_key: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub turnover: f64,
    pub open_interest: f64,
    /// Signed order flow: Σ buy − Σ sell.
    pub delta: f64,
    /// Price with the highest total (buy+sell) volume.
    pub poc: f64,
    pub buy_volumes: BTreeMap<i64, f64>,
    pub sell_volumes: BTreeMap<i64, f64>,
}

impl Bar {
    pub fn new(symbol: Symbol, price_tick: f64, bucket_key: i64, last: f64) -> Self {
        Bar {
            symbol,
            price_tick,
            bucket_key,
            open: last,
            high: last,
            low: last,
            close: last,
            volume: 0.0,
            turnover: 0.0,
            open_interest: 0.0,
            delta: 0.0,
            poc: last,
            buy_volumes: BTreeMap::new(),
            sell_volumes: BTreeMap::new(),
        }
    }

    /// Total (buy+sell) volume traded at `price`.
    pub fn volume_at(&self, price: f64) -> f64 {
        let idx = price_to_tick_index(price, self.price_tick);
        self.buy_volumes.get(&idx).copied().unwrap_or(0.0)
            + self.sell_volumes.get(&idx).copied().unwrap_or(0.0)
    }

    /// Invariant per spec.md §3: volume = Σ buy + Σ sell; delta = Σ buy − Σ sell.
    pub fn volume_from_maps(&self) -> f64 {
        let buy: f64 = self.buy_volumes.values().sum();
        let sell: f64 = self.sell_volumes.values().sum();
        buy + sell
    }

    pub fn delta_from_maps(&self) -> f64 {
        let buy: f64 = self.buy_volumes.values().sum();
        let sell: f64 = self.sell_volumes.values().sum();
        buy - sell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::Symbol;

    #[test]
    fn price_tick_round_trip() {
        let idx = price_to_tick_index(101.5, 0.5);
        assert_eq!(idx, 203);
        assert_eq!(tick_index_to_price(idx, 0.5), 101.5);
    }

    #[test]
    fn bar_serializes_and_deserializes_identically() {
        let mut bar = Bar::new(Symbol::new("IF2409", "CFFEX"), 0.5, 93000, 100.0);
        bar.buy_volumes.insert(200, 5.0);
        bar.sell_volumes.insert(202, 3.0);
        bar.volume = bar.volume_from_maps();
        bar.delta = bar.delta_from_maps();

        let json = serde_json::to_string(&bar).unwrap();
        let restored: Bar = serde_json::from_str(&json).unwrap();
        assert_eq!(bar, restored);
    }

    #[test]
    fn volume_and_delta_invariants_hold() {
        let mut bar = Bar::new(Symbol::new("IF2409", "CFFEX"), 1.0, 0, 100.0);
        bar.buy_volumes.insert(100, 4.0);
        bar.buy_volumes.insert(101, 2.0);
        bar.sell_volumes.insert(99, 3.0);
        assert_eq!(bar.volume_from_maps(), 9.0);
        assert_eq!(bar.delta_from_maps(), 3.0);
    }
}
