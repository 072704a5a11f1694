//! Commission/margin rate caches, per spec.md §3. Cached for a trading day;
//! cleared on day rollover at login (spec.md §4.5 state 3).
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RateSide {
    Open,
    Close,
    CloseToday,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct RateEntry {
    pub ratio: f64,
    pub per_volume_amount: f64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct CommissionRate {
    pub instrument_id: String,
    pub open: RateEntry,
    pub close: RateEntry,
    pub close_today: RateEntry,
}

impl CommissionRate {
    pub fn entry(&self, side: RateSide) -> RateEntry {
        match side {
            RateSide::Open => self.open,
            RateSide::Close => self.close,
            RateSide::CloseToday => self.close_today,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MarginRateSide {
    pub long: RateEntry,
    pub short: RateEntry,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct MarginRate {
    pub instrument_id: String,
    pub rate: MarginRateSide,
}
