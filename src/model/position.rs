//! Position accounting state, per spec.md §3/§4.5.
//!
//! Layout: `today.{long,short}.{position,frozen}`,
//! `history.{long,short}.{position,frozen}`, `pending.{long,short}`. The
//! mutating operations themselves (`_calcPosition`, `_recordPending`, ...)
//! live in `crate::trading::position`; this module is the plain data shape
//! plus the floor-at-zero helper they share.
use serde::{Deserialize, Serialize};

use super::ids::Symbol;
use super::order::Side;

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PositionBucket {
    pub position: f64,
    pub frozen: f64,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SidedBuckets {
    pub long: PositionBucket,
    pub short: PositionBucket,
}

impl SidedBuckets {
    pub fn bucket(&self, side: Side) -> PositionBucket {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    pub fn bucket_mut(&mut self, side: Side) -> &mut PositionBucket {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct PendingBySide {
    pub long: f64,
    pub short: f64,
}

impl PendingBySide {
    pub fn get(&self, side: Side) -> f64 {
        match side {
            Side::Long => self.long,
            Side::Short => self.short,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut f64 {
        match side {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub symbol: Symbol,
    pub today: SidedBuckets,
    pub history: SidedBuckets,
    pub pending: PendingBySide,
}

impl Position {
    pub fn new(symbol: Symbol) -> Self {
        Position {
            symbol,
            ..Default::default()
        }
    }

    /// Invariant per spec.md §8.3: every bucket and pending value is >= 0.
    pub fn is_non_negative(&self) -> bool {
        self.today.long.position >= 0.0
            && self.today.long.frozen >= 0.0
            && self.today.short.position >= 0.0
            && self.today.short.frozen >= 0.0
            && self.history.long.position >= 0.0
            && self.history.long.frozen >= 0.0
            && self.history.short.position >= 0.0
            && self.history.short.frozen >= 0.0
            && self.pending.long >= 0.0
            && self.pending.short >= 0.0
    }
}

/// Subtracts `v` from `x`, flooring at 0. Shared by close/freeze/unfreeze
/// accounting so no bucket ever goes negative (spec.md §4.5, §8.3).
pub fn floored_sub(x: f64, v: f64) -> f64 {
    (x - v).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_position_is_zeroed_and_non_negative() {
        let p = Position::new(Symbol::new("IF2409", "CFFEX"));
        assert!(p.is_non_negative());
        assert_eq!(p.today.long.position, 0.0);
    }

    #[test]
    fn floored_sub_never_goes_negative() {
        assert_eq!(floored_sub(2.0, 5.0), 0.0);
        assert_eq!(floored_sub(5.0, 2.0), 3.0);
    }
}
