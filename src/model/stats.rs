//! Per-symbol order-flow counters, per spec.md §3/§8.2. Monotonic
//! non-decreasing within a trading day; reset at a new trading day.
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderStatistic {
    pub places: u64,
    pub entrusts: u64,
    pub filleds: u64,
    pub cancels: u64,
    pub rejects: u64,
}

impl OrderStatistic {
    /// Invariant per spec.md §8.2: `places >= entrusts >= filleds + cancels + rejects`.
    pub fn is_consistent(&self) -> bool {
        self.places >= self.entrusts && self.entrusts >= self.filleds + self.cancels + self.rejects
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_statistic_is_consistent() {
        assert!(OrderStatistic::default().is_consistent());
    }

    #[test]
    fn places_must_dominate_entrusts_and_outcomes() {
        let stat = OrderStatistic {
            places: 3,
            entrusts: 3,
            filleds: 1,
            cancels: 1,
            rejects: 1,
        };
        assert!(stat.is_consistent());

        let bad = OrderStatistic {
            places: 1,
            entrusts: 3,
            filleds: 1,
            cancels: 1,
            rejects: 1,
        };
        assert!(!bad.is_consistent());
    }
}
