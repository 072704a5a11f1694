//! Query coalescing: rate caches, accounts snapshot, position-details
//! snapshot, per-symbol/instrument lookups, per spec.md §4.5.
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::model::{CommissionRate, Instrument, MarginRate, Position, ProductType};
use crate::receivers::{
    AccountSnapshot, AccountsReceiver, CommissionRateReceiver, MarginRateReceiver,
    PositionDetailsReceiver,
};

struct PendingRate<R: ?Sized> {
    instrument_id: String,
    receivers: Vec<Rc<RefCell<R>>>,
}

/// Generic coalescing queue for a per-instrument-cached rate (commission or
/// margin), per spec.md §4.5 "Rate queries" / S5.
pub struct RateQueryQueue<V: Clone, R: ?Sized> {
    cache: HashMap<String, V>,
    queue: VecDeque<PendingRate<R>>,
}

impl<V: Clone, R: ?Sized> Default for RateQueryQueue<V, R> {
    fn default() -> Self {
        RateQueryQueue {
            cache: HashMap::new(),
            queue: VecDeque::new(),
        }
    }
}

/// Outcome of `RateQueryQueue::query`: whether a brand-new gateway request
/// must be issued for `instrument_id` (the queue was empty beforehand).
pub enum QueryOutcome {
    /// Served synchronously from cache; caller must invoke the receiver.
    CacheHit,
    /// Enqueued; caller must issue the first network request.
    Enqueued,
    /// Enqueued behind an in-flight request for the same instrument.
    Coalesced,
}

impl<V: Clone, R: ?Sized> RateQueryQueue<V, R> {
    pub fn cached(&self, instrument_id: &str) -> Option<&V> {
        self.cache.get(instrument_id)
    }

    /// Enqueues `receiver` for `instrument_id`. Returns the outcome so the
    /// caller can invoke the receiver immediately (`CacheHit`) or issue a
    /// gateway request (`Enqueued`).
    pub fn query(&mut self, instrument_id: &str, receiver: Rc<RefCell<R>>) -> QueryOutcome {
        if self.cache.contains_key(instrument_id) {
            return QueryOutcome::CacheHit;
        }
        if let Some(entry) = self.queue.iter_mut().find(|e| e.instrument_id == instrument_id) {
            entry.receivers.push(receiver);
            return QueryOutcome::Coalesced;
        }
        let was_empty = self.queue.is_empty();
        self.queue.push_back(PendingRate {
            instrument_id: instrument_id.to_string(),
            receivers: vec![receiver],
        });
        if was_empty {
            QueryOutcome::Enqueued
        } else {
            QueryOutcome::Coalesced
        }
    }

    /// Completes the head-of-queue request with `value`, updates the
    /// cache, and returns `(receivers_to_notify, next_instrument_id)` where
    /// `next_instrument_id` is `Some` only when the new head is *not*
    /// already cached and a fresh gateway request must be issued.
    #[allow(clippy::type_complexity)]
    pub fn complete_head(&mut self, value: V) -> (Vec<Rc<RefCell<R>>>, Option<String>) {
        let mut notify = Vec::new();
        if let Some(entry) = self.queue.pop_front() {
            self.cache.insert(entry.instrument_id.clone(), value);
            notify.extend(entry.receivers);
        }
        // drain synchronously while the new head's symbol is already cached.
        loop {
            match self.queue.front() {
                Some(head) if self.cache.contains_key(&head.instrument_id) => {
                    let entry = self.queue.pop_front().unwrap();
                    notify.extend(entry.receivers);
                }
                _ => break,
            }
        }
        let next = self.queue.front().map(|e| e.instrument_id.clone());
        (notify, next)
    }
}

pub type MarginRateQueue = RateQueryQueue<MarginRate, dyn MarginRateReceiver>;
pub type CommissionRateQueue = RateQueryQueue<CommissionRate, dyn CommissionRateReceiver>;

/// Accounts query state per spec.md §4.5: in-flight coalescing plus a
/// short-TTL cache (default 3s, spec.md §4.5/`EngineConfig`).
#[derive(Default)]
pub struct AccountsQuery {
    in_flight: bool,
    receivers: Vec<Rc<RefCell<dyn AccountsReceiver>>>,
    accumulator: Vec<AccountSnapshot>,
    last_snapshot: Option<(Instant, Vec<AccountSnapshot>)>,
}

pub enum AccountsOutcome {
    CacheHit(Vec<AccountSnapshot>),
    Appended,
    IssueRequest,
}

impl AccountsQuery {
    pub fn query(
        &mut self,
        receiver: Rc<RefCell<dyn AccountsReceiver>>,
        ttl: Duration,
    ) -> AccountsOutcome {
        if self.in_flight {
            self.receivers.push(receiver);
            return AccountsOutcome::Appended;
        }
        if let Some((at, snapshot)) = &self.last_snapshot {
            if at.elapsed() < ttl {
                return AccountsOutcome::CacheHit(snapshot.clone());
            }
        }
        self.accumulator.clear();
        self.receivers.push(receiver);
        self.in_flight = true;
        AccountsOutcome::IssueRequest
    }

    /// Appends one account record; when `is_last`, flushes every queued
    /// receiver with the accumulated snapshot.
    pub fn record(
        &mut self,
        account: AccountSnapshot,
        is_last: bool,
    ) -> Option<Vec<Rc<RefCell<dyn AccountsReceiver>>>> {
        self.accumulator.push(account);
        if !is_last {
            return None;
        }
        self.in_flight = false;
        self.last_snapshot = Some((Instant::now(), self.accumulator.clone()));
        Some(self.receivers.drain(..).collect())
    }

    /// The batch most recently completed by `record`, for notifying
    /// receivers with the full snapshot rather than just the last record.
    pub fn snapshot(&self) -> Vec<AccountSnapshot> {
        self.last_snapshot
            .as_ref()
            .map(|(_, v)| v.clone())
            .unwrap_or_default()
    }
}

/// Position-details query state per spec.md §4.5: in-flight coalescing
/// plus a dirty-flag cache (`positionDetailsChanged`).
#[derive(Default)]
pub struct PositionDetailsQuery {
    in_flight: bool,
    receivers: Vec<Rc<RefCell<dyn PositionDetailsReceiver>>>,
    accumulator: Vec<Position>,
    last_snapshot: Option<Vec<Position>>,
    pub changed: bool,
}

pub enum PositionDetailsOutcome {
    CacheHit(Vec<Position>),
    Appended,
    IssueRequest,
}

impl PositionDetailsQuery {
    pub fn query(
        &mut self,
        receiver: Rc<RefCell<dyn PositionDetailsReceiver>>,
    ) -> PositionDetailsOutcome {
        if self.in_flight {
            self.receivers.push(receiver);
            return PositionDetailsOutcome::Appended;
        }
        if !self.changed {
            if let Some(snapshot) = &self.last_snapshot {
                return PositionDetailsOutcome::CacheHit(snapshot.clone());
            }
        }
        self.accumulator.clear();
        self.receivers.push(receiver);
        self.in_flight = true;
        PositionDetailsOutcome::IssueRequest
    }

    pub fn record(
        &mut self,
        position: Position,
        is_last: bool,
    ) -> Option<Vec<Rc<RefCell<dyn PositionDetailsReceiver>>>> {
        self.accumulator.push(position);
        if !is_last {
            return None;
        }
        self.in_flight = false;
        self.changed = false;
        self.last_snapshot = Some(self.accumulator.clone());
        Some(self.receivers.drain(..).collect())
    }

    pub fn mark_changed(&mut self) {
        self.changed = true;
    }

    /// The batch most recently completed by `record`.
    pub fn snapshot(&self) -> Vec<Position> {
        self.last_snapshot.clone().unwrap_or_default()
    }

    /// Flushes the queue with whatever's accumulated so far without adding
    /// another record — for a last-record-is-empty response (the trader
    /// holds zero position-detail rows).
    pub fn flush(&mut self) -> Option<Vec<Rc<RefCell<dyn PositionDetailsReceiver>>>> {
        self.in_flight = false;
        self.changed = false;
        self.last_snapshot = Some(self.accumulator.clone());
        if self.receivers.is_empty() {
            None
        } else {
            Some(self.receivers.drain(..).collect())
        }
    }
}

/// Per-symbol position query outcome (spec.md §4.5): a direct map read.
pub enum PositionLookup {
    Found(Position),
    /// Instrument is known but has no position row.
    Zeroed(Position),
    /// Instrument is unknown.
    None,
}

pub fn lookup_position(
    positions: &HashMap<String, Position>,
    known_instruments: &HashMap<String, Instrument>,
    symbol_key: &str,
) -> PositionLookup {
    if let Some(p) = positions.get(symbol_key) {
        return PositionLookup::Found(p.clone());
    }
    if let Some(instrument) = known_instruments.get(symbol_key) {
        return PositionLookup::Zeroed(Position::new(instrument.symbol.clone()));
    }
    PositionLookup::None
}

/// Instruments query, optionally filtered by product type (spec.md §4.5).
pub fn query_instruments<'a>(
    instruments: &'a HashMap<String, Instrument>,
    product_type: Option<ProductType>,
) -> Vec<&'a Instrument> {
    instruments
        .values()
        .filter(|i| product_type.map(|pt| i.product_type == pt).unwrap_or(true))
        .collect()
}

/// Instrument-by-symbol lookup requiring both instrumentId and exchangeId
/// to match (spec.md §4.5).
pub fn find_instrument_by_symbol<'a>(
    instruments: &'a HashMap<String, Instrument>,
    instrument_id: &str,
    exchange_id: &str,
) -> Option<&'a Instrument> {
    instruments.get(instrument_id).filter(|i| i.exchange_id == exchange_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::rates::MarginRateSide;

    struct CollectingMarginReceiver {
        seen: Vec<MarginRate>,
    }
    impl MarginRateReceiver for CollectingMarginReceiver {
        fn on_margin_rate(&mut self, rate: &MarginRate) {
            self.seen.push(rate.clone());
        }
    }

    /// S5: two queries for the same instrument before the response lands
    /// coalesce into a single gateway request; both receivers get called.
    #[test]
    fn s5_margin_rate_queries_coalesce() {
        let mut queue: MarginRateQueue = RateQueryQueue::default();
        let r1 = Rc::new(RefCell::new(CollectingMarginReceiver { seen: vec![] }));
        let r2 = Rc::new(RefCell::new(CollectingMarginReceiver { seen: vec![] }));

        let mut issued_requests = 0;
        match queue.query("X", r1.clone()) {
            QueryOutcome::Enqueued => issued_requests += 1,
            _ => panic!("expected first query to enqueue"),
        }
        match queue.query("X", r2.clone()) {
            QueryOutcome::Coalesced => {}
            _ => panic!("expected second query to coalesce"),
        }
        assert_eq!(issued_requests, 1);

        let rate = MarginRate {
            instrument_id: "X".to_string(),
            rate: MarginRateSide::default(),
        };
        let (notify, next) = queue.complete_head(rate.clone());
        assert!(next.is_none());
        for r in notify {
            r.borrow_mut().on_margin_rate(&rate);
        }
        assert_eq!(r1.borrow().seen.len(), 1);
        assert_eq!(r2.borrow().seen.len(), 1);
    }

    #[test]
    fn cached_rate_serves_synchronously() {
        let mut queue: MarginRateQueue = RateQueryQueue::default();
        let r1 = Rc::new(RefCell::new(CollectingMarginReceiver { seen: vec![] }));
        queue.query("X", r1.clone());
        queue.complete_head(MarginRate {
            instrument_id: "X".to_string(),
            rate: MarginRateSide::default(),
        });

        let r2 = Rc::new(RefCell::new(CollectingMarginReceiver { seen: vec![] }));
        match queue.query("X", r2) {
            QueryOutcome::CacheHit => {}
            _ => panic!("expected cache hit"),
        }
    }

    struct CollectingAccountsReceiver {
        seen: Vec<Vec<AccountSnapshot>>,
    }
    impl AccountsReceiver for CollectingAccountsReceiver {
        fn on_accounts(&mut self, accounts: &[AccountSnapshot]) {
            self.seen.push(accounts.to_vec());
        }
    }

    #[test]
    fn accounts_query_coalesces_in_flight_batch() {
        let mut q = AccountsQuery::default();
        let r1 = Rc::new(RefCell::new(CollectingAccountsReceiver { seen: vec![] }));
        let r2 = Rc::new(RefCell::new(CollectingAccountsReceiver { seen: vec![] }));

        matches!(q.query(r1.clone(), Duration::from_secs(3)), AccountsOutcome::IssueRequest);
        matches!(q.query(r2.clone(), Duration::from_secs(3)), AccountsOutcome::Appended);

        let flushed = q
            .record(
                AccountSnapshot {
                    account_id: "A1".to_string(),
                    ..Default::default()
                },
                true,
            )
            .unwrap();
        assert_eq!(flushed.len(), 2);
        for r in flushed {
            r.borrow_mut().on_accounts(&[AccountSnapshot {
                account_id: "A1".to_string(),
                ..Default::default()
            }]);
        }
        assert_eq!(r1.borrow().seen.len(), 1);
        assert_eq!(r2.borrow().seen.len(), 1);
    }

    #[test]
    fn position_details_cache_hit_when_unchanged() {
        let mut q = PositionDetailsQuery::default();
        struct Dummy;
        impl PositionDetailsReceiver for Dummy {
            fn on_position_details(&mut self, _positions: &[Position]) {}
        }
        let r1 = Rc::new(RefCell::new(Dummy));
        matches!(q.query(r1.clone()), PositionDetailsOutcome::IssueRequest);
        q.record(Position::new(crate::model::ids::Symbol::new("X", "DCE")), true);

        let r2 = Rc::new(RefCell::new(Dummy));
        match q.query(r2) {
            PositionDetailsOutcome::CacheHit(_) => {}
            _ => panic!("expected cache hit when unchanged"),
        }
    }

    #[test]
    fn per_symbol_lookup_distinguishes_zeroed_from_unknown() {
        let positions = HashMap::new();
        let mut instruments = HashMap::new();
        let sym = crate::model::ids::Symbol::new("X", "DCE");
        instruments.insert(
            "X".to_string(),
            Instrument {
                symbol: sym.clone(),
                instrument_id: "X".to_string(),
                name: "X".to_string(),
                exchange_id: "DCE".to_string(),
                product_id: "p".to_string(),
                product_type: ProductType::Futures,
                delivery_time: 202601,
                open_date: 0,
                expire_date: 0,
                volume_multiple: 10.0,
                price_tick: 1.0,
                min_limit_order_volume: 1.0,
                max_limit_order_volume: 1000.0,
                strike_price: None,
                is_call: None,
            },
        );

        match lookup_position(&positions, &instruments, "X") {
            PositionLookup::Zeroed(_) => {}
            _ => panic!("expected zeroed position for known instrument"),
        }
        match lookup_position(&positions, &instruments, "Y") {
            PositionLookup::None => {}
            _ => panic!("expected none for unknown instrument"),
        }
    }
}
