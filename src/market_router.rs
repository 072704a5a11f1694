//! Reference-counted instrument subscriptions, last-tick cache, recorder
//! sink, and tick fan-out, per spec.md §4.4.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::{ErrorKind, GatewayError};
use crate::gateway::adapter::{refine_millis, GatewayAdapter};
use crate::gateway::contract::{MarketApi, RawDepthMarketDataField, RspInfo};
use crate::model::ids::Symbol;
use crate::model::sentinel::is_present;
use crate::model::tick::{DepthBook, PriceLevel, Tick};
use crate::tape_classifier;

pub trait TickReceiver {
    fn on_tick(&mut self, tick: &Tick, tape: &crate::model::Tape);
}

/// Raw-depth recorder sink, decoupled from `TickReceiver` since it wants
/// the unconverted wire payload (spec.md §4.4).
pub trait RecorderSink {
    fn on_raw_depth(&mut self, raw: &RawDepthMarketDataField);
}

/// Fired exactly once per lifecycle, after login re-subscribes the union of
/// recorder + subscriber instruments (spec.md §4.4).
pub trait MarketLifecycle {
    fn on_open(&mut self);
    fn on_close(&mut self);
    fn on_error(&mut self, message: &str);
}

type ReceiverHandle = Rc<RefCell<dyn TickReceiver>>;

struct RecorderState {
    sink: Rc<RefCell<dyn RecorderSink>>,
    selector: Box<dyn Fn(&[Instrument]) -> Vec<Symbol>>,
    instrument_ids: HashSet<String>,
}

/// A minimal instrument row the recorder selector runs over. Kept separate
/// from `model::Instrument` so the router doesn't need the full reference
/// catalogue just to drive `startRecorder`.
#[derive(Clone, Debug)]
pub struct Instrument {
    pub symbol: Symbol,
}

pub struct MarketRouter<M: MarketApi> {
    market: M,
    adapter: GatewayAdapter,
    subscribers: HashMap<String, Vec<ReceiverHandle>>,
    recordings: HashSet<String>,
    symbols: HashMap<String, Symbol>,
    last_ticks: HashMap<String, Tick>,
    trading_day: i32,
    recorder: Option<RecorderState>,
    pending_subscribes: Vec<String>,
    pending_unsubscribes: Vec<String>,
}

impl<M: MarketApi> MarketRouter<M> {
    pub fn new(market: M, config: EngineConfig) -> Self {
        MarketRouter {
            market,
            adapter: GatewayAdapter::new(config),
            subscribers: HashMap::new(),
            recordings: HashSet::new(),
            symbols: HashMap::new(),
            last_ticks: HashMap::new(),
            trading_day: 0,
            recorder: None,
            pending_subscribes: Vec::new(),
            pending_unsubscribes: Vec::new(),
        }
    }

    /// Subscribes `receiver` to each symbol, adding it idempotently to
    /// existing subscriber lists and queuing a network subscribe for
    /// instruments with no prior subscriber or recorder interest.
    pub fn subscribe(&mut self, symbols: &[Symbol], receiver: ReceiverHandle) {
        for symbol in symbols {
            let id = symbol.instrument_id.clone();
            self.symbols.entry(id.clone()).or_insert_with(|| symbol.clone());
            let list = self.subscribers.entry(id.clone()).or_insert_with(Vec::new);
            let already_subscribed = !list.is_empty();
            if !list.iter().any(|r| Rc::ptr_eq(r, &receiver)) {
                list.push(receiver.clone());
            }
            if !already_subscribed && !self.recordings.contains(&id) {
                self.pending_subscribes.push(id);
            }
        }
        self.flush_subscribes();
    }

    /// Removes `receiver` from each symbol's subscriber list; if a list
    /// empties and the instrument isn't recorded, queues a network
    /// unsubscribe.
    pub fn unsubscribe(&mut self, symbols: &[Symbol], receiver: &ReceiverHandle) {
        for symbol in symbols {
            let id = symbol.instrument_id.clone();
            if let Some(list) = self.subscribers.get_mut(&id) {
                list.retain(|r| !Rc::ptr_eq(r, receiver));
                if list.is_empty() {
                    self.subscribers.remove(&id);
                    self.symbols.remove(&id);
                    if !self.recordings.contains(&id) {
                        self.pending_unsubscribes.push(id);
                    }
                }
            }
        }
        self.flush_unsubscribes();
    }

    pub fn start_recorder(
        &mut self,
        sink: Rc<RefCell<dyn RecorderSink>>,
        selector: Box<dyn Fn(&[Instrument]) -> Vec<Symbol>>,
        instruments: &[Instrument],
    ) {
        let symbols = selector(instruments);
        let mut ids = HashSet::new();
        for symbol in &symbols {
            let id = symbol.instrument_id.clone();
            self.symbols.entry(id.clone()).or_insert_with(|| symbol.clone());
            if self.recordings.insert(id.clone()) && !self.subscribers.contains_key(&id) {
                self.pending_subscribes.push(id.clone());
            }
            ids.insert(id);
        }
        self.recorder = Some(RecorderState {
            sink,
            selector,
            instrument_ids: ids,
        });
        self.flush_subscribes();
    }

    pub fn stop_recorder(&mut self) {
        if let Some(state) = self.recorder.take() {
            for id in state.instrument_ids {
                self.recordings.remove(&id);
                if !self.subscribers.contains_key(&id) {
                    self.pending_unsubscribes.push(id);
                }
            }
        }
        self.flush_unsubscribes();
    }

    fn flush_subscribes(&mut self) {
        if self.pending_subscribes.is_empty() {
            return;
        }
        let batch: Vec<String> = self.pending_subscribes.drain(..).collect();
        let rc = self.adapter.submit(|| self.market.subscribe_market_data(&batch));
        if rc != 0 {
            warn!("market subscribe failed for batch {:?} (rc={})", batch, rc);
        } else {
            debug!("subscribed {} instrument(s)", batch.len());
        }
    }

    fn flush_unsubscribes(&mut self) {
        if self.pending_unsubscribes.is_empty() {
            return;
        }
        let batch: Vec<String> = self.pending_unsubscribes.drain(..).collect();
        let rc = self
            .adapter
            .submit(|| self.market.unsubscribe_market_data(&batch));
        if rc != 0 {
            warn!("market unsubscribe failed for batch {:?} (rc={})", batch, rc);
        } else {
            debug!("unsubscribed {} instrument(s)", batch.len());
        }
    }

    /// Submits `ReqUserLogin` on the market endpoint via the adapter's
    /// backpressure retry (spec.md §6).
    pub fn request_login(&mut self) -> i32 {
        self.adapter.submit(|| self.market.req_user_login())
    }

    /// Classifies a market-endpoint response's error payload, per the same
    /// contract as `GatewayAdapter::classify` on the trading side.
    pub fn classify_error(&self, kind: ErrorKind, info: &RspInfo) -> Option<GatewayError> {
        self.adapter.classify(kind, info)
    }

    /// Called on successful login: clears `last_ticks` if the trading day
    /// advanced, then re-subscribes the union of recorder + subscriber
    /// instrument ids (idempotent — safe to re-invoke without user action).
    pub fn on_login_success(&mut self, trading_day: i32, lifecycle: &mut dyn MarketLifecycle) {
        if trading_day != self.trading_day {
            self.last_ticks.clear();
            self.trading_day = trading_day;
        }
        let mut union: HashSet<String> = self.recordings.clone();
        union.extend(self.subscribers.keys().cloned());
        if !union.is_empty() {
            let batch: Vec<String> = union.into_iter().collect();
            let rc = self.adapter.submit(|| self.market.subscribe_market_data(&batch));
            if rc != 0 {
                warn!("post-login re-subscribe failed (rc={})", rc);
            }
        }
        lifecycle.on_open();
    }

    fn decode_book(raw: &RawDepthMarketDataField) -> DepthBook {
        let mut asks = Vec::new();
        for (price, volume) in raw.ask_prices.iter().zip(raw.ask_volumes.iter()) {
            if !is_present(*price) || !is_present(*volume) {
                break;
            }
            asks.push(PriceLevel {
                price: *price,
                volume: *volume,
            });
        }
        let mut bids = Vec::new();
        for (price, volume) in raw.bid_prices.iter().zip(raw.bid_volumes.iter()) {
            if !is_present(*price) || !is_present(*volume) {
                break;
            }
            bids.push(PriceLevel {
                price: *price,
                volume: *volume,
            });
        }
        DepthBook { asks, bids }
    }

    /// Handles one raw depth tick from the gateway: recorder delivery,
    /// orphan drop, tick construction, tape derivation, last-tick storage
    /// (before fan-out, so re-entrant receivers see the latest), then
    /// fan-out in registration order (spec.md §4.4).
    pub fn on_depth_tick(&mut self, raw: RawDepthMarketDataField) {
        if let Some(recorder) = &self.recorder {
            if recorder.instrument_ids.contains(&raw.instrument_id) {
                recorder.sink.borrow_mut().on_raw_depth(&raw);
            }
        }

        let symbol = match self.symbols.get(&raw.instrument_id) {
            Some(s) => s.clone(),
            None => return, // orphan: no subscriber ever registered this instrument
        };

        let hms = crate::gateway::adapter::parse_time_hms(&raw.update_time).unwrap_or(0);
        let time = refine_millis(hms, raw.update_millisec);

        let tick = Tick {
            symbol,
            date: raw.action_day,
            time,
            trading_day: raw.trading_day,
            last_price: raw.last_price,
            open_price: raw.open_price,
            high_price: raw.high_price,
            low_price: raw.low_price,
            pre_close: raw.pre_close,
            open_interest: raw.open_interest,
            pre_open_interest: raw.pre_open_interest,
            volume: raw.volume,
            turnover: raw.turnover,
            upper_limit_price: raw.upper_limit_price,
            lower_limit_price: raw.lower_limit_price,
            upper_band: is_present(raw.upper_band).then_some(raw.upper_band),
            lower_band: is_present(raw.lower_band).then_some(raw.lower_band),
            book: Self::decode_book(&raw),
        };

        let previous = self.last_ticks.get(&raw.instrument_id);
        let tape = tape_classifier::classify(&tick, previous);

        self.last_ticks.insert(raw.instrument_id.clone(), tick.clone());

        if let Some(list) = self.subscribers.get(&raw.instrument_id) {
            for receiver in list {
                receiver.borrow_mut().on_tick(&tick, &tape);
            }
        }
    }

    pub fn last_tick(&self, instrument_id: &str) -> Option<&Tick> {
        self.last_ticks.get(instrument_id)
    }

    pub fn subscriber_count(&self, instrument_id: &str) -> usize {
        self.subscribers.get(instrument_id).map(|l| l.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMarket {
        subscribe_calls: Vec<Vec<String>>,
        unsubscribe_calls: Vec<Vec<String>>,
    }

    impl MarketApi for FakeMarket {
        fn req_user_login(&mut self) -> i32 {
            0
        }
        fn subscribe_market_data(&mut self, instrument_ids: &[String]) -> i32 {
            self.subscribe_calls.push(instrument_ids.to_vec());
            0
        }
        fn unsubscribe_market_data(&mut self, instrument_ids: &[String]) -> i32 {
            self.unsubscribe_calls.push(instrument_ids.to_vec());
            0
        }
        fn last_request_id(&self) -> i32 {
            1
        }
    }

    struct NullReceiver;
    impl TickReceiver for NullReceiver {
        fn on_tick(&mut self, _tick: &Tick, _tape: &crate::model::Tape) {}
    }

    /// S4: subscription refcount round-trips to empty.
    #[test]
    fn s4_subscription_refcount_round_trips() {
        let market = FakeMarket {
            subscribe_calls: vec![],
            unsubscribe_calls: vec![],
        };
        let mut router = MarketRouter::new(market, EngineConfig::default());

        let r1: ReceiverHandle = Rc::new(RefCell::new(NullReceiver));
        let r2: ReceiverHandle = Rc::new(RefCell::new(NullReceiver));

        let a = Symbol::new("A", "SHFE");
        let b = Symbol::new("B", "SHFE");

        router.subscribe(&[a.clone(), b.clone()], r1.clone());
        router.subscribe(&[a.clone()], r2.clone());
        router.unsubscribe(&[a.clone()], &r1);
        router.unsubscribe(&[a.clone()], &r2);
        router.unsubscribe(&[b.clone()], &r1);

        assert!(router.is_empty());
        assert_eq!(router.market.subscribe_calls.len(), 1);
        assert_eq!(router.market.unsubscribe_calls.len(), 2);
    }

    #[test]
    fn orphan_ticks_for_unknown_instrument_are_dropped() {
        let market = FakeMarket {
            subscribe_calls: vec![],
            unsubscribe_calls: vec![],
        };
        let mut router = MarketRouter::new(market, EngineConfig::default());
        let raw = RawDepthMarketDataField {
            instrument_id: "UNKNOWN".to_string(),
            update_time: "09:30:00".to_string(),
            last_price: 100.0,
            ..Default::default()
        };
        router.on_depth_tick(raw);
        assert!(router.last_tick("UNKNOWN").is_none());
    }

    #[test]
    fn depth_decoder_stops_at_first_invalid_level() {
        let raw = RawDepthMarketDataField {
            ask_prices: vec![101.0, 102.0, f64::MAX],
            ask_volumes: vec![1.0, 2.0, 3.0],
            bid_prices: vec![99.0, 0.0],
            bid_volumes: vec![1.0, 1.0],
            ..Default::default()
        };
        let book = MarketRouter::<FakeMarket>::decode_book(&raw);
        assert_eq!(book.asks.len(), 2);
        assert_eq!(book.bids.len(), 1);
    }

    #[test]
    fn last_tick_is_stored_before_fan_out() {
        let market = FakeMarket {
            subscribe_calls: vec![],
            unsubscribe_calls: vec![],
        };
        let mut router = MarketRouter::new(market, EngineConfig::default());

        struct ReentrantReceiver {
            seen_last_tick_price: Rc<RefCell<Option<f64>>>,
        }
        // We can't borrow `router` inside the receiver (it is owned by the
        // router itself), so this test instead checks the simpler
        // observable: last_tick() reflects the just-delivered tick
        // immediately after on_depth_tick returns.
        let _ = ReentrantReceiver {
            seen_last_tick_price: Rc::new(RefCell::new(None)),
        };

        let symbol = Symbol::new("A", "SHFE");
        let r1: ReceiverHandle = Rc::new(RefCell::new(NullReceiver));
        router.subscribe(&[symbol], r1);

        let raw = RawDepthMarketDataField {
            instrument_id: "A".to_string(),
            update_time: "09:30:00".to_string(),
            last_price: 100.0,
            ..Default::default()
        };
        router.on_depth_tick(raw);
        assert_eq!(router.last_tick("A").unwrap().last_price, 100.0);
    }
}
