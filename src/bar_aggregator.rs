//! Per-symbol bar reducer over (tick, tape), per spec.md §4.3.
use std::cell::RefCell;
use std::rc::Rc;

use crate::model::bar::price_to_tick_index;
use crate::model::tape::{Tape, TapeDirection};
use crate::model::tick::Tick;
use crate::model::{Bar, Symbol};

/// `onBar`/`onUpdateBar` receiver. Reference-counted: the generator is
/// "working" while any receiver is attached (spec.md §4.3).
pub trait BarReceiver {
    fn on_bar(&mut self, bar: &Bar);
    /// Whether this receiver wants intra-bar snapshots. Only receivers that
    /// opt in pay for the extra clone-and-dispatch per tick.
    fn wants_updates(&self) -> bool {
        false
    }
    fn on_update_bar(&mut self, _bar: &Bar, _tick: &Tick, _tape: &Tape) {}
}

#[derive(Clone, Copy, Debug)]
pub enum BucketMode {
    /// One-minute buckets: `floor(time/100)*100` on the `HHMMSS.fff`
    /// encoding.
    Time,
    /// Closes when cumulative volume in the bar reaches `max_volume`.
    Volume { max_volume: f64 },
}

fn time_bucket_key(time: f64) -> i64 {
    let hms = time.floor() as i64;
    (hms / 100) * 100
}

/// Per-symbol bar reducer. Owned by the Broker Façade, keyed by symbol
/// (spec.md §3 Ownership, §4.6).
pub struct BarGenerator {
    symbol: Symbol,
    price_tick: f64,
    mode: BucketMode,
    current: Option<Bar>,
    volume_bucket_ordinal: i64,
    last_turnover: Option<f64>,
    receivers: Vec<Rc<RefCell<dyn BarReceiver>>>,
}

impl BarGenerator {
    pub fn new(symbol: Symbol, price_tick: f64, mode: BucketMode) -> Self {
        BarGenerator {
            symbol,
            price_tick,
            mode,
            current: None,
            volume_bucket_ordinal: 0,
            last_turnover: None,
            receivers: Vec::new(),
        }
    }

    pub fn add_receiver(&mut self, receiver: Rc<RefCell<dyn BarReceiver>>) {
        if !self
            .receivers
            .iter()
            .any(|r| Rc::ptr_eq(r, &receiver))
        {
            self.receivers.push(receiver);
        }
    }

    pub fn remove_receiver(&mut self, receiver: &Rc<RefCell<dyn BarReceiver>>) {
        self.receivers.retain(|r| !Rc::ptr_eq(r, receiver));
    }

    pub fn is_working(&self) -> bool {
        !self.receivers.is_empty()
    }

    fn bucket_key_for(&self, tick: &Tick) -> i64 {
        match self.mode {
            BucketMode::Time => time_bucket_key(tick.time),
            BucketMode::Volume { .. } => self.volume_bucket_ordinal,
        }
    }

    fn is_finished(&self, bar: &Bar, tick: &Tick) -> bool {
        match self.mode {
            BucketMode::Time => self.bucket_key_for(tick) != bar.bucket_key,
            BucketMode::Volume { max_volume } => bar.volume >= max_volume,
        }
    }

    /// Feeds one (tick, tape) pair through the reducer, per the step
    /// sequence in spec.md §4.3. Emits a completed bar via `on_bar` when a
    /// bucket closes.
    pub fn on_tick(&mut self, tick: &Tick, tape: &Tape) {
        // 1. freeze and emit a finished bar.
        if let Some(bar) = &self.current {
            if self.is_finished(bar, tick) {
                let finished = self.current.take().unwrap();
                self.emit_bar(&finished);
                if matches!(self.mode, BucketMode::Volume { .. }) {
                    self.volume_bucket_ordinal += 1;
                }
            }
        }

        // 2. drop ticks with no new business.
        if tape.delta_volume == 0.0 {
            self.last_turnover = Some(tick.turnover);
            return;
        }

        let delta_amount = match self.last_turnover {
            Some(prev) => tick.turnover - prev,
            None => tick.turnover,
        };
        self.last_turnover = Some(tick.turnover);

        // 3. create a new bar if none.
        if self.current.is_none() {
            let bucket_key = self.bucket_key_for(tick);
            self.current = Some(Bar::new(
                self.symbol.clone(),
                self.price_tick,
                bucket_key,
                tick.last_price,
            ));
        }

        let bar = self.current.as_mut().unwrap();

        // 4. update OHLC/volume/turnover/open interest.
        bar.open_interest = tick.open_interest;
        bar.close = tick.last_price;
        if tick.last_price > bar.high {
            bar.high = tick.last_price;
        }
        if tick.last_price < bar.low {
            bar.low = tick.last_price;
        }
        bar.volume += tape.delta_volume;
        bar.turnover += delta_amount;

        // 5. apportion volume by tape direction.
        let idx = price_to_tick_index(tick.last_price, self.price_tick);
        match tape.direction {
            TapeDirection::Up => {
                *bar.buy_volumes.entry(idx).or_insert(0.0) += tape.delta_volume;
                bar.delta += tape.delta_volume;
            }
            TapeDirection::Down => {
                *bar.sell_volumes.entry(idx).or_insert(0.0) += tape.delta_volume;
                bar.delta -= tape.delta_volume;
            }
            TapeDirection::None => {}
        }

        // 6. POC update.
        if tick.last_price != bar.poc && !matches!(tape.direction, TapeDirection::None) {
            let poc_idx = price_to_tick_index(bar.poc, self.price_tick);
            let volume_at_last = bar.buy_volumes.get(&idx).copied().unwrap_or(0.0)
                + bar.sell_volumes.get(&idx).copied().unwrap_or(0.0);
            let volume_at_poc = bar.buy_volumes.get(&poc_idx).copied().unwrap_or(0.0)
                + bar.sell_volumes.get(&poc_idx).copied().unwrap_or(0.0);
            if volume_at_last > volume_at_poc {
                bar.poc = tick.last_price;
            }
        }

        // 7. intra-bar snapshot for receivers that want it.
        if self.receivers.iter().any(|r| r.borrow().wants_updates()) {
            let snapshot = bar.clone();
            for r in &self.receivers {
                let mut r = r.borrow_mut();
                if r.wants_updates() {
                    r.on_update_bar(&snapshot, tick, tape);
                }
            }
        }
    }

    fn emit_bar(&mut self, bar: &Bar) {
        for r in &self.receivers {
            r.borrow_mut().on_bar(bar);
        }
    }
}

impl crate::market_router::TickReceiver for BarGenerator {
    fn on_tick(&mut self, tick: &Tick, tape: &Tape) {
        BarGenerator::on_tick(self, tick, tape)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::Symbol;
    use crate::model::tick::{DepthBook, PriceLevel};
    use crate::tape_classifier;

    fn tick(time: f64, last: f64, volume: f64, open_interest: f64) -> Tick {
        Tick {
            symbol: Symbol::new("IF2409", "CFFEX"),
            date: 20260728,
            time,
            trading_day: 20260728,
            last_price: last,
            open_price: last,
            high_price: last,
            low_price: last,
            pre_close: last,
            open_interest,
            pre_open_interest: open_interest,
            volume,
            turnover: last * volume,
            upper_limit_price: 0.0,
            lower_limit_price: 0.0,
            upper_band: None,
            lower_band: None,
            book: DepthBook {
                asks: vec![PriceLevel {
                    price: last + 1.0,
                    volume: 1.0,
                }],
                bids: vec![PriceLevel {
                    price: last - 1.0,
                    volume: 1.0,
                }],
            },
        }
    }

    struct CollectingReceiver {
        bars: Vec<Bar>,
    }

    impl BarReceiver for CollectingReceiver {
        fn on_bar(&mut self, bar: &Bar) {
            self.bars.push(bar.clone());
        }
    }

    #[test]
    fn volume_bucket_closes_and_emits_when_threshold_reached() {
        let symbol = Symbol::new("IF2409", "CFFEX");
        let mut gen = BarGenerator::new(symbol, 1.0, BucketMode::Volume { max_volume: 5.0 });
        let receiver = Rc::new(RefCell::new(CollectingReceiver { bars: vec![] }));
        gen.add_receiver(receiver.clone());

        let mut prev: Option<Tick> = None;
        let ticks = [
            tick(93000.0, 100.0, 10.0, 5.0),
            tick(93001.0, 101.0, 14.0, 6.0),
            tick(93002.0, 102.0, 20.0, 6.0),
        ];
        for t in &ticks {
            let tape = tape_classifier::classify(t, prev.as_ref());
            gen.on_tick(t, &tape);
            prev = Some(t.clone());
        }

        assert!(!receiver.borrow().bars.is_empty());
        let first = &receiver.borrow().bars[0];
        assert!(first.volume >= 5.0);
    }

    #[test]
    fn ticks_with_zero_delta_volume_are_dropped() {
        let symbol = Symbol::new("IF2409", "CFFEX");
        let mut gen = BarGenerator::new(symbol, 1.0, BucketMode::Time);
        let t0 = tick(93000.0, 100.0, 10.0, 5.0);
        let tape0 = tape_classifier::classify(&t0, None);
        gen.on_tick(&t0, &tape0);

        let t1 = tick(93000.0, 100.0, 10.0, 5.0); // same volume => delta 0
        let tape1 = tape_classifier::classify(&t1, Some(&t0));
        assert_eq!(tape1.delta_volume, 0.0);
        gen.on_tick(&t1, &tape1);

        assert_eq!(gen.current.as_ref().unwrap().volume, 10.0);
    }

    #[test]
    fn generator_is_working_only_while_receivers_attached() {
        let symbol = Symbol::new("IF2409", "CFFEX");
        let mut gen = BarGenerator::new(symbol, 1.0, BucketMode::Time);
        assert!(!gen.is_working());
        let receiver = Rc::new(RefCell::new(CollectingReceiver { bars: vec![] }));
        gen.add_receiver(receiver.clone());
        assert!(gen.is_working());
        gen.remove_receiver(&receiver);
        assert!(!gen.is_working());
    }
}
