//! The Trading Coordinator (spec.md §4.5): runs the login pipeline, owns
//! the authoritative per-symbol maps (orders, positions, statistics,
//! instruments, rate caches), correlates async order/cancel results, and
//! implements the market-order-to-limit-order conversion.
pub mod login;
pub mod orders;
pub mod position;
pub mod queries;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::config::EngineConfig;
use crate::errors::ErrorKind;
use crate::gateway::adapter::GatewayAdapter;
use crate::gateway::contract::{
    GatewayEvents, RawAccountField, RawCommissionRateField, RawDepthMarketDataField,
    RawInstrumentField, RawMarginRateField, RawOrderField, RawPositionField, RawTradeField,
    RspInfo, TradeApi,
};
use crate::model::ids::{ReceiptId, Symbol};
use crate::model::instrument::{Instrument, ProductType};
use crate::model::order::{Offset, OrderFlag, Side};
use crate::model::position::Position;
use crate::model::rates::{CommissionRate, MarginRate, MarginRateSide, RateEntry};
use crate::model::stats::OrderStatistic;
use crate::model::tick::{DepthBook, Tick};
use crate::receivers::{
    AccountsReceiver, CancelOrderResultReceiver, CommissionRateReceiver, MarginRateReceiver,
    PlaceOrderResultReceiver, PositionDetailsReceiver, TradingEvents,
};

use login::{LoginAction, LoginSession};
use orders::{OrderBook, PendingMarketOrder};
use queries::{
    AccountsOutcome, AccountsQuery, CommissionRateQueue, MarginRateQueue, PositionDetailsOutcome,
    PositionDetailsQuery, PositionLookup, QueryOutcome,
};

fn instrument_from_raw(raw: &RawInstrumentField) -> Instrument {
    let product_type = match raw.product_class.as_str() {
        "2" => ProductType::Options,
        "3" => ProductType::Spot,
        "4" => ProductType::SpotOptions,
        _ => ProductType::Futures,
    };
    let is_option = matches!(product_type, ProductType::Options | ProductType::SpotOptions);
    Instrument {
        symbol: Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone()),
        instrument_id: raw.instrument_id.clone(),
        name: raw.instrument_name.clone(),
        exchange_id: raw.exchange_id.clone(),
        product_id: raw.product_id.clone(),
        product_type,
        delivery_time: raw.delivery_year * 100 + raw.delivery_month,
        open_date: raw.open_date,
        expire_date: raw.expire_date,
        volume_multiple: raw.volume_multiple,
        price_tick: raw.price_tick,
        min_limit_order_volume: raw.min_limit_order_volume,
        max_limit_order_volume: raw.max_limit_order_volume,
        strike_price: is_option.then_some(raw.strike_price),
        is_call: is_option.then_some(raw.is_call),
    }
}

/// Folds one `RspQryInvestorPosition` record into `position`, applying the
/// SHFE/INE `TodayPosition` quirk (spec.md §4.5). `long_frozen`/
/// `short_frozen` are reported per-instrument regardless of `side`, so both
/// buckets are written every time; CTP doesn't split frozen by today/history,
/// so it's attributed entirely to the `today` bucket (a design decision, see
/// DESIGN.md).
fn apply_position_snapshot(config: &EngineConfig, position: &mut Position, raw: &RawPositionField) {
    let (today, history) = if config.uses_today_position_field(&raw.exchange_id) {
        (raw.today_position, (raw.position - raw.today_position).max(0.0))
    } else {
        ((raw.position - raw.yd_position).max(0.0), raw.yd_position)
    };
    position.today.bucket_mut(raw.side).position = today;
    position.history.bucket_mut(raw.side).position = history;
    position.today.long.frozen = raw.long_frozen;
    position.today.short.frozen = raw.short_frozen;
}

/// Builds a `Tick` from a depth-market-data response for price-bound
/// resolution only; the full book/tape pipeline lives in `MarketRouter`,
/// not here (spec.md §4.4 vs §4.5 are separate concerns).
fn tick_from_depth_response(raw: &RawDepthMarketDataField) -> Tick {
    Tick {
        symbol: Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone().unwrap_or_default()),
        date: raw.action_day,
        time: 0.0,
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
        upper_band: crate::model::sentinel::is_present(raw.upper_band).then_some(raw.upper_band),
        lower_band: crate::model::sentinel::is_present(raw.lower_band).then_some(raw.lower_band),
        book: DepthBook::default(),
    }
}

enum InstrumentBufferState {
    Idle,
    Loading(Vec<RawInstrumentField>),
}

/// Owns the authoritative trading-side state and drives it from gateway
/// callbacks. Generic over the trading endpoint the embedder supplies.
pub struct TradingCoordinator<T: TradeApi> {
    trade: T,
    adapter: GatewayAdapter,
    config: EngineConfig,
    events: Rc<RefCell<dyn TradingEvents>>,

    login: LoginSession,
    orders: OrderBook,
    positions: HashMap<String, Position>,
    statistics: HashMap<String, OrderStatistic>,
    instruments: HashMap<String, Instrument>,
    instrument_buffer: InstrumentBufferState,

    margin_rates: MarginRateQueue,
    commission_rates: CommissionRateQueue,
    accounts: AccountsQuery,
    position_details: PositionDetailsQuery,
}

impl<T: TradeApi> TradingCoordinator<T> {
    pub fn new(trade: T, config: EngineConfig, events: Rc<RefCell<dyn TradingEvents>>) -> Self {
        TradingCoordinator {
            trade,
            adapter: GatewayAdapter::new(config.clone()),
            config,
            events,
            login: LoginSession::default(),
            orders: OrderBook::new(),
            positions: HashMap::new(),
            statistics: HashMap::new(),
            instruments: HashMap::new(),
            instrument_buffer: InstrumentBufferState::Idle,
            margin_rates: MarginRateQueue::default(),
            commission_rates: CommissionRateQueue::default(),
            accounts: AccountsQuery::default(),
            position_details: PositionDetailsQuery::default(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.login.is_ready()
    }

    fn position_entry(&mut self, symbol: &Symbol) -> &mut Position {
        self.positions
            .entry(symbol.instrument_id.clone())
            .or_insert_with(|| Position::new(symbol.clone()))
    }

    fn surface_error(&mut self, kind: ErrorKind, info: &RspInfo) -> bool {
        if let Some(err) = self.adapter.classify(kind.clone(), info) {
            self.events.borrow_mut().on_error(kind, &err.message());
            true
        } else {
            false
        }
    }

    // -- order/cancel submission, delegated to `orders::OrderBook` --

    pub fn place_limit_order(
        &mut self,
        symbol: Symbol,
        side: Side,
        offset: Offset,
        price: f64,
        volume: f64,
        receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>,
    ) -> Option<ReceiptId> {
        if volume <= 0.0 {
            receiver.borrow_mut().on_place_order_error("Invalid Volume");
            return None;
        }
        let Some(instrument) = self.instruments.get(&symbol.instrument_id) else {
            receiver.borrow_mut().on_place_order_error("Instrument Not Found");
            return None;
        };
        if instrument.exchange_id != symbol.exchange_id {
            receiver.borrow_mut().on_place_order_error("Exchange Id Error");
            return None;
        }

        let order_ref = self.login.next_order_ref();
        let statistic = self.statistics.entry(symbol.instrument_id.clone()).or_default();
        self.orders.submit_limit_order(
            &mut self.trade,
            &self.adapter,
            self.login.front_id,
            self.login.session_id,
            order_ref,
            symbol,
            self.login.trading_day,
            0,
            side,
            offset,
            OrderFlag::Limit,
            price,
            volume,
            statistic,
            receiver,
        )
    }

    /// Places a market order, resolving it to a limit order per spec.md
    /// §4.5's three-tier bound resolution. `fast_tick_lookup` is the
    /// embedder's optional last-tick hook (typically `MarketRouter::last_tick`
    /// wired in by the Broker Façade).
    pub fn place_market_order(
        &mut self,
        symbol: Symbol,
        side: Side,
        offset: Offset,
        volume: f64,
        fast_tick_lookup: Option<&dyn Fn(&str) -> Option<Tick>>,
        receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>,
    ) {
        if volume <= 0.0 {
            receiver.borrow_mut().on_place_order_error("Invalid Volume");
            return;
        }
        if !self.instruments.contains_key(&symbol.instrument_id) {
            receiver.borrow_mut().on_place_order_error("Instrument Not Found");
            return;
        }

        let resolved = self.orders.resolve_market_order_price(
            &symbol.instrument_id,
            side,
            self.login.trading_day,
            fast_tick_lookup,
        );
        if let Some(price) = resolved {
            self.place_limit_order(symbol, side, offset, price, volume, receiver);
            return;
        }

        let instrument_id = symbol.instrument_id.clone();
        let first = self.orders.enqueue_market_order(
            &instrument_id,
            PendingMarketOrder {
                symbol,
                side,
                offset,
                volume,
                insert_date: self.login.trading_day,
                insert_time: 0,
                receiver,
            },
        );
        if first {
            let rc = self
                .adapter
                .submit(|| self.trade.req_qry_depth_market_data(&instrument_id));
            if rc != 0 {
                warn!("depth-market-data query failed for {} (rc={})", instrument_id, rc);
                for pending in self.orders.fail_market_order_queue(&instrument_id) {
                    pending
                        .receiver
                        .borrow_mut()
                        .on_place_order_error("Request Error");
                }
            }
        }
    }

    pub fn cancel_order(
        &mut self,
        receipt_id: &ReceiptId,
        receiver: Rc<RefCell<dyn CancelOrderResultReceiver>>,
    ) {
        let order_ref = self.login.next_order_ref();
        self.orders
            .submit_cancel_order(&mut self.trade, &self.adapter, order_ref, receipt_id, receiver);
    }

    // -- query surface, delegated to `trading::queries` --

    pub fn query_margin_rate(&mut self, instrument_id: &str, receiver: Rc<RefCell<dyn MarginRateReceiver>>) {
        if let Some(rate) = self.margin_rates.cached(instrument_id) {
            receiver.borrow_mut().on_margin_rate(&rate.clone());
            return;
        }
        if let QueryOutcome::Enqueued = self.margin_rates.query(instrument_id, receiver) {
            let id = instrument_id.to_string();
            self.adapter.submit(|| self.trade.req_qry_instrument_margin_rate(&id));
        }
    }

    pub fn query_commission_rate(
        &mut self,
        instrument_id: &str,
        receiver: Rc<RefCell<dyn CommissionRateReceiver>>,
    ) {
        if let Some(rate) = self.commission_rates.cached(instrument_id) {
            receiver.borrow_mut().on_commission_rate(&rate.clone());
            return;
        }
        if let QueryOutcome::Enqueued = self.commission_rates.query(instrument_id, receiver) {
            let id = instrument_id.to_string();
            self.adapter
                .submit(|| self.trade.req_qry_instrument_commission_rate(&id));
        }
    }

    pub fn query_accounts(&mut self, receiver: Rc<RefCell<dyn AccountsReceiver>>) {
        match self.accounts.query(receiver.clone(), self.config.accounts_cache_ttl) {
            AccountsOutcome::CacheHit(snapshot) => {
                receiver.borrow_mut().on_accounts(&snapshot);
            }
            AccountsOutcome::Appended => {}
            AccountsOutcome::IssueRequest => {
                self.adapter.submit(|| self.trade.req_qry_trading_account());
            }
        }
    }

    pub fn query_position_details(&mut self, receiver: Rc<RefCell<dyn PositionDetailsReceiver>>) {
        match self.position_details.query(receiver.clone()) {
            PositionDetailsOutcome::CacheHit(snapshot) => {
                receiver.borrow_mut().on_position_details(&snapshot);
            }
            PositionDetailsOutcome::Appended => {}
            PositionDetailsOutcome::IssueRequest => {
                self.adapter
                    .submit(|| self.trade.req_qry_investor_position_detail());
            }
        }
    }

    pub fn query_position(&self, symbol_key: &str) -> PositionLookup {
        queries::lookup_position(&self.positions, &self.instruments, symbol_key)
    }

    pub fn query_instruments(&self, product_type: Option<ProductType>) -> Vec<&Instrument> {
        queries::query_instruments(&self.instruments, product_type)
    }

    pub fn find_instrument(&self, instrument_id: &str, exchange_id: &str) -> Option<&Instrument> {
        queries::find_instrument_by_symbol(&self.instruments, instrument_id, exchange_id)
    }

    /// Looks up an order by receipt id, e.g. for a risk manager inspecting
    /// the order a cancel request targets.
    pub fn find_order(&self, receipt_id: &ReceiptId) -> Option<&crate::model::Order> {
        self.orders.order(receipt_id)
    }

    pub fn trading_day(&self) -> i32 {
        self.login.trading_day
    }
}

impl<T: TradeApi> GatewayEvents for TradingCoordinator<T> {
    fn on_front_connected(&mut self) {
        if self.login.on_front_connected() == LoginAction::SubmitAuthenticate {
            self.adapter.submit(|| self.trade.req_authenticate());
        }
    }

    fn on_front_disconnected(&mut self) {
        self.login.on_front_disconnected();
        let failed = self.orders.on_front_disconnected();
        for pending in failed {
            pending.receiver.borrow_mut().on_place_order_error("Request Error");
        }
        self.events.borrow_mut().on_close();
    }

    fn on_rsp_authenticate(&mut self, info: RspInfo) {
        if self.surface_error(ErrorKind::Login, &info) {
            return;
        }
        if self.login.on_authenticate_ok() == LoginAction::SubmitLogin {
            self.adapter.submit(|| self.trade.req_user_login());
        }
    }

    fn on_rsp_user_login(
        &mut self,
        front_id: i32,
        session_id: i32,
        max_order_ref: i32,
        trading_day: i32,
        info: RspInfo,
    ) {
        if self.surface_error(ErrorKind::Login, &info) {
            return;
        }
        let (action, advanced) = self.login.on_login_ok(front_id, session_id, max_order_ref, trading_day);
        if advanced {
            self.orders.clear_price_limits();
            self.statistics.clear();
            self.margin_rates = MarginRateQueue::default();
            self.commission_rates = CommissionRateQueue::default();
        }
        if action == LoginAction::SubmitSettlementConfirm {
            self.adapter.submit(|| self.trade.req_settlement_info_confirm());
        }
    }

    fn on_rsp_settlement_info_confirm(&mut self, info: RspInfo) {
        if self.surface_error(ErrorKind::Login, &info) {
            return;
        }
        if self.login.on_confirm_ok() == LoginAction::ClearOrdersAndSubmitQryOrder {
            self.orders.clear_orders();
            self.adapter.submit(|| self.trade.req_qry_order());
        }
    }

    fn on_rsp_qry_order(&mut self, order: Option<RawOrderField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryOrder, &info) {
            return;
        }
        if let Some(raw) = order {
            self.orders.load_order_snapshot(raw);
        }
        if info.is_last && self.login.on_orders_loaded() == LoginAction::ClearTradesAndSubmitQryTrade {
            self.adapter.submit(|| self.trade.req_qry_trade());
        }
    }

    fn on_rsp_qry_trade(&mut self, trade: Option<RawTradeField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryTrade, &info) {
            return;
        }
        if let Some(raw) = trade {
            self.orders.load_trade_snapshot(raw);
        }
        if info.is_last
            && self.login.on_trades_loaded() == LoginAction::ClearInstrumentsAndSubmitQryInstrument
        {
            self.instrument_buffer = InstrumentBufferState::Loading(Vec::new());
            self.adapter.submit(|| self.trade.req_qry_instrument());
        }
    }

    fn on_rsp_qry_instrument(&mut self, instrument: Option<RawInstrumentField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryInstrument, &info) {
            return;
        }
        if let Some(raw) = instrument {
            if let InstrumentBufferState::Loading(buf) = &mut self.instrument_buffer {
                buf.push(raw);
            }
        }
        if !info.is_last {
            return;
        }
        if let InstrumentBufferState::Loading(buf) = std::mem::replace(&mut self.instrument_buffer, InstrumentBufferState::Idle)
        {
            self.instruments.clear();
            for raw in buf {
                let instrument = instrument_from_raw(&raw);
                if matches!(instrument.product_type, ProductType::Futures | ProductType::Options) {
                    self.instruments.insert(instrument.instrument_id.clone(), instrument);
                }
            }
        }
        if self.login.on_instruments_loaded() == LoginAction::ClearPositionsAndSubmitQryPosition {
            self.positions.clear();
            self.adapter.submit(|| self.trade.req_qry_investor_position());
        }
    }

    fn on_rsp_qry_investor_position(&mut self, position: Option<RawPositionField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryPositions, &info) {
            return;
        }
        if let Some(raw) = position {
            let symbol = Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone());
            let entry = self.position_entry(&symbol);
            apply_position_snapshot(&self.config, entry, &raw);
        }
        if info.is_last && self.login.on_positions_loaded() == LoginAction::FireOnOpen {
            self.events.borrow_mut().on_open();
        }
    }

    fn on_rsp_qry_investor_position_detail(&mut self, position: Option<RawPositionField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryPositionDetails, &info) {
            return;
        }
        if let Some(raw) = position {
            let symbol = Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone());
            let mut snapshot = Position::new(symbol);
            apply_position_snapshot(&self.config, &mut snapshot, &raw);
            if let Some(receivers) = self.position_details.record(snapshot, info.is_last) {
                let positions = self.position_details.snapshot();
                for r in receivers {
                    r.borrow_mut().on_position_details(&positions);
                }
            }
        } else if info.is_last {
            if let Some(receivers) = self.position_details.flush() {
                let positions = self.position_details.snapshot();
                for r in receivers {
                    r.borrow_mut().on_position_details(&positions);
                }
            }
        }
    }

    fn on_rsp_qry_trading_account(&mut self, account: Option<RawAccountField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryAccounts, &info) {
            return;
        }
        let snapshot = account.map(|raw| crate::receivers::AccountSnapshot {
            account_id: raw.account_id,
            balance: raw.balance,
            available: raw.available,
            margin: raw.margin,
            close_profit: raw.close_profit,
            position_profit: raw.position_profit,
        });
        if let Some(snapshot) = snapshot {
            if let Some(receivers) = self.accounts.record(snapshot, info.is_last) {
                let accounts = self.accounts.snapshot();
                for r in receivers {
                    r.borrow_mut().on_accounts(&accounts);
                }
            }
        }
    }

    fn on_rsp_qry_instrument_margin_rate(&mut self, rate: Option<RawMarginRateField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryMarginRate, &info) {
            return;
        }
        let Some(raw) = rate else { return };
        let rate = MarginRate {
            instrument_id: raw.instrument_id.clone(),
            rate: MarginRateSide {
                long: RateEntry {
                    ratio: raw.long_ratio,
                    per_volume_amount: raw.long_amount,
                },
                short: RateEntry {
                    ratio: raw.short_ratio,
                    per_volume_amount: raw.short_amount,
                },
            },
        };
        let (notify, next) = self.margin_rates.complete_head(rate.clone());
        for r in notify {
            r.borrow_mut().on_margin_rate(&rate);
        }
        if let Some(next_id) = next {
            self.adapter
                .submit(|| self.trade.req_qry_instrument_margin_rate(&next_id));
        }
    }

    fn on_rsp_qry_instrument_commission_rate(&mut self, rate: Option<RawCommissionRateField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryCommissionRate, &info) {
            return;
        }
        let Some(raw) = rate else { return };
        let rate = CommissionRate {
            instrument_id: raw.instrument_id.clone(),
            open: RateEntry {
                ratio: raw.open_ratio,
                per_volume_amount: raw.open_amount,
            },
            close: RateEntry {
                ratio: raw.close_ratio,
                per_volume_amount: raw.close_amount,
            },
            close_today: RateEntry {
                ratio: raw.close_today_ratio,
                per_volume_amount: raw.close_today_amount,
            },
        };
        let (notify, next) = self.commission_rates.complete_head(rate.clone());
        for r in notify {
            r.borrow_mut().on_commission_rate(&rate);
        }
        if let Some(next_id) = next {
            self.adapter
                .submit(|| self.trade.req_qry_instrument_commission_rate(&next_id));
        }
    }

    fn on_rsp_qry_depth_market_data(&mut self, tick: Option<RawDepthMarketDataField>, info: RspInfo) {
        if self.surface_error(ErrorKind::QueryDepthMarketData, &info) {
            return;
        }
        let Some(raw) = tick else { return };
        let instrument_id = raw.instrument_id.clone();
        let tick = tick_from_depth_response(&raw);
        let (bound, queued) = self.orders.drain_market_order_queue(&instrument_id, &tick);
        for pending in queued {
            let price = bound.price_for(pending.side);
            self.place_limit_order(pending.symbol, pending.side, pending.offset, price, pending.volume, pending.receiver);
        }
    }

    fn on_rsp_order_insert(&mut self, request_id: i32, info: RspInfo) {
        self.orders.on_rsp_order_insert(request_id, info);
    }

    fn on_rsp_order_action(&mut self, request_id: i32, info: RspInfo) {
        self.orders.on_rsp_order_action(request_id, info);
    }

    fn on_rtn_order(&mut self, raw: RawOrderField) {
        let symbol = Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone());
        let mut position = self.positions.remove(&symbol.instrument_id).unwrap_or_else(|| Position::new(symbol.clone()));
        let mut statistic = self.statistics.remove(&symbol.instrument_id).unwrap_or_default();
        self.orders
            .reduce_rtn_order(raw, &mut position, &mut statistic, &mut *self.events.borrow_mut());
        self.positions.insert(symbol.instrument_id.clone(), position);
        self.statistics.insert(symbol.instrument_id, statistic);
    }

    fn on_rtn_trade(&mut self, raw: RawTradeField) {
        let symbol = Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone());
        let mut position = self.positions.remove(&symbol.instrument_id).unwrap_or_else(|| Position::new(symbol.clone()));
        let mut changed = self.position_details.changed;
        self.orders
            .reduce_rtn_trade(raw, &mut position, &mut changed, &mut *self.events.borrow_mut());
        if changed {
            self.position_details.mark_changed();
        }
        self.positions.insert(symbol.instrument_id, position);
    }
}
