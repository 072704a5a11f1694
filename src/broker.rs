//! The Broker Façade (spec.md §4.6): composes strategies, risk managers,
//! the Market Router, and the Trading Coordinator behind a single
//! callback-driven entry point. Implements both `GatewayEvents` (trading
//! endpoint) and `MarketEvents` (market endpoint) itself, following the
//! adapter crate's convention of one concrete wrapper implementing every
//! SPI interface the gateway delivers.
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;

use crate::bar_aggregator::{BarGenerator, BarReceiver, BucketMode};
use crate::config::EngineConfig;
use crate::errors::{ErrorKind, RequestError};
use crate::gateway::contract::{
    GatewayEvents, MarketApi, MarketEvents, RawAccountField, RawCommissionRateField,
    RawDepthMarketDataField, RawInstrumentField, RawMarginRateField, RawOrderField,
    RawPositionField, RawTradeField, RspInfo, TradeApi,
};
use crate::market_router::{
    Instrument as RouterInstrument, MarketLifecycle, MarketRouter, RecorderSink, TickReceiver,
};
use crate::model::ids::{ReceiptId, Symbol};
use crate::model::instrument::ProductType;
use crate::model::order::{Offset, Order, OrderFlag, Side, Trade};
use crate::model::tick::Tick;
use crate::receivers::{
    AccountsReceiver, CancelOrderResultReceiver, CommissionRateReceiver, MarginRateReceiver,
    PlaceOrderResultReceiver, PositionDetailsReceiver, RiskManager, RiskVerdict, Strategy,
    TradingEvents,
};
use crate::trading::queries::PositionLookup;
use crate::trading::TradingCoordinator;

/// The façade's configured global error sink (spec.md §4.6: "Errors from
/// either endpoint reach a configured error sink").
pub trait ErrorSink {
    fn on_error(&mut self, kind: ErrorKind, message: &str);
}

struct RecorderSetup {
    sink: Rc<RefCell<dyn RecorderSink>>,
    selector: Box<dyn Fn(&[RouterInstrument]) -> Vec<Symbol>>,
}

/// The `TradingEvents` sink installed into the `TradingCoordinator` at
/// construction time. Shares its state with `BrokerFacade` via `Rc` rather
/// than holding a back-reference to the façade itself, so no self-referential
/// construction (`Rc::new_cyclic`/`Weak`) is needed: `on_open`/`on_close` only
/// set a flag the façade drains once the triggering gateway callback
/// returns, after the coordinator's own borrow of its state has ended.
struct BrokerEvents {
    strategies: Rc<RefCell<Vec<Rc<RefCell<dyn Strategy>>>>>,
    error_sink: Rc<RefCell<Option<Rc<RefCell<dyn ErrorSink>>>>>,
    pending_open: Rc<Cell<bool>>,
    pending_close: Rc<Cell<bool>>,
}

impl TradingEvents for BrokerEvents {
    fn on_open(&mut self) {
        self.pending_open.set(true);
    }

    fn on_close(&mut self) {
        self.pending_close.set(true);
    }

    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        if let Some(sink) = self.error_sink.borrow().as_ref() {
            sink.borrow_mut().on_error(kind, message);
        }
    }

    fn on_entrust(&mut self, order: &Order) {
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_entrust(order);
        }
    }

    fn on_trade(&mut self, order: &Order, trade: &Trade) {
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_trade(order, trade);
        }
    }

    fn on_cancel(&mut self, order: &Order) {
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_cancel(order);
        }
    }

    fn on_reject(&mut self, order: &Order) {
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_reject(order);
        }
    }
}

/// `on_login_success` only ever calls `on_open` in this engine; the recorder
/// start and strategy `onInit` sequencing is driven off the trading
/// endpoint's readiness instead (see `drain_pending_open`), since that's
/// where the authoritative instrument catalogue lives.
struct NullMarketLifecycle;

impl MarketLifecycle for NullMarketLifecycle {
    fn on_open(&mut self) {}
    fn on_close(&mut self) {}
    fn on_error(&mut self, _message: &str) {}
}

/// Composes a strategy list, a risk-manager chain, the `MarketRouter`, and
/// the `TradingCoordinator` (spec.md §4.6). Generic over both gateway
/// endpoints the embedder supplies.
pub struct BrokerFacade<T: TradeApi, M: MarketApi> {
    trading: TradingCoordinator<T>,
    market: MarketRouter<M>,

    strategies: Rc<RefCell<Vec<Rc<RefCell<dyn Strategy>>>>>,
    risk_managers: Vec<Rc<RefCell<dyn RiskManager>>>,
    bar_generators: HashMap<String, Rc<RefCell<BarGenerator>>>,
    recorder: Option<RecorderSetup>,
    error_sink: Rc<RefCell<Option<Rc<RefCell<dyn ErrorSink>>>>>,

    pending_open: Rc<Cell<bool>>,
    pending_close: Rc<Cell<bool>>,
}

impl<T: TradeApi, M: MarketApi> BrokerFacade<T, M> {
    pub fn new(trade: T, market: M, config: EngineConfig) -> Self {
        let strategies: Rc<RefCell<Vec<Rc<RefCell<dyn Strategy>>>>> =
            Rc::new(RefCell::new(Vec::new()));
        let error_sink: Rc<RefCell<Option<Rc<RefCell<dyn ErrorSink>>>>> =
            Rc::new(RefCell::new(None));
        let pending_open = Rc::new(Cell::new(false));
        let pending_close = Rc::new(Cell::new(false));

        let events: Rc<RefCell<dyn TradingEvents>> = Rc::new(RefCell::new(BrokerEvents {
            strategies: strategies.clone(),
            error_sink: error_sink.clone(),
            pending_open: pending_open.clone(),
            pending_close: pending_close.clone(),
        }));

        BrokerFacade {
            trading: TradingCoordinator::new(trade, config.clone(), events),
            market: MarketRouter::new(market, config),
            strategies,
            risk_managers: Vec::new(),
            bar_generators: HashMap::new(),
            recorder: None,
            error_sink,
            pending_open,
            pending_close,
        }
    }

    pub fn add_strategy(&mut self, strategy: Rc<RefCell<dyn Strategy>>) {
        self.strategies.borrow_mut().push(strategy);
    }

    pub fn add_risk_manager(&mut self, risk_manager: Rc<RefCell<dyn RiskManager>>) {
        self.risk_managers.push(risk_manager);
    }

    pub fn set_error_sink(&mut self, sink: Rc<RefCell<dyn ErrorSink>>) {
        *self.error_sink.borrow_mut() = Some(sink);
    }

    pub fn is_ready(&self) -> bool {
        self.trading.is_ready()
    }

    // -- startup/teardown sequencing (spec.md §4.6 "Start"/"Symmetric teardown") --

    /// Configures the recorder selector once; if the trading endpoint is
    /// already `Ready` this starts it immediately, otherwise it starts on
    /// the next trader `onOpen` (spec.md §4.6: "query instruments once").
    pub fn configure_recorder(
        &mut self,
        sink: Rc<RefCell<dyn RecorderSink>>,
        selector: Box<dyn Fn(&[RouterInstrument]) -> Vec<Symbol>>,
    ) {
        self.recorder = Some(RecorderSetup { sink, selector });
        if self.trading.is_ready() {
            self.start_recorder_now();
        }
    }

    pub fn stop_recorder(&mut self) {
        self.market.stop_recorder();
    }

    fn start_recorder_now(&mut self) {
        if let Some(setup) = self.recorder.take() {
            let instruments: Vec<RouterInstrument> = self
                .trading
                .query_instruments(None)
                .into_iter()
                .map(|i| RouterInstrument {
                    symbol: i.symbol.clone(),
                })
                .collect();
            self.market
                .start_recorder(setup.sink, setup.selector, &instruments);
        }
    }

    fn drain_pending_open(&mut self) {
        if !self.pending_open.replace(false) {
            return;
        }
        self.start_recorder_now();
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_init();
        }
    }

    fn drain_pending_close(&mut self) {
        if !self.pending_close.replace(false) {
            return;
        }
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_destroy();
        }
    }

    // -- risk-gated order submission (spec.md §4.6) --

    fn run_place_risk(&mut self, order: &Order) -> Option<Option<String>> {
        for rm in &self.risk_managers {
            if let RiskVerdict::Deny(reason) = rm.borrow_mut().check_place_order(order) {
                return Some(reason);
            }
        }
        None
    }

    fn run_cancel_risk(&mut self, order: &Order) -> Option<Option<String>> {
        for rm in &self.risk_managers {
            if let RiskVerdict::Deny(reason) = rm.borrow_mut().check_cancel_order(order) {
                return Some(reason);
            }
        }
        None
    }

    fn notify_risk(&self, stage: &str, reason: Option<&str>) {
        for s in self.strategies.borrow().iter() {
            s.borrow_mut().on_risk(stage, reason);
        }
    }

    /// A throwaway `Order` built solely so risk managers can inspect the
    /// candidate before it's ever submitted or given a real receipt id.
    fn candidate_order(&self, symbol: &Symbol, side: Side, offset: Offset, flag: OrderFlag, price: f64, volume: f64) -> Order {
        Order::new(
            ReceiptId::new(0, 0, 0),
            symbol.clone(),
            self.trading.trading_day(),
            0,
            side,
            offset,
            flag,
            price,
            volume,
        )
    }

    /// Places a limit order, gated by the place-order risk chain. On first
    /// denial: `strategy.onRisk("place-order-risk", reason)` to every
    /// registered strategy, then `receiver.onPlaceOrderError("Risk
    /// Rejected")`, without reaching the Trading Coordinator.
    pub fn place_order(
        &mut self,
        symbol: Symbol,
        side: Side,
        offset: Offset,
        price: f64,
        volume: f64,
        receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>,
    ) -> Option<ReceiptId> {
        let candidate = self.candidate_order(&symbol, side, offset, OrderFlag::Limit, price, volume);
        if let Some(reason) = self.run_place_risk(&candidate) {
            self.notify_risk("place-order-risk", reason.as_deref());
            receiver
                .borrow_mut()
                .on_place_order_error(&RequestError::RiskRejected(reason).to_string());
            return None;
        }
        self.trading.place_limit_order(symbol, side, offset, price, volume, receiver)
    }

    /// Places a market order, gated the same way as `place_order`. Price
    /// resolution (cached limit / fast-tick lookup / depth query) is the
    /// Trading Coordinator's job; this wires `MarketRouter::last_tick` in
    /// as the fast-tick hook.
    pub fn place_market_order(
        &mut self,
        symbol: Symbol,
        side: Side,
        offset: Offset,
        volume: f64,
        receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>,
    ) {
        let candidate = self.candidate_order(&symbol, side, offset, OrderFlag::Market, 0.0, volume);
        if let Some(reason) = self.run_place_risk(&candidate) {
            self.notify_risk("place-order-risk", reason.as_deref());
            receiver
                .borrow_mut()
                .on_place_order_error(&RequestError::RiskRejected(reason).to_string());
            return;
        }
        let lookup = |instrument_id: &str| self.market.last_tick(instrument_id).cloned();
        self.trading
            .place_market_order(symbol, side, offset, volume, Some(&lookup), receiver);
    }

    /// Cancels an order, gated by the cancel-order risk chain. Unknown
    /// receipt ids fail fast with `"Order Not Found"` before risk managers
    /// ever see them.
    pub fn cancel_order(&mut self, receipt_id: &ReceiptId, receiver: Rc<RefCell<dyn CancelOrderResultReceiver>>) {
        let Some(order) = self.trading.find_order(receipt_id).cloned() else {
            receiver
                .borrow_mut()
                .on_cancel_order_error(&RequestError::OrderNotFound.to_string());
            return;
        };
        if let Some(reason) = self.run_cancel_risk(&order) {
            self.notify_risk("cancel-order-risk", reason.as_deref());
            receiver
                .borrow_mut()
                .on_cancel_order_error(&RequestError::RiskRejected(reason).to_string());
            return;
        }
        self.trading.cancel_order(receipt_id, receiver);
    }

    // -- side/offset convenience helpers (spec.md §4.6) --

    pub fn buy_open(&mut self, symbol: Symbol, price: f64, volume: f64, receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>) -> Option<ReceiptId> {
        self.place_order(symbol, Side::Long, Offset::Open, price, volume, receiver)
    }

    pub fn sell_open(&mut self, symbol: Symbol, price: f64, volume: f64, receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>) -> Option<ReceiptId> {
        self.place_order(symbol, Side::Short, Offset::Open, price, volume, receiver)
    }

    pub fn buy_close(&mut self, symbol: Symbol, price: f64, volume: f64, receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>) -> Option<ReceiptId> {
        self.place_order(symbol, Side::Long, Offset::Close, price, volume, receiver)
    }

    pub fn sell_close(&mut self, symbol: Symbol, price: f64, volume: f64, receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>) -> Option<ReceiptId> {
        self.place_order(symbol, Side::Short, Offset::Close, price, volume, receiver)
    }

    // -- market data subscription (spec.md §4.4, §4.6) --

    pub fn subscribe_tick(&mut self, symbols: &[Symbol], receiver: Rc<RefCell<dyn TickReceiver>>) {
        self.market.subscribe(symbols, receiver);
    }

    pub fn unsubscribe_tick(&mut self, symbols: &[Symbol], receiver: &Rc<RefCell<dyn TickReceiver>>) {
        self.market.unsubscribe(symbols, receiver);
    }

    pub fn last_tick(&self, instrument_id: &str) -> Option<&Tick> {
        self.market.last_tick(instrument_id)
    }

    /// One Bar Aggregator per symbol, lazily created (spec.md §4.6); it's
    /// itself a tick receiver against the Market Router.
    pub fn subscribe_bar(
        &mut self,
        symbol: Symbol,
        price_tick: f64,
        mode: BucketMode,
        receiver: Rc<RefCell<dyn BarReceiver>>,
    ) {
        let id = symbol.instrument_id.clone();
        let generator = self
            .bar_generators
            .entry(id)
            .or_insert_with(|| Rc::new(RefCell::new(BarGenerator::new(symbol.clone(), price_tick, mode))));
        generator.borrow_mut().add_receiver(receiver);
        let tick_receiver: Rc<RefCell<dyn TickReceiver>> = generator.clone();
        self.market.subscribe(&[symbol], tick_receiver);
    }

    /// Garbage-collects the generator once its receiver set empties.
    pub fn unsubscribe_bar(&mut self, symbol: &Symbol, receiver: &Rc<RefCell<dyn BarReceiver>>) {
        let Some(generator) = self.bar_generators.get(&symbol.instrument_id) else {
            return;
        };
        generator.borrow_mut().remove_receiver(receiver);
        if generator.borrow().is_working() {
            return;
        }
        let tick_receiver: Rc<RefCell<dyn TickReceiver>> = generator.clone();
        self.market.unsubscribe(std::slice::from_ref(symbol), &tick_receiver);
        self.bar_generators.remove(&symbol.instrument_id);
    }

    // -- query surface, delegated to `TradingCoordinator` --

    pub fn query_margin_rate(&mut self, instrument_id: &str, receiver: Rc<RefCell<dyn MarginRateReceiver>>) {
        self.trading.query_margin_rate(instrument_id, receiver);
    }

    pub fn query_commission_rate(&mut self, instrument_id: &str, receiver: Rc<RefCell<dyn CommissionRateReceiver>>) {
        self.trading.query_commission_rate(instrument_id, receiver);
    }

    pub fn query_accounts(&mut self, receiver: Rc<RefCell<dyn AccountsReceiver>>) {
        self.trading.query_accounts(receiver);
    }

    pub fn query_position_details(&mut self, receiver: Rc<RefCell<dyn PositionDetailsReceiver>>) {
        self.trading.query_position_details(receiver);
    }

    pub fn query_position(&self, symbol_key: &str) -> PositionLookup {
        self.trading.query_position(symbol_key)
    }

    pub fn query_instruments(&self, product_type: Option<ProductType>) -> Vec<&crate::model::Instrument> {
        self.trading.query_instruments(product_type)
    }

    pub fn find_instrument(&self, instrument_id: &str, exchange_id: &str) -> Option<&crate::model::Instrument> {
        self.trading.find_instrument(instrument_id, exchange_id)
    }
}

impl<T: TradeApi, M: MarketApi> GatewayEvents for BrokerFacade<T, M> {
    fn on_front_connected(&mut self) {
        self.trading.on_front_connected();
    }

    fn on_front_disconnected(&mut self) {
        self.trading.on_front_disconnected();
        self.drain_pending_close();
    }

    fn on_rsp_authenticate(&mut self, info: RspInfo) {
        self.trading.on_rsp_authenticate(info);
    }

    fn on_rsp_user_login(&mut self, front_id: i32, session_id: i32, max_order_ref: i32, trading_day: i32, info: RspInfo) {
        self.trading
            .on_rsp_user_login(front_id, session_id, max_order_ref, trading_day, info);
    }

    fn on_rsp_settlement_info_confirm(&mut self, info: RspInfo) {
        self.trading.on_rsp_settlement_info_confirm(info);
    }

    fn on_rsp_qry_order(&mut self, order: Option<RawOrderField>, info: RspInfo) {
        self.trading.on_rsp_qry_order(order, info);
    }

    fn on_rsp_qry_trade(&mut self, trade: Option<RawTradeField>, info: RspInfo) {
        self.trading.on_rsp_qry_trade(trade, info);
    }

    fn on_rsp_qry_instrument(&mut self, instrument: Option<RawInstrumentField>, info: RspInfo) {
        self.trading.on_rsp_qry_instrument(instrument, info);
    }

    fn on_rsp_qry_investor_position(&mut self, position: Option<RawPositionField>, info: RspInfo) {
        self.trading.on_rsp_qry_investor_position(position, info);
        self.drain_pending_open();
    }

    fn on_rsp_qry_investor_position_detail(&mut self, position: Option<RawPositionField>, info: RspInfo) {
        self.trading.on_rsp_qry_investor_position_detail(position, info);
    }

    fn on_rsp_qry_trading_account(&mut self, account: Option<RawAccountField>, info: RspInfo) {
        self.trading.on_rsp_qry_trading_account(account, info);
    }

    fn on_rsp_qry_instrument_margin_rate(&mut self, rate: Option<RawMarginRateField>, info: RspInfo) {
        self.trading.on_rsp_qry_instrument_margin_rate(rate, info);
    }

    fn on_rsp_qry_instrument_commission_rate(&mut self, rate: Option<RawCommissionRateField>, info: RspInfo) {
        self.trading.on_rsp_qry_instrument_commission_rate(rate, info);
    }

    fn on_rsp_qry_depth_market_data(&mut self, tick: Option<RawDepthMarketDataField>, info: RspInfo) {
        self.trading.on_rsp_qry_depth_market_data(tick, info);
    }

    fn on_rsp_order_insert(&mut self, request_id: i32, info: RspInfo) {
        self.trading.on_rsp_order_insert(request_id, info);
    }

    fn on_rsp_order_action(&mut self, request_id: i32, info: RspInfo) {
        self.trading.on_rsp_order_action(request_id, info);
    }

    fn on_rtn_order(&mut self, order: RawOrderField) {
        self.trading.on_rtn_order(order);
    }

    fn on_rtn_trade(&mut self, trade: RawTradeField) {
        self.trading.on_rtn_trade(trade);
    }
}

impl<T: TradeApi, M: MarketApi> MarketEvents for BrokerFacade<T, M> {
    fn on_front_connected(&mut self) {
        let rc = self.market.request_login();
        if rc != 0 {
            warn!("market req_user_login failed (rc={})", rc);
        }
    }

    fn on_front_disconnected(&mut self) {}

    fn on_rsp_user_login(&mut self, trading_day: i32, info: RspInfo) {
        if let Some(err) = self.market.classify_error(ErrorKind::Login, &info) {
            if let Some(sink) = self.error_sink.borrow().as_ref() {
                sink.borrow_mut().on_error(ErrorKind::Login, &err.message());
            }
            return;
        }
        let mut lifecycle = NullMarketLifecycle;
        self.market.on_login_success(trading_day, &mut lifecycle);
    }

    fn on_rsp_sub_market_data(&mut self, instrument_id: &str, info: RspInfo) {
        if info.is_error() {
            warn!("subscribe rejected for {}", instrument_id);
        }
    }

    fn on_rsp_unsub_market_data(&mut self, instrument_id: &str, info: RspInfo) {
        if info.is_error() {
            warn!("unsubscribe rejected for {}", instrument_id);
        }
    }

    fn on_rtn_depth_market_data(&mut self, tick: RawDepthMarketDataField) {
        self.market.on_depth_tick(tick);
    }
}
