//! Order/trade lifecycle reduction, submission, market-order-to-limit
//! conversion, and cancellation, per spec.md §4.5 "Order lifecycle
//! reduction" / "Order submission".
use std::collections::HashMap;
use std::rc::Rc;
use std::cell::RefCell;

use crate::errors::RequestError;
use crate::gateway::adapter::GatewayAdapter;
use crate::gateway::contract::{RawOrderField, RawTradeField, RspInfo, TradeApi};
use crate::model::order::{Offset, Order, OrderFlag, OrderStatus, Side, SubmitStatus, Trade};
use crate::model::position::Position;
use crate::model::stats::OrderStatistic;
use crate::model::tick::Tick;
use crate::model::ids::{OrderId, ReceiptId, Symbol};
use crate::receivers::{CancelOrderResultReceiver, PlaceOrderResultReceiver, TradingEvents};
use crate::trading::position as position_ops;

/// Maps the raw gateway order-status code to `OrderStatus`, per spec.md
/// §4.5's reduction table. Codes follow the gateway's own convention:
/// `"a"`=Unknown, `"0"`=AllTraded, `"5"`=Canceled; any other value falls
/// through to the traded-vs-original comparison.
pub fn classify_order_status(
    raw_order_status: &str,
    raw_submit_status: &str,
    traded: f64,
    original_volume: f64,
) -> OrderStatus {
    match raw_order_status {
        "a" => OrderStatus::Submitted,
        "0" => OrderStatus::Filled,
        "5" => {
            if matches!(raw_submit_status, "4" | "5" | "6") {
                OrderStatus::Rejected
            } else {
                OrderStatus::Canceled
            }
        }
        _ => {
            if traded >= original_volume {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            }
        }
    }
}

/// Maps the raw gateway submit-status code to `SubmitStatus`. Modify-related
/// codes (`"2"`, modify-submitted) have no counterpart here since order
/// modification isn't part of this engine's surface; they classify as
/// `Unknown`.
pub fn classify_submit_status(raw_submit_status: &str) -> SubmitStatus {
    match raw_submit_status {
        "0" => SubmitStatus::InsertSubmitted,
        "1" => SubmitStatus::CancelSubmitted,
        "3" => SubmitStatus::Accepted,
        "4" => SubmitStatus::InsertRejected,
        "5" => SubmitStatus::CancelRejected,
        "6" => SubmitStatus::ModifyRejected,
        _ => SubmitStatus::Unknown,
    }
}

/// Validates a place-order request against the reference catalogue, per
/// spec.md §4.5 "resolve instrument; validate exchangeId matches" plus the
/// volume guard from §7.
pub fn validate_order_request(
    instrument_exchange_id: Option<&str>,
    requested_exchange_id: &str,
    volume: f64,
) -> Result<(), RequestError> {
    if volume <= 0.0 {
        return Err(RequestError::InvalidVolume);
    }
    let exchange_id = instrument_exchange_id.ok_or(RequestError::InstrumentNotFound)?;
    if exchange_id != requested_exchange_id {
        return Err(RequestError::ExchangeIdError);
    }
    Ok(())
}

fn gateway_request_error(info: &RspInfo) -> Option<RequestError> {
    if info.is_error() {
        Some(RequestError::Gateway {
            err_id: info.error_id.unwrap_or(0),
            err_msg: info.error_msg.clone().unwrap_or_default(),
        })
    } else {
        None
    }
}

/// A cached exchange price bound, either from the daily limit fields or the
/// (narrower, not cached) circuit-breaker bands — spec.md §4.5 "Market
/// order" resolution step 2.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceLimit {
    pub upper: f64,
    pub lower: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PriceBound {
    Band { upper: f64, lower: f64 },
    Limit(PriceLimit),
}

impl PriceBound {
    pub fn price_for(&self, side: Side) -> f64 {
        let (upper, lower) = match self {
            PriceBound::Band { upper, lower } => (*upper, *lower),
            PriceBound::Limit(l) => (l.upper, l.lower),
        };
        match side {
            Side::Long => upper,
            Side::Short => lower,
        }
    }
}

/// Derives a price bound from a tick: circuit-breaker bands when both are
/// present, else the daily upper/lower limit (spec.md §4.5).
pub fn resolve_bound_from_tick(tick: &Tick) -> PriceBound {
    match (tick.upper_band, tick.lower_band) {
        (Some(upper), Some(lower)) => PriceBound::Band { upper, lower },
        _ => PriceBound::Limit(PriceLimit {
            upper: tick.upper_limit_price,
            lower: tick.lower_limit_price,
        }),
    }
}

/// An order awaiting a depth-market-data response before it can be
/// converted to a limit order (spec.md §4.5 "Market order" resolution
/// step 3).
pub struct PendingMarketOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub offset: Offset,
    pub volume: f64,
    pub insert_date: i32,
    pub insert_time: i32,
    pub receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>,
}

pub enum MarketOrderResolution {
    /// Resolved synchronously; submit a limit order at this price now.
    Immediate(f64),
    /// No bound available; the order was enqueued. `first_for_instrument`
    /// is true when the caller must issue a depth-market-data query.
    Queued { first_for_instrument: bool },
}

/// Owns the per-session order book: authoritative `Order` records indexed
/// by receipt id, the exchange-order-id index, the request-id correlation
/// maps for the async insert/action error path, the cached price-limit
/// table, and the market-order queue.
pub struct OrderBook {
    orders: HashMap<ReceiptId, Order>,
    by_order_id: HashMap<OrderId, ReceiptId>,
    insert_correlation: HashMap<i32, Rc<RefCell<dyn PlaceOrderResultReceiver>>>,
    action_correlation: HashMap<i32, Rc<RefCell<dyn CancelOrderResultReceiver>>>,
    price_limits: HashMap<String, PriceLimit>,
    market_order_queue: HashMap<String, Vec<PendingMarketOrder>>,
}

impl Default for OrderBook {
    fn default() -> Self {
        OrderBook {
            orders: HashMap::new(),
            by_order_id: HashMap::new(),
            insert_correlation: HashMap::new(),
            action_correlation: HashMap::new(),
            price_limits: HashMap::new(),
            market_order_queue: HashMap::new(),
        }
    }
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self, receipt_id: &ReceiptId) -> Option<&Order> {
        self.orders.get(receipt_id)
    }

    pub fn order_by_id(&self, order_id: &OrderId) -> Option<&Order> {
        self.by_order_id.get(order_id).and_then(|r| self.orders.get(r))
    }

    /// Login-pipeline step 4: wipe all orders before replaying `QryOrder`.
    pub fn clear_orders(&mut self) {
        self.orders.clear();
        self.by_order_id.clear();
    }

    pub fn clear_price_limits(&mut self) {
        self.price_limits.clear();
    }

    /// `FrontDisconnected`: drop queued market-order requests and pending
    /// place/cancel correlations (spec.md §4.5). Existing order records
    /// survive — they're reconciled again by the next login's `QryOrder`.
    /// Returns every order that was still waiting on a depth response so
    /// the caller can fail each one's receiver.
    pub fn on_front_disconnected(&mut self) -> Vec<PendingMarketOrder> {
        self.insert_correlation.clear();
        self.action_correlation.clear();
        self.fail_all_market_orders()
    }

    /// Replays one `RspQryOrder` record at login without firing any
    /// lifecycle side effects (it's historical reconciliation, not a live
    /// transition).
    pub fn load_order_snapshot(&mut self, raw: RawOrderField) {
        let receipt_id = ReceiptId::new(raw.front_id, raw.session_id, raw.order_ref);
        let status = classify_order_status(
            &raw.raw_order_status,
            &raw.raw_order_submit_status,
            raw.volume_traded,
            raw.volume_total_original,
        );
        let submit_status = classify_submit_status(&raw.raw_order_submit_status);

        let mut order = Order::new(
            receipt_id.clone(),
            Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone()),
            raw.insert_date,
            raw.insert_time,
            raw.side.unwrap_or(Side::Long),
            raw.offset.unwrap_or(Offset::Open),
            if raw.is_market { OrderFlag::Market } else { OrderFlag::Limit },
            raw.limit_price,
            raw.volume_total_original,
        );
        order.traded = raw.volume_traded;
        order.status = status;
        order.submit_status = submit_status;
        order.cancel_time = raw.cancel_time;

        if let Some(exchange_order_id) = raw.exchange_order_id {
            let id = OrderId::new(raw.exchange_id, raw.trader_id, exchange_order_id);
            self.by_order_id.insert(id.clone(), receipt_id.clone());
            order.id = Some(id);
        }
        self.orders.insert(receipt_id, order);
    }

    /// Replays one `RspQryTrade` record at login: appends the fill to the
    /// already-loaded order (from `load_order_snapshot`) without any
    /// position/event side effect, since positions are rebuilt wholesale
    /// from `RspQryInvestorPosition` a few steps later.
    pub fn load_trade_snapshot(&mut self, raw: RawTradeField) {
        let receipt_id = ReceiptId::new(raw.front_id, raw.session_id, raw.order_ref);
        if let Some(order) = self.orders.get_mut(&receipt_id) {
            order.trades.push(Trade {
                id: raw.trade_id,
                date: raw.trade_date,
                time: raw.trade_time,
                price: raw.price,
                volume: raw.volume,
            });
            order.recompute_traded();
        }
    }

    /// Submits a limit order via retry, per spec.md §4.5 "Order submission".
    /// Bumps `statistic.places` regardless of outcome; on a non-zero return
    /// code notifies `"Request Error"` and returns `None` without creating
    /// an order record. On success, records the provisional order (status
    /// `Submitted`, `submit_status` `Unknown` — the `"submitted"` lifecycle
    /// side effects fire later from `reduce_rtn_order`, once the gateway
    /// actually acknowledges it) and correlates `request_id` for the async
    /// error path.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_limit_order(
        &mut self,
        trade_api: &mut dyn TradeApi,
        adapter: &GatewayAdapter,
        front_id: i32,
        session_id: i32,
        order_ref: i32,
        symbol: Symbol,
        insert_date: i32,
        insert_time: i32,
        side: Side,
        offset: Offset,
        flag: OrderFlag,
        price: f64,
        volume: f64,
        statistic: &mut OrderStatistic,
        receiver: Rc<RefCell<dyn PlaceOrderResultReceiver>>,
    ) -> Option<ReceiptId> {
        statistic.places += 1;
        let rc = adapter.submit(|| {
            trade_api.req_order_insert(
                order_ref,
                &symbol.instrument_id,
                &symbol.exchange_id,
                side,
                offset,
                price,
                volume,
            )
        });
        if rc != 0 {
            receiver
                .borrow_mut()
                .on_place_order_error(&RequestError::RequestError.to_string());
            return None;
        }

        let request_id = trade_api.last_request_id();
        self.insert_correlation.insert(request_id, receiver.clone());

        let receipt_id = ReceiptId::new(front_id, session_id, order_ref);
        let order = Order::new(
            receipt_id.clone(),
            symbol,
            insert_date,
            insert_time,
            side,
            offset,
            flag,
            price,
            volume,
        );
        self.orders.insert(receipt_id.clone(), order);
        receiver.borrow_mut().on_place_order_sent(&receipt_id.to_string());
        Some(receipt_id)
    }

    /// `RspOrderInsert`: routes an attached error payload to the correlated
    /// receiver and drops the correlation. Absence of an error is not a
    /// success signal — `RtnOrder` is authoritative (spec.md §4.5).
    pub fn on_rsp_order_insert(&mut self, request_id: i32, info: RspInfo) {
        if let Some(receiver) = self.insert_correlation.remove(&request_id) {
            if let Some(err) = gateway_request_error(&info) {
                receiver.borrow_mut().on_place_order_error(&err.to_string());
            }
        }
    }

    /// Cancels an order, per spec.md §4.5 "Cancel": requires the order to
    /// exist and be uncancelled, then submits `OrderAction(Delete)` via
    /// retry.
    pub fn submit_cancel_order(
        &mut self,
        trade_api: &mut dyn TradeApi,
        adapter: &GatewayAdapter,
        order_ref: i32,
        receipt_id: &ReceiptId,
        receiver: Rc<RefCell<dyn CancelOrderResultReceiver>>,
    ) {
        let order = match self.orders.get(receipt_id) {
            Some(o) => o,
            None => {
                receiver
                    .borrow_mut()
                    .on_cancel_order_error(&RequestError::OrderNotFound.to_string());
                return;
            }
        };
        if order.cancel_time.is_some() {
            receiver
                .borrow_mut()
                .on_cancel_order_error(&RequestError::AlreadyCanceled.to_string());
            return;
        }
        let exchange_id = order.symbol.exchange_id.clone();
        let exchange_order_id = order
            .id
            .as_ref()
            .map(|id| id.order_local_id.clone())
            .unwrap_or_default();

        let rc = adapter.submit(|| {
            trade_api.req_order_action_delete(order_ref, &exchange_id, &exchange_order_id)
        });
        if rc != 0 {
            receiver
                .borrow_mut()
                .on_cancel_order_error(&RequestError::RequestError.to_string());
            return;
        }
        let request_id = trade_api.last_request_id();
        self.action_correlation.insert(request_id, receiver.clone());
        receiver.borrow_mut().on_cancel_order_sent();
    }

    /// `RspOrderAction`: same error-routing contract as `on_rsp_order_insert`.
    pub fn on_rsp_order_action(&mut self, request_id: i32, info: RspInfo) {
        if let Some(receiver) = self.action_correlation.remove(&request_id) {
            if let Some(err) = gateway_request_error(&info) {
                receiver.borrow_mut().on_cancel_order_error(&err.to_string());
            }
        }
    }

    /// `RtnOrder`: the authoritative lifecycle reduction, per spec.md
    /// §4.5. Deduplicates on unchanged `(status, submit_status)`; otherwise
    /// applies the per-status side effect to `position`/`statistic` and
    /// fires the matching `TradingEvents` method.
    pub fn reduce_rtn_order(
        &mut self,
        raw: RawOrderField,
        position: &mut Position,
        statistic: &mut OrderStatistic,
        events: &mut dyn TradingEvents,
    ) {
        let receipt_id = ReceiptId::new(raw.front_id, raw.session_id, raw.order_ref);
        let new_status = classify_order_status(
            &raw.raw_order_status,
            &raw.raw_order_submit_status,
            raw.volume_traded,
            raw.volume_total_original,
        );
        let new_submit_status = classify_submit_status(&raw.raw_order_submit_status);

        let is_new = !self.orders.contains_key(&receipt_id);
        let order = self.orders.entry(receipt_id.clone()).or_insert_with(|| {
            Order::new(
                receipt_id.clone(),
                Symbol::new(raw.instrument_id.clone(), raw.exchange_id.clone()),
                raw.insert_date,
                raw.insert_time,
                raw.side.unwrap_or(Side::Long),
                raw.offset.unwrap_or(Offset::Open),
                if raw.is_market { OrderFlag::Market } else { OrderFlag::Limit },
                raw.limit_price,
                raw.volume_total_original,
            )
        });

        if !is_new && order.status == new_status && order.submit_status == new_submit_status {
            return;
        }

        if order.id.is_none() {
            if let Some(exchange_order_id) = &raw.exchange_order_id {
                let id = OrderId::new(
                    raw.exchange_id.clone(),
                    raw.trader_id.clone(),
                    exchange_order_id.clone(),
                );
                self.by_order_id.insert(id.clone(), receipt_id.clone());
                order.id = Some(id);
            }
        }
        order.status = new_status;
        order.submit_status = new_submit_status;
        if raw.cancel_time.is_some() {
            order.cancel_time = raw.cancel_time;
        }

        let side = order.side;
        let offset = order.offset;
        let volume = order.volume;

        match new_status {
            OrderStatus::Submitted => {
                match offset {
                    Offset::Open => position_ops::record_pending(position, side, volume),
                    Offset::Close | Offset::CloseToday => {
                        position_ops::freeze_position(position, side, offset, volume)
                    }
                }
                statistic.entrusts += 1;
                events.on_entrust(order);
            }
            OrderStatus::Filled => {
                statistic.filleds += 1;
            }
            OrderStatus::Canceled => {
                match offset {
                    Offset::Open => position_ops::recover_pending(position, side, volume),
                    Offset::Close | Offset::CloseToday => {
                        position_ops::unfreeze_position(position, side, offset, volume)
                    }
                }
                statistic.cancels += 1;
                events.on_cancel(order);
            }
            OrderStatus::Rejected => {
                statistic.rejects += 1;
                events.on_reject(order);
            }
            OrderStatus::PartiallyFilled => {}
        }
    }

    /// `RtnTrade`: appends the fill, applies `_calcPosition`, and fires
    /// `onTrade`. Sets `*position_details_changed = true` so the next
    /// position-details query re-fetches rather than serving cache
    /// (spec.md §4.5 "Position-details query").
    pub fn reduce_rtn_trade(
        &mut self,
        raw: RawTradeField,
        position: &mut Position,
        position_details_changed: &mut bool,
        events: &mut dyn TradingEvents,
    ) {
        let receipt_id = ReceiptId::new(raw.front_id, raw.session_id, raw.order_ref);
        let trade = Trade {
            id: raw.trade_id,
            date: raw.trade_date,
            time: raw.trade_time,
            price: raw.price,
            volume: raw.volume,
        };
        position_ops::calc_position(position, raw.side, raw.offset, raw.volume);
        *position_details_changed = true;
        if let Some(order) = self.orders.get_mut(&receipt_id) {
            order.trades.push(trade.clone());
            order.recompute_traded();
            events.on_trade(order, &trade);
        }
    }

    // -- market-order-to-limit conversion (spec.md §4.5) --

    pub fn cached_price_limit(&self, instrument_id: &str) -> Option<PriceLimit> {
        self.price_limits.get(instrument_id).copied()
    }

    fn cache_if_limit(&mut self, instrument_id: &str, bound: PriceBound) {
        if let PriceBound::Limit(limit) = bound {
            self.price_limits.insert(instrument_id.to_string(), limit);
        }
    }

    /// Resolution steps 1 and 2 of spec.md §4.5's market-order conversion.
    /// Step 3 (enqueue + depth query) is driven by the caller via
    /// `enqueue_market_order`, since issuing the gateway query is the
    /// coordinator's job.
    pub fn resolve_market_order_price(
        &mut self,
        instrument_id: &str,
        side: Side,
        current_trading_day: i32,
        fast_tick_lookup: Option<&dyn Fn(&str) -> Option<Tick>>,
    ) -> Option<f64> {
        if let Some(limit) = self.cached_price_limit(instrument_id) {
            return Some(match side {
                Side::Long => limit.upper,
                Side::Short => limit.lower,
            });
        }
        if let Some(lookup) = fast_tick_lookup {
            if let Some(tick) = lookup(instrument_id) {
                if tick.trading_day == current_trading_day {
                    let bound = resolve_bound_from_tick(&tick);
                    self.cache_if_limit(instrument_id, bound);
                    return Some(bound.price_for(side));
                }
            }
        }
        None
    }

    /// Enqueues a market order awaiting a depth response. Returns `true`
    /// when this is the first queued order for `instrument_id` (caller
    /// must issue `reqQryDepthMarketData`).
    pub fn enqueue_market_order(&mut self, instrument_id: &str, pending: PendingMarketOrder) -> bool {
        let first = !self.market_order_queue.contains_key(instrument_id);
        self.market_order_queue
            .entry(instrument_id.to_string())
            .or_default()
            .push(pending);
        first
    }

    /// Drains the market-order queue for `instrument_id` once a depth
    /// response arrives, returning the resolved bound (for the caller to
    /// compute each queued order's per-side price) and the queued orders.
    pub fn drain_market_order_queue(
        &mut self,
        instrument_id: &str,
        tick: &Tick,
    ) -> (PriceBound, Vec<PendingMarketOrder>) {
        let bound = resolve_bound_from_tick(tick);
        self.cache_if_limit(instrument_id, bound);
        let queue = self.market_order_queue.remove(instrument_id).unwrap_or_default();
        (bound, queue)
    }

    /// Fails every queued market order across every instrument (disconnect
    /// or depth-query error, spec.md §4.5 step 3).
    pub fn fail_all_market_orders(&mut self) -> Vec<PendingMarketOrder> {
        self.market_order_queue.drain().flat_map(|(_, q)| q).collect()
    }

    /// Fails the queued market orders for one instrument (the depth query
    /// issued on their behalf itself failed to submit).
    pub fn fail_market_order_queue(&mut self, instrument_id: &str) -> Vec<PendingMarketOrder> {
        self.market_order_queue.remove(instrument_id).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::gateway::contract::RspInfo;
    use crate::model::tick::DepthBook;
    use std::cell::RefCell;

    struct FakeTrade {
        last_request_id: i32,
        insert_calls: u32,
        action_calls: u32,
        next_rc: i32,
    }

    impl TradeApi for FakeTrade {
        fn req_authenticate(&mut self) -> i32 { 0 }
        fn req_user_login(&mut self) -> i32 { 0 }
        fn req_settlement_info_confirm(&mut self) -> i32 { 0 }
        fn req_qry_order(&mut self) -> i32 { 0 }
        fn req_qry_trade(&mut self) -> i32 { 0 }
        fn req_qry_instrument(&mut self) -> i32 { 0 }
        fn req_qry_investor_position(&mut self) -> i32 { 0 }
        fn req_qry_investor_position_detail(&mut self) -> i32 { 0 }
        fn req_qry_trading_account(&mut self) -> i32 { 0 }
        fn req_qry_instrument_margin_rate(&mut self, _instrument_id: &str) -> i32 { 0 }
        fn req_qry_instrument_commission_rate(&mut self, _instrument_id: &str) -> i32 { 0 }
        fn req_qry_depth_market_data(&mut self, _instrument_id: &str) -> i32 { 0 }
        fn req_order_insert(
            &mut self,
            _order_ref: i32,
            _instrument_id: &str,
            _exchange_id: &str,
            _side: Side,
            _offset: Offset,
            _price: f64,
            _volume: f64,
        ) -> i32 {
            self.insert_calls += 1;
            self.next_rc
        }
        fn req_order_action_delete(
            &mut self,
            _order_ref: i32,
            _exchange_id: &str,
            _exchange_order_id: &str,
        ) -> i32 {
            self.action_calls += 1;
            self.next_rc
        }
        fn last_request_id(&self) -> i32 {
            self.last_request_id
        }
    }

    struct CollectingPlaceReceiver {
        sent: Vec<String>,
        errors: Vec<String>,
    }
    impl PlaceOrderResultReceiver for CollectingPlaceReceiver {
        fn on_place_order_sent(&mut self, receipt_id: &str) {
            self.sent.push(receipt_id.to_string());
        }
        fn on_place_order_error(&mut self, reason: &str) {
            self.errors.push(reason.to_string());
        }
    }

    struct CollectingCancelReceiver {
        sent: u32,
        errors: Vec<String>,
    }
    impl CancelOrderResultReceiver for CollectingCancelReceiver {
        fn on_cancel_order_sent(&mut self) {
            self.sent += 1;
        }
        fn on_cancel_order_error(&mut self, reason: &str) {
            self.errors.push(reason.to_string());
        }
    }

    struct CollectingEvents {
        entrusts: u32,
        trades: u32,
        cancels: u32,
        rejects: u32,
    }
    impl TradingEvents for CollectingEvents {
        fn on_entrust(&mut self, _order: &Order) {
            self.entrusts += 1;
        }
        fn on_trade(&mut self, _order: &Order, _trade: &Trade) {
            self.trades += 1;
        }
        fn on_cancel(&mut self, _order: &Order) {
            self.cancels += 1;
        }
        fn on_reject(&mut self, _order: &Order) {
            self.rejects += 1;
        }
    }

    fn order_field(front: i32, session: i32, order_ref: i32) -> RawOrderField {
        RawOrderField {
            front_id: front,
            session_id: session,
            order_ref,
            exchange_order_id: None,
            trader_id: "t1".to_string(),
            instrument_id: "X".to_string(),
            exchange_id: "DCE".to_string(),
            side: Some(Side::Long),
            offset: Some(Offset::Open),
            is_market: false,
            limit_price: 100.0,
            volume_total_original: 3.0,
            volume_traded: 0.0,
            insert_date: 20260728,
            insert_time: 91500,
            cancel_time: None,
            raw_order_status: "a".to_string(),
            raw_order_submit_status: "0".to_string(),
        }
    }

    #[test]
    fn validate_rejects_zero_volume_then_missing_instrument_then_exchange_mismatch() {
        assert_eq!(
            validate_order_request(Some("DCE"), "DCE", 0.0),
            Err(RequestError::InvalidVolume)
        );
        assert_eq!(
            validate_order_request(None, "DCE", 1.0),
            Err(RequestError::InstrumentNotFound)
        );
        assert_eq!(
            validate_order_request(Some("SHFE"), "DCE", 1.0),
            Err(RequestError::ExchangeIdError)
        );
        assert_eq!(validate_order_request(Some("DCE"), "DCE", 1.0), Ok(()));
    }

    #[test]
    fn submit_limit_order_success_correlates_and_notifies_sent() {
        let mut book = OrderBook::new();
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let mut trade = FakeTrade {
            last_request_id: 42,
            insert_calls: 0,
            action_calls: 0,
            next_rc: 0,
        };
        let mut stat = OrderStatistic::default();
        let receiver = Rc::new(RefCell::new(CollectingPlaceReceiver {
            sent: vec![],
            errors: vec![],
        }));

        let receipt_id = book
            .submit_limit_order(
                &mut trade,
                &adapter,
                1,
                1,
                10,
                Symbol::new("X", "DCE"),
                20260728,
                91500,
                Side::Long,
                Offset::Open,
                OrderFlag::Limit,
                100.0,
                3.0,
                &mut stat,
                receiver.clone(),
            )
            .unwrap();

        assert_eq!(stat.places, 1);
        assert_eq!(receiver.borrow().sent, vec![receipt_id.to_string()]);
        assert!(book.order(&receipt_id).is_some());
    }

    #[test]
    fn submit_limit_order_failure_notifies_request_error_without_creating_order() {
        let mut book = OrderBook::new();
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let mut trade = FakeTrade {
            last_request_id: 1,
            insert_calls: 0,
            action_calls: 0,
            next_rc: -5,
        };
        let mut stat = OrderStatistic::default();
        let receiver = Rc::new(RefCell::new(CollectingPlaceReceiver {
            sent: vec![],
            errors: vec![],
        }));

        let result = book.submit_limit_order(
            &mut trade,
            &adapter,
            1,
            1,
            10,
            Symbol::new("X", "DCE"),
            20260728,
            91500,
            Side::Long,
            Offset::Open,
            OrderFlag::Limit,
            100.0,
            3.0,
            &mut stat,
            receiver.clone(),
        );
        assert!(result.is_none());
        assert_eq!(receiver.borrow().errors, vec!["Request Error".to_string()]);
    }

    #[test]
    fn reduce_rtn_order_dedups_unchanged_status_pair() {
        let mut book = OrderBook::new();
        let mut position = Position::new(Symbol::new("X", "DCE"));
        let mut stat = OrderStatistic::default();
        let mut events = CollectingEvents {
            entrusts: 0,
            trades: 0,
            cancels: 0,
            rejects: 0,
        };

        book.reduce_rtn_order(order_field(1, 1, 10), &mut position, &mut stat, &mut events);
        assert_eq!(events.entrusts, 1);
        assert_eq!(stat.entrusts, 1);
        assert_eq!(position.pending.long, 3.0);

        // identical status/submit_status => deduped, no repeat side effect.
        book.reduce_rtn_order(order_field(1, 1, 10), &mut position, &mut stat, &mut events);
        assert_eq!(events.entrusts, 1);
        assert_eq!(stat.entrusts, 1);
        assert_eq!(position.pending.long, 3.0);
    }

    #[test]
    fn reduce_rtn_order_canceled_after_insert_rejected_submit_status_is_rejected() {
        let mut book = OrderBook::new();
        let mut position = Position::new(Symbol::new("X", "DCE"));
        let mut stat = OrderStatistic::default();
        let mut events = CollectingEvents {
            entrusts: 0,
            trades: 0,
            cancels: 0,
            rejects: 0,
        };

        let mut raw = order_field(1, 1, 10);
        raw.raw_order_status = "5".to_string();
        raw.raw_order_submit_status = "4".to_string();
        book.reduce_rtn_order(raw, &mut position, &mut stat, &mut events);
        assert_eq!(events.rejects, 1);
        assert_eq!(stat.rejects, 1);
    }

    #[test]
    fn reduce_rtn_order_canceled_open_recovers_pending() {
        let mut book = OrderBook::new();
        let mut position = Position::new(Symbol::new("X", "DCE"));
        let mut stat = OrderStatistic::default();
        let mut events = CollectingEvents {
            entrusts: 0,
            trades: 0,
            cancels: 0,
            rejects: 0,
        };

        book.reduce_rtn_order(order_field(1, 1, 10), &mut position, &mut stat, &mut events);
        assert_eq!(position.pending.long, 3.0);

        let mut raw = order_field(1, 1, 10);
        raw.raw_order_status = "5".to_string();
        raw.raw_order_submit_status = "1".to_string();
        raw.cancel_time = Some(91600);
        book.reduce_rtn_order(raw, &mut position, &mut stat, &mut events);
        assert_eq!(events.cancels, 1);
        assert_eq!(stat.cancels, 1);
        assert_eq!(position.pending.long, 0.0);
    }

    #[test]
    fn reduce_rtn_trade_appends_trade_and_updates_position() {
        let mut book = OrderBook::new();
        let mut position = Position::new(Symbol::new("X", "DCE"));
        let mut stat = OrderStatistic::default();
        let mut events = CollectingEvents {
            entrusts: 0,
            trades: 0,
            cancels: 0,
            rejects: 0,
        };
        let mut changed = false;

        book.reduce_rtn_order(order_field(1, 1, 10), &mut position, &mut stat, &mut events);

        let raw_trade = RawTradeField {
            front_id: 1,
            session_id: 1,
            order_ref: 10,
            exchange_order_id: None,
            trader_id: "t1".to_string(),
            trade_id: "tr1".to_string(),
            instrument_id: "X".to_string(),
            exchange_id: "DCE".to_string(),
            side: Side::Long,
            offset: Offset::Open,
            price: 100.0,
            volume: 3.0,
            trade_date: 20260728,
            trade_time: 91501,
        };
        book.reduce_rtn_trade(raw_trade, &mut position, &mut changed, &mut events);

        assert_eq!(events.trades, 1);
        assert!(changed);
        assert_eq!(position.today.long.position, 3.0);
        let receipt_id = ReceiptId::new(1, 1, 10);
        assert_eq!(book.order(&receipt_id).unwrap().traded, 3.0);
    }

    #[test]
    fn cancel_order_not_found_then_already_canceled() {
        let mut book = OrderBook::new();
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let mut trade = FakeTrade {
            last_request_id: 1,
            insert_calls: 0,
            action_calls: 0,
            next_rc: 0,
        };
        let receiver = Rc::new(RefCell::new(CollectingCancelReceiver {
            sent: 0,
            errors: vec![],
        }));
        let missing_id = ReceiptId::new(9, 9, 9);
        book.submit_cancel_order(&mut trade, &adapter, 1, &missing_id, receiver.clone());
        assert_eq!(receiver.borrow().errors, vec!["Order Not Found".to_string()]);

        let mut position = Position::new(Symbol::new("X", "DCE"));
        let mut stat = OrderStatistic::default();
        let mut events = CollectingEvents {
            entrusts: 0,
            trades: 0,
            cancels: 0,
            rejects: 0,
        };
        book.reduce_rtn_order(order_field(1, 1, 10), &mut position, &mut stat, &mut events);
        let receipt_id = ReceiptId::new(1, 1, 10);
        book.orders.get_mut(&receipt_id).unwrap().cancel_time = Some(91600);

        let receiver2 = Rc::new(RefCell::new(CollectingCancelReceiver {
            sent: 0,
            errors: vec![],
        }));
        book.submit_cancel_order(&mut trade, &adapter, 1, &receipt_id, receiver2.clone());
        assert_eq!(
            receiver2.borrow().errors,
            vec!["Already Canceled".to_string()]
        );
    }

    #[test]
    fn cancel_order_success_correlates_and_notifies_sent() {
        let mut book = OrderBook::new();
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let mut trade = FakeTrade {
            last_request_id: 77,
            insert_calls: 0,
            action_calls: 0,
            next_rc: 0,
        };
        let mut position = Position::new(Symbol::new("X", "DCE"));
        let mut stat = OrderStatistic::default();
        let mut events = CollectingEvents {
            entrusts: 0,
            trades: 0,
            cancels: 0,
            rejects: 0,
        };
        book.reduce_rtn_order(order_field(1, 1, 10), &mut position, &mut stat, &mut events);
        let receipt_id = ReceiptId::new(1, 1, 10);

        let receiver = Rc::new(RefCell::new(CollectingCancelReceiver {
            sent: 0,
            errors: vec![],
        }));
        book.submit_cancel_order(&mut trade, &adapter, 1, &receipt_id, receiver.clone());
        assert_eq!(receiver.borrow().sent, 1);

        // a later error on the correlated request_id routes to the receiver.
        book.on_rsp_order_action(
            77,
            RspInfo {
                error_id: Some(9),
                error_msg: Some("busy".to_string()),
                is_last: true,
            },
        );
        assert_eq!(receiver.borrow().errors, vec!["9: busy".to_string()]);
    }

    #[test]
    fn on_rsp_order_insert_routes_error_and_ignores_clean_response() {
        let mut book = OrderBook::new();
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let mut trade = FakeTrade {
            last_request_id: 5,
            insert_calls: 0,
            action_calls: 0,
            next_rc: 0,
        };
        let mut stat = OrderStatistic::default();
        let receiver = Rc::new(RefCell::new(CollectingPlaceReceiver {
            sent: vec![],
            errors: vec![],
        }));
        book.submit_limit_order(
            &mut trade,
            &adapter,
            1,
            1,
            1,
            Symbol::new("X", "DCE"),
            20260728,
            91500,
            Side::Long,
            Offset::Open,
            OrderFlag::Limit,
            100.0,
            1.0,
            &mut stat,
            receiver.clone(),
        );

        book.on_rsp_order_insert(5, RspInfo::ok(true));
        assert!(receiver.borrow().errors.is_empty());
    }

    fn sample_tick(upper_band: Option<f64>, lower_band: Option<f64>) -> Tick {
        Tick {
            symbol: Symbol::new("X", "SHFE"),
            date: 20260728,
            time: 93000.0,
            trading_day: 20260728,
            last_price: 100.0,
            open_price: 100.0,
            high_price: 100.0,
            low_price: 100.0,
            pre_close: 100.0,
            open_interest: 0.0,
            pre_open_interest: 0.0,
            volume: 0.0,
            turnover: 0.0,
            upper_limit_price: 120.0,
            lower_limit_price: 80.0,
            upper_band,
            lower_band,
            book: DepthBook::default(),
        }
    }

    /// S6: no cached limit and no fast-query hook resolves to `None`
    /// (caller must enqueue + query depth data); the eventual depth
    /// response with `upperLimit=120` resolves the queued long order to
    /// 120 and caches the daily-limit bound.
    #[test]
    fn s6_market_order_falls_back_to_queue_then_resolves_from_depth_response() {
        let mut book = OrderBook::new();

        let resolved = book.resolve_market_order_price("X", Side::Long, 20260728, None);
        assert!(resolved.is_none());

        let receiver = Rc::new(RefCell::new(CollectingPlaceReceiver {
            sent: vec![],
            errors: vec![],
        }));
        let first = book.enqueue_market_order(
            "X",
            PendingMarketOrder {
                symbol: Symbol::new("X", "SHFE"),
                side: Side::Long,
                offset: Offset::Open,
                volume: 1.0,
                insert_date: 20260728,
                insert_time: 93000,
                receiver,
            },
        );
        assert!(first);

        let tick = sample_tick(None, None);
        let (bound, queue) = book.drain_market_order_queue("X", &tick);
        assert_eq!(queue.len(), 1);
        assert_eq!(bound.price_for(Side::Long), 120.0);
        assert_eq!(book.cached_price_limit("X"), Some(PriceLimit { upper: 120.0, lower: 80.0 }));
    }

    #[test]
    fn cached_price_limit_short_circuits_resolution() {
        let mut book = OrderBook::new();
        book.price_limits.insert(
            "X".to_string(),
            PriceLimit {
                upper: 130.0,
                lower: 90.0,
            },
        );
        let resolved = book.resolve_market_order_price("X", Side::Short, 20260728, None);
        assert_eq!(resolved, Some(90.0));
    }

    #[test]
    fn circuit_breaker_band_resolves_without_caching() {
        let mut book = OrderBook::new();
        let lookup: &dyn Fn(&str) -> Option<Tick> =
            &|_id| Some(sample_tick(Some(105.0), Some(95.0)));
        let resolved = book.resolve_market_order_price("X", Side::Long, 20260728, Some(lookup));
        assert_eq!(resolved, Some(105.0));
        assert!(book.cached_price_limit("X").is_none());
    }

    #[test]
    fn daily_limit_fallback_is_cached() {
        let mut book = OrderBook::new();
        let lookup: &dyn Fn(&str) -> Option<Tick> = &|_id| Some(sample_tick(None, None));
        let resolved = book.resolve_market_order_price("X", Side::Short, 20260728, Some(lookup));
        assert_eq!(resolved, Some(80.0));
        assert_eq!(
            book.cached_price_limit("X"),
            Some(PriceLimit { upper: 120.0, lower: 80.0 })
        );
    }
}
