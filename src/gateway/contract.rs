//! The contract we require from the gateway SDK (spec.md §6). This crate
//! does not implement a transport — these traits are what an embedder
//! backs with their own gateway binding, the same separation the adapter
//! crate draws between `core::client::EClient` (send) and
//! `core::wrapper::Wrapper` (receive).
use crate::model::{Offset, Side};

/// Common trailer on every `Rsp*` batch callback: optional error payload
/// plus the "this is the last record in the batch" flag the gateway SDKs
/// in this family always attach.
#[derive(Clone, Debug, Default)]
pub struct RspInfo {
    pub error_id: Option<i32>,
    pub error_msg: Option<String>,
    pub is_last: bool,
}

impl RspInfo {
    pub fn ok(is_last: bool) -> Self {
        RspInfo {
            error_id: None,
            error_msg: None,
            is_last,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error_id.is_some()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RawOrderField {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: i32,
    pub exchange_order_id: Option<String>,
    pub trader_id: String,
    pub instrument_id: String,
    pub exchange_id: String,
    pub side: Option<Side>,
    pub offset: Option<Offset>,
    pub is_market: bool,
    pub limit_price: f64,
    pub volume_total_original: f64,
    pub volume_traded: f64,
    pub insert_date: i32,
    pub insert_time: i32,
    pub cancel_time: Option<i32>,
    /// Raw gateway order-status code, e.g. `"0"`=AllTraded, `"5"`=Canceled.
    /// Left as the wire string so the coordinator's reducer owns the
    /// mapping (spec.md §4.5).
    pub raw_order_status: String,
    pub raw_order_submit_status: String,
}

#[derive(Clone, Debug, Default)]
pub struct RawTradeField {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: i32,
    pub exchange_order_id: Option<String>,
    pub trader_id: String,
    pub trade_id: String,
    pub instrument_id: String,
    pub exchange_id: String,
    pub side: Side,
    pub offset: Offset,
    pub price: f64,
    pub volume: f64,
    pub trade_date: i32,
    pub trade_time: i32,
}

#[derive(Clone, Debug, Default)]
pub struct RawPositionField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub side: Side,
    pub position: f64,
    pub today_position: f64,
    pub yd_position: f64,
    pub long_frozen: f64,
    pub short_frozen: f64,
}

#[derive(Clone, Debug, Default)]
pub struct RawInstrumentField {
    pub instrument_id: String,
    pub exchange_id: String,
    pub instrument_name: String,
    pub product_id: String,
    /// `"1"`=futures, `"2"`=options, `"3"`=spot, `"4"`=spot-options, per the
    /// gateway's product-class convention.
    pub product_class: String,
    pub delivery_year: i32,
    pub delivery_month: i32,
    pub open_date: i32,
    pub expire_date: i32,
    pub volume_multiple: f64,
    pub price_tick: f64,
    pub min_limit_order_volume: f64,
    pub max_limit_order_volume: f64,
    pub strike_price: f64,
    pub is_call: bool,
}

#[derive(Clone, Debug, Default)]
pub struct RawAccountField {
    pub account_id: String,
    pub balance: f64,
    pub available: f64,
    pub margin: f64,
    pub close_profit: f64,
    pub position_profit: f64,
}

#[derive(Clone, Debug, Default)]
pub struct RawCommissionRateField {
    pub instrument_id: String,
    pub open_ratio: f64,
    pub open_amount: f64,
    pub close_ratio: f64,
    pub close_amount: f64,
    pub close_today_ratio: f64,
    pub close_today_amount: f64,
}

#[derive(Clone, Debug, Default)]
pub struct RawMarginRateField {
    pub instrument_id: String,
    pub long_ratio: f64,
    pub long_amount: f64,
    pub short_ratio: f64,
    pub short_amount: f64,
}

#[derive(Clone, Debug, Default)]
pub struct RawDepthMarketDataField {
    pub instrument_id: String,
    pub exchange_id: Option<String>,
    pub trading_day: i32,
    pub action_day: i32,
    pub update_time: String,
    pub update_millisec: i32,
    pub last_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub pre_close: f64,
    pub open_interest: f64,
    pub pre_open_interest: f64,
    pub volume: f64,
    pub turnover: f64,
    pub upper_limit_price: f64,
    pub lower_limit_price: f64,
    pub upper_band: f64,
    pub lower_band: f64,
    pub bid_prices: Vec<f64>,
    pub bid_volumes: Vec<f64>,
    pub ask_prices: Vec<f64>,
    pub ask_volumes: Vec<f64>,
}

/// Trading endpoint: authentication, order submission/cancellation,
/// reference/account/position queries. Each method returns the gateway's
/// raw "queue request, get numeric return" result — 0=accepted (current
/// request id fetched out-of-band via `last_request_id`), -2/-3=retry,
/// anything else negative=terminal failure (spec.md §4.1, §6).
pub trait TradeApi {
    fn req_authenticate(&mut self) -> i32;
    fn req_user_login(&mut self) -> i32;
    fn req_settlement_info_confirm(&mut self) -> i32;
    fn req_qry_order(&mut self) -> i32;
    fn req_qry_trade(&mut self) -> i32;
    fn req_qry_instrument(&mut self) -> i32;
    fn req_qry_investor_position(&mut self) -> i32;
    fn req_qry_investor_position_detail(&mut self) -> i32;
    fn req_qry_trading_account(&mut self) -> i32;
    fn req_qry_instrument_margin_rate(&mut self, instrument_id: &str) -> i32;
    fn req_qry_instrument_commission_rate(&mut self, instrument_id: &str) -> i32;
    fn req_qry_depth_market_data(&mut self, instrument_id: &str) -> i32;

    /// `GFD`/`AV`/`ContingentCondition=Immediately`/`ForceClose=No` per
    /// spec.md §6; `order_ref` is the engine-minted monotonic ref.
    #[allow(clippy::too_many_arguments)]
    fn req_order_insert(
        &mut self,
        order_ref: i32,
        instrument_id: &str,
        exchange_id: &str,
        side: Side,
        offset: Offset,
        price: f64,
        volume: f64,
    ) -> i32;

    fn req_order_action_delete(
        &mut self,
        order_ref: i32,
        exchange_id: &str,
        exchange_order_id: &str,
    ) -> i32;

    /// The gateway's process-wide "last request id", fetched out-of-band
    /// after a `0` return from any `req_*` call (spec.md §9: "Encapsulate
    /// access behind the Gateway Adapter; do not leak it upward").
    fn last_request_id(&self) -> i32;
}

/// Market-data endpoint: login plus subscribe/unsubscribe (spec.md §6).
pub trait MarketApi {
    fn req_user_login(&mut self) -> i32;
    fn subscribe_market_data(&mut self, instrument_ids: &[String]) -> i32;
    fn unsubscribe_market_data(&mut self, instrument_ids: &[String]) -> i32;
    fn last_request_id(&self) -> i32;
}

/// The callback surface both endpoints deliver events through. Grouped by
/// feature area the way the adapter crate's `core::wrapper::Wrapper` trait
/// groups its callback methods.
pub trait GatewayEvents {
    // -- lifecycle --
    fn on_front_connected(&mut self);
    fn on_front_disconnected(&mut self);
    fn on_rsp_authenticate(&mut self, info: RspInfo);
    fn on_rsp_user_login(
        &mut self,
        front_id: i32,
        session_id: i32,
        max_order_ref: i32,
        trading_day: i32,
        info: RspInfo,
    );
    fn on_rsp_settlement_info_confirm(&mut self, info: RspInfo);

    // -- reference/account/position queries --
    fn on_rsp_qry_order(&mut self, order: Option<RawOrderField>, info: RspInfo);
    fn on_rsp_qry_trade(&mut self, trade: Option<RawTradeField>, info: RspInfo);
    fn on_rsp_qry_instrument(&mut self, instrument: Option<RawInstrumentField>, info: RspInfo);
    fn on_rsp_qry_investor_position(&mut self, position: Option<RawPositionField>, info: RspInfo);
    fn on_rsp_qry_investor_position_detail(
        &mut self,
        position: Option<RawPositionField>,
        info: RspInfo,
    );
    fn on_rsp_qry_trading_account(&mut self, account: Option<RawAccountField>, info: RspInfo);
    fn on_rsp_qry_instrument_margin_rate(
        &mut self,
        rate: Option<RawMarginRateField>,
        info: RspInfo,
    );
    fn on_rsp_qry_instrument_commission_rate(
        &mut self,
        rate: Option<RawCommissionRateField>,
        info: RspInfo,
    );
    fn on_rsp_qry_depth_market_data(&mut self, tick: Option<RawDepthMarketDataField>, info: RspInfo);

    // -- order submission/cancellation correlation --
    fn on_rsp_order_insert(&mut self, request_id: i32, info: RspInfo);
    fn on_rsp_order_action(&mut self, request_id: i32, info: RspInfo);
    fn on_rtn_order(&mut self, order: RawOrderField);
    fn on_rtn_trade(&mut self, trade: RawTradeField);
}

/// Market-endpoint-specific callback surface.
pub trait MarketEvents {
    fn on_front_connected(&mut self);
    fn on_front_disconnected(&mut self);
    fn on_rsp_user_login(&mut self, trading_day: i32, info: RspInfo);
    fn on_rsp_sub_market_data(&mut self, instrument_id: &str, info: RspInfo);
    fn on_rsp_unsub_market_data(&mut self, instrument_id: &str, info: RspInfo);
    fn on_rtn_depth_market_data(&mut self, tick: RawDepthMarketDataField);
}
