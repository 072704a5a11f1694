//! User-facing and internal receiver interfaces (spec.md §6): explicit
//! method-set traits in place of the source's dynamically typed callbacks,
//! following the adapter crate's `core::wrapper::Wrapper` convention of one
//! trait per feature area.
use crate::errors::ErrorKind;
use crate::model::{CommissionRate, MarginRate, Order, Position, Trade};

/// A strategy: user-written decision code. The Broker Façade owns the
/// strategy list (spec.md §9: "ownership is unilateral").
pub trait Strategy {
    fn on_init(&mut self) {}
    fn on_destroy(&mut self) {}
    /// `stage` is e.g. `"place-order-risk"`/`"cancel-order-risk"`.
    fn on_risk(&mut self, stage: &str, reason: Option<&str>) {
        let _ = (stage, reason);
    }
    fn on_entrust(&mut self, order: &Order) {
        let _ = order;
    }
    fn on_trade(&mut self, order: &Order, trade: &Trade) {
        let _ = (order, trade);
    }
    fn on_cancel(&mut self, order: &Order) {
        let _ = order;
    }
    fn on_reject(&mut self, order: &Order) {
        let _ = order;
    }
}

/// Verdict from one risk manager in the chain (spec.md §4.6): `Allow`,
/// `Deny(None)` (unspecified reason), or `Deny(Some(reason))`.
#[derive(Clone, Debug, PartialEq)]
pub enum RiskVerdict {
    Allow,
    Deny(Option<String>),
}

pub trait RiskManager {
    fn check_place_order(&mut self, order: &Order) -> RiskVerdict;
    fn check_cancel_order(&mut self, order: &Order) -> RiskVerdict;
}

/// Per-place-order result correlation (spec.md §4.5, §7).
pub trait PlaceOrderResultReceiver {
    fn on_place_order_sent(&mut self, receipt_id: &str);
    fn on_place_order_error(&mut self, reason: &str);
}

/// Per-cancel-order result correlation (spec.md §4.5, §7).
pub trait CancelOrderResultReceiver {
    fn on_cancel_order_sent(&mut self);
    fn on_cancel_order_error(&mut self, reason: &str);
}

pub trait MarginRateReceiver {
    fn on_margin_rate(&mut self, rate: &MarginRate);
}

pub trait CommissionRateReceiver {
    fn on_commission_rate(&mut self, rate: &CommissionRate);
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub balance: f64,
    pub available: f64,
    pub margin: f64,
    pub close_profit: f64,
    pub position_profit: f64,
}

pub trait AccountsReceiver {
    fn on_accounts(&mut self, accounts: &[AccountSnapshot]);
}

pub trait PositionDetailsReceiver {
    fn on_position_details(&mut self, positions: &[Position]);
}

/// The Trading Coordinator's own lifecycle sink (spec.md §4.5, §7): fired
/// once per login (`on_open`), on any surfaced async error (`on_error`),
/// and on every order lifecycle transition. The Broker Façade implements
/// this and fans the per-order events out to strategies.
pub trait TradingEvents {
    fn on_open(&mut self) {}
    fn on_close(&mut self) {}
    fn on_error(&mut self, kind: ErrorKind, message: &str) {
        let _ = (kind, message);
    }
    fn on_entrust(&mut self, order: &Order) {
        let _ = order;
    }
    fn on_trade(&mut self, order: &Order, trade: &Trade) {
        let _ = (order, trade);
    }
    fn on_cancel(&mut self, order: &Order) {
        let _ = order;
    }
    fn on_reject(&mut self, order: &Order) {
        let _ = order;
    }
}
