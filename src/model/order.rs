//! Order/Trade entities and their small enums, per spec.md §3/§4.5.
use serde::{Deserialize, Serialize};

use super::ids::{OrderId, ReceiptId, Symbol};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Offset {
    Open,
    Close,
    CloseToday,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderFlag {
    Limit,
    Market,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Submitted,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
}

/// Raw gateway order-submit acknowledgement state, tracked separately from
/// `OrderStatus` because the dedup rule in spec.md §4.5 compares them
/// independently ("if both `OrderSubmitStatus` and `OrderStatus` are
/// unchanged, ignore").
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubmitStatus {
    Unknown,
    InsertSubmitted,
    CancelSubmitted,
    Accepted,
    InsertRejected,
    CancelRejected,
    ModifyRejected,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Trade {
    pub id: String,
    pub date: i32,
    pub time: i32,
    pub price: f64,
    pub volume: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: Option<OrderId>,
    pub receipt_id: ReceiptId,
    pub symbol: Symbol,
    pub insert_date: i32,
    pub insert_time: i32,
    pub side: Side,
    pub offset: Offset,
    pub flag: OrderFlag,
    pub price: f64,
    pub volume: f64,
    pub traded: f64,
    pub status: OrderStatus,
    pub submit_status: SubmitStatus,
    pub trades: Vec<Trade>,
    pub cancel_time: Option<i32>,
}

impl Order {
    pub fn new(
        receipt_id: ReceiptId,
        symbol: Symbol,
        insert_date: i32,
        insert_time: i32,
        side: Side,
        offset: Offset,
        flag: OrderFlag,
        price: f64,
        volume: f64,
    ) -> Self {
        Order {
            id: None,
            receipt_id,
            symbol,
            insert_date,
            insert_time,
            side,
            offset,
            flag,
            price,
            volume,
            traded: 0.0,
            status: OrderStatus::Submitted,
            submit_status: SubmitStatus::Unknown,
            trades: Vec::new(),
            cancel_time: None,
        }
    }

    /// Recomputes `traded` from the attached trade list. Invariant per
    /// spec.md §8.1: `traded = Σ trade.volume`.
    pub fn recompute_traded(&mut self) {
        self.traded = self.trades.iter().map(|t| t.volume).sum();
    }

    pub fn is_fully_filled(&self) -> bool {
        self.traded == self.volume
    }
}
