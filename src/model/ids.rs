//! Identifier types and their wire encodings, per spec.md §3.
use std::fmt;

/// `instrumentId.exchangeId`, split by `.`. The gateway addresses
/// instruments by `instrumentId` alone; the engine must translate both
/// directions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol {
    pub instrument_id: String,
    pub exchange_id: String,
}

impl Symbol {
    pub fn new(instrument_id: impl Into<String>, exchange_id: impl Into<String>) -> Self {
        Symbol {
            instrument_id: instrument_id.into(),
            exchange_id: exchange_id.into(),
        }
    }

    /// Parses `instrumentId.exchangeId`. Returns `None` if there isn't
    /// exactly one `.` separator.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(2, '.');
        let instrument_id = parts.next()?;
        let exchange_id = parts.next()?;
        if instrument_id.is_empty() || exchange_id.is_empty() {
            return None;
        }
        Some(Symbol::new(instrument_id, exchange_id))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.instrument_id, self.exchange_id)
    }
}

/// `exchangeId:traderId:orderLocalId`, stable once the exchange accepts the
/// order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OrderId {
    pub exchange_id: String,
    pub trader_id: String,
    pub order_local_id: String,
}

impl OrderId {
    pub fn new(
        exchange_id: impl Into<String>,
        trader_id: impl Into<String>,
        order_local_id: impl Into<String>,
    ) -> Self {
        OrderId {
            exchange_id: exchange_id.into(),
            trader_id: trader_id.into(),
            order_local_id: order_local_id.into(),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let exchange_id = parts.next()?;
        let trader_id = parts.next()?;
        let order_local_id = parts.next()?;
        Some(OrderId::new(exchange_id, trader_id, order_local_id))
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.exchange_id, self.trader_id, self.order_local_id
        )
    }
}

/// `frontId:sessionId:orderRef`, minted by the client at submission and
/// returned to the requester for correlation before the exchange id exists.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiptId {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: i32,
}

impl ReceiptId {
    pub fn new(front_id: i32, session_id: i32, order_ref: i32) -> Self {
        ReceiptId {
            front_id,
            session_id,
            order_ref,
        }
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}:{}", self.front_id, self.session_id, self.order_ref)
    }
}
