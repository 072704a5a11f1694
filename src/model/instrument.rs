//! Instrument reference data, per spec.md §3. Grounded on the adapter
//! crate's richer `core::contract::Contract`/`ContractDetails`, trimmed to
//! the fields spec.md actually names.
use serde::{Deserialize, Serialize};

use super::ids::Symbol;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Futures,
    Options,
    Spot,
    SpotOptions,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Instrument {
    pub symbol: Symbol,
    pub instrument_id: String,
    pub name: String,
    pub exchange_id: String,
    pub product_id: String,
    pub product_type: ProductType,
    /// `year*100 + month`, per spec.md §3.
    pub delivery_time: i32,
    pub open_date: i32,
    pub expire_date: i32,
    pub volume_multiple: f64,
    pub price_tick: f64,
    pub min_limit_order_volume: f64,
    pub max_limit_order_volume: f64,
    pub strike_price: Option<f64>,
    pub is_call: Option<bool>,
}

impl Instrument {
    pub fn is_option(&self) -> bool {
        matches!(
            self.product_type,
            ProductType::Options | ProductType::SpotOptions
        )
    }
}
