//! The gateway boundary: trait contracts for the two logical endpoints
//! (spec.md §6) plus the adapter that turns their synchronous
//! "queue request, get numeric return" calling convention into a
//! suspension-free "submit request, await typed callback" model.
pub mod adapter;
pub mod contract;

pub use adapter::GatewayAdapter;
pub use contract::{GatewayEvents, MarketApi, TradeApi};
