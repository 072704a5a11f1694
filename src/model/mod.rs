//! Core data entities shared across the engine: immutable snapshots handed
//! to receivers, following the adapter crate's `core::common` convention of
//! `#[derive(Serialize, Deserialize, Clone, Debug[, Default])]` structs.
pub mod bar;
pub mod ids;
pub mod instrument;
pub mod order;
pub mod position;
pub mod rates;
pub mod sentinel;
pub mod stats;
pub mod tape;
pub mod tick;

pub use bar::Bar;
pub use ids::{OrderId, ReceiptId, Symbol};
pub use instrument::{Instrument, ProductType};
pub use order::{Offset, Order, OrderFlag, OrderStatus, Side, Trade};
pub use position::Position;
pub use rates::{CommissionRate, MarginRate, RateSide};
pub use stats::OrderStatistic;
pub use tape::{Tape, TapeDirection, TapeStatus, TapeType};
pub use tick::Tick;
