/*! A client-side trading engine sitting between user strategies and a
CTP-style brokerage gateway (trading endpoint + market-data endpoint).

The gateway itself is not implemented here; embedders supply it behind the
`TradeApi`/`MarketApi` request traits and drive this crate's `GatewayEvents`/
`MarketEvents` callback traits from their own transport. On top of that
contract this crate provides:

- a Gateway Adapter handling request backpressure and response classification
- a Trading Coordinator reducing order/trade/position/account state
- a Market Router fanning depth ticks out to subscribers and a recorder sink
- a Bar Aggregator building time/volume/tick bars from ticks
- a Broker Façade composing strategies, risk managers, and both endpoints

# Example

    let broker = BrokerFacade::new(my_trade_api, my_market_api, EngineConfig::default());
*/
pub mod bar_aggregator;
pub mod broker;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod market_router;
pub mod model;
pub mod receivers;
pub mod tape_classifier;
pub mod trading;

pub use broker::BrokerFacade;
pub use config::EngineConfig;
pub use errors::{EngineError, ErrorKind, GatewayError, RequestError};
