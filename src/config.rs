//! Policy knobs. Rate/limit/backoff tuning is a policy surface, not a
//! subsystem (spec.md §1) — constructed by the embedder, never parsed from
//! a file or environment by this crate.
use std::time::Duration;

/// Exchanges for which the gateway reports "today" position in a separate
/// `TodayPosition` field rather than folding it into `Position`.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Sleep between retries of a gateway request that reported
    /// backpressure (-2/-3). Default 100ms per spec.md §4.1.
    pub retry_interval: Duration,
    /// How long a trading-account snapshot remains servable from cache.
    /// Default 3s per spec.md §4.5 "accounts query".
    pub accounts_cache_ttl: Duration,
    /// Exchange ids that report "today" position via a separate field.
    pub today_position_exchanges: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            retry_interval: Duration::from_millis(100),
            accounts_cache_ttl: Duration::from_secs(3),
            today_position_exchanges: vec!["SHFE".to_string(), "INE".to_string()],
        }
    }
}

impl EngineConfig {
    pub fn uses_today_position_field(&self, exchange_id: &str) -> bool {
        self.today_position_exchanges
            .iter()
            .any(|e| e.eq_ignore_ascii_case(exchange_id))
    }
}
