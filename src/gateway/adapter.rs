//! Thin wrapper over the gateway SDK's synchronous "queue request, get
//! numeric return" calling convention (spec.md §4.1). Owns the bounded
//! retry primitive for backpressure codes -2/-3 and the error-response
//! classifier used by every login-pipeline step and query handler.
use std::thread;

use log::{debug, warn};

use crate::config::EngineConfig;
use crate::errors::{EngineError, ErrorKind, GatewayError, RequestError};
use crate::gateway::contract::RspInfo;

/// Gateway return codes that mean "flow control, retry later" (spec.md
/// §4.1). Any other negative value is a terminal failure; 0 is success.
const RETRY_CODES: [i32; 2] = [-2, -3];

#[derive(Clone, Debug)]
pub struct GatewayAdapter {
    config: EngineConfig,
}

impl GatewayAdapter {
    pub fn new(config: EngineConfig) -> Self {
        GatewayAdapter { config }
    }

    /// Submits a request via `f`, retrying on -2/-3 with the configured
    /// sleep between attempts. Returns the raw gateway return code on
    /// success (0) or the first non-retryable negative value.
    pub fn submit(&self, mut f: impl FnMut() -> i32) -> i32 {
        loop {
            let rc = f();
            if RETRY_CODES.contains(&rc) {
                warn!("gateway request backpressured (rc={}), retrying", rc);
                thread::sleep(self.config.retry_interval);
                continue;
            }
            return rc;
        }
    }

    /// `submit`, but maps a non-zero-non-retry terminal failure straight
    /// into `RequestError::RequestError` (the "Request Error" reason
    /// spec.md §4.5 mandates for place/cancel order submission failures).
    pub fn submit_request(&self, f: impl FnMut() -> i32) -> Result<i32, EngineError> {
        let rc = self.submit(f);
        if rc == 0 {
            debug!("gateway request accepted");
            Ok(rc)
        } else {
            Err(EngineError::Request(RequestError::RequestError))
        }
    }

    /// Classifies an optional gateway error payload into an `ErrorKind` for
    /// routing through the current lifecycle listener. Returns `None` (no
    /// error) when `info.error_id` is absent.
    pub fn classify(&self, kind: ErrorKind, info: &RspInfo) -> Option<GatewayError> {
        if !info.is_error() {
            return None;
        }
        Some(GatewayError::new(
            kind,
            info.error_id.unwrap_or(0),
            info.error_msg.clone().unwrap_or_default(),
        ))
    }
}

/// Parses `HH:MM:SS` into `HH*10000 + MM*100 + SS` (spec.md §4.1).
pub fn parse_time_hms(s: &str) -> Result<i32, EngineError> {
    let mut parts = s.splitn(3, ':');
    let h: i32 = parts
        .next()
        .ok_or_else(|| EngineError::Parse(format!("bad time '{}'", s)))?
        .parse()
        .map_err(|_| EngineError::Parse(format!("bad hour in '{}'", s)))?;
    let m: i32 = parts
        .next()
        .ok_or_else(|| EngineError::Parse(format!("bad time '{}'", s)))?
        .parse()
        .map_err(|_| EngineError::Parse(format!("bad minute in '{}'", s)))?;
    let sec: i32 = parts
        .next()
        .ok_or_else(|| EngineError::Parse(format!("bad time '{}'", s)))?
        .parse()
        .map_err(|_| EngineError::Parse(format!("bad second in '{}'", s)))?;
    Ok(h * 10000 + m * 100 + sec)
}

/// Refines an `HHMMSS`-encoded time with a millisecond fraction, producing
/// the `HHMMSS.fff`-style float spec.md §4.1 describes.
pub fn refine_millis(hms: i32, ms: i32) -> f64 {
    hms as f64 + (ms as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::contract::RspInfo;
    use std::cell::Cell;

    #[test]
    fn parses_hms_into_packed_integer() {
        assert_eq!(parse_time_hms("09:31:05").unwrap(), 93105);
    }

    #[test]
    fn refines_with_millisecond_fraction() {
        assert_eq!(refine_millis(93105, 500), 93105.5);
    }

    #[test]
    fn submit_retries_on_backpressure_then_succeeds() {
        let adapter = GatewayAdapter::new(EngineConfig {
            retry_interval: std::time::Duration::from_millis(1),
            ..Default::default()
        });
        let attempts = Cell::new(0);
        let rc = adapter.submit(|| {
            let n = attempts.get() + 1;
            attempts.set(n);
            if n < 3 {
                -2
            } else {
                0
            }
        });
        assert_eq!(rc, 0);
        assert_eq!(attempts.get(), 3);
    }

    #[test]
    fn submit_request_maps_terminal_failure_to_request_error() {
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let err = adapter.submit_request(|| -5).unwrap_err();
        assert_eq!(err.to_string(), "Request Error");
    }

    #[test]
    fn classify_returns_none_when_no_error_present() {
        let adapter = GatewayAdapter::new(EngineConfig::default());
        assert!(adapter
            .classify(ErrorKind::Login, &RspInfo::ok(true))
            .is_none());
    }

    #[test]
    fn classify_formats_colon_joined_message() {
        let adapter = GatewayAdapter::new(EngineConfig::default());
        let info = RspInfo {
            error_id: Some(3),
            error_msg: Some("bad login".to_string()),
            is_last: true,
        };
        let e = adapter.classify(ErrorKind::Login, &info).unwrap();
        assert_eq!(e.message(), "3:bad login");
    }
}
