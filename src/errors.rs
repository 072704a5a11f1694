//! Engine-level error types.
//!
//! Mirrors the two-tier shape of a brokerage gateway SDK's own error model:
//! a small set of stable, named failures (`EngineError`) plus the
//! lifecycle-sink vocabulary (`ErrorKind`) that `onError` callbacks are
//! classified into per the gateway's numeric error payloads.
use std::fmt;
use std::io;

/// The ten `onError` classes a trading-coordinator lifecycle listener can
/// observe. Each wraps the gateway's `{errorId}:{errorMsg}` payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Login,
    QueryOrder,
    QueryTrade,
    QueryInstrument,
    QueryMarginRate,
    QueryCommissionRate,
    QueryAccounts,
    QueryPositions,
    QueryPositionDetails,
    QueryDepthMarketData,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            ErrorKind::Login => "login-error",
            ErrorKind::QueryOrder => "query-order-error",
            ErrorKind::QueryTrade => "query-trade-error",
            ErrorKind::QueryInstrument => "query-instrument-error",
            ErrorKind::QueryMarginRate => "query-margin-rate-error",
            ErrorKind::QueryCommissionRate => "query-commission-rate-error",
            ErrorKind::QueryAccounts => "query-accounts-error",
            ErrorKind::QueryPositions => "query-positions-error",
            ErrorKind::QueryPositionDetails => "query-position-details-error",
            ErrorKind::QueryDepthMarketData => "query-depth-market-data-error",
        };
        write!(f, "{}", s)
    }
}

/// A classified gateway error payload, ready to be routed to the current
/// lifecycle listener along with its formatted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub error_id: i32,
    pub error_msg: String,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, error_id: i32, error_msg: impl Into<String>) -> Self {
        GatewayError {
            kind,
            error_id,
            error_msg: error_msg.into(),
        }
    }

    /// Renders as `{errorId}:{errorMsg}`, the wire format spec.md mandates.
    pub fn message(&self) -> String {
        format!("{}:{}", self.error_id, self.error_msg)
    }
}

/// Per-request failure reasons, handed back to the originating requester
/// (never the global error sink). Stable short strings per spec.md §7.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestError {
    RiskRejected(Option<String>),
    InvalidVolume,
    InstrumentNotFound,
    ExchangeIdError,
    RequestError,
    OrderNotFound,
    AlreadyCanceled,
    Gateway { err_id: i32, err_msg: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RequestError::RiskRejected(_) => write!(f, "Risk Rejected"),
            RequestError::InvalidVolume => write!(f, "Invalid Volume"),
            RequestError::InstrumentNotFound => write!(f, "Instrument Not Found"),
            RequestError::ExchangeIdError => write!(f, "Exchange Id Error"),
            RequestError::RequestError => write!(f, "Request Error"),
            RequestError::OrderNotFound => write!(f, "Order Not Found"),
            RequestError::AlreadyCanceled => write!(f, "Already Canceled"),
            RequestError::Gateway { err_id, err_msg } => write!(f, "{}: {}", err_id, err_msg),
        }
    }
}

/// Crate-wide fallible-operation error, modeled on the adapter crate's
/// `TwsError`/`IBKRApiLibError` split: a small catalogue of named engine
/// failures plus pass-through local I/O/parse errors.
#[derive(Debug)]
pub enum EngineError {
    Gateway(GatewayError),
    Request(RequestError),
    Io(io::Error),
    Parse(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EngineError::Gateway(e) => write!(f, "{}: {}", e.kind, e.message()),
            EngineError::Request(e) => write!(f, "{}", e),
            EngineError::Io(e) => write!(f, "io error: {}", e),
            EngineError::Parse(s) => write!(f, "parse error: {}", s),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(e: io::Error) -> Self {
        EngineError::Io(e)
    }
}

impl From<RequestError> for EngineError {
    fn from(e: RequestError) -> Self {
        EngineError::Request(e)
    }
}

impl From<GatewayError> for EngineError {
    fn from(e: GatewayError) -> Self {
        EngineError::Gateway(e)
    }
}
