//! Tape classification vocabulary, per spec.md §3/§4.2.
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapeType {
    Open,
    Close,
    DualOpen,
    DualClose,
    Turnover,
    NoDeal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapeDirection {
    Up,
    Down,
    None,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TapeStatus {
    OpenLong,
    OpenShort,
    CloseShort,
    CloseLong,
    TurnoverLong,
    TurnoverShort,
    DualOpen,
    DualClose,
    Invalid,
}

/// Derived per-tick classification. Pure function of (current, previous)
/// ticks — see `crate::tape_classifier`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tape {
    pub tape_type: TapeType,
    pub direction: TapeDirection,
    pub status: TapeStatus,
    pub delta_volume: f64,
    pub delta_open_interest: f64,
}
