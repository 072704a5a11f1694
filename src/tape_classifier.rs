//! Pure tape derivation from a current tick and an optional previous tick
//! (spec.md §4.2). Stateless aside from the caller's memory of the
//! previous tick — no internal state is kept here.
use crate::model::sentinel::MAX_VALUE;
use crate::model::tick::Tick;
use crate::model::{Tape, TapeDirection, TapeStatus, TapeType};

fn classify_type(delta_volume: f64, delta_open_interest: f64) -> TapeType {
    if delta_open_interest > 0.0 {
        if delta_volume == delta_open_interest {
            TapeType::DualOpen
        } else {
            TapeType::Open
        }
    } else if delta_open_interest < 0.0 {
        if delta_volume + delta_open_interest == 0.0 {
            TapeType::DualClose
        } else {
            TapeType::Close
        }
    } else if delta_volume > 0.0 {
        TapeType::Turnover
    } else {
        TapeType::NoDeal
    }
}

fn classify_direction(current: &Tick, previous: Option<&Tick>) -> TapeDirection {
    let cur_ask = current.best_ask_price().unwrap_or(MAX_VALUE);
    let cur_bid = current.best_bid_price().unwrap_or(-MAX_VALUE);

    match previous {
        Some(prev) => {
            let prev_ask = prev.best_ask_price().unwrap_or(MAX_VALUE);
            let prev_bid = prev.best_bid_price().unwrap_or(-MAX_VALUE);

            if current.last_price >= prev_ask {
                TapeDirection::Up
            } else if current.last_price <= prev_bid {
                TapeDirection::Down
            } else if current.last_price >= cur_ask {
                TapeDirection::Up
            } else if current.last_price <= cur_bid {
                TapeDirection::Down
            } else if current.last_price > prev.last_price {
                TapeDirection::Up
            } else if current.last_price < prev.last_price {
                TapeDirection::Down
            } else if cur_bid >= prev_ask {
                TapeDirection::Up
            } else if cur_ask <= prev_bid {
                TapeDirection::Down
            } else {
                TapeDirection::None
            }
        }
        None => {
            if current.last_price >= cur_ask {
                TapeDirection::Up
            } else if current.last_price <= cur_bid {
                TapeDirection::Down
            } else if current.last_price > current.pre_close {
                TapeDirection::Up
            } else if current.last_price < current.pre_close {
                TapeDirection::Down
            } else {
                TapeDirection::None
            }
        }
    }
}

fn classify_status(tape_type: TapeType, direction: TapeDirection) -> TapeStatus {
    use TapeDirection::*;
    use TapeType::*;
    match (tape_type, direction) {
        (Open, Up) => TapeStatus::OpenLong,
        (Open, Down) => TapeStatus::OpenShort,
        (Close, Up) => TapeStatus::CloseShort,
        (Close, Down) => TapeStatus::CloseLong,
        (Turnover, Up) => TapeStatus::TurnoverLong,
        (Turnover, Down) => TapeStatus::TurnoverShort,
        (DualOpen, _) => TapeStatus::DualOpen,
        (DualClose, _) => TapeStatus::DualClose,
        _ => TapeStatus::Invalid,
    }
}

/// Derives a `Tape` from `current` and the caller-supplied `previous` tick
/// (absent on the first tick of a session), per spec.md §4.2.
pub fn classify(current: &Tick, previous: Option<&Tick>) -> Tape {
    let (delta_volume, delta_open_interest) = match previous {
        Some(prev) => (
            current.volume - prev.volume,
            current.open_interest - prev.open_interest,
        ),
        None => (
            current.volume,
            current.open_interest - current.pre_open_interest,
        ),
    };

    let tape_type = classify_type(delta_volume, delta_open_interest);
    let direction = classify_direction(current, previous);
    let status = classify_status(tape_type, direction);

    Tape {
        tape_type,
        direction,
        status,
        delta_volume,
        delta_open_interest,
    }
}
