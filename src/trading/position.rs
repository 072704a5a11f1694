//! Position accounting operations (`_calcPosition`, `_recordPending`/
//! `_recoverPending`, `_freezePosition`/`_unfreezePosition`), per spec.md
//! §4.5. Pure mutators over `model::Position` — no gateway or map-of-maps
//! bookkeeping lives here, that's `trading::orders`' job.
use crate::model::order::{Offset, Side};
use crate::model::position::{floored_sub, Position};

/// Open(side, v): grows the today position on the order's own side and
/// shrinks that side's pending (intent already reserved at submit time).
pub fn open(position: &mut Position, side: Side, v: f64) {
    position.today.bucket_mut(side).position += v;
    let pending = position.pending.get_mut(side);
    *pending = floored_sub(*pending, v);
}

/// Close(side, v): consumes the *opposite* side's history first, overflow
/// into today; identical sequence for frozen. An order with side=long
/// closes a short position, so the target bucket is `side.opposite()`.
pub fn close(position: &mut Position, side: Side, v: f64) {
    let target = side.opposite();

    let history_bucket = position.history.bucket_mut(target);
    let from_history = v.min(history_bucket.position);
    history_bucket.position -= from_history;
    let remainder = v - from_history;
    let today_bucket = position.today.bucket_mut(target);
    today_bucket.position = floored_sub(today_bucket.position, remainder);

    let history_bucket = position.history.bucket_mut(target);
    let frozen_from_history = v.min(history_bucket.frozen);
    history_bucket.frozen -= frozen_from_history;
    let frozen_remainder = v - frozen_from_history;
    let today_bucket = position.today.bucket_mut(target);
    today_bucket.frozen = floored_sub(today_bucket.frozen, frozen_remainder);
}

/// CloseToday(side, v): decrements only today[opposite].{position,frozen},
/// floored at 0.
pub fn close_today(position: &mut Position, side: Side, v: f64) {
    let target = side.opposite();
    let bucket = position.today.bucket_mut(target);
    bucket.position = floored_sub(bucket.position, v);
    bucket.frozen = floored_sub(bucket.frozen, v);
}

/// Applies a fill of `v` for `(side, offset)` — the single entry point
/// `_calcPosition` from spec.md §4.5 dispatches to.
pub fn calc_position(position: &mut Position, side: Side, offset: Offset, v: f64) {
    match offset {
        Offset::Open => open(position, side, v),
        Offset::Close => close(position, side, v),
        Offset::CloseToday => close_today(position, side, v),
    }
}

/// `_recordPending`: on submit of an open order, reserve intent.
pub fn record_pending(position: &mut Position, side: Side, v: f64) {
    *position.pending.get_mut(side) += v;
}

/// `_recoverPending`: on cancel of an open order. Not floored — if the
/// order partially filled before cancellation, `calc_position` already
/// reduced pending during the fills, so the full original volume may
/// over-decrement (spec.md §9 Open Question: resolved to this literal
/// behavior rather than tracking per-order remaining-open).
pub fn recover_pending(position: &mut Position, side: Side, v: f64) {
    let pending = position.pending.get_mut(side);
    *pending -= v;
}

/// `_freezePosition`: on submit of a close/close-today order, earmark the
/// target bucket. Close always targets history[opposite] (exchange FIFOs
/// history first); close-today targets today[opposite].
pub fn freeze_position(position: &mut Position, side: Side, offset: Offset, v: f64) {
    let target = side.opposite();
    match offset {
        Offset::Close => position.history.bucket_mut(target).frozen += v,
        Offset::CloseToday => position.today.bucket_mut(target).frozen += v,
        Offset::Open => {}
    }
}

/// `_unfreezePosition`: on cancel of a close/close-today order, floored at 0.
pub fn unfreeze_position(position: &mut Position, side: Side, offset: Offset, v: f64) {
    let target = side.opposite();
    match offset {
        Offset::Close => {
            let bucket = position.history.bucket_mut(target);
            bucket.frozen = floored_sub(bucket.frozen, v);
        }
        Offset::CloseToday => {
            let bucket = position.today.bucket_mut(target);
            bucket.frozen = floored_sub(bucket.frozen, v);
        }
        Offset::Open => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::Symbol;

    /// S3: position accounting sequence on `X.DCE`.
    #[test]
    fn s3_position_accounting_sequence() {
        let mut position = Position::new(Symbol::new("X", "DCE"));

        // submit-open-long(v=3) => submitted
        record_pending(&mut position, Side::Long, 3.0);
        assert_eq!(position.pending.long, 3.0);

        // fill(2)
        calc_position(&mut position, Side::Long, Offset::Open, 2.0);
        assert_eq!(position.today.long.position, 2.0);
        assert_eq!(position.pending.long, 1.0);

        // fill(1)
        calc_position(&mut position, Side::Long, Offset::Open, 1.0);
        assert_eq!(position.today.long.position, 3.0);
        assert_eq!(position.pending.long, 0.0);

        // submit-close-long(v=2) as a close-today order with side=Short
        // (selling to close the long position)
        freeze_position(&mut position, Side::Short, Offset::CloseToday, 2.0);
        assert_eq!(position.today.long.frozen, 2.0);

        // fill(2)
        calc_position(&mut position, Side::Short, Offset::CloseToday, 2.0);
        assert_eq!(position.today.long.position, 1.0);
        assert_eq!(position.today.long.frozen, 0.0);

        assert!(position.is_non_negative());
    }

    #[test]
    fn close_consumes_history_before_overflowing_into_today() {
        let mut position = Position::new(Symbol::new("X", "DCE"));
        position.history.short.position = 1.0;
        position.today.short.position = 4.0;

        // order side=Long, offset=Close closes 3 units of the Short position:
        // 1 from history, 2 overflow into today.
        close(&mut position, Side::Long, 3.0);

        assert_eq!(position.history.short.position, 0.0);
        assert_eq!(position.today.short.position, 2.0);
        assert!(position.is_non_negative());
    }

    #[test]
    fn close_never_goes_negative_even_when_over_closing() {
        let mut position = Position::new(Symbol::new("X", "DCE"));
        position.history.short.position = 1.0;
        position.today.short.position = 1.0;

        close(&mut position, Side::Long, 10.0);

        assert_eq!(position.history.short.position, 0.0);
        assert_eq!(position.today.short.position, 0.0);
        assert!(position.is_non_negative());
    }

    #[test]
    fn unfreeze_is_floored_at_zero() {
        let mut position = Position::new(Symbol::new("X", "DCE"));
        freeze_position(&mut position, Side::Short, Offset::CloseToday, 2.0);
        unfreeze_position(&mut position, Side::Short, Offset::CloseToday, 5.0);
        assert_eq!(position.today.long.frozen, 0.0);
    }
}
