//! The login pipeline state machine, per spec.md §4.5.
//!
//! Each state advances on a specific gateway callback; every error callback
//! is consulted by the classifier first — on a classified failure the
//! lifecycle error listener fires and the state halts with no automatic
//! fall-through (spec.md §4.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginState {
    Disconnected,
    Authenticating,
    LoggingIn,
    Confirming,
    LoadingOrders,
    LoadingTrades,
    LoadingInstruments,
    LoadingPositions,
    Ready,
}

/// What the coordinator should do next after a successful transition. The
/// state machine itself never touches the gateway or the coordinator's
/// maps — `trading::TradingCoordinator` executes these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoginAction {
    SubmitAuthenticate,
    SubmitLogin,
    SubmitSettlementConfirm,
    ClearOrdersAndSubmitQryOrder,
    ClearTradesAndSubmitQryTrade,
    ClearInstrumentsAndSubmitQryInstrument,
    ClearPositionsAndSubmitQryPosition,
    FireOnOpen,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoginSession {
    pub state: LoginState,
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: i32,
    pub trading_day: i32,
}

impl Default for LoginSession {
    fn default() -> Self {
        LoginSession {
            state: LoginState::Disconnected,
            front_id: 0,
            session_id: 0,
            order_ref: 0,
            trading_day: 0,
        }
    }
}

impl LoginSession {
    /// 1. `Disconnected -> FrontConnected` ⇒ submit Authenticate.
    pub fn on_front_connected(&mut self) -> LoginAction {
        self.state = LoginState::Authenticating;
        LoginAction::SubmitAuthenticate
    }

    /// `FrontDisconnected`: drop back to `Disconnected`. Pending place/cancel
    /// correlation maps are cleared by the coordinator, not here.
    pub fn on_front_disconnected(&mut self) {
        self.state = LoginState::Disconnected;
    }

    /// 2. `Authenticating -> Authenticate OK` ⇒ submit Login.
    pub fn on_authenticate_ok(&mut self) -> LoginAction {
        self.state = LoginState::LoggingIn;
        LoginAction::SubmitLogin
    }

    /// 3. `LoggingIn -> Login OK` ⇒ capture session ids and order-ref seed;
    /// submit SettlementConfirm. Returns whether the trading day advanced
    /// (the coordinator clears rate/statistic/price-limit caches on `true`).
    pub fn on_login_ok(
        &mut self,
        front_id: i32,
        session_id: i32,
        max_order_ref: i32,
        trading_day: i32,
    ) -> (LoginAction, bool) {
        let advanced = trading_day != self.trading_day;
        self.front_id = front_id;
        self.session_id = session_id;
        self.order_ref = max_order_ref;
        self.trading_day = trading_day;
        self.state = LoginState::Confirming;
        (LoginAction::SubmitSettlementConfirm, advanced)
    }

    /// 4. `Confirming -> Confirm OK` ⇒ clear orders, submit QryOrder.
    pub fn on_confirm_ok(&mut self) -> LoginAction {
        self.state = LoginState::LoadingOrders;
        LoginAction::ClearOrdersAndSubmitQryOrder
    }

    /// 5. `LoadingOrders -> last order record` ⇒ clear trades, submit QryTrade.
    pub fn on_orders_loaded(&mut self) -> LoginAction {
        self.state = LoginState::LoadingTrades;
        LoginAction::ClearTradesAndSubmitQryTrade
    }

    /// 6. `LoadingTrades -> last trade record` ⇒ clear instruments, submit
    /// QryInstrument.
    pub fn on_trades_loaded(&mut self) -> LoginAction {
        self.state = LoginState::LoadingInstruments;
        LoginAction::ClearInstrumentsAndSubmitQryInstrument
    }

    /// 7. `LoadingInstruments -> last instrument record` ⇒ clear positions,
    /// submit QryInvestorPosition.
    pub fn on_instruments_loaded(&mut self) -> LoginAction {
        self.state = LoginState::LoadingPositions;
        LoginAction::ClearPositionsAndSubmitQryPosition
    }

    /// 8. `LoadingPositions -> last position record` ⇒ fire `onOpen` once.
    pub fn on_positions_loaded(&mut self) -> LoginAction {
        self.state = LoginState::Ready;
        LoginAction::FireOnOpen
    }

    pub fn is_ready(&self) -> bool {
        self.state == LoginState::Ready
    }

    /// Mints the next order ref (monotonic per session, seeded from
    /// `MaxOrderRef`, spec.md §5).
    pub fn next_order_ref(&mut self) -> i32 {
        self.order_ref += 1;
        self.order_ref
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_walks_every_state_in_order() {
        let mut session = LoginSession::default();
        assert_eq!(session.on_front_connected(), LoginAction::SubmitAuthenticate);
        assert_eq!(session.state, LoginState::Authenticating);

        assert_eq!(session.on_authenticate_ok(), LoginAction::SubmitLogin);
        assert_eq!(session.state, LoginState::LoggingIn);

        let (action, advanced) = session.on_login_ok(1, 2, 100, 20260728);
        assert_eq!(action, LoginAction::SubmitSettlementConfirm);
        assert!(advanced);
        assert_eq!(session.front_id, 1);
        assert_eq!(session.session_id, 2);
        assert_eq!(session.order_ref, 100);

        assert_eq!(
            session.on_confirm_ok(),
            LoginAction::ClearOrdersAndSubmitQryOrder
        );
        assert_eq!(
            session.on_orders_loaded(),
            LoginAction::ClearTradesAndSubmitQryTrade
        );
        assert_eq!(
            session.on_trades_loaded(),
            LoginAction::ClearInstrumentsAndSubmitQryInstrument
        );
        assert_eq!(
            session.on_instruments_loaded(),
            LoginAction::ClearPositionsAndSubmitQryPosition
        );
        assert_eq!(session.on_positions_loaded(), LoginAction::FireOnOpen);
        assert!(session.is_ready());
    }

    #[test]
    fn trading_day_unchanged_is_reported() {
        let mut session = LoginSession::default();
        session.on_front_connected();
        session.on_authenticate_ok();
        let (_, advanced) = session.on_login_ok(1, 1, 5, 20260728);
        assert!(advanced);
        session.state = LoginState::LoggingIn;
        let (_, advanced2) = session.on_login_ok(1, 1, 6, 20260728);
        assert!(!advanced2);
    }

    #[test]
    fn order_ref_is_monotonic_and_seeded_from_max_order_ref() {
        let mut session = LoginSession::default();
        session.on_front_connected();
        session.on_authenticate_ok();
        session.on_login_ok(1, 1, 100, 20260728);
        assert_eq!(session.next_order_ref(), 101);
        assert_eq!(session.next_order_ref(), 102);
    }

    #[test]
    fn front_disconnected_resets_to_disconnected_from_any_state() {
        let mut session = LoginSession::default();
        session.on_front_connected();
        session.on_authenticate_ok();
        session.on_login_ok(1, 1, 1, 20260728);
        session.on_front_disconnected();
        assert_eq!(session.state, LoginState::Disconnected);
    }
}
