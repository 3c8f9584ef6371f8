//! Single-position state machine: flat -> open -> closed -> flat.
//!
//! An open position lives in `position`; closing it moves a `Trade` into
//! the ledger and books the realised P&L into capital.

use chrono::NaiveDateTime;

use crate::domain::ohlcv::PriceBar;
use crate::domain::position::{position_size, Direction, ExitReason, Position, Trade};

#[derive(Debug, Clone)]
pub struct PositionManager {
    capital: f64,
    risk_per_trade: f64,
    trailing_stop: bool,
    position: Option<Position>,
    trades: Vec<Trade>,
}

impl PositionManager {
    pub fn new(initial_capital: f64, risk_per_trade: f64, trailing_stop: bool) -> Self {
        Self {
            capital: initial_capital,
            risk_per_trade,
            trailing_stop,
            position: None,
            trades: Vec::new(),
        }
    }

    pub fn is_flat(&self) -> bool {
        self.position.is_none()
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    /// Realised capital.
    pub fn capital(&self) -> f64 {
        self.capital
    }

    /// Realised capital plus the open position marked at `price`.
    pub fn equity(&self, price: f64) -> f64 {
        self.capital + self.position.as_ref().map_or(0.0, |p| p.unrealized_pnl(price))
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn into_trades(self) -> Vec<Trade> {
        self.trades
    }

    /// Enter at the bar's close with the given exit distances.
    ///
    /// Ignored while a position is open. Returns `None` without opening
    /// when the computed size is zero.
    pub fn open(
        &mut self,
        direction: Direction,
        bar: &PriceBar,
        stop_distance: f64,
        take_profit_distance: f64,
    ) -> Option<&Position> {
        if self.position.is_some() {
            return None;
        }
        let entry = bar.close;
        let stop_loss = entry - direction.sign() * stop_distance;
        let take_profit = entry + direction.sign() * take_profit_distance;
        let size = position_size(self.capital, self.risk_per_trade, entry, stop_loss);
        if size <= 0 {
            return None;
        }
        self.position = Some(Position::new(
            direction,
            bar.timestamp,
            entry,
            size,
            stop_loss,
            take_profit,
        ));
        self.position.as_ref()
    }

    /// Ratchet the open position's stop toward `close` when trailing is on.
    pub fn update_trailing_stop(&mut self, close: f64) {
        if !self.trailing_stop {
            return;
        }
        if let Some(position) = self.position.as_mut() {
            position.trail_stop(close);
        }
    }

    /// First exit condition met on `bar`, in priority order, with its price.
    ///
    /// `reversal` is whether the opposite canonical signal is true on this
    /// bar; `end_of_day` whether the bar is at or past the cutoff.
    pub fn check_exit(&self, bar: &PriceBar, reversal: bool, end_of_day: bool) -> Option<(ExitReason, f64)> {
        let position = self.position.as_ref()?;
        if position.should_stop_loss(bar) {
            Some((ExitReason::StopLoss, position.stop_loss))
        } else if position.should_take_profit(bar) {
            Some((ExitReason::TakeProfit, position.take_profit))
        } else if reversal {
            Some((ExitReason::SignalReversal, bar.close))
        } else if end_of_day {
            Some((ExitReason::EndOfDay, bar.close))
        } else {
            None
        }
    }

    /// Close the open position and return the resulting trade.
    pub fn close(&mut self, timestamp: NaiveDateTime, price: f64, reason: ExitReason) -> Option<&Trade> {
        let position = self.position.take()?;
        let trade = position.close(timestamp, price, reason);
        self.capital += trade.pnl;
        self.trades.push(trade);
        self.trades.last()
    }
}
