//! Open positions, closed trades and risk-based sizing.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fmt;

use crate::domain::ohlcv::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1 for long, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ExitReason {
    #[serde(rename = "Stop Loss")]
    StopLoss,
    #[serde(rename = "Take Profit")]
    TakeProfit,
    #[serde(rename = "Signal Reversal")]
    SignalReversal,
    #[serde(rename = "End of Day")]
    EndOfDay,
    #[serde(rename = "End of Backtest")]
    EndOfBacktest,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExitReason::StopLoss => "Stop Loss",
            ExitReason::TakeProfit => "Take Profit",
            ExitReason::SignalReversal => "Signal Reversal",
            ExitReason::EndOfDay => "End of Day",
            ExitReason::EndOfBacktest => "End of Backtest",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub direction: Direction,
    pub entry_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub size: i64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub initial_stop_loss: f64,
    /// |entry - initial stop|; the trailing stop keeps this gap to the close.
    pub risk_distance: f64,
}

impl Position {
    pub fn new(
        direction: Direction,
        entry_timestamp: NaiveDateTime,
        entry_price: f64,
        size: i64,
        stop_loss: f64,
        take_profit: f64,
    ) -> Self {
        Self {
            direction,
            entry_timestamp,
            entry_price,
            size,
            stop_loss,
            take_profit,
            initial_stop_loss: stop_loss,
            risk_distance: (entry_price - stop_loss).abs(),
        }
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        (price - self.entry_price) * self.size as f64 * self.direction.sign()
    }

    /// Bar low (long) or high (short) reached the stop.
    pub fn should_stop_loss(&self, bar: &PriceBar) -> bool {
        if self.is_long() {
            bar.low <= self.stop_loss
        } else {
            bar.high >= self.stop_loss
        }
    }

    /// Bar high (long) or low (short) reached the target.
    pub fn should_take_profit(&self, bar: &PriceBar) -> bool {
        if self.is_long() {
            bar.high >= self.take_profit
        } else {
            bar.low <= self.take_profit
        }
    }

    /// Move the stop to `close ∓ risk_distance` if that tightens it.
    /// Returns whether the stop moved.
    pub fn trail_stop(&mut self, close: f64) -> bool {
        let candidate = close - self.direction.sign() * self.risk_distance;
        let tighter = match self.direction {
            Direction::Long => candidate > self.stop_loss,
            Direction::Short => candidate < self.stop_loss,
        };
        if tighter {
            self.stop_loss = candidate;
        }
        tighter
    }

    pub fn close(self, exit_timestamp: NaiveDateTime, exit_price: f64, exit_reason: ExitReason) -> Trade {
        let pnl = self.unrealized_pnl(exit_price);
        Trade {
            direction: self.direction,
            entry_timestamp: self.entry_timestamp,
            exit_timestamp,
            entry_price: self.entry_price,
            exit_price,
            size: self.size,
            initial_stop_loss: self.initial_stop_loss,
            stop_loss: self.stop_loss,
            take_profit: self.take_profit,
            exit_reason,
            pnl,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub direction: Direction,
    pub entry_timestamp: NaiveDateTime,
    pub exit_timestamp: NaiveDateTime,
    pub entry_price: f64,
    pub exit_price: f64,
    pub size: i64,
    pub initial_stop_loss: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_reason: ExitReason,
    pub pnl: f64,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Return on the notional at entry.
    pub fn return_pct(&self) -> f64 {
        let notional = self.entry_price * self.size as f64;
        if notional == 0.0 {
            0.0
        } else {
            self.pnl / notional
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        (self.exit_timestamp - self.entry_timestamp).num_seconds() as f64 / 60.0
    }

    /// Capital put at risk at entry.
    pub fn initial_risk(&self) -> f64 {
        (self.entry_price - self.initial_stop_loss).abs() * self.size as f64
    }
}

/// Risk-based share count.
///
/// `floor(capital * risk_per_trade / |entry - stop|)`, capped at
/// `floor(capital / entry)`. Returns 0 when the stop sits on the entry
/// price or any input is non-positive.
pub fn position_size(capital: f64, risk_per_trade: f64, entry_price: f64, stop_loss: f64) -> i64 {
    let risk_distance = (entry_price - stop_loss).abs();
    if !(risk_distance > 0.0) || !(entry_price > 0.0) || !(capital > 0.0) || !(risk_per_trade > 0.0)
    {
        return 0;
    }
    let by_risk = (capital * risk_per_trade / risk_distance).floor();
    let by_capital = (capital / entry_price).floor();
    by_risk.min(by_capital).max(0.0) as i64
}
