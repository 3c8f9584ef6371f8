//! Performance metrics over a finished run.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::backtest::EquityPoint;
use super::position::Trade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const CALENDAR_DAYS_PER_YEAR: f64 = 365.0;

/// Thresholds behind the `meets_*_target` flags.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceTargets {
    pub min_win_rate: f64,
    pub min_profit_factor: f64,
    pub min_sharpe_ratio: f64,
    pub min_annual_return: f64,
    pub max_drawdown: f64,
}

impl Default for PerformanceTargets {
    fn default() -> Self {
        Self {
            min_win_rate: 0.5,
            min_profit_factor: 1.5,
            min_sharpe_ratio: 1.0,
            min_annual_return: 0.10,
            max_drawdown: 0.20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceMetrics {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub total_return: f64,
    pub annual_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub expected_value: f64,
    pub expected_value_pct: f64,
    pub sharpe_ratio: f64,
    pub profit_factor: f64,
    pub calmar_ratio: f64,
    pub recovery_factor: f64,
    pub max_drawdown: f64,
    pub avg_risk_per_trade: f64,
    pub avg_trade_duration_minutes: f64,
    pub max_win_streak: usize,
    pub max_loss_streak: usize,
    pub final_equity: f64,
    pub meets_win_rate_target: bool,
    pub meets_profit_factor_target: bool,
    pub meets_sharpe_target: bool,
    pub meets_return_target: bool,
    pub meets_drawdown_target: bool,
}

impl PerformanceMetrics {
    /// Metrics for a run with no trades.
    pub fn empty(initial_capital: f64) -> Self {
        Self {
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            total_pnl: 0.0,
            total_return: 0.0,
            annual_return: 0.0,
            avg_win: 0.0,
            avg_loss: 0.0,
            expected_value: 0.0,
            expected_value_pct: 0.0,
            sharpe_ratio: 0.0,
            profit_factor: 0.0,
            calmar_ratio: 0.0,
            recovery_factor: 0.0,
            max_drawdown: 0.0,
            avg_risk_per_trade: 0.0,
            avg_trade_duration_minutes: 0.0,
            max_win_streak: 0,
            max_loss_streak: 0,
            final_equity: initial_capital,
            meets_win_rate_target: false,
            meets_profit_factor_target: false,
            meets_sharpe_target: false,
            meets_return_target: false,
            meets_drawdown_target: true,
        }
    }

    pub fn compute(
        trades: &[Trade],
        equity_curve: &[EquityPoint],
        initial_capital: f64,
        targets: &PerformanceTargets,
    ) -> Self {
        if trades.is_empty() {
            return Self::empty(initial_capital);
        }

        let total_trades = trades.len();
        let wins: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = trades.iter().map(|t| t.pnl).filter(|p| *p < 0.0).collect();

        let win_rate = wins.len() as f64 / total_trades as f64;
        let total_pnl: f64 = trades.iter().map(|t| t.pnl).sum();
        let gross_profit: f64 = wins.iter().sum();
        let avg_win = mean(&wins);
        let avg_loss = mean(&losses).abs();
        let expected_value = win_rate * avg_win - (1.0 - win_rate) * avg_loss;

        // No losing trades: gross loss floors at 1 so the factor stays finite.
        let gross_loss = if losses.is_empty() {
            1.0
        } else {
            losses.iter().sum::<f64>().abs()
        };
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else {
            0.0
        };

        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital + total_pnl);
        let total_return = ratio(final_equity - initial_capital, initial_capital);

        let sharpe_ratio = sharpe(equity_curve);
        let max_drawdown = max_drawdown(equity_curve);

        let days = match (equity_curve.first(), equity_curve.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_days(),
            _ => 0,
        };
        let annual_return = if days > 0 {
            total_return * CALENDAR_DAYS_PER_YEAR / days as f64
        } else {
            0.0
        };
        let calmar_ratio = if max_drawdown > 0.0 {
            annual_return / max_drawdown
        } else {
            0.0
        };
        let recovery_factor = if max_drawdown > 0.0 {
            ratio(total_pnl, max_drawdown * initial_capital)
        } else {
            0.0
        };

        let avg_risk_per_trade = mean(
            &trades
                .iter()
                .map(|t| ratio(t.initial_risk(), initial_capital))
                .collect::<Vec<_>>(),
        );
        let avg_trade_duration_minutes = mean(
            &trades
                .iter()
                .map(Trade::duration_minutes)
                .collect::<Vec<_>>(),
        );

        let outcomes: Vec<bool> = trades.iter().map(Trade::is_winner).collect();

        Self {
            total_trades,
            winning_trades: wins.len(),
            losing_trades: losses.len(),
            win_rate,
            total_pnl,
            total_return,
            annual_return,
            avg_win,
            avg_loss,
            expected_value,
            expected_value_pct: ratio(expected_value, initial_capital),
            sharpe_ratio,
            profit_factor,
            calmar_ratio,
            recovery_factor,
            max_drawdown,
            avg_risk_per_trade,
            avg_trade_duration_minutes,
            max_win_streak: max_streak(&outcomes, true),
            max_loss_streak: max_streak(&outcomes, false),
            final_equity,
            meets_win_rate_target: win_rate >= targets.min_win_rate,
            meets_profit_factor_target: profit_factor >= targets.min_profit_factor,
            meets_sharpe_target: sharpe_ratio >= targets.min_sharpe_ratio,
            meets_return_target: annual_return >= targets.min_annual_return,
            meets_drawdown_target: max_drawdown <= targets.max_drawdown,
        }
    }

    /// Flat `name -> number` view; flags map to 1.0 / 0.0.
    pub fn to_map(&self) -> BTreeMap<&'static str, f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        BTreeMap::from([
            ("total_trades", self.total_trades as f64),
            ("winning_trades", self.winning_trades as f64),
            ("losing_trades", self.losing_trades as f64),
            ("win_rate", self.win_rate),
            ("total_pnl", self.total_pnl),
            ("total_return", self.total_return),
            ("annual_return", self.annual_return),
            ("avg_win", self.avg_win),
            ("avg_loss", self.avg_loss),
            ("expected_value", self.expected_value),
            ("expected_value_pct", self.expected_value_pct),
            ("sharpe_ratio", self.sharpe_ratio),
            ("profit_factor", self.profit_factor),
            ("calmar_ratio", self.calmar_ratio),
            ("recovery_factor", self.recovery_factor),
            ("max_drawdown", self.max_drawdown),
            ("avg_risk_per_trade", self.avg_risk_per_trade),
            ("avg_trade_duration_minutes", self.avg_trade_duration_minutes),
            ("max_win_streak", self.max_win_streak as f64),
            ("max_loss_streak", self.max_loss_streak as f64),
            ("final_equity", self.final_equity),
            ("meets_win_rate_target", flag(self.meets_win_rate_target)),
            ("meets_profit_factor_target", flag(self.meets_profit_factor_target)),
            ("meets_sharpe_target", flag(self.meets_sharpe_target)),
            ("meets_return_target", flag(self.meets_return_target)),
            ("meets_drawdown_target", flag(self.meets_drawdown_target)),
        ])
    }

    /// Human-readable report.
    pub fn summary(&self) -> String {
        let mark = |b: bool| if b { "yes" } else { "no" };
        let mut out = String::new();
        let rule = "=".repeat(60);
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "BACKTEST SUMMARY");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "\nTrade Statistics:");
        let _ = writeln!(out, "  Total Trades:     {}", self.total_trades);
        let _ = writeln!(out, "  Winning Trades:   {}", self.winning_trades);
        let _ = writeln!(out, "  Losing Trades:    {}", self.losing_trades);
        let _ = writeln!(out, "  Win Rate:         {:.2}%", self.win_rate * 100.0);
        let _ = writeln!(out, "  Max Win Streak:   {}", self.max_win_streak);
        let _ = writeln!(out, "  Max Loss Streak:  {}", self.max_loss_streak);
        let _ = writeln!(out, "  Avg Duration:     {:.1} min", self.avg_trade_duration_minutes);
        let _ = writeln!(out, "\nReturns:");
        let _ = writeln!(out, "  Total P&L:        {:.2}", self.total_pnl);
        let _ = writeln!(out, "  Total Return:     {:.2}%", self.total_return * 100.0);
        let _ = writeln!(out, "  Annual Return:    {:.2}%", self.annual_return * 100.0);
        let _ = writeln!(
            out,
            "  Expected Value:   {:.2} ({:.2}%)",
            self.expected_value,
            self.expected_value_pct * 100.0
        );
        let _ = writeln!(out, "  Final Equity:     {:.2}", self.final_equity);
        let _ = writeln!(out, "\nRisk Metrics:");
        let _ = writeln!(out, "  Sharpe Ratio:     {:.2}", self.sharpe_ratio);
        let _ = writeln!(out, "  Profit Factor:    {:.2}", self.profit_factor);
        let _ = writeln!(out, "  Max Drawdown:     {:.2}%", self.max_drawdown * 100.0);
        let _ = writeln!(out, "  Calmar Ratio:     {:.2}", self.calmar_ratio);
        let _ = writeln!(out, "  Recovery Factor:  {:.2}", self.recovery_factor);
        let _ = writeln!(out, "\nPerformance Targets:");
        let _ = writeln!(out, "  Win Rate:         {}", mark(self.meets_win_rate_target));
        let _ = writeln!(out, "  Profit Factor:    {}", mark(self.meets_profit_factor_target));
        let _ = writeln!(out, "  Sharpe Ratio:     {}", mark(self.meets_sharpe_target));
        let _ = writeln!(out, "  Annual Return:    {}", mark(self.meets_return_target));
        let _ = writeln!(out, "  Max Drawdown:     {}", mark(self.meets_drawdown_target));
        let _ = writeln!(out, "{rule}");
        out
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator != 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// sqrt(252) * mean / sample stddev of bar-to-bar equity returns.
fn sharpe(equity_curve: &[EquityPoint]) -> f64 {
    let returns: Vec<f64> = equity_curve
        .windows(2)
        .filter(|w| w[0].equity != 0.0)
        .map(|w| (w[1].equity - w[0].equity) / w[0].equity)
        .collect();
    if returns.len() < 2 {
        return 0.0;
    }

    let n = returns.len() as f64;
    let avg = mean(&returns);
    let variance = returns.iter().map(|r| (r - avg).powi(2)).sum::<f64>() / (n - 1.0);
    let std_dev = variance.sqrt();
    if std_dev > 0.0 && std_dev.is_finite() {
        TRADING_DAYS_PER_YEAR.sqrt() * avg / std_dev
    } else {
        0.0
    }
}

/// Largest fractional decline from the running peak.
fn max_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut max_dd = 0.0_f64;
    for point in equity_curve {
        peak = peak.max(point.equity);
        if peak > 0.0 {
            max_dd = max_dd.max((peak - point.equity) / peak);
        }
    }
    max_dd
}

fn max_streak(outcomes: &[bool], value: bool) -> usize {
    let mut streak = 0;
    let mut best = 0;
    for &o in outcomes {
        if o == value {
            streak += 1;
            best = best.max(streak);
        } else {
            streak = 0;
        }
    }
    best
}
