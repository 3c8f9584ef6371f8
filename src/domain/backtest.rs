//! Backtest engine and bar loop.
//!
//! One run is synchronous and owns its `PositionManager`; nothing is shared
//! between runs, so a sweep can execute many of them in parallel.

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use tracing::{debug, warn};

use super::error::SpxError;
use super::indicator::compute_indicators;
use super::metrics::{PerformanceMetrics, PerformanceTargets};
use super::ohlcv::{validate_series, PriceBar};
use super::params::IndicatorParams;
use super::position::{Direction, ExitReason, Trade};
use super::position_manager::PositionManager;
use super::signal::{
    generate_signals, SessionWindow, SignalConfig, SignalFrame, DEFAULT_ATR_MULTIPLIER,
    DEFAULT_MIN_CONFIRMATIONS, DEFAULT_REWARD_RISK, DEFAULT_STOP_LOSS_PCT,
};

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;
pub const DEFAULT_RISK_PER_TRADE: f64 = 0.02;

pub fn default_end_of_day_cutoff() -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(15, 55, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub risk_per_trade: f64,
    pub min_confirmations: usize,
    pub reward_risk: f64,
    pub stop_loss_pct: f64,
    pub atr_multiplier: f64,
    pub trailing_stop: bool,
    /// Open positions close at the first bar at or after this time.
    pub end_of_day_cutoff: Option<NaiveTime>,
    pub session: Option<SessionWindow>,
    pub targets: PerformanceTargets,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_capital: DEFAULT_INITIAL_CAPITAL,
            risk_per_trade: DEFAULT_RISK_PER_TRADE,
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            reward_risk: DEFAULT_REWARD_RISK,
            stop_loss_pct: DEFAULT_STOP_LOSS_PCT,
            atr_multiplier: DEFAULT_ATR_MULTIPLIER,
            trailing_stop: true,
            end_of_day_cutoff: default_end_of_day_cutoff(),
            session: None,
            targets: PerformanceTargets::default(),
        }
    }
}

impl BacktestConfig {
    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            min_confirmations: self.min_confirmations,
            stop_loss_pct: self.stop_loss_pct,
            atr_multiplier: self.atr_multiplier,
            reward_risk: self.reward_risk,
            session: self.session,
        }
    }

    pub fn validate(&self) -> Result<(), SpxError> {
        let positive = [
            ("initial_capital", self.initial_capital),
            ("risk_per_trade", self.risk_per_trade),
            ("reward_risk", self.reward_risk),
            ("stop_loss_pct", self.stop_loss_pct),
            ("atr_multiplier", self.atr_multiplier),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(SpxError::invalid_parameter(
                    "backtest",
                    format!("{name} must be positive, got {value}"),
                ));
            }
        }
        if self.risk_per_trade > 1.0 {
            return Err(SpxError::invalid_parameter(
                "backtest",
                format!("risk_per_trade {} exceeds 1.0", self.risk_per_trade),
            ));
        }
        if let Some(session) = &self.session {
            if session.start > session.end {
                return Err(SpxError::invalid_parameter(
                    "backtest",
                    format!("session start {} after end {}", session.start, session.end),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub params: IndicatorParams,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub signals: SignalFrame,
}

/// Simulate the strategy described by `params` over `bars`.
///
/// Per bar: an open position has its stop trailed to the close and is then
/// checked for exits in priority order; a flat book then enters on a fresh
/// canonical signal edge. Entries are not taken at or after the
/// end-of-day cutoff, nor on the final bar. Equity is sampled once per bar.
pub fn run_backtest(
    bars: &[PriceBar],
    params: &IndicatorParams,
    config: &BacktestConfig,
) -> Result<BacktestResult, SpxError> {
    let inconsistent = validate_series(bars)?;
    if !inconsistent.is_empty() {
        warn!(
            count = inconsistent.len(),
            first_index = inconsistent[0],
            "bars violate high >= open/close >= low"
        );
    }
    params.validate()?;
    config.validate()?;

    let minimum = params.warmup_bars();
    if bars.len() < minimum {
        return Err(SpxError::InsufficientData {
            bars: bars.len(),
            minimum,
        });
    }

    let indicators = compute_indicators(bars, params);
    let signals = generate_signals(bars, &indicators, params, &config.signal_config());
    debug!(
        bars = bars.len(),
        indicators = indicators.len(),
        variants = signals.variants.len(),
        min_confirmations = config.min_confirmations,
        "starting backtest"
    );

    let mut manager =
        PositionManager::new(config.initial_capital, config.risk_per_trade, config.trailing_stop);
    let mut equity_curve = Vec::with_capacity(bars.len());
    let last = bars.len() - 1;

    for (i, bar) in bars.iter().enumerate() {
        let past_cutoff = config
            .end_of_day_cutoff
            .is_some_and(|cutoff| bar.timestamp.time() >= cutoff);

        if let Some(direction) = manager.position().map(|p| p.direction) {
            manager.update_trailing_stop(bar.close);
            let reversal = match direction.opposite() {
                Direction::Long => signals.long_signal[i],
                Direction::Short => signals.short_signal[i],
            };
            let exit = manager.check_exit(bar, reversal, past_cutoff).or_else(|| {
                (i == last).then_some((ExitReason::EndOfBacktest, bar.close))
            });
            if let Some((reason, price)) = exit {
                if let Some(trade) = manager.close(bar.timestamp, price, reason) {
                    debug!(
                        direction = %trade.direction,
                        entry = trade.entry_price,
                        exit = trade.exit_price,
                        pnl = trade.pnl,
                        reason = %trade.exit_reason,
                        "closed position"
                    );
                }
            }
        }

        if manager.is_flat() && i < last && !past_cutoff {
            let long_edge = signals.long_signal[i] && (i == 0 || !signals.long_signal[i - 1]);
            let short_edge = signals.short_signal[i] && (i == 0 || !signals.short_signal[i - 1]);
            let direction = if long_edge {
                Some(Direction::Long)
            } else if short_edge {
                Some(Direction::Short)
            } else {
                None
            };
            if let Some(direction) = direction {
                let stop_distance = signals.stop_distance[i];
                let tp_distance = signals.take_profit_distance[i];
                match manager.open(direction, bar, stop_distance, tp_distance) {
                    Some(position) => debug!(
                        %direction,
                        timestamp = %position.entry_timestamp,
                        entry = position.entry_price,
                        size = position.size,
                        stop = position.stop_loss,
                        target = position.take_profit,
                        "opened position"
                    ),
                    None => debug!(%direction, index = i, "signal skipped: zero position size"),
                }
            }
        }

        equity_curve.push(EquityPoint {
            timestamp: bar.timestamp,
            equity: manager.equity(bar.close),
        });
    }

    let trades = manager.into_trades();
    let metrics =
        PerformanceMetrics::compute(&trades, &equity_curve, config.initial_capital, &config.targets);
    debug!(
        trades = metrics.total_trades,
        final_equity = metrics.final_equity,
        sharpe = metrics.sharpe_ratio,
        "backtest finished"
    );

    Ok(BacktestResult {
        params: params.clone(),
        metrics,
        trades,
        equity_curve,
        signals,
    })
}
