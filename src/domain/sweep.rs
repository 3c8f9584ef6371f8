//! Parameter sweeps and walk-forward optimisation.
//!
//! A sweep expands an `IndicatorParams` grid into single-valued
//! combinations, backtests each one in isolation and ranks them by a base
//! metric passed through a chain of score adjustments.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::backtest::{run_backtest, BacktestConfig};
use super::error::SpxError;
use super::metrics::PerformanceMetrics;
use super::ohlcv::{validate_series, PriceBar};
use super::params::IndicatorParams;

/// Base metric a sweep ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OptimizationMetric {
    SharpeRatio,
    TotalReturn,
    AnnualReturn,
    ProfitFactor,
    WinRate,
    CalmarRatio,
    ExpectedValue,
    RecoveryFactor,
}

impl OptimizationMetric {
    pub fn value(self, metrics: &PerformanceMetrics) -> f64 {
        match self {
            OptimizationMetric::SharpeRatio => metrics.sharpe_ratio,
            OptimizationMetric::TotalReturn => metrics.total_return,
            OptimizationMetric::AnnualReturn => metrics.annual_return,
            OptimizationMetric::ProfitFactor => metrics.profit_factor,
            OptimizationMetric::WinRate => metrics.win_rate,
            OptimizationMetric::CalmarRatio => metrics.calmar_ratio,
            OptimizationMetric::ExpectedValue => metrics.expected_value,
            OptimizationMetric::RecoveryFactor => metrics.recovery_factor,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            OptimizationMetric::SharpeRatio => "sharpe_ratio",
            OptimizationMetric::TotalReturn => "total_return",
            OptimizationMetric::AnnualReturn => "annual_return",
            OptimizationMetric::ProfitFactor => "profit_factor",
            OptimizationMetric::WinRate => "win_rate",
            OptimizationMetric::CalmarRatio => "calmar_ratio",
            OptimizationMetric::ExpectedValue => "expected_value",
            OptimizationMetric::RecoveryFactor => "recovery_factor",
        }
    }
}

impl fmt::Display for OptimizationMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OptimizationMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sharpe_ratio" | "sharpe" => Ok(OptimizationMetric::SharpeRatio),
            "total_return" => Ok(OptimizationMetric::TotalReturn),
            "annual_return" => Ok(OptimizationMetric::AnnualReturn),
            "profit_factor" => Ok(OptimizationMetric::ProfitFactor),
            "win_rate" => Ok(OptimizationMetric::WinRate),
            "calmar_ratio" | "calmar" => Ok(OptimizationMetric::CalmarRatio),
            "expected_value" => Ok(OptimizationMetric::ExpectedValue),
            "recovery_factor" => Ok(OptimizationMetric::RecoveryFactor),
            other => Err(format!("unknown optimization metric '{other}'")),
        }
    }
}

/// A pluggable rule that reshapes a run's score.
pub trait ScoreAdjustment: fmt::Debug + Send + Sync {
    fn adjust(&self, metrics: &PerformanceMetrics, score: f64) -> f64;
}

/// Scales the score down when a run traded too rarely to trust.
#[derive(Debug, Clone, PartialEq)]
pub struct MinTradesPenalty {
    pub min_trades: usize,
    pub factor: f64,
}

impl Default for MinTradesPenalty {
    fn default() -> Self {
        Self {
            min_trades: 100,
            factor: 0.5,
        }
    }
}

impl ScoreAdjustment for MinTradesPenalty {
    fn adjust(&self, metrics: &PerformanceMetrics, score: f64) -> f64 {
        if metrics.total_trades < self.min_trades {
            score * self.factor
        } else {
            score
        }
    }
}

/// Scales the score down when the drawdown exceeds a ceiling.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawdownPenalty {
    pub max_drawdown: f64,
    pub factor: f64,
}

impl Default for DrawdownPenalty {
    fn default() -> Self {
        Self {
            max_drawdown: 0.3,
            factor: 0.7,
        }
    }
}

impl ScoreAdjustment for DrawdownPenalty {
    fn adjust(&self, metrics: &PerformanceMetrics, score: f64) -> f64 {
        if metrics.max_drawdown > self.max_drawdown {
            score * self.factor
        } else {
            score
        }
    }
}

#[derive(Debug)]
pub struct SweepConfig {
    pub metric: OptimizationMetric,
    pub adjustments: Vec<Box<dyn ScoreAdjustment>>,
    pub parallel: bool,
    /// Runs not yet started once this much wall-clock time has passed are
    /// discarded.
    pub time_budget: Option<Duration>,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            metric: OptimizationMetric::SharpeRatio,
            adjustments: vec![
                Box::new(MinTradesPenalty::default()),
                Box::new(DrawdownPenalty::default()),
            ],
            parallel: true,
            time_budget: None,
        }
    }
}

impl SweepConfig {
    pub fn score(&self, metrics: &PerformanceMetrics) -> f64 {
        self.adjustments
            .iter()
            .fold(self.metric.value(metrics), |score, adj| adj.adjust(metrics, score))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepOutcome {
    pub params: IndicatorParams,
    pub metrics: PerformanceMetrics,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub metric: OptimizationMetric,
    /// Best first; equal scores keep grid order.
    pub outcomes: Vec<SweepOutcome>,
    pub combinations: usize,
    pub skipped: usize,
    pub discarded: usize,
}

impl SweepReport {
    pub fn best(&self) -> Option<&SweepOutcome> {
        self.outcomes.first()
    }
}

enum RunOutcome {
    Done(SweepOutcome),
    Skipped,
    Expired,
    Failed(SpxError),
}

/// Backtest every combination of `grid` over `bars` and rank the results.
///
/// Combinations with invalid parameters or too few bars are skipped.
/// Structural data errors abort the whole sweep.
pub fn run_sweep(
    bars: &[PriceBar],
    grid: &IndicatorParams,
    backtest: &BacktestConfig,
    sweep: &SweepConfig,
) -> Result<SweepReport, SpxError> {
    validate_series(bars)?;
    backtest.validate()?;

    let combos = grid.expand_grid();
    let deadline = sweep.time_budget.map(|budget| Instant::now() + budget);
    info!(
        combinations = combos.len(),
        bars = bars.len(),
        metric = %sweep.metric,
        parallel = sweep.parallel,
        "starting parameter sweep"
    );

    let evaluate = |combo: &IndicatorParams| -> RunOutcome {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return RunOutcome::Expired;
        }
        match run_backtest(bars, combo, backtest) {
            Ok(result) => RunOutcome::Done(SweepOutcome {
                score: sweep.score(&result.metrics),
                params: result.params,
                metrics: result.metrics,
            }),
            Err(e) if e.is_skippable() => {
                debug!(error = %e, "skipping combination");
                RunOutcome::Skipped
            }
            Err(e) => RunOutcome::Failed(e),
        }
    };

    let results: Vec<RunOutcome> = if sweep.parallel {
        combos.par_iter().map(evaluate).collect()
    } else {
        combos.iter().map(evaluate).collect()
    };

    let mut outcomes = Vec::new();
    let mut skipped = 0;
    let mut discarded = 0;
    for result in results {
        match result {
            RunOutcome::Done(outcome) => outcomes.push(outcome),
            RunOutcome::Skipped => skipped += 1,
            RunOutcome::Expired => discarded += 1,
            RunOutcome::Failed(e) => return Err(e),
        }
    }
    if discarded > 0 {
        warn!(discarded, "time budget exhausted before every combination ran");
    }

    outcomes.sort_by(|a, b| b.score.total_cmp(&a.score));
    info!(
        evaluated = outcomes.len(),
        skipped,
        discarded,
        best_score = outcomes.first().map(|o| o.score),
        "parameter sweep finished"
    );

    Ok(SweepReport {
        metric: sweep.metric,
        outcomes,
        combinations: combos.len(),
        skipped,
        discarded,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalkForwardWindow {
    pub train_start: NaiveDateTime,
    pub train_end: NaiveDateTime,
    pub test_start: NaiveDateTime,
    pub test_end: NaiveDateTime,
    pub params: IndicatorParams,
    pub train_score: f64,
    pub test_metrics: PerformanceMetrics,
}

/// Rolling optimisation: sweep on `train_bars`, then backtest the winner on
/// the following `test_bars`. Windows advance by `test_bars`.
pub fn walk_forward(
    bars: &[PriceBar],
    grid: &IndicatorParams,
    backtest: &BacktestConfig,
    sweep: &SweepConfig,
    train_bars: usize,
    test_bars: usize,
) -> Result<Vec<WalkForwardWindow>, SpxError> {
    if train_bars == 0 || test_bars == 0 {
        return Err(SpxError::invalid_parameter(
            "walk_forward",
            "train_bars and test_bars must be positive",
        ));
    }
    validate_series(bars)?;
    let window = train_bars + test_bars;
    if bars.len() < window {
        return Err(SpxError::InsufficientData {
            bars: bars.len(),
            minimum: window,
        });
    }

    let mut windows = Vec::new();
    let mut start = 0;
    while start + window <= bars.len() {
        let train = &bars[start..start + train_bars];
        let test = &bars[start + train_bars..start + window];
        start += test_bars;

        let report = run_sweep(train, grid, backtest, sweep)?;
        let Some(best) = report.best() else {
            warn!(train_start = %train[0].timestamp, "no usable combination in training window");
            continue;
        };

        match run_backtest(test, &best.params, backtest) {
            Ok(result) => {
                info!(
                    test_start = %test[0].timestamp,
                    train_score = best.score,
                    test_trades = result.metrics.total_trades,
                    test_return = result.metrics.total_return,
                    "walk-forward window"
                );
                windows.push(WalkForwardWindow {
                    train_start: train[0].timestamp,
                    train_end: train[train.len() - 1].timestamp,
                    test_start: test[0].timestamp,
                    test_end: test[test.len() - 1].timestamp,
                    params: best.params.clone(),
                    train_score: best.score,
                    test_metrics: result.metrics,
                });
            }
            Err(e) if e.is_skippable() => {
                warn!(test_start = %test[0].timestamp, error = %e, "skipping test window");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(windows)
}
