//! File export of run results.
//!
//! A backtest writes `trades.csv`, `equity.csv`, `metrics.json` and
//! `summary.txt`; a sweep writes `sweep.csv` and `sweep.json`; a
//! walk-forward run writes `walk_forward.csv` and `walk_forward.json`.

use chrono::NaiveDateTime;
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::domain::backtest::BacktestResult;
use crate::domain::error::SpxError;
use crate::domain::position::{Direction, ExitReason};
use crate::domain::sweep::{SweepReport, WalkForwardWindow};
use crate::ports::report_port::ReportPort;

#[derive(Debug, Default)]
pub struct ExportAdapter;

impl ExportAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[derive(Serialize)]
struct TradeRow {
    direction: Direction,
    entry_timestamp: NaiveDateTime,
    exit_timestamp: NaiveDateTime,
    entry_price: f64,
    exit_price: f64,
    size: i64,
    initial_stop_loss: f64,
    stop_loss: f64,
    take_profit: f64,
    exit_reason: ExitReason,
    pnl: f64,
    return_pct: f64,
    duration_minutes: f64,
}

#[derive(Serialize)]
struct SweepRow {
    rank: usize,
    params: String,
    score: f64,
    total_trades: usize,
    win_rate: f64,
    total_return: f64,
    sharpe_ratio: f64,
    profit_factor: f64,
    max_drawdown: f64,
}

#[derive(Serialize)]
struct WalkForwardRow {
    train_start: NaiveDateTime,
    train_end: NaiveDateTime,
    test_start: NaiveDateTime,
    test_end: NaiveDateTime,
    params: String,
    train_score: f64,
    test_trades: usize,
    test_return: f64,
    test_sharpe: f64,
    test_max_drawdown: f64,
}

fn write_csv<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<(), SpxError> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SpxError> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

impl ReportPort for ExportAdapter {
    fn write(&self, result: &BacktestResult, output_dir: &Path) -> Result<(), SpxError> {
        fs::create_dir_all(output_dir)?;

        write_csv(
            &output_dir.join("trades.csv"),
            result.trades.iter().map(|t| TradeRow {
                direction: t.direction,
                entry_timestamp: t.entry_timestamp,
                exit_timestamp: t.exit_timestamp,
                entry_price: t.entry_price,
                exit_price: t.exit_price,
                size: t.size,
                initial_stop_loss: t.initial_stop_loss,
                stop_loss: t.stop_loss,
                take_profit: t.take_profit,
                exit_reason: t.exit_reason,
                pnl: t.pnl,
                return_pct: t.return_pct(),
                duration_minutes: t.duration_minutes(),
            }),
        )?;
        write_csv(&output_dir.join("equity.csv"), &result.equity_curve)?;
        write_json(&output_dir.join("metrics.json"), &result.metrics)?;

        let summary = format!(
            "Parameters: {}\n\n{}",
            result.params.label(),
            result.metrics.summary()
        );
        fs::write(output_dir.join("summary.txt"), summary)?;

        info!(
            dir = %output_dir.display(),
            trades = result.trades.len(),
            "exported backtest results"
        );
        Ok(())
    }

    fn write_sweep(&self, report: &SweepReport, output_dir: &Path) -> Result<(), SpxError> {
        fs::create_dir_all(output_dir)?;

        write_csv(
            &output_dir.join("sweep.csv"),
            report.outcomes.iter().enumerate().map(|(i, o)| SweepRow {
                rank: i + 1,
                params: o.params.label(),
                score: o.score,
                total_trades: o.metrics.total_trades,
                win_rate: o.metrics.win_rate,
                total_return: o.metrics.total_return,
                sharpe_ratio: o.metrics.sharpe_ratio,
                profit_factor: o.metrics.profit_factor,
                max_drawdown: o.metrics.max_drawdown,
            }),
        )?;
        write_json(&output_dir.join("sweep.json"), report)?;

        info!(
            dir = %output_dir.display(),
            outcomes = report.outcomes.len(),
            "exported sweep results"
        );
        Ok(())
    }

    fn write_walk_forward(
        &self,
        windows: &[WalkForwardWindow],
        output_dir: &Path,
    ) -> Result<(), SpxError> {
        fs::create_dir_all(output_dir)?;

        write_csv(
            &output_dir.join("walk_forward.csv"),
            windows.iter().map(|w| WalkForwardRow {
                train_start: w.train_start,
                train_end: w.train_end,
                test_start: w.test_start,
                test_end: w.test_end,
                params: w.params.label(),
                train_score: w.train_score,
                test_trades: w.test_metrics.total_trades,
                test_return: w.test_metrics.total_return,
                test_sharpe: w.test_metrics.sharpe_ratio,
                test_max_drawdown: w.test_metrics.max_drawdown,
            }),
        )?;
        write_json(&output_dir.join("walk_forward.json"), windows)?;
        Ok(())
    }
}
