//! End-to-end tests of the backtest engine, sweeps and the file adapters.

mod common;

use approx::assert_relative_eq;
use common::*;
use spxtrader::adapters::csv_adapter::CsvAdapter;
use spxtrader::adapters::export_adapter::ExportAdapter;
use spxtrader::domain::backtest::{run_backtest, BacktestConfig};
use spxtrader::domain::error::SpxError;
use spxtrader::domain::metrics::{PerformanceMetrics, PerformanceTargets};
use spxtrader::domain::params::{
    AtrParams, BollingerParams, EmaParams, IndicatorParams, RsiParams,
};
use spxtrader::domain::position::{position_size, Direction, ExitReason};
use spxtrader::domain::position_manager::PositionManager;
use spxtrader::domain::sweep::{run_sweep, walk_forward, OptimizationMetric, SweepConfig};
use spxtrader::ports::data_port::DataPort;
use spxtrader::ports::report_port::ReportPort;
use std::time::Duration;

fn full_params() -> IndicatorParams {
    IndicatorParams {
        ema: Some(EmaParams {
            short_periods: vec![5],
            long_periods: vec![20],
        }),
        bollinger: Some(BollingerParams {
            periods: vec![20],
            std_devs: vec![2.0],
        }),
        atr: Some(AtrParams { periods: vec![14] }),
        ..rsi_macd_params()
    }
}

mod scenarios {
    use super::*;

    #[test]
    fn monotonic_uptrend_goes_long_and_profits() {
        let bars = session_bars(&linear_closes(100, 100.0, 200.0));
        let result = run_backtest(&bars, &rsi_macd_params(), &single_confirmation()).unwrap();

        assert!(!result.trades.is_empty());
        assert!(result.trades.iter().all(|t| t.direction == Direction::Long));
        assert!(result.signals.short_signal.iter().all(|&s| !s));
        assert!(result.metrics.final_equity > 100_000.0);
    }

    #[test]
    fn stop_pierced_right_after_entry() {
        let bars = session_bars(&[10.0, 10.0, 10.0, 10.0, 20.0, 19.0, 19.0]);
        let result = run_backtest(&bars, &ema_params(2, 4), &single_confirmation()).unwrap();

        assert_eq!(result.trades.len(), 1);
        let trade = &result.trades[0];
        assert_eq!(trade.direction, Direction::Long);
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.exit_timestamp, bars[5].timestamp);
        assert_relative_eq!(trade.exit_price, 19.6, epsilon = 1e-9);
        assert_eq!(trade.size, 5000);
        assert_relative_eq!(trade.pnl, -2000.0, epsilon = 1e-6);
    }

    #[test]
    fn risk_size_capped_by_capital() {
        assert_eq!(position_size(100_000.0, 0.02, 4000.0, 3980.0), 25);

        let bar = session_bars(&[4000.0])[0].clone();
        let mut manager = PositionManager::new(100_000.0, 0.02, true);
        let position = manager.open(Direction::Long, &bar, 20.0, 40.0).unwrap();
        assert_eq!(position.size, 25);
        assert_relative_eq!(position.stop_loss, 3980.0);
        assert_relative_eq!(position.take_profit, 4040.0);
    }

    #[test]
    fn empty_trade_list_metrics() {
        let m = PerformanceMetrics::compute(&[], &[], 100_000.0, &PerformanceTargets::default());
        assert_eq!(m.total_trades, 0);
        assert_eq!(m.win_rate, 0.0);
        assert_eq!(m.sharpe_ratio, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert_eq!(m.final_equity, 100_000.0);
        assert!(!m.meets_win_rate_target);
        assert!(!m.meets_profit_factor_target);
        assert!(!m.meets_sharpe_target);
        assert!(!m.meets_return_target);
        assert!(m.meets_drawdown_target);
    }
}

mod engine_properties {
    use super::*;

    #[test]
    fn same_input_same_output() {
        let bars = session_bars(&wave_closes(400));
        let a = run_backtest(&bars, &full_params(), &single_confirmation()).unwrap();
        let b = run_backtest(&bars, &full_params(), &single_confirmation()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn flat_series_never_trades() {
        let bars = session_bars(&[4000.0; 120]);
        let result = run_backtest(&bars, &full_params(), &single_confirmation()).unwrap();
        assert!(result.trades.is_empty());
        assert_eq!(result.metrics.final_equity, 100_000.0);
        assert!(result.equity_curve.iter().all(|p| p.equity == 100_000.0));
    }

    #[test]
    fn short_series_is_insufficient() {
        let bars = session_bars(&linear_closes(10, 100.0, 110.0));
        let err = run_backtest(&bars, &rsi_macd_params(), &single_confirmation()).unwrap_err();
        assert!(matches!(err, SpxError::InsufficientData { bars: 10, minimum: 35 }));
    }

    #[test]
    fn positions_close_before_the_next_session() {
        let bars = session_bars(&wave_closes(BARS_PER_DAY * 3));
        let result = run_backtest(&bars, &full_params(), &single_confirmation()).unwrap();
        for trade in &result.trades {
            assert_eq!(
                trade.entry_timestamp.date(),
                trade.exit_timestamp.date(),
                "trade held overnight: {trade:?}"
            );
        }
    }

    #[test]
    fn session_window_limits_entries() {
        let bars = session_bars(&wave_closes(BARS_PER_DAY * 2));
        let config = BacktestConfig {
            session: Some(spxtrader::domain::signal::SessionWindow::default()),
            ..single_confirmation()
        };
        let result = run_backtest(&bars, &full_params(), &config).unwrap();
        let window = spxtrader::domain::signal::SessionWindow::default();
        for trade in &result.trades {
            assert!(window.contains(trade.entry_timestamp));
        }
    }

    #[test]
    fn signals_respect_confirmation_threshold() {
        let bars = session_bars(&wave_closes(400));
        let config = BacktestConfig {
            min_confirmations: 2,
            ..Default::default()
        };
        let result = run_backtest(&bars, &full_params(), &config).unwrap();
        let s = &result.signals;
        for i in 0..s.len() {
            if s.long_signal[i] {
                assert!(s.long_strength[i] >= 2 && s.short_strength[i] < 2);
            }
            if s.short_signal[i] {
                assert!(s.short_strength[i] >= 2 && s.long_strength[i] < 2);
            }
            assert!(!(s.long_signal[i] && s.short_signal[i]));
        }
    }
}

mod randomised_invariants {
    use super::*;
    use proptest::prelude::*;

    fn walk(steps: &[f64]) -> Vec<f64> {
        let mut price = 4000.0;
        steps
            .iter()
            .map(|s| {
                price += s;
                price
            })
            .collect()
    }

    fn params() -> IndicatorParams {
        IndicatorParams {
            rsi: Some(RsiParams {
                periods: vec![14],
                oversold: vec![30.0],
                overbought: vec![70.0],
            }),
            ema: Some(EmaParams {
                short_periods: vec![5],
                long_periods: vec![20],
            }),
            bollinger: Some(BollingerParams {
                periods: vec![20],
                std_devs: vec![2.0],
            }),
            ..Default::default()
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn at_most_one_open_position(
            steps in prop::collection::vec(-4.0f64..4.0, 40..300),
            trailing in any::<bool>(),
        ) {
            let bars = session_bars(&walk(&steps));
            let config = BacktestConfig { trailing_stop: trailing, ..single_confirmation() };
            let result = run_backtest(&bars, &params(), &config).unwrap();

            prop_assert_eq!(result.equity_curve.len(), bars.len());
            for pair in result.trades.windows(2) {
                prop_assert!(pair[1].entry_timestamp >= pair[0].exit_timestamp);
            }
        }

        #[test]
        fn trade_pnl_matches_direction(
            steps in prop::collection::vec(-4.0f64..4.0, 40..300),
        ) {
            let bars = session_bars(&walk(&steps));
            let result = run_backtest(&bars, &params(), &single_confirmation()).unwrap();

            for t in &result.trades {
                prop_assert!(t.exit_timestamp > t.entry_timestamp);
                prop_assert!(t.size > 0);
                let expected = (t.exit_price - t.entry_price) * t.direction.sign() * t.size as f64;
                prop_assert!((t.pnl - expected).abs() <= 1e-6 * expected.abs().max(1.0));
            }
            let total: f64 = result.trades.iter().map(|t| t.pnl).sum();
            let last = result.equity_curve.last().unwrap().equity;
            prop_assert!((last - (100_000.0 + total)).abs() < 1e-4);
        }
    }
}

mod sweeps {
    use super::*;

    fn grid() -> IndicatorParams {
        IndicatorParams {
            ema: Some(EmaParams {
                short_periods: vec![3, 5],
                long_periods: vec![10, 20],
            }),
            rsi: Some(RsiParams {
                periods: vec![7, 14],
                oversold: vec![30.0],
                overbought: vec![70.0],
            }),
            ..Default::default()
        }
    }

    fn serial() -> SweepConfig {
        SweepConfig {
            parallel: false,
            ..Default::default()
        }
    }

    #[test]
    fn parallel_matches_serial() {
        let bars = session_bars(&wave_closes(300));
        let config = single_confirmation();
        let a = run_sweep(&bars, &grid(), &config, &serial()).unwrap();
        let b = run_sweep(&bars, &grid(), &config, &SweepConfig::default()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert_eq!(a.combinations, 8);
        assert_eq!(a.outcomes.len() + a.skipped, 8);
    }

    #[test]
    fn outcomes_ranked_best_first() {
        let bars = session_bars(&wave_closes(300));
        let sweep = SweepConfig {
            metric: OptimizationMetric::TotalReturn,
            ..serial()
        };
        let report = run_sweep(&bars, &grid(), &single_confirmation(), &sweep).unwrap();
        for pair in report.outcomes.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(report.best(), report.outcomes.first());
    }

    #[test]
    fn invalid_combinations_are_skipped() {
        let bars = session_bars(&wave_closes(200));
        let grid = IndicatorParams {
            ema: Some(EmaParams {
                short_periods: vec![5, 30],
                long_periods: vec![20],
            }),
            ..Default::default()
        };
        let report = run_sweep(&bars, &grid, &single_confirmation(), &serial()).unwrap();
        assert_eq!(report.combinations, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.outcomes.len(), 1);
    }

    #[test]
    fn exhausted_budget_discards_runs() {
        let bars = session_bars(&wave_closes(200));
        let sweep = SweepConfig {
            time_budget: Some(Duration::ZERO),
            ..serial()
        };
        let report = run_sweep(&bars, &grid(), &single_confirmation(), &sweep).unwrap();
        assert!(report.outcomes.is_empty());
        assert_eq!(report.discarded, report.combinations);
    }

    #[test]
    fn structural_errors_abort() {
        let mut bars = session_bars(&wave_closes(200));
        bars.swap(50, 51);
        let err = run_sweep(&bars, &grid(), &single_confirmation(), &serial()).unwrap_err();
        assert!(matches!(err, SpxError::NonMonotonicTimestamp { index: 51, .. }));
    }

    #[test]
    fn walk_forward_windows_tile_the_series() {
        let bars = session_bars(&wave_closes(600));
        let windows = walk_forward(
            &bars,
            &grid(),
            &single_confirmation(),
            &serial(),
            300,
            100,
        )
        .unwrap();
        assert_eq!(windows.len(), 3);
        for (k, w) in windows.iter().enumerate() {
            assert_eq!(w.train_start, bars[100 * k].timestamp);
            assert_eq!(w.test_start, bars[300 + 100 * k].timestamp);
            assert_eq!(w.test_end, bars[399 + 100 * k].timestamp);
        }
    }

    #[test]
    fn walk_forward_needs_one_full_window() {
        let bars = session_bars(&wave_closes(150));
        let err = walk_forward(&bars, &grid(), &single_confirmation(), &serial(), 100, 100)
            .unwrap_err();
        assert!(matches!(err, SpxError::InsufficientData { bars: 150, minimum: 200 }));
    }
}

mod adapters {
    use super::*;
    use chrono::NaiveDate;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn data_port_date_filter_feeds_backtest() {
        let bars = session_bars(&wave_closes(BARS_PER_DAY * 3));
        let port = MockDataPort::new().with_bars("SPX", bars);
        let day = NaiveDate::from_ymd_opt(2024, 1, 3);
        let fetched = port.fetch_ohlcv("SPX", "5m", day, day).unwrap();
        assert_eq!(fetched.len(), BARS_PER_DAY);
        assert!(fetched.iter().all(|b| Some(b.timestamp.date()) == day));

        let result = run_backtest(&fetched, &full_params(), &single_confirmation()).unwrap();
        assert_eq!(result.equity_curve.len(), BARS_PER_DAY);
    }

    #[test]
    fn data_port_errors_surface() {
        let port = MockDataPort::new().with_error("SPX", "disk on fire");
        let err = port.fetch_ohlcv("SPX", "5m", None, None).unwrap_err();
        assert!(matches!(err, SpxError::Data { .. }));
        let err = port.fetch_ohlcv("NDX", "5m", None, None).unwrap_err();
        assert!(matches!(err, SpxError::NoData { .. }));
    }

    #[test]
    fn csv_round_trip_then_export() {
        let dir = TempDir::new().unwrap();
        let bars = session_bars(&wave_closes(200));
        write_bars_csv(dir.path(), "SPX", "5m", &bars);

        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let loaded = adapter.fetch_ohlcv("SPX", "5m", None, None).unwrap();
        assert_eq!(loaded, bars);
        assert_eq!(adapter.list_symbols("5m").unwrap(), vec!["SPX".to_string()]);

        let result = run_backtest(&loaded, &full_params(), &single_confirmation()).unwrap();
        let out = dir.path().join("out");
        ExportAdapter::new().write(&result, &out).unwrap();

        let trades = fs::read_to_string(out.join("trades.csv")).unwrap();
        assert_eq!(trades.lines().count(), 1 + result.trades.len());
        let equity = fs::read_to_string(out.join("equity.csv")).unwrap();
        assert_eq!(equity.lines().count(), 1 + bars.len());
        let metrics: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out.join("metrics.json")).unwrap()).unwrap();
        assert_eq!(metrics["total_trades"], result.metrics.total_trades);
        assert!(out.join("summary.txt").exists());
    }

    #[test]
    fn sweep_and_walk_forward_export() {
        let dir = TempDir::new().unwrap();
        let bars = session_bars(&wave_closes(400));
        let grid = IndicatorParams {
            ema: Some(EmaParams {
                short_periods: vec![3, 5],
                long_periods: vec![20],
            }),
            ..Default::default()
        };
        let sweep = SweepConfig {
            parallel: false,
            ..Default::default()
        };
        let report = run_sweep(&bars, &grid, &single_confirmation(), &sweep).unwrap();
        let windows =
            walk_forward(&bars, &grid, &single_confirmation(), &sweep, 200, 100).unwrap();

        let exporter = ExportAdapter::new();
        exporter.write_sweep(&report, dir.path()).unwrap();
        exporter.write_walk_forward(&windows, dir.path()).unwrap();

        let sweep_csv = fs::read_to_string(dir.path().join("sweep.csv")).unwrap();
        assert!(sweep_csv.starts_with("rank,params,score"));
        assert_eq!(sweep_csv.lines().count(), 1 + report.outcomes.len());
        let wf_csv = fs::read_to_string(dir.path().join("walk_forward.csv")).unwrap();
        assert_eq!(wf_csv.lines().count(), 1 + windows.len());
        let wf_json: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("walk_forward.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(wf_json.as_array().unwrap().len(), windows.len());
    }
}
