//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::export_adapter::ExportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig};
use crate::domain::config_validation::{
    read_cutoff, read_date, read_indicator_params, read_metric, read_session,
    validate_backtest_config, validate_data_config, validate_indicator_config,
    validate_sweep_config,
};
use crate::domain::error::SpxError;
use crate::domain::metrics::PerformanceTargets;
use crate::domain::ohlcv::PriceBar;
use crate::domain::params::IndicatorParams;
use crate::domain::signal::{
    SessionWindow, DEFAULT_ATR_MULTIPLIER, DEFAULT_MIN_CONFIRMATIONS, DEFAULT_REWARD_RISK,
    DEFAULT_STOP_LOSS_PCT,
};
use crate::domain::sweep::{
    self, DrawdownPenalty, MinTradesPenalty, OptimizationMetric, SweepConfig, SweepReport,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_TOP: usize = 10;

#[derive(Parser, Debug)]
#[command(name = "spxtrader", about = "Intraday SPX signal backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest over every configured indicator variant
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Directory for trades.csv, equity.csv, metrics.json and summary.txt
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Backtest every parameter combination and rank the results
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Number of ranked results to print
        #[arg(long)]
        top: Option<usize>,
        /// Run combinations one at a time
        #[arg(long)]
        serial: bool,
    },
    /// Rolling train/test optimisation
    WalkForward {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        train_bars: Option<usize>,
        #[arg(long)]
        test_bars: Option<usize>,
    },
    /// Validate a configuration file without loading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show available symbols or the data range for one symbol
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Backtest { config, .. }
            | Command::Sweep { config, .. }
            | Command::WalkForward { config, .. }
            | Command::Validate { config }
            | Command::Info { config, .. } => config,
        }
    }
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            symbol,
        } => run_backtest(&config, output.as_deref(), symbol.as_deref()),
        Command::Sweep {
            config,
            output,
            top,
            serial,
        } => run_sweep(&config, output.as_deref(), top, serial),
        Command::WalkForward {
            config,
            output,
            train_bars,
            test_bars,
        } => run_walk_forward(&config, output.as_deref(), train_bars, test_bars),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
    }
}

/// `[logging] level` from the command's config file, if it can be read.
pub fn configured_log_level(cli: &Cli) -> Option<String> {
    FileConfigAdapter::from_file(cli.command.config_path())
        .ok()?
        .get_string("logging", "level")
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| fail(&e))
}

fn fail(err: &SpxError) -> ExitCode {
    error!("{err}");
    err.into()
}

/// Where the bars come from: `[data]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub data_dir: PathBuf,
    pub symbol: String,
    pub interval: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DataSource {
    pub fn load(&self) -> Result<Vec<PriceBar>, SpxError> {
        CsvAdapter::new(self.data_dir.clone()).fetch_ohlcv(
            &self.symbol,
            &self.interval,
            self.start_date,
            self.end_date,
        )
    }
}

pub fn build_data_source(adapter: &dyn ConfigPort) -> Result<DataSource, SpxError> {
    let required = |key: &str| {
        adapter
            .get_string("data", key)
            .ok_or_else(|| SpxError::ConfigMissing {
                section: "data".into(),
                key: key.into(),
            })
    };
    Ok(DataSource {
        data_dir: PathBuf::from(required("data_dir")?),
        symbol: required("symbol")?,
        interval: required("interval")?,
        start_date: read_date(adapter, "start_date")?,
        end_date: read_date(adapter, "end_date")?,
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, SpxError> {
    let defaults = BacktestConfig::default();
    let target_defaults = PerformanceTargets::default();
    let min_confirmations = adapter.get_int(
        "backtest",
        "min_confirmations",
        DEFAULT_MIN_CONFIRMATIONS as i64,
    );

    Ok(BacktestConfig {
        initial_capital: adapter.get_double("backtest", "initial_capital", defaults.initial_capital),
        risk_per_trade: adapter.get_double("backtest", "risk_per_trade", defaults.risk_per_trade),
        min_confirmations: usize::try_from(min_confirmations).map_err(|_| {
            SpxError::ConfigInvalid {
                section: "backtest".into(),
                key: "min_confirmations".into(),
                reason: "min_confirmations must be at least 1".into(),
            }
        })?,
        reward_risk: adapter.get_double("backtest", "reward_risk", DEFAULT_REWARD_RISK),
        stop_loss_pct: adapter.get_double("backtest", "stop_loss_pct", DEFAULT_STOP_LOSS_PCT),
        atr_multiplier: adapter.get_double("backtest", "atr_multiplier", DEFAULT_ATR_MULTIPLIER),
        trailing_stop: adapter.get_bool("backtest", "trailing_stop", defaults.trailing_stop),
        end_of_day_cutoff: read_cutoff(adapter)?.unwrap_or(defaults.end_of_day_cutoff),
        session: read_session(adapter)?.map(|(start, end)| SessionWindow::new(start, end)),
        targets: PerformanceTargets {
            min_win_rate: adapter.get_double("targets", "min_win_rate", target_defaults.min_win_rate),
            min_profit_factor: adapter.get_double(
                "targets",
                "min_profit_factor",
                target_defaults.min_profit_factor,
            ),
            min_sharpe_ratio: adapter.get_double(
                "targets",
                "min_sharpe_ratio",
                target_defaults.min_sharpe_ratio,
            ),
            min_annual_return: adapter.get_double(
                "targets",
                "min_annual_return",
                target_defaults.min_annual_return,
            ),
            max_drawdown: adapter.get_double("targets", "max_drawdown", target_defaults.max_drawdown),
        },
    })
}

pub fn build_indicator_params(adapter: &dyn ConfigPort) -> Result<IndicatorParams, SpxError> {
    read_indicator_params(adapter)
}

pub fn build_sweep_config(adapter: &dyn ConfigPort) -> Result<SweepConfig, SpxError> {
    let min_trades = MinTradesPenalty::default();
    let drawdown = DrawdownPenalty::default();
    let time_budget_secs = adapter.get_double("sweep", "time_budget_secs", 0.0);

    Ok(SweepConfig {
        metric: read_metric(adapter)?.unwrap_or(OptimizationMetric::SharpeRatio),
        adjustments: vec![
            Box::new(MinTradesPenalty {
                min_trades: adapter
                    .get_int("sweep", "min_trades", min_trades.min_trades as i64)
                    .max(0) as usize,
                ..min_trades
            }),
            Box::new(DrawdownPenalty {
                max_drawdown: adapter.get_double("sweep", "max_drawdown", drawdown.max_drawdown),
                ..drawdown
            }),
        ],
        parallel: adapter.get_bool("sweep", "parallel", true),
        time_budget: (time_budget_secs > 0.0).then(|| Duration::from_secs_f64(time_budget_secs)),
    })
}

/// Everything a run needs, read and validated from one config file.
struct RunSetup {
    adapter: FileConfigAdapter,
    source: DataSource,
    backtest: BacktestConfig,
    params: IndicatorParams,
}

fn prepare(config_path: &Path, symbol_override: Option<&str>) -> Result<RunSetup, ExitCode> {
    info!(path = %config_path.display(), "loading config");
    let adapter = load_config(config_path)?;
    read_setup(adapter, symbol_override).map_err(|e| fail(&e))
}

fn read_setup(
    adapter: FileConfigAdapter,
    symbol_override: Option<&str>,
) -> Result<RunSetup, SpxError> {
    validate_data_config(&adapter)?;
    validate_backtest_config(&adapter)?;
    validate_indicator_config(&adapter)?;
    let mut source = build_data_source(&adapter)?;
    if let Some(symbol) = symbol_override {
        source.symbol = symbol.to_string();
    }
    let backtest = build_backtest_config(&adapter)?;
    let params = build_indicator_params(&adapter)?;
    Ok(RunSetup {
        adapter,
        source,
        backtest,
        params,
    })
}

fn load_bars(source: &DataSource) -> Result<Vec<PriceBar>, ExitCode> {
    info!(
        symbol = %source.symbol,
        interval = %source.interval,
        dir = %source.data_dir.display(),
        "loading bars"
    );
    let bars = source.load().map_err(|e| fail(&e))?;
    if let (Some(first), Some(last)) = (bars.first(), bars.last()) {
        info!(
            bars = bars.len(),
            first = %first.timestamp,
            last = %last.timestamp,
            "bars loaded"
        );
    }
    Ok(bars)
}

fn run_backtest(config_path: &Path, output: Option<&Path>, symbol: Option<&str>) -> ExitCode {
    let setup = match prepare(config_path, symbol) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let bars = match load_bars(&setup.source) {
        Ok(b) => b,
        Err(code) => return code,
    };

    info!(params = %setup.params.label(), "running backtest");
    let result = match backtest_engine::run_backtest(&bars, &setup.params, &setup.backtest) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };

    println!("Parameters: {}", result.params.label());
    println!(
        "Signals: {} long, {} short",
        result.signals.long_signal.iter().filter(|&&s| s).count(),
        result.signals.short_signal.iter().filter(|&&s| s).count()
    );
    println!("{}", result.metrics.summary());

    if let Some(dir) = output {
        if let Err(e) = ExportAdapter::new().write(&result, dir) {
            return fail(&e);
        }
        println!("Results written to: {}", dir.display());
    }
    ExitCode::SUCCESS
}

fn run_sweep(config_path: &Path, output: Option<&Path>, top: Option<usize>, serial: bool) -> ExitCode {
    let setup = match prepare(config_path, None) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let (mut sweep_config, config_top) = match sweep_settings(&setup.adapter) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if serial {
        sweep_config.parallel = false;
    }
    let bars = match load_bars(&setup.source) {
        Ok(b) => b,
        Err(code) => return code,
    };

    let report = match sweep::run_sweep(&bars, &setup.params, &setup.backtest, &sweep_config) {
        Ok(r) => r,
        Err(e) => return fail(&e),
    };
    if report.outcomes.is_empty() {
        warn!("no combination produced a result");
    }
    print_sweep(&report, top.unwrap_or(config_top));

    if let Some(dir) = output {
        if let Err(e) = ExportAdapter::new().write_sweep(&report, dir) {
            return fail(&e);
        }
        println!("Results written to: {}", dir.display());
    }
    ExitCode::SUCCESS
}

/// Validated `[sweep]` settings plus the configured `top`.
fn sweep_settings(adapter: &dyn ConfigPort) -> Result<(SweepConfig, usize), ExitCode> {
    validate_sweep_config(adapter).map_err(|e| fail(&e))?;
    let sweep_config = build_sweep_config(adapter).map_err(|e| fail(&e))?;
    let top = adapter.get_int("sweep", "top", DEFAULT_TOP as i64).max(1) as usize;
    Ok((sweep_config, top))
}

pub fn print_sweep(report: &SweepReport, top: usize) {
    println!(
        "Sweep: {} combinations, {} evaluated, {} skipped, {} discarded (ranked by {})",
        report.combinations,
        report.outcomes.len(),
        report.skipped,
        report.discarded,
        report.metric
    );
    println!(
        "{:>4}  {:>9}  {:>6}  {:>8}  {:>9}  {:>7}  {:>7}  params",
        "rank", "score", "trades", "win%", "return%", "sharpe", "maxdd%"
    );
    for (i, o) in report.outcomes.iter().take(top).enumerate() {
        println!(
            "{:>4}  {:>9.4}  {:>6}  {:>8.2}  {:>9.2}  {:>7.2}  {:>7.2}  {}",
            i + 1,
            o.score,
            o.metrics.total_trades,
            o.metrics.win_rate * 100.0,
            o.metrics.total_return * 100.0,
            o.metrics.sharpe_ratio,
            o.metrics.max_drawdown * 100.0,
            o.params.label()
        );
    }
}

fn run_walk_forward(
    config_path: &Path,
    output: Option<&Path>,
    train_bars: Option<usize>,
    test_bars: Option<usize>,
) -> ExitCode {
    let setup = match prepare(config_path, None) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let (sweep_config, _) = match sweep_settings(&setup.adapter) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let window_size = |arg: Option<usize>, key: &str| {
        arg.or_else(|| {
            let v = setup.adapter.get_int("sweep", key, 0);
            (v > 0).then_some(v as usize)
        })
        .ok_or_else(|| SpxError::ConfigMissing {
            section: "sweep".into(),
            key: key.into(),
        })
    };
    let (train_bars, test_bars) = match (
        window_size(train_bars, "train_bars"),
        window_size(test_bars, "test_bars"),
    ) {
        (Ok(train), Ok(test)) => (train, test),
        (Err(e), _) | (_, Err(e)) => return fail(&e),
    };
    let bars = match load_bars(&setup.source) {
        Ok(b) => b,
        Err(code) => return code,
    };

    let windows = match sweep::walk_forward(
        &bars,
        &setup.params,
        &setup.backtest,
        &sweep_config,
        train_bars,
        test_bars,
    ) {
        Ok(w) => w,
        Err(e) => return fail(&e),
    };

    println!("Walk-forward: {} windows (train {train_bars}, test {test_bars})", windows.len());
    for w in &windows {
        println!(
            "  {} .. {}  score {:>8.4}  test: {:>3} trades, {:>7.2}% return, sharpe {:>6.2}  {}",
            w.test_start,
            w.test_end,
            w.train_score,
            w.test_metrics.total_trades,
            w.test_metrics.total_return * 100.0,
            w.test_metrics.sharpe_ratio,
            w.params.label()
        );
    }

    if let Some(dir) = output {
        if let Err(e) = ExportAdapter::new().write_walk_forward(&windows, dir) {
            return fail(&e);
        }
        println!("Results written to: {}", dir.display());
    }
    ExitCode::SUCCESS
}

pub fn run_validate(config_path: &Path) -> ExitCode {
    let setup = match prepare(config_path, None) {
        Ok(s) => s,
        Err(code) => return code,
    };
    if let Err(code) = sweep_settings(&setup.adapter) {
        return code;
    }
    if let Err(e) = setup.backtest.validate() {
        return fail(&e);
    }

    let variants = setup.params.signal_variants();
    println!(
        "Data: {} {} from {}",
        setup.source.symbol,
        setup.source.interval,
        setup.source.data_dir.display()
    );
    println!("Indicator families: {}", setup.params.family_names().join(", "));
    println!("Signal variants ({}):", variants.len());
    for v in &variants {
        println!("  {v}");
    }
    println!("Sweep combinations: {}", setup.params.expand_grid().len());
    println!("Warm-up bars: {}", setup.params.warmup_bars());
    println!("Configuration is valid");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path, symbol: Option<&str>) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let source = match build_data_source(&adapter) {
        Ok(s) => s,
        Err(e) => return fail(&e),
    };
    let data = CsvAdapter::new(source.data_dir.clone());

    let symbols = match symbol {
        Some(s) => vec![s.to_string()],
        None => match data.list_symbols(&source.interval) {
            Ok(s) => s,
            Err(e) => return fail(&e),
        },
    };
    if symbols.is_empty() {
        println!("No symbols found for interval {}", source.interval);
        return ExitCode::SUCCESS;
    }

    for sym in &symbols {
        match data.get_data_range(sym, &source.interval) {
            Ok(Some((first, last, count))) => {
                println!("{sym} ({}): {first} to {last}, {count} bars", source.interval)
            }
            Ok(None) => println!("{sym} ({}): no data", source.interval),
            Err(e) => return fail(&e),
        }
    }
    ExitCode::SUCCESS
}
