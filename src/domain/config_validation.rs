//! Configuration validation.
//!
//! Checks every section a run reads before any data is loaded, and holds the
//! small parsers the CLI builders share with it.

use chrono::{NaiveDate, NaiveTime};
use std::str::FromStr;

use crate::domain::error::SpxError;
use crate::domain::params::{
    parse_f64_list, parse_usize_list, AtrParams, BollingerParams, EmaParams, IndicatorParams,
    MacdParams, RsiParams, StochasticParams,
};
use crate::domain::sweep::OptimizationMetric;
use crate::ports::config_port::ConfigPort;

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), SpxError> {
    for key in ["data_dir", "symbol", "interval"] {
        require(config, "data", key)?;
    }
    let start = read_date(config, "start_date")?;
    let end = read_date(config, "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(invalid("data", "start_date", "start_date must not be after end_date"));
        }
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), SpxError> {
    if let Some(v) = read_value::<f64>(config, "backtest", "initial_capital")? {
        if v <= 0.0 {
            return Err(invalid("backtest", "initial_capital", "initial_capital must be positive"));
        }
    }
    if let Some(v) = read_value::<f64>(config, "backtest", "risk_per_trade")? {
        if v <= 0.0 || v > 1.0 {
            return Err(invalid(
                "backtest",
                "risk_per_trade",
                "risk_per_trade must be in (0, 1]",
            ));
        }
    }
    if let Some(v) = read_value::<i64>(config, "backtest", "min_confirmations")? {
        if v < 1 {
            return Err(invalid(
                "backtest",
                "min_confirmations",
                "min_confirmations must be at least 1",
            ));
        }
    }
    if let Some(v) = read_value::<f64>(config, "backtest", "reward_risk")? {
        if v <= 0.0 {
            return Err(invalid("backtest", "reward_risk", "reward_risk must be positive"));
        }
    }
    if let Some(v) = read_value::<f64>(config, "backtest", "stop_loss_pct")? {
        if v <= 0.0 || v >= 1.0 {
            return Err(invalid(
                "backtest",
                "stop_loss_pct",
                "stop_loss_pct must be between 0 and 1",
            ));
        }
    }
    if let Some(v) = read_value::<f64>(config, "backtest", "atr_multiplier")? {
        if v <= 0.0 {
            return Err(invalid("backtest", "atr_multiplier", "atr_multiplier must be positive"));
        }
    }
    read_cutoff(config)?;
    read_session(config)?;
    validate_targets(config)
}

fn validate_targets(config: &dyn ConfigPort) -> Result<(), SpxError> {
    if let Some(v) = read_value::<f64>(config, "targets", "min_win_rate")? {
        if !(0.0..=1.0).contains(&v) {
            return Err(invalid("targets", "min_win_rate", "min_win_rate must be between 0 and 1"));
        }
    }
    for key in ["min_profit_factor", "min_sharpe_ratio", "min_annual_return"] {
        read_value::<f64>(config, "targets", key)?;
    }
    if let Some(v) = read_value::<f64>(config, "targets", "max_drawdown")? {
        if v <= 0.0 || v > 1.0 {
            return Err(invalid("targets", "max_drawdown", "max_drawdown must be in (0, 1]"));
        }
    }
    Ok(())
}

pub fn validate_indicator_config(config: &dyn ConfigPort) -> Result<(), SpxError> {
    let params = read_indicator_params(config)?;
    if params.family_names().is_empty() {
        return Err(SpxError::ConfigMissing {
            section: "indicators".into(),
            key: "rsi_periods".into(),
        });
    }
    params.validate().map_err(|e| match e {
        SpxError::InvalidParameter { family, reason } => SpxError::ConfigInvalid {
            section: "indicators".into(),
            key: family.to_lowercase(),
            reason,
        },
        other => other,
    })
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), SpxError> {
    read_metric(config)?;
    if let Some(v) = read_value::<i64>(config, "sweep", "min_trades")? {
        if v < 0 {
            return Err(invalid("sweep", "min_trades", "min_trades must be non-negative"));
        }
    }
    if let Some(v) = read_value::<f64>(config, "sweep", "max_drawdown")? {
        if v <= 0.0 || v > 1.0 {
            return Err(invalid("sweep", "max_drawdown", "max_drawdown must be in (0, 1]"));
        }
    }
    if let Some(v) = read_value::<f64>(config, "sweep", "time_budget_secs")? {
        if v <= 0.0 {
            return Err(invalid(
                "sweep",
                "time_budget_secs",
                "time_budget_secs must be positive",
            ));
        }
    }
    for key in ["top", "train_bars", "test_bars"] {
        if let Some(v) = read_value::<i64>(config, "sweep", key)? {
            if v < 1 {
                return Err(invalid("sweep", key, format!("{key} must be at least 1")));
            }
        }
    }
    Ok(())
}

/// Build the indicator grid from `[indicators]`.
///
/// A family is enabled by its first key (`rsi_periods`, `ema_short_periods`,
/// `macd_fast`, `bb_periods`, `atr_periods`, `stoch_k_periods`); the other
/// keys of a family fall back to the usual defaults, except
/// `ema_long_periods` which is required alongside `ema_short_periods`.
pub fn read_indicator_params(config: &dyn ConfigPort) -> Result<IndicatorParams, SpxError> {
    let rsi = match read_usize_list(config, "rsi_periods")? {
        Some(periods) => Some(RsiParams {
            periods,
            oversold: read_f64_list(config, "rsi_oversold")?.unwrap_or_else(|| vec![30.0]),
            overbought: read_f64_list(config, "rsi_overbought")?.unwrap_or_else(|| vec![70.0]),
        }),
        None => None,
    };
    let ema = match read_usize_list(config, "ema_short_periods")? {
        Some(short_periods) => Some(EmaParams {
            short_periods,
            long_periods: read_usize_list(config, "ema_long_periods")?.ok_or_else(|| {
                SpxError::ConfigMissing {
                    section: "indicators".into(),
                    key: "ema_long_periods".into(),
                }
            })?,
        }),
        None => None,
    };
    let macd = match read_usize_list(config, "macd_fast")? {
        Some(fast) => Some(MacdParams {
            fast,
            slow: read_usize_list(config, "macd_slow")?.unwrap_or_else(|| vec![26]),
            signal: read_usize_list(config, "macd_signal")?.unwrap_or_else(|| vec![9]),
        }),
        None => None,
    };
    let bollinger = match read_usize_list(config, "bb_periods")? {
        Some(periods) => Some(BollingerParams {
            periods,
            std_devs: read_f64_list(config, "bb_std_devs")?.unwrap_or_else(|| vec![2.0]),
        }),
        None => None,
    };
    let atr = read_usize_list(config, "atr_periods")?.map(|periods| AtrParams { periods });
    let stochastic = match read_usize_list(config, "stoch_k_periods")? {
        Some(k_periods) => Some(StochasticParams {
            k_periods,
            d_periods: read_usize_list(config, "stoch_d_periods")?.unwrap_or_else(|| vec![3]),
        }),
        None => None,
    };

    Ok(IndicatorParams {
        rsi,
        ema,
        macd,
        bollinger,
        atr,
        stochastic,
    })
}

/// `[backtest] end_of_day_cutoff`: `HH:MM`, or `none` to hold overnight.
/// Absent means the 15:55 default.
pub fn read_cutoff(config: &dyn ConfigPort) -> Result<Option<Option<NaiveTime>>, SpxError> {
    match config.get_string("backtest", "end_of_day_cutoff") {
        None => Ok(None),
        Some(s) if s.eq_ignore_ascii_case("none") => Ok(Some(None)),
        Some(s) => parse_time(&s)
            .map(|t| Some(Some(t)))
            .ok_or_else(|| invalid("backtest", "end_of_day_cutoff", "expected HH:MM or none")),
    }
}

/// `[backtest] session_start` / `session_end`. Both or neither.
pub fn read_session(config: &dyn ConfigPort) -> Result<Option<(NaiveTime, NaiveTime)>, SpxError> {
    let start = config.get_string("backtest", "session_start");
    let end = config.get_string("backtest", "session_end");
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            let start = parse_time(&start)
                .ok_or_else(|| invalid("backtest", "session_start", "expected HH:MM"))?;
            let end = parse_time(&end)
                .ok_or_else(|| invalid("backtest", "session_end", "expected HH:MM"))?;
            if start > end {
                return Err(invalid(
                    "backtest",
                    "session_start",
                    "session_start must not be after session_end",
                ));
            }
            Ok(Some((start, end)))
        }
        (Some(_), None) => Err(SpxError::ConfigMissing {
            section: "backtest".into(),
            key: "session_end".into(),
        }),
        (None, Some(_)) => Err(SpxError::ConfigMissing {
            section: "backtest".into(),
            key: "session_start".into(),
        }),
    }
}

pub fn read_metric(config: &dyn ConfigPort) -> Result<Option<OptimizationMetric>, SpxError> {
    config
        .get_string("sweep", "metric")
        .map(|s| {
            s.parse::<OptimizationMetric>()
                .map_err(|reason| invalid("sweep", "metric", reason))
        })
        .transpose()
}

/// `[data] start_date` / `end_date` as `YYYY-MM-DD`.
pub fn read_date(config: &dyn ConfigPort, key: &str) -> Result<Option<NaiveDate>, SpxError> {
    config
        .get_string("data", key)
        .map(|s| {
            NaiveDate::parse_from_str(&s, "%Y-%m-%d").map_err(|_| {
                invalid("data", key, format!("invalid {key} format, expected YYYY-MM-DD"))
            })
        })
        .transpose()
}

pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn read_value<T: FromStr>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<T>, SpxError> {
    config
        .get_string(section, key)
        .map(|s| {
            s.parse::<T>()
                .map_err(|_| invalid(section, key, format!("'{s}' is not a valid {key}")))
        })
        .transpose()
}

fn read_usize_list(config: &dyn ConfigPort, key: &str) -> Result<Option<Vec<usize>>, SpxError> {
    config
        .get_string("indicators", key)
        .map(|s| parse_usize_list(&s).map_err(|reason| invalid("indicators", key, reason)))
        .transpose()
}

fn read_f64_list(config: &dyn ConfigPort, key: &str) -> Result<Option<Vec<f64>>, SpxError> {
    config
        .get_string("indicators", key)
        .map(|s| parse_f64_list(&s).map_err(|reason| invalid("indicators", key, reason)))
        .transpose()
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SpxError> {
    config
        .get_string(section, key)
        .ok_or_else(|| SpxError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        })
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> SpxError {
    SpxError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}
