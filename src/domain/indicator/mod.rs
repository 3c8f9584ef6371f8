//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values
//! - `IndicatorSet`: Every series computed for one parameter sweep
//!
//! All calculators are pure functions of the bar slice. Rolling windows are
//! allowed to be partial at the start of the series, so most indicators are
//! valid from the first bar; the exceptions are documented per indicator.

pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rolling;
pub mod rsi;
pub mod stochastic;

use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::fmt;

use crate::domain::ohlcv::PriceBar;
use crate::domain::params::IndicatorParams;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub timestamp: NaiveDateTime,
    pub valid: bool,
    pub value: IndicatorValue,
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Macd {
        line: f64,
        signal: f64,
        histogram: f64,
    },
    Stochastic {
        k: f64,
        d: f64,
    },
    Bollinger {
        upper: f64,
        middle: f64,
        lower: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Stochastic {
        k_period: usize,
        d_period: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
}

impl IndicatorType {
    pub fn bollinger(period: usize, stddev_mult: f64) -> Self {
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100: to_x100(stddev_mult),
        }
    }
}

/// Fixed-point encoding for fractional parameters used inside hashable keys.
pub fn to_x100(value: f64) -> u32 {
    (value * 100.0).round().max(0.0) as u32
}

pub fn from_x100(value: u32) -> f64 {
    value as f64 / 100.0
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Scalar value at `index`, or `None` while in warmup.
    pub fn simple(&self, index: usize) -> Option<f64> {
        match self.values.get(index) {
            Some(IndicatorPoint {
                valid: true,
                value: IndicatorValue::Simple(v),
                ..
            }) => Some(*v),
            _ => None,
        }
    }

    /// (line, signal) at `index`, or `None` while in warmup.
    pub fn macd(&self, index: usize) -> Option<(f64, f64)> {
        match self.values.get(index) {
            Some(IndicatorPoint {
                valid: true,
                value: IndicatorValue::Macd { line, signal, .. },
                ..
            }) => Some((*line, *signal)),
            _ => None,
        }
    }

    /// (upper, middle, lower) at `index`, or `None` while in warmup.
    pub fn bollinger(&self, index: usize) -> Option<(f64, f64, f64)> {
        match self.values.get(index) {
            Some(IndicatorPoint {
                valid: true,
                value:
                    IndicatorValue::Bollinger {
                        upper,
                        middle,
                        lower,
                    },
                ..
            }) => Some((*upper, *middle, *lower)),
            _ => None,
        }
    }
}

pub type IndicatorSet = HashMap<IndicatorType, IndicatorSeries>;

/// Compute a single indicator series.
pub fn calculate(bars: &[PriceBar], indicator: IndicatorType) -> IndicatorSeries {
    match indicator {
        IndicatorType::Ema(period) => ema::calculate_ema(bars, period),
        IndicatorType::Rsi(period) => rsi::calculate_rsi(bars, period),
        IndicatorType::Atr(period) => atr::calculate_atr(bars, period),
        IndicatorType::Macd { fast, slow, signal } => {
            macd::calculate_macd(bars, fast, slow, signal)
        }
        IndicatorType::Stochastic { k_period, d_period } => {
            stochastic::calculate_stochastic(bars, k_period, d_period)
        }
        IndicatorType::Bollinger {
            period,
            stddev_mult_x100,
        } => bollinger::calculate_bollinger(bars, period, from_x100(stddev_mult_x100)),
    }
}

/// Compute every indicator variant named by `params`.
///
/// Each variant is keyed by its full parameter set, so sweeping several
/// values of one family never overwrites an earlier result.
pub fn compute_indicators(bars: &[PriceBar], params: &IndicatorParams) -> IndicatorSet {
    params
        .indicator_types()
        .into_iter()
        .map(|t| (t, calculate(bars, t)))
        .collect()
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(period) => write!(f, "EMA({})", period),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::Macd { fast, slow, signal } => {
                write!(f, "MACD({},{},{})", fast, slow, signal)
            }
            IndicatorType::Stochastic { k_period, d_period } => {
                write!(f, "STOCHASTIC({},{})", k_period, d_period)
            }
            IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            } => write!(f, "BOLLINGER({},{})", period, from_x100(*stddev_mult_x100)),
        }
    }
}

/// Build a series from per-bar optional values; `None` marks warmup.
pub(crate) fn series_from_options(
    bars: &[PriceBar],
    indicator_type: IndicatorType,
    values: impl IntoIterator<Item = Option<IndicatorValue>>,
) -> IndicatorSeries {
    let values = bars
        .iter()
        .zip(values)
        .map(|(bar, value)| match value {
            Some(value) => IndicatorPoint {
                timestamp: bar.timestamp,
                valid: true,
                value,
            },
            None => IndicatorPoint {
                timestamp: bar.timestamp,
                valid: false,
                value: IndicatorValue::Simple(0.0),
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type,
        values,
    }
}
