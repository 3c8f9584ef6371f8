#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime};
use spxtrader::domain::backtest::BacktestConfig;
use spxtrader::domain::error::SpxError;
pub use spxtrader::domain::ohlcv::PriceBar;
use spxtrader::domain::params::{EmaParams, IndicatorParams, MacdParams, RsiParams};
use spxtrader::ports::data_port::DataPort;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

/// 5-minute bars per regular session, 09:30 through 15:55.
pub const BARS_PER_DAY: usize = 78;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PriceBar>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, SpxError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(SpxError::Data {
                reason: reason.clone(),
            });
        }
        let bars: Vec<PriceBar> = self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| start_date.is_none_or(|d| b.timestamp.date() >= d))
                    .filter(|b| end_date.is_none_or(|d| b.timestamp.date() <= d))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if bars.is_empty() {
            return Err(SpxError::NoData {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self, _interval: &str) -> Result<Vec<String>, SpxError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
        _interval: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, SpxError> {
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => Ok(Some((
                bars[0].timestamp,
                bars[bars.len() - 1].timestamp,
                bars.len(),
            ))),
            _ => Ok(None),
        }
    }
}

/// Timestamp of the `i`th regular-session 5-minute bar counted from
/// 2024-01-02 09:30, rolling into the next calendar day after 15:55.
pub fn session_timestamp(i: usize) -> NaiveDateTime {
    let day = (i / BARS_PER_DAY) as i64;
    let slot = (i % BARS_PER_DAY) as i64;
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
        + Duration::days(day)
        + Duration::minutes(5 * slot)
}

/// Session bars from closes. Each bar opens at the previous close and its
/// range extends a quarter point past the body.
pub fn session_bars(closes: &[f64]) -> Vec<PriceBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                timestamp: session_timestamp(i),
                open,
                high: open.max(close) + 0.25,
                low: open.min(close) - 0.25,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

/// `count` closes rising linearly from `from` to `to`.
pub fn linear_closes(count: usize, from: f64, to: f64) -> Vec<f64> {
    let step = (to - from) / (count - 1) as f64;
    (0..count).map(|i| from + step * i as f64).collect()
}

/// A deterministic oscillating series that keeps crossing its averages.
pub fn wave_closes(count: usize) -> Vec<f64> {
    (0..count)
        .map(|i| {
            let t = i as f64;
            4000.0 + 15.0 * (t / 9.0).sin() + 6.0 * (t / 3.7).cos() + 0.05 * t
        })
        .collect()
}

pub fn rsi_macd_params() -> IndicatorParams {
    IndicatorParams {
        rsi: Some(RsiParams {
            periods: vec![14],
            oversold: vec![30.0],
            overbought: vec![70.0],
        }),
        macd: Some(MacdParams {
            fast: vec![12],
            slow: vec![26],
            signal: vec![9],
        }),
        ..Default::default()
    }
}

pub fn ema_params(short: usize, long: usize) -> IndicatorParams {
    IndicatorParams {
        ema: Some(EmaParams {
            short_periods: vec![short],
            long_periods: vec![long],
        }),
        ..Default::default()
    }
}

pub fn single_confirmation() -> BacktestConfig {
    BacktestConfig {
        min_confirmations: 1,
        ..Default::default()
    }
}

/// Write bars as `{symbol}_{interval}.csv` under `dir`.
pub fn write_bars_csv(dir: &Path, symbol: &str, interval: &str, bars: &[PriceBar]) {
    let mut file = std::fs::File::create(dir.join(format!("{symbol}_{interval}.csv"))).unwrap();
    writeln!(file, "timestamp,open,high,low,close,volume").unwrap();
    for b in bars {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            b.timestamp.format("%Y-%m-%d %H:%M:%S"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        )
        .unwrap();
    }
}

pub fn write_temp_ini(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
