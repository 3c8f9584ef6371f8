//! CSV file price data adapter.
//!
//! Reads `{symbol}_{interval}.csv` from a base directory. Columns are found
//! by header name, case-insensitively; the timestamp column may be called
//! `timestamp`, `datetime`, `date` or `time`.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

use crate::domain::error::SpxError;
use crate::domain::ohlcv::PriceBar;
use crate::ports::data_port::DataPort;

const TIMESTAMP_COLUMNS: [&str; 4] = ["timestamp", "datetime", "date", "time"];
const PRICE_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%:z", "%Y-%m-%dT%H:%M:%S%:z"];

pub struct CsvAdapter {
    base_path: PathBuf,
}

impl CsvAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn csv_path(&self, symbol: &str, interval: &str) -> PathBuf {
        self.base_path.join(format!("{}_{}.csv", symbol, interval))
    }

    /// Every bar in the file, sorted, with duplicate timestamps and rows
    /// holding non-finite prices dropped.
    fn load(&self, symbol: &str, interval: &str) -> Result<Vec<PriceBar>, SpxError> {
        let path = self.csv_path(symbol, interval);
        let content = fs::read_to_string(&path).map_err(|e| SpxError::Data {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_lowercase()).collect();

        let ts_col = TIMESTAMP_COLUMNS
            .iter()
            .find_map(|name| headers.iter().position(|h| h == name))
            .or_else(|| headers.first().filter(|h| h.is_empty()).map(|_| 0))
            .ok_or_else(|| SpxError::MissingColumn {
                column: "timestamp".into(),
            })?;
        let mut price_cols = [0usize; 5];
        for (slot, name) in price_cols.iter_mut().zip(PRICE_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| SpxError::MissingColumn {
                    column: name.to_string(),
                })?;
        }

        let mut bars = Vec::new();
        let mut dropped = 0usize;
        for (row, result) in rdr.records().enumerate() {
            let record = result?;
            let field = |col: usize| record.get(col).unwrap_or("");

            let timestamp = parse_timestamp(field(ts_col)).ok_or_else(|| SpxError::Data {
                reason: format!("row {}: invalid timestamp '{}'", row + 1, field(ts_col)),
            })?;

            let mut values = [0.0f64; 5];
            for (value, (&col, name)) in values.iter_mut().zip(price_cols.iter().zip(PRICE_COLUMNS)) {
                let raw = field(col);
                *value = if raw.is_empty() {
                    f64::NAN
                } else {
                    raw.parse().map_err(|e| SpxError::Data {
                        reason: format!("row {}: invalid {} value '{}': {}", row + 1, name, raw, e),
                    })?
                };
            }
            if values.iter().any(|v| !v.is_finite()) {
                dropped += 1;
                continue;
            }

            let [open, high, low, close, volume] = values;
            bars.push(PriceBar {
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        let before = bars.len();
        bars.dedup_by_key(|b| b.timestamp);
        let duplicates = before - bars.len();
        if dropped > 0 || duplicates > 0 {
            debug!(
                path = %path.display(),
                dropped,
                duplicates,
                "cleaned price data"
            );
        }
        Ok(bars)
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .or_else(|| {
            OFFSET_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl DataPort for CsvAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, SpxError> {
        let bars: Vec<PriceBar> = self
            .load(symbol, interval)?
            .into_iter()
            .filter(|b| start_date.is_none_or(|s| b.timestamp.date() >= s))
            .filter(|b| end_date.is_none_or(|e| b.timestamp.date() <= e))
            .collect();

        if bars.is_empty() {
            return Err(SpxError::NoData {
                symbol: symbol.to_string(),
                interval: interval.to_string(),
            });
        }
        Ok(bars)
    }

    fn list_symbols(&self, interval: &str) -> Result<Vec<String>, SpxError> {
        let suffix = format!("_{}.csv", interval);
        let mut symbols = Vec::new();

        for entry in fs::read_dir(&self.base_path)? {
            let name = entry?.file_name();
            let name = name.to_string_lossy();
            if let Some(symbol) = name.strip_suffix(&suffix) {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, SpxError> {
        if !self.csv_path(symbol, interval).exists() {
            return Ok(None);
        }
        let bars = self.load(symbol, interval)?;
        Ok(match (bars.first(), bars.last()) {
            (Some(first), Some(last)) => Some((first.timestamp, last.timestamp, bars.len())),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ts(d: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn setup_test_data() -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().to_path_buf();

        let csv_content = "Datetime,Open,High,Low,Close,Volume\n\
            2024-01-03 09:35:00,4705.0,4712.0,4701.0,4710.0,1200\n\
            2024-01-02 09:30:00,4700.0,4706.0,4695.0,4702.5,1500\n\
            2024-01-02 09:35:00,4702.5,4708.0,4700.0,4704.0,900\n\
            2024-01-02 09:35:00,4999.0,4999.0,4999.0,4999.0,1\n\
            2024-01-02 09:40:00,4704.0,,4701.0,4703.0,800\n";

        fs::write(path.join("SPX_5m.csv"), csv_content).unwrap();
        fs::write(
            path.join("ES_5m.csv"),
            "timestamp,open,high,low,close,volume\n",
        )
        .unwrap();
        fs::write(
            path.join("SPX_1h.csv"),
            "timestamp,open,high,low,close,volume\n",
        )
        .unwrap();

        (dir, path)
    }

    #[test]
    fn fetch_sorts_dedupes_and_drops_gaps() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let bars = adapter.fetch_ohlcv("SPX", "5m", None, None).unwrap();
        assert_eq!(bars.len(), 3);
        assert_eq!(bars[0].timestamp, ts(2, 9, 30));
        assert_eq!(bars[0].open, 4700.0);
        assert_eq!(bars[0].high, 4706.0);
        assert_eq!(bars[0].low, 4695.0);
        assert_eq!(bars[0].close, 4702.5);
        assert_eq!(bars[0].volume, 1500.0);
        // first of the duplicate 09:35 rows wins
        assert_eq!(bars[1].close, 4704.0);
        assert_eq!(bars[2].timestamp, ts(3, 9, 35));
    }

    #[test]
    fn fetch_filters_by_date() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        let day = NaiveDate::from_ymd_opt(2024, 1, 3);
        let bars = adapter.fetch_ohlcv("SPX", "5m", day, day).unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].timestamp, ts(3, 9, 35));
    }

    #[test]
    fn fetch_missing_file_is_error() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_ohlcv("XYZ", "5m", None, None).unwrap_err();
        assert!(matches!(err, SpxError::Data { .. }));
    }

    #[test]
    fn fetch_empty_file_is_no_data() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);
        let err = adapter.fetch_ohlcv("ES", "5m", None, None).unwrap_err();
        assert!(matches!(err, SpxError::NoData { .. }));
    }

    #[test]
    fn missing_column_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("SPX_5m.csv"),
            "timestamp,open,high,low,close\n2024-01-02 09:30:00,1,2,0.5,1.5\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.fetch_ohlcv("SPX", "5m", None, None).unwrap_err();
        assert!(matches!(err, SpxError::MissingColumn { column } if column == "volume"));
    }

    #[test]
    fn bad_number_is_data_error() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("SPX_5m.csv"),
            "timestamp,open,high,low,close,volume\n2024-01-02 09:30:00,1,abc,0.5,1.5,10\n",
        )
        .unwrap();
        let adapter = CsvAdapter::new(dir.path().to_path_buf());
        let err = adapter.fetch_ohlcv("SPX", "5m", None, None).unwrap_err();
        assert!(matches!(err, SpxError::Data { .. }));
    }

    #[test]
    fn timestamp_formats() {
        assert_eq!(parse_timestamp("2024-01-02 09:30:00"), Some(ts(2, 9, 30)));
        assert_eq!(parse_timestamp("2024-01-02T09:30:00"), Some(ts(2, 9, 30)));
        assert_eq!(parse_timestamp("2024-01-02 09:30"), Some(ts(2, 9, 30)));
        assert_eq!(
            parse_timestamp("2024-01-02 09:30:00-05:00"),
            Some(ts(2, 9, 30))
        );
        assert_eq!(parse_timestamp("2024-01-02"), Some(ts(2, 0, 0)));
        assert_eq!(parse_timestamp("02/01/2024"), None);
    }

    #[test]
    fn list_symbols_by_interval() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(adapter.list_symbols("5m").unwrap(), vec!["ES", "SPX"]);
        assert_eq!(adapter.list_symbols("1h").unwrap(), vec!["SPX"]);
    }

    #[test]
    fn data_range() {
        let (_dir, path) = setup_test_data();
        let adapter = CsvAdapter::new(path);

        assert_eq!(
            adapter.get_data_range("SPX", "5m").unwrap(),
            Some((ts(2, 9, 30), ts(3, 9, 35), 3))
        );
        assert_eq!(adapter.get_data_range("ES", "5m").unwrap(), None);
        assert_eq!(adapter.get_data_range("XYZ", "5m").unwrap(), None);
    }
}
