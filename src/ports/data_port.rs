//! Price data access port.

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::error::SpxError;
use crate::domain::ohlcv::PriceBar;

pub trait DataPort {
    /// Bars for `symbol` at `interval` with timestamps on or between the two
    /// dates, ascending and free of duplicates.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        interval: &str,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<Vec<PriceBar>, SpxError>;

    fn list_symbols(&self, interval: &str) -> Result<Vec<String>, SpxError>;

    /// First timestamp, last timestamp and bar count, if any data exists.
    fn get_data_range(
        &self,
        symbol: &str,
        interval: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime, usize)>, SpxError>;
}
