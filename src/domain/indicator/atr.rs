//! Average True Range.
//!
//! Rolling mean (partial windows) of the true range. Bar 0 has no previous
//! close, so its true range is `high - low`.

use crate::domain::indicator::rolling::rolling_mean;
use crate::domain::indicator::{series_from_options, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_atr(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Atr(period);
    if period == 0 {
        return series_from_options(bars, indicator_type, bars.iter().map(|_| None));
    }

    let tr_values: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let values = rolling_mean(&tr_values, period)
        .into_iter()
        .map(|v| Some(IndicatorValue::Simple(v)));

    series_from_options(bars, indicator_type, values)
}
