//! Bollinger Bands indicator.
//!
//! Bollinger Bands consist of:
//! - Middle: Simple Moving Average (SMA) over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the sample standard deviation (divides by N-1). Windows are
//! partial at the start; a bar is invalid until its window holds two closes.

use crate::domain::indicator::rolling::{rolling_mean, rolling_sample_stddev};
use crate::domain::indicator::{series_from_options, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_bollinger(bars: &[PriceBar], period: usize, stddev_mult: f64) -> IndicatorSeries {
    let indicator_type = IndicatorType::bollinger(period, stddev_mult);
    if period < 2 {
        return series_from_options(bars, indicator_type, bars.iter().map(|_| None));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let middles = rolling_mean(&closes, period);
    let stddevs = rolling_sample_stddev(&closes, period);

    let values = middles.into_iter().zip(stddevs).map(|(middle, stddev)| {
        stddev.map(|sd| IndicatorValue::Bollinger {
            upper: middle + stddev_mult * sd,
            middle,
            lower: middle - stddev_mult * sd,
        })
    });

    series_from_options(bars, indicator_type, values)
}
