//! Exponential Moving Average indicator.
//!
//! k = 2/(n+1), seeded with the first close, then EMA[i] = C[i]*k + EMA[i-1]*(1-k).
//! Valid from the first bar.

use crate::domain::indicator::rolling::ema_values;
use crate::domain::indicator::{series_from_options, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_ema(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Ema(period);
    if period == 0 {
        return series_from_options(bars, indicator_type, bars.iter().map(|_| None));
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let values = ema_values(&closes, period)
        .into_iter()
        .map(|v| Some(IndicatorValue::Simple(v)));

    series_from_options(bars, indicator_type, values)
}
