//! Stochastic oscillator.
//!
//! %K = 100 * (C - lowest_low(k)) / (highest_high(k) - lowest_low(k))
//! %D = mean of the valid %K values over the last d bars
//!
//! Windows are partial at the start. %K is undefined when the window's high
//! equals its low; such bars are invalid and are left out of later %D means.

use crate::domain::indicator::{series_from_options, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_stochastic(bars: &[PriceBar], k_period: usize, d_period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Stochastic { k_period, d_period };
    if k_period == 0 || d_period == 0 {
        return series_from_options(bars, indicator_type, bars.iter().map(|_| None));
    }

    let k_values: Vec<Option<f64>> = (0..bars.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(k_period);
            let window = &bars[start..=i];
            let lowest = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
            let highest = window.iter().map(|b| b.high).fold(f64::NEG_INFINITY, f64::max);
            let range = highest - lowest;
            (range > 0.0).then(|| 100.0 * (bars[i].close - lowest) / range)
        })
        .collect();

    let values: Vec<Option<IndicatorValue>> = (0..bars.len())
        .map(|i| {
            let k = k_values[i]?;
            let start = (i + 1).saturating_sub(d_period);
            let valid: Vec<f64> = k_values[start..=i].iter().flatten().copied().collect();
            let d = valid.iter().sum::<f64>() / valid.len() as f64;
            Some(IndicatorValue::Stochastic { k, d })
        })
        .collect();

    series_from_options(bars, indicator_type, values)
}
