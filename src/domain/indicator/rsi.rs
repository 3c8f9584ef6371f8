//! RSI (Relative Strength Index).
//!
//! Average gain and average loss are simple rolling means over the last
//! `period` close-to-close changes, with partial windows at the start. This
//! is not Wilder's recursive smoothing.
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0: RSI = 100, or 50 when avg_gain is also 0.
//!
//! Bar 0 has no prior close and is invalid.

use crate::domain::indicator::rolling::rolling_mean;
use crate::domain::indicator::{series_from_options, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::PriceBar;

pub fn calculate_rsi(bars: &[PriceBar], period: usize) -> IndicatorSeries {
    let indicator_type = IndicatorType::Rsi(period);
    if period == 0 || bars.len() < 2 {
        return series_from_options(bars, indicator_type, bars.iter().map(|_| None));
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = bars
        .windows(2)
        .map(|w| {
            let change = w[1].close - w[0].close;
            (change.max(0.0), (-change).max(0.0))
        })
        .unzip();

    let avg_gains = rolling_mean(&gains, period);
    let avg_losses = rolling_mean(&losses, period);

    let values = std::iter::once(None).chain(
        avg_gains
            .into_iter()
            .zip(avg_losses)
            .map(|(g, l)| Some(IndicatorValue::Simple(rsi_from_averages(g, l)))),
    );

    series_from_options(bars, indicator_type, values)
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 { 50.0 } else { 100.0 }
    } else {
        100.0 - (100.0 / (1.0 + avg_gain / avg_loss))
    }
}
