//! OHLCV bar representation and series validation.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::SpxError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, prev_close: f64) -> f64 {
        let hl = self.high - self.low;
        let hc = (self.high - prev_close).abs();
        let lc = (self.low - prev_close).abs();
        hl.max(hc).max(lc)
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// `high >= max(open, close) >= min(open, close) >= low`, all finite.
    pub fn is_consistent(&self) -> bool {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return false;
        }
        self.high >= self.open.max(self.close) && self.open.min(self.close) >= self.low
    }
}

/// Check the structural invariants the engine relies on.
///
/// Empty input and non-ascending (or duplicate) timestamps abort the run.
/// Bars with inconsistent OHLC values are reported and returned as indices
/// so the caller can log them; they do not abort.
pub fn validate_series(bars: &[PriceBar]) -> Result<Vec<usize>, SpxError> {
    if bars.is_empty() {
        return Err(SpxError::EmptySeries);
    }

    for (i, pair) in bars.windows(2).enumerate() {
        if pair[1].timestamp <= pair[0].timestamp {
            return Err(SpxError::NonMonotonicTimestamp {
                index: i + 1,
                previous: pair[0].timestamp,
                current: pair[1].timestamp,
            });
        }
    }

    Ok(bars
        .iter()
        .enumerate()
        .filter(|(_, b)| !b.is_consistent())
        .map(|(i, _)| i)
        .collect())
}
