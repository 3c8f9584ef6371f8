//! Rolling-window helpers shared by the indicator calculators.
//!
//! Windows are trailing and may be partial at the start of the series: the
//! value at index `i` covers `values[i + 1 - min(i + 1, period) ..= i]`.

/// Trailing mean over at most `period` values.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if period == 0 {
        return out;
    }
    let mut sum = 0.0;
    for i in 0..values.len() {
        sum += values[i];
        if i >= period {
            sum -= values[i - period];
        }
        let n = (i + 1).min(period);
        out.push(sum / n as f64);
    }
    out
}

/// Trailing sample standard deviation (n - 1 denominator).
///
/// `None` while the window holds fewer than two values.
pub fn rolling_sample_stddev(values: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(period);
            let window = &values[start..=i];
            if window.len() < 2 {
                return None;
            }
            let n = window.len() as f64;
            let mean = window.iter().sum::<f64>() / n;
            let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(variance.sqrt())
        })
        .collect()
}

/// Exponential moving average with `alpha = 2 / (period + 1)`, seeded by the
/// first value.
pub fn ema_values(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };
    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = first;
    out.push(ema);
    for &v in &values[1..] {
        ema = v * k + ema * (1.0 - k);
        out.push(ema);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn mean_partial_windows() {
        let out = rolling_mean(&[2.0, 4.0, 6.0, 8.0], 3);
        assert_eq!(out.len(), 4);
        assert_relative_eq!(out[0], 2.0);
        assert_relative_eq!(out[1], 3.0);
        assert_relative_eq!(out[2], 4.0);
        assert_relative_eq!(out[3], 6.0);
    }

    #[test]
    fn mean_zero_period() {
        assert!(rolling_mean(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn sample_stddev_needs_two_values() {
        let out = rolling_sample_stddev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 8);
        assert_eq!(out[0], None);
        assert_relative_eq!(out[1].unwrap(), 2.0_f64.sqrt());
        // full window: population variance 4, sample variance 32/7
        assert_relative_eq!(out[7].unwrap(), (32.0_f64 / 7.0).sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn sample_stddev_constant_is_zero() {
        let out = rolling_sample_stddev(&[5.0, 5.0, 5.0], 3);
        assert_relative_eq!(out[2].unwrap(), 0.0);
    }

    #[test]
    fn ema_seeded_by_first_value() {
        let out = ema_values(&[10.0, 20.0, 30.0], 3);
        let k = 0.5;
        assert_relative_eq!(out[0], 10.0);
        assert_relative_eq!(out[1], 20.0 * k + 10.0 * (1.0 - k));
        assert_relative_eq!(out[2], 30.0 * k + out[1] * (1.0 - k));
    }

    #[test]
    fn ema_empty() {
        assert!(ema_values(&[], 5).is_empty());
    }
}
