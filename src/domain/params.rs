//! Indicator parameter sweeps.
//!
//! Every field holds an ordered list of values. A list with several values
//! means "compute every variant"; [`IndicatorParams::expand_grid`] turns a
//! multi-valued set into single-valued combinations for a sweep.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::error::SpxError;
use crate::domain::indicator::IndicatorType;
use crate::domain::signal::SignalVariant;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RsiParams {
    pub periods: Vec<usize>,
    pub oversold: Vec<f64>,
    pub overbought: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmaParams {
    pub short_periods: Vec<usize>,
    pub long_periods: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast: Vec<usize>,
    pub slow: Vec<usize>,
    pub signal: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerParams {
    pub periods: Vec<usize>,
    pub std_devs: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtrParams {
    pub periods: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochasticParams {
    pub k_periods: Vec<usize>,
    pub d_periods: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    pub rsi: Option<RsiParams>,
    pub ema: Option<EmaParams>,
    pub macd: Option<MacdParams>,
    pub bollinger: Option<BollingerParams>,
    pub atr: Option<AtrParams>,
    pub stochastic: Option<StochasticParams>,
}

impl IndicatorParams {
    /// Every indicator series needed by these params, in a stable order.
    pub fn indicator_types(&self) -> Vec<IndicatorType> {
        let mut types = BTreeSet::new();

        if let Some(rsi) = &self.rsi {
            types.extend(rsi.periods.iter().map(|&p| IndicatorType::Rsi(p)));
        }
        if let Some(ema) = &self.ema {
            types.extend(ema.short_periods.iter().map(|&p| IndicatorType::Ema(p)));
            types.extend(ema.long_periods.iter().map(|&p| IndicatorType::Ema(p)));
        }
        if let Some(macd) = &self.macd {
            for &fast in &macd.fast {
                for &slow in &macd.slow {
                    if fast >= slow {
                        continue;
                    }
                    for &signal in &macd.signal {
                        types.insert(IndicatorType::Macd { fast, slow, signal });
                    }
                }
            }
        }
        if let Some(bb) = &self.bollinger {
            for &period in &bb.periods {
                for &mult in &bb.std_devs {
                    types.insert(IndicatorType::bollinger(period, mult));
                }
            }
        }
        if let Some(atr) = &self.atr {
            types.extend(atr.periods.iter().map(|&p| IndicatorType::Atr(p)));
        }
        if let Some(stoch) = &self.stochastic {
            for &k_period in &stoch.k_periods {
                for &d_period in &stoch.d_periods {
                    types.insert(IndicatorType::Stochastic { k_period, d_period });
                }
            }
        }

        types.into_iter().collect()
    }

    /// Signal-producing variants. Ill-defined combinations (oversold above
    /// overbought, fast MACD not faster than slow, short EMA not shorter than
    /// long) are left out.
    pub fn signal_variants(&self) -> Vec<SignalVariant> {
        let mut variants = Vec::new();

        if let Some(rsi) = &self.rsi {
            for &period in &rsi.periods {
                for &oversold in &rsi.oversold {
                    for &overbought in &rsi.overbought {
                        if oversold < overbought {
                            variants.push(SignalVariant::rsi(period, oversold, overbought));
                        }
                    }
                }
            }
        }
        if let Some(macd) = &self.macd {
            for &fast in &macd.fast {
                for &slow in &macd.slow {
                    for &signal in &macd.signal {
                        if fast < slow {
                            variants.push(SignalVariant::Macd { fast, slow, signal });
                        }
                    }
                }
            }
        }
        if let Some(bb) = &self.bollinger {
            for &period in &bb.periods {
                for &mult in &bb.std_devs {
                    variants.push(SignalVariant::bollinger(period, mult));
                }
            }
        }
        if let Some(ema) = &self.ema {
            for &short in &ema.short_periods {
                for &long in &ema.long_periods {
                    if short < long {
                        variants.push(SignalVariant::EmaCross { short, long });
                    }
                }
            }
        }

        variants
    }

    /// ATR series used for stop distances: the first configured period.
    pub fn stop_atr(&self) -> Option<IndicatorType> {
        self.atr
            .as_ref()
            .and_then(|a| a.periods.first())
            .map(|&p| IndicatorType::Atr(p))
    }

    /// Bars needed before the slowest configured indicator has a full window.
    pub fn warmup_bars(&self) -> usize {
        let mut warmup = 2;
        if let Some(rsi) = &self.rsi {
            warmup = warmup.max(rsi.periods.iter().max().map_or(0, |p| p + 1));
        }
        if let Some(ema) = &self.ema {
            warmup = warmup.max(ema.long_periods.iter().copied().max().unwrap_or(0));
        }
        if let Some(macd) = &self.macd {
            let slow = macd.slow.iter().copied().max().unwrap_or(0);
            let signal = macd.signal.iter().copied().max().unwrap_or(0);
            warmup = warmup.max(slow + signal);
        }
        if let Some(bb) = &self.bollinger {
            warmup = warmup.max(bb.periods.iter().copied().max().unwrap_or(0));
        }
        if let Some(atr) = &self.atr {
            warmup = warmup.max(atr.periods.iter().copied().max().unwrap_or(0));
        }
        if let Some(stoch) = &self.stochastic {
            let k = stoch.k_periods.iter().copied().max().unwrap_or(0);
            let d = stoch.d_periods.iter().copied().max().unwrap_or(0);
            warmup = warmup.max(k + d);
        }
        warmup
    }

    /// Reject parameter sets that make an indicator ill-defined.
    pub fn validate(&self) -> Result<(), SpxError> {
        if let Some(rsi) = &self.rsi {
            check_periods("RSI", &rsi.periods)?;
            check_non_empty("RSI", "oversold", &rsi.oversold)?;
            check_non_empty("RSI", "overbought", &rsi.overbought)?;
            for &level in rsi.oversold.iter().chain(&rsi.overbought) {
                if !(0.0..=100.0).contains(&level) {
                    return Err(SpxError::invalid_parameter(
                        "RSI",
                        format!("threshold {level} outside 0..=100"),
                    ));
                }
            }
            let any_valid = rsi
                .oversold
                .iter()
                .any(|&os| rsi.overbought.iter().any(|&ob| os < ob));
            if !any_valid {
                return Err(SpxError::invalid_parameter(
                    "RSI",
                    "no oversold level below an overbought level",
                ));
            }
        }
        if let Some(ema) = &self.ema {
            check_periods("EMA", &ema.short_periods)?;
            check_periods("EMA", &ema.long_periods)?;
            let any_valid = ema
                .short_periods
                .iter()
                .any(|&s| ema.long_periods.iter().any(|&l| s < l));
            if !any_valid {
                return Err(SpxError::invalid_parameter(
                    "EMA",
                    format!(
                        "no short period below a long period (short {:?}, long {:?})",
                        ema.short_periods, ema.long_periods
                    ),
                ));
            }
        }
        if let Some(macd) = &self.macd {
            check_periods("MACD", &macd.fast)?;
            check_periods("MACD", &macd.slow)?;
            check_periods("MACD", &macd.signal)?;
            let any_valid = macd.fast.iter().any(|&f| macd.slow.iter().any(|&s| f < s));
            if !any_valid {
                return Err(SpxError::invalid_parameter(
                    "MACD",
                    format!(
                        "no fast period below a slow period (fast {:?}, slow {:?})",
                        macd.fast, macd.slow
                    ),
                ));
            }
        }
        if let Some(bb) = &self.bollinger {
            check_periods("Bollinger_Bands", &bb.periods)?;
            if let Some(&p) = bb.periods.iter().find(|&&p| p < 2) {
                return Err(SpxError::invalid_parameter(
                    "Bollinger_Bands",
                    format!("period {p} too short for a standard deviation"),
                ));
            }
            check_non_empty("Bollinger_Bands", "std_dev", &bb.std_devs)?;
            if let Some(m) = bb.std_devs.iter().find(|m| !m.is_finite() || **m <= 0.0) {
                return Err(SpxError::invalid_parameter(
                    "Bollinger_Bands",
                    format!("std_dev multiplier {m} must be positive"),
                ));
            }
        }
        if let Some(atr) = &self.atr {
            check_periods("ATR", &atr.periods)?;
        }
        if let Some(stoch) = &self.stochastic {
            check_periods("Stochastic", &stoch.k_periods)?;
            check_periods("Stochastic", &stoch.d_periods)?;
        }
        Ok(())
    }

    /// Cartesian product of every parameter list, one value per list.
    ///
    /// Combinations come out in a deterministic order: families in field
    /// order, values in list order, last parameter varying fastest.
    pub fn expand_grid(&self) -> Vec<IndicatorParams> {
        let mut grid = vec![IndicatorParams::default()];

        if let Some(rsi) = &self.rsi {
            grid = extend(grid, product3(&rsi.periods, &rsi.oversold, &rsi.overbought), |p, (period, os, ob)| {
                p.rsi = Some(RsiParams {
                    periods: vec![period],
                    oversold: vec![os],
                    overbought: vec![ob],
                });
            });
        }
        if let Some(ema) = &self.ema {
            grid = extend(grid, product2(&ema.short_periods, &ema.long_periods), |p, (s, l)| {
                p.ema = Some(EmaParams {
                    short_periods: vec![s],
                    long_periods: vec![l],
                });
            });
        }
        if let Some(macd) = &self.macd {
            grid = extend(grid, product3(&macd.fast, &macd.slow, &macd.signal), |p, (f, s, sig)| {
                p.macd = Some(MacdParams {
                    fast: vec![f],
                    slow: vec![s],
                    signal: vec![sig],
                });
            });
        }
        if let Some(bb) = &self.bollinger {
            grid = extend(grid, product2(&bb.periods, &bb.std_devs), |p, (period, m)| {
                p.bollinger = Some(BollingerParams {
                    periods: vec![period],
                    std_devs: vec![m],
                });
            });
        }
        if let Some(atr) = &self.atr {
            grid = extend(grid, atr.periods.clone(), |p, period| {
                p.atr = Some(AtrParams {
                    periods: vec![period],
                });
            });
        }
        if let Some(stoch) = &self.stochastic {
            grid = extend(grid, product2(&stoch.k_periods, &stoch.d_periods), |p, (k, d)| {
                p.stochastic = Some(StochasticParams {
                    k_periods: vec![k],
                    d_periods: vec![d],
                });
            });
        }

        grid
    }

    /// Compact description such as `RSI_14_30_70 EMA_10_50 ATR_14`.
    pub fn label(&self) -> String {
        let mut parts: Vec<String> = self
            .signal_variants()
            .iter()
            .map(|v| v.to_string())
            .collect();
        if let Some(atr) = &self.atr {
            parts.extend(atr.periods.iter().map(|p| format!("ATR_{p}")));
        }
        if let Some(stoch) = &self.stochastic {
            for k in &stoch.k_periods {
                for d in &stoch.d_periods {
                    parts.push(format!("STOCH_{k}_{d}"));
                }
            }
        }
        parts.join(" ")
    }

    pub fn family_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.rsi.is_some() {
            names.push("RSI");
        }
        if self.ema.is_some() {
            names.push("EMA");
        }
        if self.macd.is_some() {
            names.push("MACD");
        }
        if self.bollinger.is_some() {
            names.push("Bollinger_Bands");
        }
        if self.atr.is_some() {
            names.push("ATR");
        }
        if self.stochastic.is_some() {
            names.push("Stochastic");
        }
        names
    }
}

fn check_periods(family: &str, periods: &[usize]) -> Result<(), SpxError> {
    check_non_empty(family, "periods", periods)?;
    if periods.contains(&0) {
        return Err(SpxError::invalid_parameter(family, "period must be positive"));
    }
    Ok(())
}

fn check_non_empty<T>(family: &str, name: &str, values: &[T]) -> Result<(), SpxError> {
    if values.is_empty() {
        return Err(SpxError::invalid_parameter(
            family,
            format!("{name} list is empty"),
        ));
    }
    Ok(())
}

fn product2<A: Copy, B: Copy>(a: &[A], b: &[B]) -> Vec<(A, B)> {
    a.iter()
        .flat_map(|&x| b.iter().map(move |&y| (x, y)))
        .collect()
}

fn product3<A: Copy, B: Copy, C: Copy>(a: &[A], b: &[B], c: &[C]) -> Vec<(A, B, C)> {
    product2(a, b)
        .into_iter()
        .flat_map(|(x, y)| c.iter().map(move |&z| (x, y, z)))
        .collect()
}

fn extend<T: Copy>(
    grid: Vec<IndicatorParams>,
    choices: Vec<T>,
    apply: impl Fn(&mut IndicatorParams, T),
) -> Vec<IndicatorParams> {
    grid.into_iter()
        .flat_map(|base| {
            choices
                .iter()
                .map(|&choice| {
                    let mut p = base.clone();
                    apply(&mut p, choice);
                    p
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Parse a comma-separated list of positive integers.
pub fn parse_usize_list(input: &str) -> Result<Vec<usize>, String> {
    input
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<usize>().map_err(|e| format!("'{t}': {e}")))
        .collect()
}

/// Parse a comma-separated list of numbers.
pub fn parse_f64_list(input: &str) -> Result<Vec<f64>, String> {
    input
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.parse::<f64>().map_err(|e| format!("'{t}': {e}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_params() -> IndicatorParams {
        IndicatorParams {
            rsi: Some(RsiParams {
                periods: vec![9, 14],
                oversold: vec![20.0, 30.0],
                overbought: vec![70.0],
            }),
            ema: Some(EmaParams {
                short_periods: vec![10, 20],
                long_periods: vec![50],
            }),
            macd: Some(MacdParams {
                fast: vec![12],
                slow: vec![26],
                signal: vec![9],
            }),
            bollinger: Some(BollingerParams {
                periods: vec![20],
                std_devs: vec![2.0, 2.5],
            }),
            atr: Some(AtrParams { periods: vec![14] }),
            stochastic: None,
        }
    }

    #[test]
    fn indicator_types_are_unique_and_sorted() {
        let mut params = full_params();
        params.ema = Some(EmaParams {
            short_periods: vec![10, 10],
            long_periods: vec![50],
        });
        let types = params.indicator_types();
        let mut sorted = types.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(types, sorted);
        // RSI×2, EMA×2, MACD, BB×2, ATR
        assert_eq!(types.len(), 8);
    }

    #[test]
    fn signal_variants_skip_invalid_pairs() {
        let params = IndicatorParams {
            ema: Some(EmaParams {
                short_periods: vec![10, 60],
                long_periods: vec![50],
            }),
            ..Default::default()
        };
        assert_eq!(
            params.signal_variants(),
            vec![SignalVariant::EmaCross {
                short: 10,
                long: 50
            }]
        );
    }

    #[test]
    fn signal_variant_count() {
        // RSI 2×2×1 + MACD 1 + BB 2 + EMA 2
        assert_eq!(full_params().signal_variants().len(), 9);
    }

    #[test]
    fn stop_atr_uses_first_period() {
        let mut params = full_params();
        params.atr = Some(AtrParams {
            periods: vec![10, 14],
        });
        assert_eq!(params.stop_atr(), Some(IndicatorType::Atr(10)));
        assert_eq!(IndicatorParams::default().stop_atr(), None);
    }

    #[test]
    fn warmup_is_slowest_window() {
        assert_eq!(full_params().warmup_bars(), 50);
        let macd_only = IndicatorParams {
            macd: full_params().macd,
            ..Default::default()
        };
        assert_eq!(macd_only.warmup_bars(), 35);
        assert_eq!(IndicatorParams::default().warmup_bars(), 2);
    }

    #[test]
    fn validate_accepts_full_params() {
        assert!(full_params().validate().is_ok());
    }

    #[test]
    fn validate_rejects_inverted_ema() {
        let params = IndicatorParams {
            ema: Some(EmaParams {
                short_periods: vec![50],
                long_periods: vec![20],
            }),
            ..Default::default()
        };
        match params.validate() {
            Err(SpxError::InvalidParameter { family, .. }) => assert_eq!(family, "EMA"),
            other => panic!("expected InvalidParameter, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_zero_period() {
        let params = IndicatorParams {
            atr: Some(AtrParams { periods: vec![0] }),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_positive_multiplier() {
        let params = IndicatorParams {
            bollinger: Some(BollingerParams {
                periods: vec![20],
                std_devs: vec![0.0],
            }),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_rsi_levels() {
        let params = IndicatorParams {
            rsi: Some(RsiParams {
                periods: vec![14],
                oversold: vec![70.0],
                overbought: vec![30.0],
            }),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn expand_grid_size_and_order() {
        let grid = full_params().expand_grid();
        // RSI 2×2×1, EMA 2×1, MACD 1, BB 1×2, ATR 1
        assert_eq!(grid.len(), 4 * 2 * 2);

        let first = &grid[0];
        assert_eq!(first.rsi.as_ref().unwrap().periods, vec![9]);
        assert_eq!(first.rsi.as_ref().unwrap().oversold, vec![20.0]);
        assert_eq!(first.ema.as_ref().unwrap().short_periods, vec![10]);
        assert_eq!(first.bollinger.as_ref().unwrap().std_devs, vec![2.0]);
        assert_eq!(grid[1].bollinger.as_ref().unwrap().std_devs, vec![2.5]);

        for combo in &grid {
            assert_eq!(combo.signal_variants().len(), 4);
            assert!(combo.stochastic.is_none());
        }
    }

    #[test]
    fn expand_grid_of_empty_params() {
        let grid = IndicatorParams::default().expand_grid();
        assert_eq!(grid, vec![IndicatorParams::default()]);
    }

    #[test]
    fn parse_lists() {
        assert_eq!(parse_usize_list("9, 14,21").unwrap(), vec![9, 14, 21]);
        assert_eq!(parse_f64_list("2, 2.5").unwrap(), vec![2.0, 2.5]);
        assert!(parse_usize_list("9,x").is_err());
        assert!(parse_usize_list("").unwrap().is_empty());
    }

    #[test]
    fn label_names_every_variant() {
        let combo = &full_params().expand_grid()[0];
        assert_eq!(combo.label(), "RSI_9_20_70 MACD_12_26_9 BB_20_2 EMA_10_50 ATR_14");
    }

    #[test]
    fn family_names_in_order() {
        assert_eq!(
            full_params().family_names(),
            vec!["RSI", "EMA", "MACD", "Bollinger_Bands", "ATR"]
        );
    }
}
