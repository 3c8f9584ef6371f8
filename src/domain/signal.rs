//! Signal generation.
//!
//! Each configured indicator variant produces a pair of per-bar boolean
//! vectors (long, short). The canonical decision counts how many variants
//! agree on a bar and fires once the count reaches `min_confirmations`.
//! A bar where both directions reach the threshold fires neither.

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;

use crate::domain::indicator::{from_x100, to_x100, IndicatorSet, IndicatorType};
use crate::domain::ohlcv::PriceBar;
use crate::domain::params::IndicatorParams;

pub const DEFAULT_MIN_CONFIRMATIONS: usize = 2;
pub const DEFAULT_STOP_LOSS_PCT: f64 = 0.02;
pub const DEFAULT_ATR_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_REWARD_RISK: f64 = 2.0;

/// One signal-producing indicator configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SignalVariant {
    Rsi {
        period: usize,
        oversold_x100: u32,
        overbought_x100: u32,
    },
    Macd {
        fast: usize,
        slow: usize,
        signal: usize,
    },
    Bollinger {
        period: usize,
        stddev_mult_x100: u32,
    },
    EmaCross {
        short: usize,
        long: usize,
    },
}

impl SignalVariant {
    pub fn rsi(period: usize, oversold: f64, overbought: f64) -> Self {
        SignalVariant::Rsi {
            period,
            oversold_x100: to_x100(oversold),
            overbought_x100: to_x100(overbought),
        }
    }

    pub fn bollinger(period: usize, stddev_mult: f64) -> Self {
        SignalVariant::Bollinger {
            period,
            stddev_mult_x100: to_x100(stddev_mult),
        }
    }
}

impl fmt::Display for SignalVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalVariant::Rsi {
                period,
                oversold_x100,
                overbought_x100,
            } => write!(
                f,
                "RSI_{}_{}_{}",
                period,
                from_x100(*oversold_x100),
                from_x100(*overbought_x100)
            ),
            SignalVariant::Macd { fast, slow, signal } => {
                write!(f, "MACD_{}_{}_{}", fast, slow, signal)
            }
            SignalVariant::Bollinger {
                period,
                stddev_mult_x100,
            } => write!(f, "BB_{}_{}", period, from_x100(*stddev_mult_x100)),
            SignalVariant::EmaCross { short, long } => write!(f, "EMA_{}_{}", short, long),
        }
    }
}

/// Intraday window inside which variants may signal. Both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SessionWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        let t = timestamp.time();
        t >= self.start && t <= self.end
    }
}

impl Default for SessionWindow {
    /// Regular session with the first and last 30 minutes excluded.
    fn default() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or(NaiveTime::MIN),
            end: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

/// Per-run signal settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalConfig {
    pub min_confirmations: usize,
    pub stop_loss_pct: f64,
    pub atr_multiplier: f64,
    pub reward_risk: f64,
    pub session: Option<SessionWindow>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            min_confirmations: DEFAULT_MIN_CONFIRMATIONS,
            stop_loss_pct: DEFAULT_STOP_LOSS_PCT,
            atr_multiplier: DEFAULT_ATR_MULTIPLIER,
            reward_risk: DEFAULT_REWARD_RISK,
            session: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariantSignals {
    pub variant: SignalVariant,
    pub name: String,
    pub long: Vec<bool>,
    pub short: Vec<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalFrame {
    pub variants: Vec<VariantSignals>,
    pub long_strength: Vec<usize>,
    pub short_strength: Vec<usize>,
    pub long_signal: Vec<bool>,
    pub short_signal: Vec<bool>,
    pub stop_distance: Vec<f64>,
    pub take_profit_distance: Vec<f64>,
}

impl SignalFrame {
    pub fn len(&self) -> usize {
        self.long_signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.long_signal.is_empty()
    }
}

/// Produce per-variant and canonical signals plus exit distances.
pub fn generate_signals(
    bars: &[PriceBar],
    indicators: &IndicatorSet,
    params: &IndicatorParams,
    config: &SignalConfig,
) -> SignalFrame {
    let mut variants: Vec<VariantSignals> = params
        .signal_variants()
        .into_iter()
        .map(|variant| {
            let (long, short) = variant_signals(bars, indicators, variant);
            VariantSignals {
                variant,
                name: variant.to_string(),
                long,
                short,
            }
        })
        .collect();

    if let Some(session) = &config.session {
        for v in &mut variants {
            for (i, bar) in bars.iter().enumerate() {
                if !session.contains(bar.timestamp) {
                    v.long[i] = false;
                    v.short[i] = false;
                }
            }
        }
    }

    let (stop_distance, take_profit_distance) = exit_distances(bars, indicators, params, config);
    combine(
        variants,
        bars.len(),
        config.min_confirmations,
        stop_distance,
        take_profit_distance,
    )
}

pub(crate) fn combine(
    variants: Vec<VariantSignals>,
    len: usize,
    min_confirmations: usize,
    stop_distance: Vec<f64>,
    take_profit_distance: Vec<f64>,
) -> SignalFrame {
    let mut long_strength = vec![0usize; len];
    let mut short_strength = vec![0usize; len];
    for v in &variants {
        for i in 0..len {
            long_strength[i] += v.long[i] as usize;
            short_strength[i] += v.short[i] as usize;
        }
    }

    // With zero variants nothing may fire, even if min_confirmations is 0.
    let fires = |strength: usize| strength > 0 && strength >= min_confirmations;
    let mut long_signal: Vec<bool> = long_strength.iter().map(|&s| fires(s)).collect();
    let mut short_signal: Vec<bool> = short_strength.iter().map(|&s| fires(s)).collect();
    for i in 0..len {
        if long_signal[i] && short_signal[i] {
            long_signal[i] = false;
            short_signal[i] = false;
        }
    }

    SignalFrame {
        variants,
        long_strength,
        short_strength,
        long_signal,
        short_signal,
        stop_distance,
        take_profit_distance,
    }
}

fn variant_signals(
    bars: &[PriceBar],
    indicators: &IndicatorSet,
    variant: SignalVariant,
) -> (Vec<bool>, Vec<bool>) {
    let n = bars.len();
    let mut long = vec![false; n];
    let mut short = vec![false; n];

    match variant {
        SignalVariant::Rsi {
            period,
            oversold_x100,
            overbought_x100,
        } => {
            let Some(rsi) = indicators.get(&IndicatorType::Rsi(period)) else {
                return (long, short);
            };
            let oversold = from_x100(oversold_x100);
            let overbought = from_x100(overbought_x100);
            for i in 1..n {
                if let (Some(prev), Some(cur)) = (rsi.simple(i - 1), rsi.simple(i)) {
                    long[i] = prev <= oversold && cur > oversold;
                    short[i] = prev >= overbought && cur < overbought;
                }
            }
        }
        SignalVariant::Macd { fast, slow, signal } => {
            let Some(macd) = indicators.get(&IndicatorType::Macd { fast, slow, signal }) else {
                return (long, short);
            };
            for i in 1..n {
                if let (Some(prev), Some(cur)) = (macd.macd(i - 1), macd.macd(i)) {
                    long[i] = crossed_above(prev, cur);
                    short[i] = crossed_below(prev, cur);
                }
            }
        }
        SignalVariant::Bollinger {
            period,
            stddev_mult_x100,
        } => {
            let key = IndicatorType::Bollinger {
                period,
                stddev_mult_x100,
            };
            let Some(bb) = indicators.get(&key) else {
                return (long, short);
            };
            for (i, bar) in bars.iter().enumerate() {
                if let Some((upper, _, lower)) = bb.bollinger(i) {
                    long[i] = bar.low <= lower && bar.close > lower && bar.is_bullish();
                    short[i] = bar.high >= upper && bar.close < upper && bar.is_bearish();
                }
            }
        }
        SignalVariant::EmaCross { short: s, long: l } => {
            let (Some(fast), Some(slow)) = (
                indicators.get(&IndicatorType::Ema(s)),
                indicators.get(&IndicatorType::Ema(l)),
            ) else {
                return (long, short);
            };
            for i in 1..n {
                let prev = fast.simple(i - 1).zip(slow.simple(i - 1));
                let cur = fast.simple(i).zip(slow.simple(i));
                if let (Some(prev), Some(cur)) = (prev, cur) {
                    long[i] = crossed_above(prev, cur);
                    short[i] = crossed_below(prev, cur);
                }
            }
        }
    }

    (long, short)
}

/// `a` moved from at-or-below `b` to strictly above it.
fn crossed_above(prev: (f64, f64), cur: (f64, f64)) -> bool {
    prev.0 <= prev.1 && cur.0 > cur.1
}

fn crossed_below(prev: (f64, f64), cur: (f64, f64)) -> bool {
    prev.0 >= prev.1 && cur.0 < cur.1
}

fn exit_distances(
    bars: &[PriceBar],
    indicators: &IndicatorSet,
    params: &IndicatorParams,
    config: &SignalConfig,
) -> (Vec<f64>, Vec<f64>) {
    let atr = params.stop_atr().and_then(|t| indicators.get(&t));
    let stop: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| match atr.and_then(|s| s.simple(i)) {
            Some(atr) => config.atr_multiplier * atr,
            None => config.stop_loss_pct * bar.close,
        })
        .collect();
    let take_profit = stop.iter().map(|d| d * config.reward_risk).collect();
    (stop, take_profit)
}
