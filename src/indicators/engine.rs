//! Indicator engine: a pure function from a candle series to an
//! [`IndicatorSet`]. Indicators that need more candles than are available
//! are left out and listed as absent together with the reason.

use super::adx::{adx_min_candles, calculate_adx};
use super::atr::calculate_atr;
use super::bollinger::calculate_bollinger;
use super::fibonacci::{calculate_fibonacci_levels, calculate_fibonacci_pivots, FibonacciOutcome};
use super::macd::{calculate_macd, macd_min_candles};
use super::market_analysis::{
    analyze_market_structure, calculate_volume_ratio, calculate_volume_trend, detect_volume_anomaly,
};
use super::moving_average::{calculate_ema, calculate_sma};
use super::rsi::calculate_rsi;
use super::volatility::{calculate_volatility, calculate_vwap};
use crate::models::Candle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Indicator periods, overridable from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub sma_short: usize,
    pub sma_long: usize,
    pub ema_short: usize,
    pub ema_long: usize,
    pub atr_period: usize,
    pub adx_period: usize,
    pub bollinger_period: usize,
    pub bollinger_std_devs: f64,
    pub fibonacci_lookback: usize,
    pub volume_trend_period: usize,
    pub volume_ma_period: usize,
    pub structure_lookback: usize,
    pub volume_anomaly_lookback: usize,
    /// Z-score beyond which a volume reading is anomalous
    pub volume_anomaly_threshold: f64,
    pub vwap_period: usize,
    pub volatility_period: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_fast: 21,
            macd_slow: 50,
            macd_signal: 9,
            sma_short: 100,
            sma_long: 200,
            ema_short: 13,
            ema_long: 50,
            atr_period: 14,
            adx_period: 14,
            bollinger_period: 20,
            bollinger_std_devs: 2.0,
            fibonacci_lookback: 60,
            volume_trend_period: 10,
            volume_ma_period: 20,
            structure_lookback: 20,
            volume_anomaly_lookback: 30,
            volume_anomaly_threshold: 2.0,
            vwap_period: 24,
            volatility_period: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Rsi,
    Macd,
    SmaShort,
    SmaLong,
    EmaShort,
    EmaLong,
    Atr,
    Adx,
    BollingerBands,
    Fibonacci,
    Pivots,
    VolumeTrend,
    VolumeRatio,
    VolumeAnomaly,
    MarketStructure,
    Vwap,
    Volatility,
}

impl IndicatorKind {
    pub const ALL: [IndicatorKind; 17] = [
        IndicatorKind::Rsi,
        IndicatorKind::Macd,
        IndicatorKind::SmaShort,
        IndicatorKind::SmaLong,
        IndicatorKind::EmaShort,
        IndicatorKind::EmaLong,
        IndicatorKind::Atr,
        IndicatorKind::Adx,
        IndicatorKind::BollingerBands,
        IndicatorKind::Fibonacci,
        IndicatorKind::Pivots,
        IndicatorKind::VolumeTrend,
        IndicatorKind::VolumeRatio,
        IndicatorKind::VolumeAnomaly,
        IndicatorKind::MarketStructure,
        IndicatorKind::Vwap,
        IndicatorKind::Volatility,
    ];

    /// Human label including the configured period
    pub fn label(&self, config: &IndicatorConfig) -> String {
        match self {
            IndicatorKind::Rsi => format!("RSI({})", config.rsi_period),
            IndicatorKind::Macd => format!(
                "MACD({},{},{})",
                config.macd_fast, config.macd_slow, config.macd_signal
            ),
            IndicatorKind::SmaShort => format!("SMA({})", config.sma_short),
            IndicatorKind::SmaLong => format!("SMA({})", config.sma_long),
            IndicatorKind::EmaShort => format!("EMA({})", config.ema_short),
            IndicatorKind::EmaLong => format!("EMA({})", config.ema_long),
            IndicatorKind::Atr => format!("ATR({})", config.atr_period),
            IndicatorKind::Adx => format!("ADX({})", config.adx_period),
            IndicatorKind::BollingerBands => format!(
                "Bollinger Bands({}, {})",
                config.bollinger_period, config.bollinger_std_devs
            ),
            IndicatorKind::Fibonacci => format!("Fibonacci retracement({})", config.fibonacci_lookback),
            IndicatorKind::Pivots => "Fibonacci pivots".to_string(),
            IndicatorKind::VolumeTrend => format!("Volume trend({})", config.volume_trend_period),
            IndicatorKind::VolumeRatio => format!("Volume vs MA({})", config.volume_ma_period),
            IndicatorKind::VolumeAnomaly => format!("Volume anomaly({})", config.volume_anomaly_lookback),
            IndicatorKind::MarketStructure => format!("Market structure({})", config.structure_lookback),
            IndicatorKind::Vwap => format!("VWAP({})", config.vwap_period),
            IndicatorKind::Volatility => format!("Volatility({})", config.volatility_period),
        }
    }

    /// Longest lookback window, in candles
    pub fn min_candles(&self, config: &IndicatorConfig) -> usize {
        match self {
            IndicatorKind::Rsi => config.rsi_period + 1,
            IndicatorKind::Macd => macd_min_candles(config.macd_slow, config.macd_signal),
            IndicatorKind::SmaShort => config.sma_short,
            IndicatorKind::SmaLong => config.sma_long,
            IndicatorKind::EmaShort => config.ema_short,
            IndicatorKind::EmaLong => config.ema_long,
            IndicatorKind::Atr => config.atr_period + 1,
            IndicatorKind::Adx => adx_min_candles(config.adx_period),
            IndicatorKind::BollingerBands => config.bollinger_period,
            IndicatorKind::Fibonacci => config.fibonacci_lookback,
            IndicatorKind::Pivots => 1,
            IndicatorKind::VolumeTrend => config.volume_trend_period.max(2),
            IndicatorKind::VolumeRatio => config.volume_ma_period,
            IndicatorKind::VolumeAnomaly => config.volume_anomaly_lookback.max(2) + 1,
            IndicatorKind::MarketStructure => config.structure_lookback.max(4),
            IndicatorKind::Vwap => config.vwap_period,
            IndicatorKind::Volatility => config.volatility_period.max(2) + 1,
        }
        .max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IndicatorValue {
    Value(f64),
    Macd { macd: f64, signal: f64, histogram: f64 },
    Bands { lower: f64, middle: f64, upper: f64 },
    Directional { adx: f64, plus_di: f64, minus_di: f64 },
    Levels(Vec<(String, f64)>),
    Trend { direction: String, change_pct: f64 },
    Anomaly { kind: String, z_score: f64, deviation_pct: f64, recent: usize },
    Volatility { returns_std_pct: f64, range_pct: f64 },
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AbsentReason {
    InsufficientCandles { required: usize, available: usize },
    /// Input was long enough but produced no meaningful value
    Degenerate(String),
}

/// Indicator values for one timeframe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSet {
    pub values: BTreeMap<IndicatorKind, IndicatorValue>,
    pub absent: BTreeMap<IndicatorKind, AbsentReason>,
    pub candle_count: usize,
}

impl IndicatorSet {
    pub fn get(&self, kind: IndicatorKind) -> Option<&IndicatorValue> {
        self.values.get(&kind)
    }

    /// Scalar reading, for indicators that produce a single number
    pub fn scalar(&self, kind: IndicatorKind) -> Option<f64> {
        match self.values.get(&kind) {
            Some(IndicatorValue::Value(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn is_absent(&self, kind: IndicatorKind) -> bool {
        self.absent.contains_key(&kind)
    }
}

/// Stateless indicator calculator
#[derive(Debug, Clone, Default)]
pub struct IndicatorEngine {
    config: IndicatorConfig,
}

impl IndicatorEngine {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    /// Compute every indicator the series is long enough for
    pub fn compute(&self, candles: &[Candle]) -> IndicatorSet {
        let mut set = IndicatorSet {
            candle_count: candles.len(),
            ..Default::default()
        };
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        for kind in IndicatorKind::ALL {
            let required = kind.min_candles(&self.config);
            if candles.len() < required {
                set.absent.insert(
                    kind,
                    AbsentReason::InsufficientCandles {
                        required,
                        available: candles.len(),
                    },
                );
                continue;
            }

            match self.compute_one(kind, candles, &closes) {
                Ok(value) => {
                    set.values.insert(kind, value);
                }
                Err(reason) => {
                    set.absent.insert(kind, reason);
                }
            }
        }

        set
    }

    fn compute_one(
        &self,
        kind: IndicatorKind,
        candles: &[Candle],
        closes: &[f64],
    ) -> Result<IndicatorValue, AbsentReason> {
        let cfg = &self.config;
        let degenerate = |what: &str| AbsentReason::Degenerate(what.to_string());

        let value = match kind {
            IndicatorKind::Rsi => calculate_rsi(closes, cfg.rsi_period).map(IndicatorValue::Value),
            IndicatorKind::Macd => calculate_macd(closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)
                .map(|m| IndicatorValue::Macd {
                    macd: m.macd,
                    signal: m.signal,
                    histogram: m.histogram,
                }),
            IndicatorKind::SmaShort => calculate_sma(closes, cfg.sma_short).map(IndicatorValue::Value),
            IndicatorKind::SmaLong => calculate_sma(closes, cfg.sma_long).map(IndicatorValue::Value),
            IndicatorKind::EmaShort => calculate_ema(closes, cfg.ema_short).map(IndicatorValue::Value),
            IndicatorKind::EmaLong => calculate_ema(closes, cfg.ema_long).map(IndicatorValue::Value),
            IndicatorKind::Atr => calculate_atr(candles, cfg.atr_period).map(IndicatorValue::Value),
            IndicatorKind::Adx => calculate_adx(candles, cfg.adx_period).map(|r| {
                IndicatorValue::Directional {
                    adx: r.adx,
                    plus_di: r.plus_di,
                    minus_di: r.minus_di,
                }
            }),
            IndicatorKind::BollingerBands => {
                calculate_bollinger(closes, cfg.bollinger_period, cfg.bollinger_std_devs).map(|b| {
                    IndicatorValue::Bands {
                        lower: b.lower,
                        middle: b.middle,
                        upper: b.upper,
                    }
                })
            }
            IndicatorKind::Fibonacci => match calculate_fibonacci_levels(candles, cfg.fibonacci_lookback) {
                Some(FibonacciOutcome::Levels(levels)) => Some(IndicatorValue::Levels(levels)),
                Some(FibonacciOutcome::FlatRange) => return Err(degenerate("flat price range")),
                None => None,
            },
            IndicatorKind::Pivots => candles
                .last()
                .map(|c| IndicatorValue::Levels(calculate_fibonacci_pivots(c))),
            IndicatorKind::VolumeTrend => calculate_volume_trend(candles, cfg.volume_trend_period)
                .map(|(direction, change_pct)| IndicatorValue::Trend {
                    direction: direction.as_str().to_string(),
                    change_pct,
                }),
            IndicatorKind::VolumeRatio => match calculate_volume_ratio(candles, cfg.volume_ma_period) {
                Some(ratio) => Some(IndicatorValue::Value(ratio)),
                None => return Err(degenerate("zero average volume")),
            },
            IndicatorKind::VolumeAnomaly => match detect_volume_anomaly(
                candles,
                cfg.volume_anomaly_lookback,
                cfg.volume_anomaly_threshold,
            ) {
                Some(a) => Some(IndicatorValue::Anomaly {
                    kind: a.kind.as_str().to_string(),
                    z_score: a.z_score,
                    deviation_pct: a.deviation_pct,
                    recent: a.recent_count,
                }),
                None => return Err(degenerate("zero baseline volume")),
            },
            IndicatorKind::Vwap => match calculate_vwap(candles, cfg.vwap_period) {
                Some(vwap) => Some(IndicatorValue::Value(vwap)),
                None => return Err(degenerate("zero volume in window")),
            },
            IndicatorKind::Volatility => calculate_volatility(candles, cfg.volatility_period).map(|v| {
                IndicatorValue::Volatility {
                    returns_std_pct: v.returns_std_pct,
                    range_pct: v.range_pct,
                }
            }),
            IndicatorKind::MarketStructure => Some(IndicatorValue::Label(
                analyze_market_structure(candles, cfg.structure_lookback)
                    .label()
                    .to_string(),
            )),
        };

        value
            .filter(|v| match v {
                IndicatorValue::Value(x) => x.is_finite(),
                _ => true,
            })
            .ok_or_else(|| degenerate("no finite value"))
    }
}
