/// Market structure and volume analysis
///
/// Swing structure (higher highs / lower lows) and volume behaviour over
/// recent candles, within one timeframe and across timeframes.
use crate::models::{Candle, Timeframe};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MarketStructure {
    HigherHighsHigherLows, // Uptrend
    LowerHighsLowerLows,   // Downtrend
    Mixed,                 // No clear structure
}

impl MarketStructure {
    pub fn label(&self) -> &'static str {
        match self {
            MarketStructure::HigherHighsHigherLows => "higher highs & higher lows (uptrend)",
            MarketStructure::LowerHighsLowerLows => "lower highs & lower lows (downtrend)",
            MarketStructure::Mixed => "mixed (no clear structure)",
        }
    }
}

/// Predominant swing structure over the last `lookback` closes
///
/// Needs at least two swing highs and two swing lows, and three agreeing
/// comparisons, to call a direction.
pub fn analyze_market_structure(candles: &[Candle], lookback: usize) -> MarketStructure {
    if candles.len() < lookback || lookback < 4 {
        return MarketStructure::Mixed;
    }

    let closes: Vec<f64> = candles[candles.len() - lookback..].iter().map(|c| c.close).collect();

    let mut swing_highs = Vec::new();
    let mut swing_lows = Vec::new();
    for w in closes.windows(3) {
        if w[1] > w[0] && w[1] > w[2] {
            swing_highs.push(w[1]);
        }
        if w[1] < w[0] && w[1] < w[2] {
            swing_lows.push(w[1]);
        }
    }

    if swing_highs.len() < 2 || swing_lows.len() < 2 {
        return MarketStructure::Mixed;
    }

    let rising = |swings: &[f64]| swings.windows(2).filter(|w| w[1] > w[0]).count();
    let falling = |swings: &[f64]| swings.windows(2).filter(|w| w[1] <= w[0]).count();

    let up = rising(&swing_highs) + rising(&swing_lows);
    let down = falling(&swing_highs) + falling(&swing_lows);

    if up > down && up >= 3 {
        MarketStructure::HigherHighsHigherLows
    } else if down > up && down >= 3 {
        MarketStructure::LowerHighsLowerLows
    } else {
        MarketStructure::Mixed
    }
}

/// Percentage band inside which volume is considered flat
const VOLUME_FLAT_BAND_PCT: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeDirection {
    Increasing,
    Decreasing,
    Flat,
}

impl VolumeDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeDirection::Increasing => "increasing",
            VolumeDirection::Decreasing => "decreasing",
            VolumeDirection::Flat => "flat",
        }
    }
}

/// Volume trend from the first to the last of the last `period` candles
pub fn calculate_volume_trend(candles: &[Candle], period: usize) -> Option<(VolumeDirection, f64)> {
    if period < 2 || candles.len() < period {
        return None;
    }

    let window = &candles[candles.len() - period..];
    // Zero volume at the start would blow up the ratio
    let start = window[0].volume.max(1e-6);
    let end = window[period - 1].volume;
    let change_pct = (end - start) / start * 100.0;

    let direction = if change_pct.abs() < VOLUME_FLAT_BAND_PCT {
        VolumeDirection::Flat
    } else if change_pct > 0.0 {
        VolumeDirection::Increasing
    } else {
        VolumeDirection::Decreasing
    };

    Some((direction, change_pct))
}

/// Current volume divided by the average of the last `period` volumes
pub fn calculate_volume_ratio(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period {
        return None;
    }

    let average = candles[candles.len() - period..]
        .iter()
        .map(|c| c.volume)
        .sum::<f64>()
        / period as f64;
    if average <= 0.0 {
        return None;
    }

    candles.last().map(|c| c.volume / average)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnomalyKind {
    Spike,
    Drop,
    None,
}

impl AnomalyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyKind::Spike => "spike",
            AnomalyKind::Drop => "drop",
            AnomalyKind::None => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolumeAnomaly {
    pub kind: AnomalyKind,
    pub z_score: f64,
    /// Current volume relative to the baseline mean, in percent
    pub deviation_pct: f64,
    /// Anomalous candles among the last five
    pub recent_count: usize,
}

/// Candles inspected for the recent-anomaly count
const RECENT_ANOMALY_WINDOW: usize = 5;

/// Z-score of the last volume against the `baseline` candles before it
///
/// `None` when there are fewer than `baseline + 1` candles or the baseline
/// mean is zero. A flat baseline is treated as a tiny deviation so any
/// change still registers.
pub fn detect_volume_anomaly(candles: &[Candle], baseline: usize, threshold: f64) -> Option<VolumeAnomaly> {
    if baseline < 2 || candles.len() < baseline + 1 {
        return None;
    }

    let n = candles.len();
    let window = &candles[n - 1 - baseline..n - 1];
    let mean = window.iter().map(|c| c.volume).sum::<f64>() / baseline as f64;
    if mean <= 0.0 {
        return None;
    }
    let variance = window.iter().map(|c| (c.volume - mean).powi(2)).sum::<f64>() / (baseline - 1) as f64;
    let std_dev = variance.sqrt().max(1e-6);

    let z = |volume: f64| (volume - mean) / std_dev;
    let current = candles[n - 1].volume;
    let z_score = z(current);

    let kind = if z_score.abs() <= threshold {
        AnomalyKind::None
    } else if z_score > 0.0 {
        AnomalyKind::Spike
    } else {
        AnomalyKind::Drop
    };

    let recent_count = candles[n.saturating_sub(RECENT_ANOMALY_WINDOW)..]
        .iter()
        .filter(|c| z(c.volume).abs() > threshold)
        .count();

    Some(VolumeAnomaly {
        kind,
        z_score,
        deviation_pct: (current / mean - 1.0) * 100.0,
        recent_count,
    })
}

/// Volume profile of one timeframe in a cross-timeframe comparison
#[derive(Debug, Clone, PartialEq)]
pub struct TimeframeVolume {
    /// Last volume as a percentage of its moving average
    pub current_vs_ma_pct: f64,
    pub trend: VolumeDirection,
    pub trend_change_pct: f64,
    /// Average volume per hour over the moving-average window
    pub hourly_rate: f64,
    /// `hourly_rate` relative to the longest compared timeframe
    pub rate_vs_longest: Option<f64>,
}

/// Shortest and longest timeframes trending volume in opposite directions
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeDivergence {
    pub short: Timeframe,
    pub short_trend: VolumeDirection,
    pub long: Timeframe,
    pub long_trend: VolumeDirection,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VolumeComparison {
    pub timeframes: BTreeMap<Timeframe, TimeframeVolume>,
    /// Timeframes left out for lack of candles
    pub insufficient: Vec<Timeframe>,
    pub divergence: Option<VolumeDivergence>,
}

/// Compare volume behaviour across timeframes
///
/// Volumes are normalized to an hourly rate so timeframes of different
/// length can be compared directly.
pub fn compare_volume_across_timeframes(
    series: &BTreeMap<Timeframe, &[Candle]>,
    ma_period: usize,
    trend_period: usize,
) -> VolumeComparison {
    let mut comparison = VolumeComparison::default();

    for (tf, candles) in series {
        let Some(ratio) = calculate_volume_ratio(candles, ma_period) else {
            comparison.insufficient.push(*tf);
            continue;
        };
        let Some((trend, trend_change_pct)) = calculate_volume_trend(candles, trend_period) else {
            comparison.insufficient.push(*tf);
            continue;
        };

        let average = candles[candles.len() - ma_period..]
            .iter()
            .map(|c| c.volume)
            .sum::<f64>()
            / ma_period as f64;
        let hours = tf.interval_secs() as f64 / 3600.0;

        comparison.timeframes.insert(
            *tf,
            TimeframeVolume {
                current_vs_ma_pct: ratio * 100.0,
                trend,
                trend_change_pct,
                hourly_rate: average / hours,
                rate_vs_longest: None,
            },
        );
    }

    let longest_rate = comparison
        .timeframes
        .values()
        .next_back()
        .map(|v| v.hourly_rate)
        .filter(|rate| *rate > 0.0);
    if let Some(base) = longest_rate {
        for volume in comparison.timeframes.values_mut() {
            volume.rate_vs_longest = Some(volume.hourly_rate / base);
        }
    }

    if comparison.timeframes.len() > 1 {
        let first = comparison.timeframes.iter().next();
        let last = comparison.timeframes.iter().next_back();
        if let (Some((short, s)), Some((long, l))) = (first, last) {
            let opposite = matches!(
                (s.trend, l.trend),
                (VolumeDirection::Increasing, VolumeDirection::Decreasing)
                    | (VolumeDirection::Decreasing, VolumeDirection::Increasing)
            );
            if opposite {
                comparison.divergence = Some(VolumeDivergence {
                    short: *short,
                    short_trend: s.trend,
                    long: *long,
                    long_trend: l.trend,
                });
            }
        }
    }

    comparison
}
